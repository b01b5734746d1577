//! Headless sprite rendering.
//!
//! Draws a few thousand depth-sorted sprites from two textures into an
//! offscreen target through a deliberately small ring, then reads the target
//! back and reports how many pixels were covered.
//!
//! Run with: cargo run -p tessera-render --example headless_sprites

use tessera_core::config::{Config, ProfilingMode};
use tessera_core::profiling;
use tessera_gpu::{GraphicsDevice, TextureDescriptor};
use tessera_render::{
    Color, DepthOrder, EffectDescriptor, GraphicsContext, GraphicsContextDescriptor, PackedColor,
    QuadBatch, QuadEffect, QuadParams, WgpuDevice, WgpuDeviceDescriptor, bind_texture,
    sprite_vertices, upload_projection,
};

const SIZE: u32 = 256;
const SPRITES: usize = 3000;

fn checker(size: u32, a: PackedColor, b: PackedColor) -> Vec<u8> {
    (0..size * size)
        .flat_map(|i| {
            let (x, y) = (i % size, i / size);
            let color = if (x + y) % 2 == 0 { a } else { b };
            color.to_array()
        })
        .collect()
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tessera_core::init(&Config::default().with_profiling(ProfilingMode::On));

    let context = pollster::block_on(GraphicsContext::new_owned_with_descriptor(
        GraphicsContextDescriptor::new(),
    ))?;
    tracing::info!("Adapter: {:?}", context.info());
    let device = WgpuDevice::new(context.clone(), WgpuDeviceDescriptor::default());

    let red = device.create_texture(
        &TextureDescriptor {
            label: Some("red_checker"),
            width: 4,
            height: 4,
            filter_linear: false,
        },
        &checker(4, PackedColor::from_hex(0xFF4040FF), PackedColor::WHITE),
    )?;
    let blue = device.create_texture(
        &TextureDescriptor {
            label: Some("blue_checker"),
            width: 4,
            height: 4,
            filter_linear: true,
        },
        &checker(4, PackedColor::from_hex(0x4060FFFF), PackedColor::WHITE),
    )?;

    // A small ring so the frame wraps several times
    let mut effect = QuadEffect::new("headless_sprites");
    effect.create_resources(
        &device,
        &EffectDescriptor::sprites(512, SIZE as f32, SIZE as f32),
    )?;
    let mut batch = QuadBatch::new(SPRITES);

    let target = context.device().create_texture(&wgpu::TextureDescriptor {
        label: Some("headless_target"),
        size: wgpu::Extent3d {
            width: SIZE,
            height: SIZE,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8UnormSrgb,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    });
    let view = target.create_view(&wgpu::TextureViewDescriptor::default());

    for frame in 0..3 {
        profiling::new_frame();
        batch.flush();
        effect.reset_stats();

        for i in 0..SPRITES {
            let t = i as f32 * 0.37 + frame as f32;
            let texture = if i % 3 == 0 { red } else { blue };
            let params = QuadParams::new(
                (t * 13.0) % (SIZE as f32 - 8.0),
                (t * 7.0) % (SIZE as f32 - 8.0),
            )
            .with_source(0.0, 0.0, 4.0, 4.0)
            .with_image(4.0, 4.0)
            .with_scale(2.0, 2.0)
            .with_origin(4.0, 4.0)
            .with_orientation(t)
            .with_depth((i % 17) as f32)
            .with_color(Color::rgba(1.0, 1.0, 1.0, 0.8));
            batch.add(texture, &params)?;
        }
        batch.sort_by_depth(DepthOrder::BackToFront);

        effect
            .make_current(&device, upload_projection)?
            .draw_batch(&device, &batch, sprite_vertices, bind_texture)?;
        device.submit(&view, None, Some(Color::BLACK))?;

        tracing::info!("Frame {}: {:?}", frame, effect.stats());
    }

    let covered = count_covered_pixels(&context, &target);
    tracing::info!(
        "{} of {} pixels covered",
        covered,
        SIZE as usize * SIZE as usize
    );

    effect.delete_resources(&device);
    Ok(())
}

fn count_covered_pixels(context: &GraphicsContext, target: &wgpu::Texture) -> usize {
    let bytes_per_row = SIZE * 4;
    let readback = context.device().create_buffer(&wgpu::BufferDescriptor {
        label: Some("headless_readback"),
        size: (bytes_per_row * SIZE) as u64,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = context
        .device()
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("headless_readback"),
        });
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            texture: target,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::TexelCopyBufferInfo {
            buffer: &readback,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(bytes_per_row),
                rows_per_image: Some(SIZE),
            },
        },
        target.size(),
    );
    context.queue().submit(std::iter::once(encoder.finish()));

    let slice = readback.slice(..);
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    let _ = context.device().poll(wgpu::PollType::Wait {
        submission_index: None,
        timeout: None,
    });

    match rx.recv() {
        Ok(Ok(())) => {
            let data = slice.get_mapped_range();
            data.chunks_exact(4).filter(|pixel| pixel[..3] != [0, 0, 0]).count()
        }
        _ => {
            tracing::error!("Failed to map readback buffer");
            0
        }
    }
}
