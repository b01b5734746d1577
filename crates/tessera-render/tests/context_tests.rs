//! Graphics context lifecycle and wgpu device tests.

use std::sync::Arc;

use tessera_gpu::{DeviceError, GraphicsDevice, TextureDescriptor};
use tessera_render::{
    Color, DepthOrder, EffectDescriptor, GraphicsContext, GraphicsContextDescriptor,
    GraphicsError, QuadBatch, QuadEffect, QuadParams, WgpuDevice, WgpuDeviceDescriptor,
    bind_texture, sprite_vertices, upload_projection,
};

fn headless_context() -> Option<Arc<GraphicsContext>> {
    let descriptor = GraphicsContextDescriptor::new().with_limits(wgpu::Limits::downlevel_defaults());
    match pollster::block_on(GraphicsContext::new_owned_with_descriptor(descriptor)) {
        Ok(ctx) => Some(ctx),
        Err(e) => {
            println!("GPU not available: {}", e);
            None
        }
    }
}

fn render_target(ctx: &GraphicsContext, width: u32, height: u32) -> wgpu::TextureView {
    ctx.device()
        .create_texture(&wgpu::TextureDescriptor {
            label: Some("test_target"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        })
        .create_view(&wgpu::TextureViewDescriptor::default())
}

#[test]
#[ignore] // Requires GPU - run with: cargo test --test context_tests -- --ignored
fn test_context_creation_sync() {
    if let Some(ctx) = headless_context() {
        assert_eq!(Arc::strong_count(&ctx), 1);
        assert!(ctx.limits().max_texture_dimension_2d > 0);
    }
}

#[test]
#[ignore] // Requires GPU
fn test_context_arc_cloning() {
    if let Some(ctx) = headless_context() {
        let ctx2 = ctx.clone();
        assert_eq!(Arc::strong_count(&ctx), 2);
        assert_eq!(
            ctx.device().limits().max_texture_dimension_2d,
            ctx2.device().limits().max_texture_dimension_2d
        );

        drop(ctx2);
        assert_eq!(Arc::strong_count(&ctx), 1);

        let weak = Arc::downgrade(&ctx);
        drop(ctx);
        assert!(weak.upgrade().is_none());
    }
}

#[test]
#[ignore] // Requires GPU
fn test_wgpu_device_draws_wrapped_ring() {
    let Some(ctx) = headless_context() else {
        return;
    };
    let device = WgpuDevice::new(ctx.clone(), WgpuDeviceDescriptor::default());
    let texture = device
        .create_texture(
            &TextureDescriptor {
                label: Some("checker"),
                width: 2,
                height: 2,
                filter_linear: false,
            },
            &[255; 16],
        )
        .unwrap();

    let mut effect = QuadEffect::new("wgpu_sprites");
    effect
        .create_resources(&device, &EffectDescriptor::sprites(4, 64.0, 64.0))
        .unwrap();

    let mut batch = QuadBatch::new(16);
    for i in 0..9 {
        batch
            .add(
                texture,
                &QuadParams::new(i as f32 * 6.0, 8.0)
                    .with_image(2.0, 2.0)
                    .with_depth(i as f32),
            )
            .unwrap();
    }
    batch.sort_by_depth(DepthOrder::BackToFront);

    effect
        .make_current(&device, upload_projection)
        .unwrap()
        .draw_batch(&device, &batch, sprite_vertices, bind_texture)
        .unwrap();
    assert_eq!(effect.stats().buffering_passes, 3);
    assert!(device.pending_commands() > 0);

    let target = render_target(&ctx, 64, 64);
    device.submit(&target, None, Some(Color::BLACK)).unwrap();
    assert_eq!(device.pending_commands(), 0);
}

#[test]
#[ignore] // Requires GPU
fn test_wgpu_device_rejects_bad_shader() {
    let Some(ctx) = headless_context() else {
        return;
    };
    let device = WgpuDevice::new(ctx, WgpuDeviceDescriptor::default());

    let mut desc = EffectDescriptor::sprites(4, 64.0, 64.0);
    desc.fragment_source = "this is not wgsl";

    let mut effect: QuadEffect<tessera_gpu::TextureId> = QuadEffect::new("broken");
    assert!(effect.create_resources(&device, &desc).is_err());
    assert!(!effect.has_resources());
}

#[test]
#[ignore] // Requires GPU
fn test_wgpu_device_rejects_misaligned_upload() {
    let Some(ctx) = headless_context() else {
        return;
    };
    let device = WgpuDevice::new(ctx, WgpuDeviceDescriptor::default());
    let buffer = device
        .create_buffer(&tessera_gpu::BufferDescriptor {
            label: Some("misaligned"),
            size: 64,
            kind: tessera_gpu::BufferKind::Vertex,
        })
        .unwrap();

    assert!(matches!(
        device.upload_region(buffer, 2, &[0; 4]),
        Err(DeviceError::Misaligned { .. })
    ));
    assert!(matches!(
        device.upload_region(buffer, 64, &[0; 4]),
        Err(DeviceError::OutOfBounds { .. })
    ));
}

#[test]
fn test_graphics_error_display() {
    assert_eq!(
        GraphicsError::NoAdapter.to_string(),
        "Failed to find a suitable GPU adapter"
    );
    assert!(
        GraphicsError::DeviceCreationFailed("limits".into())
            .to_string()
            .contains("limits")
    );
}
