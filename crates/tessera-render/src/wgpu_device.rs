//! [`GraphicsDevice`] implementation on top of wgpu.
//!
//! wgpu has no immediate-mode draw calls, so the device records every upload
//! and draw in call order and replays them into one command encoder on
//! [`WgpuDevice::submit`]. Upload bytes are appended to one system-memory
//! arena; at submit the arena is written into a single reusable staging
//! buffer and each upload becomes a buffer-to-buffer copy out of it,
//! recorded between render passes. A draw therefore sees exactly the uploads
//! issued before it, which is what lets a quad ring wrap (and overwrite
//! itself) several times inside one frame.
//!
//! Fixed-function state lives in pipelines, which are created lazily per
//! `(program, RenderState)` and cached.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tessera_core::alloc::HashMap;
use tessera_core::profiling::profile_function;
use tessera_gpu::{
    BufferDescriptor, BufferId, DeviceError, DeviceResult, GraphicsDevice, ProgramDescriptor,
    ProgramError, ProgramId, RenderState, ShaderStage, StateCache, TextureDescriptor, TextureId,
    VertexLayout,
};
use wgpu::util::DeviceExt;

use crate::color::Color;
use crate::context::GraphicsContext;

/// Render target formats the device builds pipelines for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WgpuDeviceDescriptor {
    pub color_format: wgpu::TextureFormat,
    /// When set, pipelines include depth state and [`WgpuDevice::submit`]
    /// must be given a depth view of this format.
    pub depth_format: Option<wgpu::TextureFormat>,
}

impl Default for WgpuDeviceDescriptor {
    fn default() -> Self {
        Self {
            color_format: wgpu::TextureFormat::Rgba8UnormSrgb,
            depth_format: None,
        }
    }
}

struct DeviceBuffer {
    buffer: wgpu::Buffer,
    size: u64,
}

struct DeviceProgram {
    label: Option<String>,
    vertex_module: wgpu::ShaderModule,
    fragment_module: wgpu::ShaderModule,
    pipeline_layout: wgpu::PipelineLayout,
    attributes: Vec<wgpu::VertexAttribute>,
    stride: u64,
    uniform_buffer: wgpu::Buffer,
    uniform_size: u64,
    uniform_bind_group: wgpu::BindGroup,
}

struct DeviceTexture {
    _texture: wgpu::Texture,
    bind_group: wgpu::BindGroup,
}

struct DrawCommand {
    pipeline: wgpu::RenderPipeline,
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    uniforms: wgpu::BindGroup,
    texture: wgpu::BindGroup,
    first_index: u32,
    index_count: u32,
}

/// Smallest staging buffer the device allocates.
const MIN_STAGING_SIZE: u64 = 64 * 1024;

/// Upload bytes recorded since the last submit, packed back to back.
///
/// Every region starts on a copy-aligned offset. The allocation is kept
/// across frames, so steady-state recording does not allocate.
#[derive(Default)]
struct UploadArena {
    bytes: Vec<u8>,
}

impl UploadArena {
    /// Append `data` and return its offset in the arena.
    fn push(&mut self, data: &[u8]) -> u64 {
        let offset = wgpu::util::align_to(self.bytes.len() as u64, wgpu::COPY_BUFFER_ALIGNMENT);
        self.bytes.resize(offset as usize, 0);
        self.bytes.extend_from_slice(data);
        offset
    }

    fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn clear(&mut self) {
        self.bytes.clear();
    }
}

/// Staging size for an arena of `needed` bytes: grows in powers of two and
/// never shrinks below `current`.
fn staging_size(current: u64, needed: u64) -> u64 {
    if needed <= current {
        return current;
    }
    needed.next_power_of_two().max(MIN_STAGING_SIZE)
}

enum Command {
    Copy {
        src_offset: u64,
        target: wgpu::Buffer,
        offset: u64,
        size: u64,
    },
    Draw(DrawCommand),
}

#[derive(Default)]
struct DeviceState {
    next_id: u32,
    buffers: HashMap<u32, DeviceBuffer>,
    programs: HashMap<u32, DeviceProgram>,
    textures: HashMap<u32, DeviceTexture>,
    pipelines: HashMap<(ProgramId, RenderState), wgpu::RenderPipeline>,
    cache: StateCache,
    bound_buffers: Option<(BufferId, BufferId)>,
    commands: Vec<Command>,
    uploads: UploadArena,
    staging: Option<DeviceBuffer>,
}

impl DeviceState {
    fn next_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }
}

/// A wgpu-backed graphics device.
///
/// Programs use two bind groups: group 0 holds the uniform block at binding
/// 0, group 1 holds the slot-0 texture (binding 0) and its sampler (binding
/// 1). Draws without a bound texture sample a 1x1 white texture.
///
/// Once the underlying device is lost every call fails with
/// [`DeviceError::Lost`]; create a new context and device to recover.
pub struct WgpuDevice {
    context: Arc<GraphicsContext>,
    descriptor: WgpuDeviceDescriptor,
    uniform_layout: wgpu::BindGroupLayout,
    texture_layout: wgpu::BindGroupLayout,
    white_texture: DeviceTexture,
    lost: Arc<AtomicBool>,
    state: Mutex<DeviceState>,
}

impl WgpuDevice {
    pub fn new(context: Arc<GraphicsContext>, descriptor: WgpuDeviceDescriptor) -> Self {
        let device = &context.device;

        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Tessera Uniform Bind Group Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Tessera Texture Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let white_texture = create_device_texture(
            &context,
            &texture_layout,
            &TextureDescriptor {
                label: Some("Tessera White Texture"),
                width: 1,
                height: 1,
                filter_linear: false,
            },
            &[255; 4],
        );

        let lost = Arc::new(AtomicBool::new(false));
        let flag = lost.clone();
        device.set_device_lost_callback(move |reason, message| {
            flag.store(true, Ordering::SeqCst);
            tracing::error!("Graphics device lost ({:?}): {}", reason, message);
        });

        Self {
            context,
            descriptor,
            uniform_layout,
            texture_layout,
            white_texture,
            lost,
            state: Mutex::new(DeviceState::default()),
        }
    }

    pub fn context(&self) -> &Arc<GraphicsContext> {
        &self.context
    }

    pub fn descriptor(&self) -> &WgpuDeviceDescriptor {
        &self.descriptor
    }

    /// Number of recorded uploads and draws not yet submitted.
    pub fn pending_commands(&self) -> usize {
        self.state.lock().commands.len()
    }

    /// Replay every recorded upload and draw into `target` and submit.
    ///
    /// `clear` clears the target before the first draw. `depth` must be given
    /// exactly when the device was created with a depth format.
    pub fn submit(
        &self,
        target: &wgpu::TextureView,
        depth: Option<&wgpu::TextureView>,
        clear: Option<Color>,
    ) -> DeviceResult<()> {
        profile_function!();

        let mut state = self.state.lock();
        let commands = std::mem::take(&mut state.commands);
        if self.is_lost() {
            state.uploads.clear();
            return Err(DeviceError::Lost);
        }
        let staging = self.flush_uploads(&mut state);
        drop(state);

        let mut encoder =
            self.context
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Tessera Quad Encoder"),
                });

        let mut color_load = clear.map_or(wgpu::LoadOp::Load, |c| wgpu::LoadOp::Clear(c.to_wgpu()));
        let mut depth_load = wgpu::LoadOp::Clear(1.0);
        let mut pass: Option<wgpu::RenderPass<'static>> = None;
        let mut draws = 0;

        for command in commands {
            match command {
                Command::Copy {
                    src_offset,
                    target: destination,
                    offset,
                    size,
                } => {
                    let Some(staging) = &staging else {
                        continue;
                    };
                    // Copies cannot be recorded while a pass is open
                    pass = None;
                    encoder.copy_buffer_to_buffer(staging, src_offset, &destination, offset, size);
                }
                Command::Draw(draw) => {
                    let pass = pass.get_or_insert_with(|| {
                        let pass = begin_pass(&mut encoder, target, depth, color_load, depth_load);
                        color_load = wgpu::LoadOp::Load;
                        depth_load = wgpu::LoadOp::Load;
                        pass
                    });
                    pass.set_pipeline(&draw.pipeline);
                    pass.set_bind_group(0, &draw.uniforms, &[]);
                    pass.set_bind_group(1, &draw.texture, &[]);
                    pass.set_vertex_buffer(0, draw.vertex_buffer.slice(..));
                    pass.set_index_buffer(draw.index_buffer.slice(..), wgpu::IndexFormat::Uint16);
                    pass.draw_indexed(draw.first_index..draw.first_index + draw.index_count, 0, 0..1);
                    draws += 1;
                }
            }
        }

        if pass.is_none() && matches!(color_load, wgpu::LoadOp::Clear(_)) {
            pass = Some(begin_pass(&mut encoder, target, depth, color_load, depth_load));
        }
        drop(pass);

        self.context.queue.submit(std::iter::once(encoder.finish()));
        tracing::trace!("Submitted {} quad draws", draws);
        Ok(())
    }

    /// Write the upload arena into the staging buffer, growing it when the
    /// arena outgrew it, and return the buffer copies should read from.
    fn flush_uploads(&self, state: &mut DeviceState) -> Option<wgpu::Buffer> {
        let needed = state.uploads.len();
        if needed == 0 {
            return None;
        }

        let current = state.staging.as_ref().map_or(0, |staging| staging.size);
        let size = staging_size(current, needed);
        if size != current {
            if let Some(old) = state.staging.take() {
                old.buffer.destroy();
            }
            tracing::debug!("Growing upload staging buffer to {} bytes", size);
            let buffer = self.context.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("Tessera Upload Staging"),
                size,
                usage: wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            state.staging = Some(DeviceBuffer { buffer, size });
        }

        let staging = state.staging.as_ref()?.buffer.clone();
        self.context
            .queue
            .write_buffer(&staging, 0, state.uploads.bytes());
        state.uploads.clear();
        Some(staging)
    }

    fn compile(
        &self,
        label: Option<&str>,
        source: &str,
        stage: ShaderStage,
    ) -> Result<wgpu::ShaderModule, ProgramError> {
        let device = &self.context.device;
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label,
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });
        match pollster::block_on(device.pop_error_scope()) {
            Some(err) => Err(ProgramError::new(stage, source, err.to_string())),
            None => Ok(module),
        }
    }

    fn build_pipeline(&self, program: &DeviceProgram, state: &RenderState) -> wgpu::RenderPipeline {
        let depth_stencil = self.descriptor.depth_format.map(|format| wgpu::DepthStencilState {
            format,
            depth_write_enabled: state.depth_stencil.depth_test && state.depth_stencil.depth_write,
            depth_compare: state.depth_stencil.effective_compare(),
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        });

        self.context
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: program.label.as_deref(),
                layout: Some(&program.pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &program.vertex_module,
                    entry_point: Some("vs_main"),
                    buffers: &[wgpu::VertexBufferLayout {
                        array_stride: program.stride,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &program.attributes,
                    }],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &program.fragment_module,
                    entry_point: Some("fs_main"),
                    targets: &[Some(
                        state.blend.to_color_target_state(self.descriptor.color_format),
                    )],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    front_face: state.raster.front_face,
                    cull_mode: state.raster.cull_mode,
                    ..Default::default()
                },
                depth_stencil,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            })
    }

    /// Build a pipeline inside a validation scope.
    fn build_pipeline_checked(
        &self,
        program: &DeviceProgram,
        state: &RenderState,
    ) -> Result<wgpu::RenderPipeline, String> {
        let device = &self.context.device;
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = self.build_pipeline(program, state);
        match pollster::block_on(device.pop_error_scope()) {
            Some(err) => Err(err.to_string()),
            None => Ok(pipeline),
        }
    }
}

fn create_device_texture(
    context: &GraphicsContext,
    layout: &wgpu::BindGroupLayout,
    desc: &TextureDescriptor,
    pixels: &[u8],
) -> DeviceTexture {
    let texture = context.device.create_texture_with_data(
        &context.queue,
        &wgpu::TextureDescriptor {
            label: desc.label,
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        },
        wgpu::util::TextureDataOrder::LayerMajor,
        pixels,
    );
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

    let filter = if desc.filter_linear {
        wgpu::FilterMode::Linear
    } else {
        wgpu::FilterMode::Nearest
    };
    let sampler = context.device.create_sampler(&wgpu::SamplerDescriptor {
        label: desc.label,
        mag_filter: filter,
        min_filter: filter,
        ..Default::default()
    });

    let bind_group = context.device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: desc.label,
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(&sampler),
            },
        ],
    });

    DeviceTexture {
        _texture: texture,
        bind_group,
    }
}

fn begin_pass(
    encoder: &mut wgpu::CommandEncoder,
    target: &wgpu::TextureView,
    depth: Option<&wgpu::TextureView>,
    color_load: wgpu::LoadOp<wgpu::Color>,
    depth_load: wgpu::LoadOp<f32>,
) -> wgpu::RenderPass<'static> {
    encoder
        .begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Tessera Quad Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: color_load,
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: depth.map(|view| wgpu::RenderPassDepthStencilAttachment {
                view,
                depth_ops: Some(wgpu::Operations {
                    load: depth_load,
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            occlusion_query_set: None,
            timestamp_writes: None,
        })
        .forget_lifetime()
}

fn check_alignment(offset: u64, len: u64) -> DeviceResult<()> {
    let alignment = wgpu::COPY_BUFFER_ALIGNMENT;
    if offset % alignment != 0 || len % alignment != 0 {
        return Err(DeviceError::Misaligned {
            offset,
            len,
            alignment,
        });
    }
    Ok(())
}

impl GraphicsDevice for WgpuDevice {
    fn create_buffer(&self, desc: &BufferDescriptor) -> DeviceResult<BufferId> {
        if self.is_lost() {
            return Err(DeviceError::Lost);
        }

        let buffer = self.context.device.create_buffer(&wgpu::BufferDescriptor {
            label: desc.label,
            size: wgpu::util::align_to(desc.size, wgpu::COPY_BUFFER_ALIGNMENT),
            usage: desc.kind.to_wgpu_usage(),
            mapped_at_creation: false,
        });

        let mut state = self.state.lock();
        let id = BufferId::from_raw(state.next_id());
        state.buffers.insert(
            id.raw(),
            DeviceBuffer {
                buffer,
                size: desc.size,
            },
        );
        tracing::debug!("Created {:?} ({} bytes, {:?})", id, desc.size, desc.kind);
        Ok(id)
    }

    fn delete_buffer(&self, buffer: BufferId) {
        let mut state = self.state.lock();
        if let Some(entry) = state.buffers.remove(&buffer.raw()) {
            entry.buffer.destroy();
            state.cache.forget_buffer(buffer);
            if matches!(state.bound_buffers, Some((v, i)) if v == buffer || i == buffer) {
                state.bound_buffers = None;
            }
        }
    }

    fn upload_region(&self, buffer: BufferId, offset: u64, data: &[u8]) -> DeviceResult<()> {
        if self.is_lost() {
            return Err(DeviceError::Lost);
        }
        if data.is_empty() {
            return Ok(());
        }
        check_alignment(offset, data.len() as u64)?;

        let mut state = self.state.lock();
        let target = {
            let entry = state
                .buffers
                .get(&buffer.raw())
                .ok_or(DeviceError::InvalidHandle {
                    kind: "buffer",
                    id: buffer.raw(),
                })?;
            if offset + data.len() as u64 > entry.size {
                return Err(DeviceError::OutOfBounds {
                    id: buffer.raw(),
                    offset,
                    len: data.len() as u64,
                    size: entry.size,
                });
            }
            entry.buffer.clone()
        };

        let src_offset = state.uploads.push(data);
        state.commands.push(Command::Copy {
            src_offset,
            target,
            offset,
            size: data.len() as u64,
        });
        Ok(())
    }

    fn create_program(&self, desc: &ProgramDescriptor) -> Result<ProgramId, ProgramError> {
        profile_function!();

        let link_error = |log: String| {
            ProgramError::new(
                ShaderStage::Link,
                format!("{}\n{}", desc.vertex_source, desc.fragment_source),
                log,
            )
        };

        if self.is_lost() {
            return Err(link_error(DeviceError::Lost.to_string()));
        }
        desc.layout
            .validate()
            .map_err(|err| link_error(err.to_string()))?;

        let attributes = desc
            .layout
            .attributes()
            .iter()
            .enumerate()
            .map(|(location, attr)| {
                let format = attr.to_wgpu_format().ok_or_else(|| {
                    link_error(format!(
                        "attribute '{}' ({:?} x{}) has no wgpu vertex format",
                        attr.name, attr.element_type, attr.component_count
                    ))
                })?;
                Ok(wgpu::VertexAttribute {
                    format,
                    offset: attr.byte_offset as u64,
                    shader_location: location as u32,
                })
            })
            .collect::<Result<Vec<_>, ProgramError>>()?;

        let vertex_module = self
            .compile(desc.label, desc.vertex_source, ShaderStage::VertexCompile)
            .inspect_err(|err| tracing::error!("{}", err))?;
        let fragment_module = self
            .compile(desc.label, desc.fragment_source, ShaderStage::FragmentCompile)
            .inspect_err(|err| tracing::error!("{}", err))?;

        let device = &self.context.device;
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: desc.label,
            bind_group_layouts: &[&self.uniform_layout, &self.texture_layout],
            push_constant_ranges: &[],
        });

        let uniform_size = desc.uniform_size;
        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: desc.label,
            size: wgpu::util::align_to(uniform_size.max(16), 16),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: desc.label,
            layout: &self.uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        let program = DeviceProgram {
            label: desc.label.map(str::to_string),
            vertex_module,
            fragment_module,
            pipeline_layout,
            attributes,
            stride: desc.layout.stride() as u64,
            uniform_buffer,
            uniform_size,
            uniform_bind_group,
        };

        // Linking: both stages must agree with each other and with the layout
        let default_state = RenderState::default();
        let pipeline = self
            .build_pipeline_checked(&program, &default_state)
            .map_err(link_error)
            .inspect_err(|err| tracing::error!("{}", err))?;

        let mut state = self.state.lock();
        let id = ProgramId::from_raw(state.next_id());
        state.programs.insert(id.raw(), program);
        state.pipelines.insert((id, default_state), pipeline);
        tracing::debug!("Created {:?} ({:?})", id, desc.label);
        Ok(id)
    }

    fn delete_program(&self, program: ProgramId) {
        let mut state = self.state.lock();
        if state.programs.remove(&program.raw()).is_some() {
            state.pipelines.retain(|(id, _), _| *id != program);
            state.cache.forget_program(program);
        }
    }

    fn bind_program(&self, program: ProgramId) {
        self.state.lock().cache.bind_program(program);
    }

    fn set_uniforms(&self, program: ProgramId, data: &[u8]) -> DeviceResult<()> {
        if self.is_lost() {
            return Err(DeviceError::Lost);
        }
        check_alignment(0, data.len() as u64)?;

        let mut state = self.state.lock();
        let target = {
            let entry = state
                .programs
                .get(&program.raw())
                .ok_or(DeviceError::InvalidHandle {
                    kind: "program",
                    id: program.raw(),
                })?;
            if data.len() as u64 > entry.uniform_size {
                return Err(DeviceError::OutOfBounds {
                    id: program.raw(),
                    offset: 0,
                    len: data.len() as u64,
                    size: entry.uniform_size,
                });
            }
            entry.uniform_buffer.clone()
        };

        let src_offset = state.uploads.push(data);
        state.commands.push(Command::Copy {
            src_offset,
            target,
            offset: 0,
            size: data.len() as u64,
        });
        Ok(())
    }

    fn bind_buffers(&self, vertex: BufferId, index: BufferId, _layout: &VertexLayout) {
        // The attribute layout is baked into the program's pipelines
        let mut state = self.state.lock();
        state.cache.bind_buffers(vertex, index);
        state.bound_buffers = Some((vertex, index));
    }

    fn create_texture(&self, desc: &TextureDescriptor, pixels: &[u8]) -> DeviceResult<TextureId> {
        if self.is_lost() {
            return Err(DeviceError::Lost);
        }

        let max = self.context.device.limits().max_texture_dimension_2d;
        if desc.width == 0 || desc.height == 0 || desc.width > max || desc.height > max {
            return Err(DeviceError::Creation(format!(
                "texture size {}x{} outside 1..={}",
                desc.width, desc.height, max
            )));
        }
        if pixels.len() != desc.byte_len() {
            return Err(DeviceError::Creation(format!(
                "expected {} bytes of RGBA8 pixels, got {}",
                desc.byte_len(),
                pixels.len()
            )));
        }

        let texture = create_device_texture(&self.context, &self.texture_layout, desc, pixels);

        let mut state = self.state.lock();
        let id = TextureId::from_raw(state.next_id());
        state.textures.insert(id.raw(), texture);
        tracing::debug!("Created {:?} ({}x{})", id, desc.width, desc.height);
        Ok(id)
    }

    fn delete_texture(&self, texture: TextureId) {
        let mut state = self.state.lock();
        if state.textures.remove(&texture.raw()).is_some() {
            state.cache.forget_texture(texture);
        }
    }

    fn bind_texture(&self, slot: u32, texture: TextureId) {
        if slot != 0 {
            tracing::warn!("Texture slot {} is not sampled by quad programs", slot);
        }
        self.state.lock().cache.bind_texture(slot, texture);
    }

    fn apply_render_state(&self, render_state: &RenderState) {
        self.state.lock().cache.apply_render_state(render_state);
    }

    fn draw_indexed(&self, index_count: u32, first_index: u32) -> DeviceResult<()> {
        if self.is_lost() {
            return Err(DeviceError::Lost);
        }

        let mut guard = self.state.lock();
        let state = &mut *guard;

        let program_id = state.cache.program().ok_or(DeviceError::NotBound("program"))?;
        let (vertex_id, index_id) = state.bound_buffers.ok_or(DeviceError::NotBound("buffers"))?;
        let render_state = state.cache.render_state().copied().unwrap_or_default();

        let program = state
            .programs
            .get(&program_id.raw())
            .ok_or(DeviceError::InvalidHandle {
                kind: "program",
                id: program_id.raw(),
            })?;
        let vertex = state
            .buffers
            .get(&vertex_id.raw())
            .ok_or(DeviceError::InvalidHandle {
                kind: "vertex buffer",
                id: vertex_id.raw(),
            })?;
        let index = state
            .buffers
            .get(&index_id.raw())
            .ok_or(DeviceError::InvalidHandle {
                kind: "index buffer",
                id: index_id.raw(),
            })?;

        let index_end = (first_index as u64 + index_count as u64) * 2;
        if index_end > index.size {
            return Err(DeviceError::OutOfBounds {
                id: index_id.raw(),
                offset: first_index as u64 * 2,
                len: index_count as u64 * 2,
                size: index.size,
            });
        }

        let texture = state
            .cache
            .texture(0)
            .and_then(|texture| state.textures.get(&texture.raw()))
            .unwrap_or(&self.white_texture)
            .bind_group
            .clone();

        let key = (program_id, render_state);
        let pipeline = match state.pipelines.get(&key).cloned() {
            Some(pipeline) => pipeline,
            None => {
                let pipeline = self
                    .build_pipeline_checked(program, &render_state)
                    .map_err(DeviceError::Creation)?;
                state.pipelines.insert(key, pipeline.clone());
                pipeline
            }
        };

        let draw = DrawCommand {
            pipeline,
            vertex_buffer: vertex.buffer.clone(),
            index_buffer: index.buffer.clone(),
            uniforms: program.uniform_bind_group.clone(),
            texture,
            first_index,
            index_count,
        };
        state.commands.push(Command::Draw(draw));
        Ok(())
    }

    fn is_lost(&self) -> bool {
        self.lost.load(Ordering::SeqCst)
    }
}
