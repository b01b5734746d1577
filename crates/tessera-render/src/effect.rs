//! Ring-buffered geometry upload and state-coalesced draw submission.
//!
//! A [`QuadEffect`] owns a vertex/index ring on the device plus system-memory
//! staging mirrors of both. Each buffering pass converts a contiguous range
//! of a batch's draw order into geometry at the ring cursor, uploads only
//! the bytes just written, and hands the range to the draw walk, which
//! issues one indexed draw per run of equal state tokens.
//!
//! ```rust
//! # #[cfg(feature = "mock")]
//! # {
//! use tessera_gpu::{MockDevice, TextureId};
//! use tessera_render::{
//!     bind_texture, sprite_vertices, upload_projection, EffectDescriptor, QuadBatch, QuadEffect,
//!     QuadParams,
//! };
//!
//! let device = MockDevice::new();
//! let mut effect = QuadEffect::new("sprites");
//! effect
//!     .create_resources(&device, &EffectDescriptor::sprites(64, 800.0, 600.0))
//!     .unwrap();
//!
//! let mut batch = QuadBatch::new(64);
//! batch
//!     .add(TextureId::from_raw(1), &QuadParams::new(10.0, 10.0))
//!     .unwrap();
//!
//! effect.make_current(&device, upload_projection).unwrap();
//! effect
//!     .draw_batch(&device, &batch, sprite_vertices, bind_texture)
//!     .unwrap();
//! assert_eq!(device.count_draws(), 1);
//! # }
//! ```

use std::fmt;

use tessera_core::geometry::Size;
use tessera_core::math::{Mat4, Vec4};
use tessera_core::profiling::{profile_function, profile_scope};
use tessera_gpu::{
    BlendMode, BufferDescriptor, BufferId, BufferKind, DepthStencilState, DeviceError,
    DeviceResult, GraphicsDevice, ProgramDescriptor, ProgramId, RasterState, RenderState,
    VertexLayout,
};

use crate::batch::QuadBatch;
use crate::error::EffectError;
use crate::sprite::{
    SPRITE_FRAGMENT_SHADER, SPRITE_UNIFORM_SIZE, SPRITE_VERTEX_SHADER, SpriteVertex,
};
use crate::staging::VertexWriter;

/// Largest ring that `u16` indices can address (`4 * 16384 = 65536` vertices).
pub const MAX_RING_QUADS: usize = 16384;

/// Configuration for [`QuadEffect::create_resources`].
#[derive(Debug, Clone)]
pub struct EffectDescriptor<'a> {
    pub vertex_source: &'a str,
    pub fragment_source: &'a str,
    pub layout: VertexLayout,
    /// Ring size in quads; clamped to `1..=MAX_RING_QUADS`.
    pub capacity_in_quads: usize,
    /// Viewport used for the initial projection.
    pub viewport: Size<f32>,
    pub render_state: RenderState,
    /// Size of the program's global uniform block in bytes.
    pub uniform_size: u64,
}

impl EffectDescriptor<'static> {
    /// The built-in sprite shaders and [`SpriteVertex`] layout.
    pub fn sprites(capacity_in_quads: usize, width: f32, height: f32) -> Self {
        Self {
            vertex_source: SPRITE_VERTEX_SHADER,
            fragment_source: SPRITE_FRAGMENT_SHADER,
            layout: SpriteVertex::layout(),
            capacity_in_quads,
            viewport: Size::new(width, height),
            render_state: RenderState::default(),
            uniform_size: SPRITE_UNIFORM_SIZE,
        }
    }
}

/// Counters accumulated since the last [`QuadEffect::reset_stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EffectStats {
    pub buffering_passes: usize,
    pub uploads: usize,
    pub uploaded_bytes: usize,
    pub draw_calls: usize,
    pub state_changes: usize,
    pub quads: usize,
}

#[derive(Debug, Clone, Copy)]
struct GpuResources {
    program: ProgramId,
    vertex_buffer: BufferId,
    index_buffer: BufferId,
}

/// Orthographic pixel projection: `(0, 0)` maps to clip `(-1, 1)` and
/// `(width, height)` to `(1, -1)`. Depth passes through unchanged.
pub fn ortho_projection(width: f32, height: f32) -> Mat4 {
    Mat4::from_cols(
        Vec4::new(2.0 / width, 0.0, 0.0, 0.0),
        Vec4::new(0.0, -2.0 / height, 0.0, 0.0),
        Vec4::new(0.0, 0.0, 1.0, 0.0),
        Vec4::new(-1.0, 1.0, 0.0, 1.0),
    )
}

/// Index pattern for one quad whose corners are stored TL, TR, BR, BL.
///
/// Corners are in a y-down space that the projection flips, so TL→TR→BR is
/// clockwise in clip space.
pub fn quad_indices(front_face: wgpu::FrontFace) -> [u16; 6] {
    match front_face {
        wgpu::FrontFace::Cw => [0, 1, 2, 0, 2, 3],
        wgpu::FrontFace::Ccw => [0, 2, 1, 0, 3, 2],
    }
}

/// Converts batches into ring-buffered geometry and coalesced draw calls.
///
/// `S` is the state token type of the batches this effect draws. The effect
/// remembers the token of the last applied run across calls, so a run that
/// straddles a ring wrap is not re-applied.
///
/// Every operation takes the device explicitly; the effect only stores
/// handles. The device must outlive the resources created on it.
pub struct QuadEffect<S> {
    label: String,
    layout: VertexLayout,
    render_state: RenderState,
    projection: Mat4,
    resources: Option<GpuResources>,
    vertex_staging: Vec<u8>,
    index_staging: Vec<u16>,
    capacity: usize,
    vertex_cursor: usize,
    index_cursor: usize,
    current_state: Option<S>,
    stats: EffectStats,
}

impl<S: Copy + PartialEq> QuadEffect<S> {
    /// Create an effect with no resources.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            layout: VertexLayout::new(0),
            render_state: RenderState::default(),
            projection: Mat4::IDENTITY,
            resources: None,
            vertex_staging: Vec::new(),
            index_staging: Vec::new(),
            capacity: 0,
            vertex_cursor: 0,
            index_cursor: 0,
            current_state: None,
            stats: EffectStats::default(),
        }
    }

    /// Create the ring buffers, staging mirrors and program.
    ///
    /// Existing resources are released first. On failure every handle created
    /// by this call is released again and the effect has no resources.
    pub fn create_resources<D>(
        &mut self,
        device: &D,
        desc: &EffectDescriptor,
    ) -> Result<&mut Self, EffectError>
    where
        D: GraphicsDevice + ?Sized,
    {
        profile_function!();

        self.delete_resources(device);
        desc.layout.validate().inspect_err(|err| {
            tracing::error!("Quad effect '{}': {}", self.label, err);
        })?;

        let capacity = clamp_ring_capacity(desc.capacity_in_quads);
        let stride = desc.layout.stride() as usize;
        let vertex_bytes = capacity * 4 * stride;
        let index_count = capacity * 6;

        let resources = create_gpu_resources(device, &self.label, desc, vertex_bytes, index_count)
            .inspect_err(|err| {
                tracing::error!("Failed to create quad effect '{}': {}", self.label, err);
            })?;

        self.vertex_staging.clear();
        self.vertex_staging.resize(vertex_bytes, 0);
        self.index_staging.clear();
        self.index_staging.resize(index_count, 0);

        self.layout = desc.layout.clone();
        self.render_state = desc.render_state;
        self.capacity = capacity;
        self.vertex_cursor = 0;
        self.index_cursor = 0;
        self.current_state = None;
        self.resources = Some(resources);
        self.apply_viewport(desc.viewport.width, desc.viewport.height);

        tracing::debug!(
            "Created quad effect '{}': {} quads, stride {}, {:?}",
            self.label,
            capacity,
            stride,
            resources.program
        );

        Ok(self)
    }

    /// Release GPU handles. Staging memory is kept.
    pub fn delete_resources<D>(&mut self, device: &D) -> &mut Self
    where
        D: GraphicsDevice + ?Sized,
    {
        if let Some(resources) = self.resources.take() {
            device.delete_program(resources.program);
            device.delete_buffer(resources.vertex_buffer);
            device.delete_buffer(resources.index_buffer);
            tracing::debug!("Deleted quad effect '{}' resources", self.label);
        }
        self.reset_ring();
        self
    }

    /// Set the projection for a `width` by `height` pixel viewport and return it.
    ///
    /// Non-positive sizes are clamped to 1.
    pub fn apply_viewport(&mut self, width: f32, height: f32) -> Mat4 {
        if !(width > 0.0 && height > 0.0) {
            tracing::warn!(
                "Quad effect '{}': invalid viewport {}x{}, clamping",
                self.label,
                width,
                height
            );
        }
        self.projection = ortho_projection(width.max(1.0), height.max(1.0));
        self.projection
    }

    /// Bind program, buffers and render state, then let `setup` upload
    /// global shader inputs.
    ///
    /// Forgets the last applied state token, so the next draw always applies
    /// its first state.
    pub fn make_current<D, F>(&mut self, device: &D, setup: F) -> Result<&mut Self, EffectError>
    where
        D: GraphicsDevice + ?Sized,
        F: FnOnce(&Self, &D, ProgramId, &Mat4) -> DeviceResult<()>,
    {
        profile_function!();

        let resources = self.resources()?;
        if device.is_lost() {
            return Err(self.device_lost());
        }

        device.bind_program(resources.program);
        device.bind_buffers(resources.vertex_buffer, resources.index_buffer, &self.layout);
        device.apply_render_state(&self.render_state);

        let result = setup(self, device, resources.program, &self.projection);
        self.check(result)?;

        self.current_state = None;
        Ok(self)
    }

    /// Generate and upload geometry for up to `count` quads starting at
    /// position `offset` of the batch's draw order.
    ///
    /// Returns how many quads were buffered. This is less than `count` when
    /// the ring runs out of room; the next call continues at the start of
    /// the ring. Zero means nothing was requested.
    ///
    /// A generator error is returned as-is; nothing is uploaded and the ring
    /// cursors stay where they were.
    pub fn buffer_data<D, G>(
        &mut self,
        device: &D,
        batch: &QuadBatch<S>,
        offset: usize,
        count: usize,
        mut generator: G,
    ) -> Result<usize, EffectError>
    where
        D: GraphicsDevice + ?Sized,
        G: FnMut(&mut VertexWriter<'_>, &QuadBatch<S>, usize, usize) -> Result<(), EffectError>,
    {
        profile_function!();

        let resources = self.resources()?;
        let count = count.min(batch.len().saturating_sub(offset));
        let remaining = self.capacity - self.vertex_cursor / 4;
        let quads = count.min(remaining);
        if quads == 0 {
            return Ok(0);
        }

        let stride = self.layout.stride() as usize;
        let vertex_start = self.vertex_cursor * stride;
        let vertex_end = (self.vertex_cursor + quads * 4) * stride;
        {
            profile_scope!("generate_vertices");
            let mut writer =
                VertexWriter::new(&mut self.vertex_staging[vertex_start..vertex_end], &self.layout);
            generator(&mut writer, batch, offset, quads)?;
        }

        let index_start = self.index_cursor;
        let index_end = index_start + quads * 6;
        let pattern = quad_indices(self.render_state.raster.front_face);
        for (q, indices) in self.index_staging[index_start..index_end]
            .chunks_exact_mut(6)
            .enumerate()
        {
            let base = (self.vertex_cursor + q * 4) as u16;
            for (slot, corner) in indices.iter_mut().zip(pattern) {
                *slot = base + corner;
            }
        }

        let vertex_bytes = &self.vertex_staging[vertex_start..vertex_end];
        let index_bytes: &[u8] = bytemuck::cast_slice(&self.index_staging[index_start..index_end]);
        let uploaded = vertex_bytes.len() + index_bytes.len();
        let result = device
            .upload_region(resources.vertex_buffer, vertex_start as u64, vertex_bytes)
            .and_then(|()| {
                device.upload_region(resources.index_buffer, (index_start * 2) as u64, index_bytes)
            });
        self.check(result)?;

        tracing::trace!(
            "Quad effect '{}': buffered {} quads at vertex {}",
            self.label,
            quads,
            self.vertex_cursor
        );

        self.vertex_cursor += quads * 4;
        self.index_cursor = index_end;
        if self.vertex_cursor == self.capacity * 4 {
            self.vertex_cursor = 0;
            self.index_cursor = 0;
        }

        self.stats.buffering_passes += 1;
        self.stats.uploads += 2;
        self.stats.uploaded_bytes += uploaded;
        self.stats.quads += quads;

        Ok(quads)
    }

    /// Draw `count` already-buffered quads starting at draw-order position
    /// `offset`, whose indices begin at `base_index` in the index buffer.
    ///
    /// Issues one draw per maximal run of equal state tokens and calls
    /// `apply_state` before each run whose token differs from the last one
    /// applied.
    pub fn draw_region<D, A>(
        &mut self,
        device: &D,
        batch: &QuadBatch<S>,
        offset: usize,
        count: usize,
        base_index: u32,
        mut apply_state: A,
    ) -> Result<&mut Self, EffectError>
    where
        D: GraphicsDevice + ?Sized,
        A: FnMut(&Self, &D, ProgramId, &S) -> DeviceResult<()>,
    {
        profile_function!();

        let program = self.resources()?.program;
        let end = (offset + count).min(batch.len());
        let offset = offset.min(end);

        let mut first_index = base_index;
        let mut run = 0u32;
        for &index in &batch.order()[offset..end] {
            let state = batch.state(index);
            if self.current_state != Some(state) {
                if run > 0 {
                    self.draw(device, run, first_index)?;
                    first_index += run * 6;
                    run = 0;
                }
                let result = apply_state(self, device, program, &state);
                self.check(result)?;
                self.current_state = Some(state);
                self.stats.state_changes += 1;
            }
            run += 1;
        }
        if run > 0 {
            self.draw(device, run, first_index)?;
        }

        Ok(self)
    }

    /// Submit the whole batch in draw order, wrapping the ring as often as needed.
    ///
    /// Call [`make_current`](Self::make_current) first. The batch is not
    /// flushed.
    pub fn draw_batch<D, G, A>(
        &mut self,
        device: &D,
        batch: &QuadBatch<S>,
        mut generator: G,
        mut apply_state: A,
    ) -> Result<&mut Self, EffectError>
    where
        D: GraphicsDevice + ?Sized,
        G: FnMut(&mut VertexWriter<'_>, &QuadBatch<S>, usize, usize) -> Result<(), EffectError>,
        A: FnMut(&Self, &D, ProgramId, &S) -> DeviceResult<()>,
    {
        profile_function!();

        self.resources()?;
        let total = batch.len();
        let mut offset = 0;
        while offset < total {
            let base_index = self.index_cursor as u32;
            let buffered = self.buffer_data(device, batch, offset, total - offset, &mut generator)?;
            if buffered == 0 {
                break;
            }
            self.draw_region(device, batch, offset, buffered, base_index, &mut apply_state)?;
            offset += buffered;
        }

        Ok(self)
    }

    pub fn set_render_state(&mut self, state: RenderState) -> &mut Self {
        self.render_state = state;
        self
    }

    /// Select a blend mode for subsequent submissions.
    pub fn set_blend_mode(&mut self, blend: BlendMode) -> &mut Self {
        self.render_state.blend = blend;
        self
    }

    pub fn set_raster_state(&mut self, raster: RasterState) -> &mut Self {
        self.render_state.raster = raster;
        self
    }

    pub fn set_depth_stencil_state(&mut self, depth_stencil: DepthStencilState) -> &mut Self {
        self.render_state.depth_stencil = depth_stencil;
        self
    }

    pub fn render_state(&self) -> &RenderState {
        &self.render_state
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn layout(&self) -> &VertexLayout {
        &self.layout
    }

    pub fn projection(&self) -> &Mat4 {
        &self.projection
    }

    /// Ring size in quads (0 before resources are created).
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn vertex_cursor(&self) -> usize {
        self.vertex_cursor
    }

    pub fn index_cursor(&self) -> usize {
        self.index_cursor
    }

    /// Token of the most recently applied run.
    pub fn current_state(&self) -> Option<S> {
        self.current_state
    }

    pub fn has_resources(&self) -> bool {
        self.resources.is_some()
    }

    pub fn program(&self) -> Option<ProgramId> {
        self.resources.map(|r| r.program)
    }

    pub fn vertex_buffer(&self) -> Option<BufferId> {
        self.resources.map(|r| r.vertex_buffer)
    }

    pub fn index_buffer(&self) -> Option<BufferId> {
        self.resources.map(|r| r.index_buffer)
    }

    pub fn stats(&self) -> EffectStats {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = EffectStats::default();
    }

    fn resources(&self) -> Result<GpuResources, EffectError> {
        self.resources.ok_or(EffectError::NoResources)
    }

    fn draw<D>(&mut self, device: &D, quads: u32, first_index: u32) -> Result<(), EffectError>
    where
        D: GraphicsDevice + ?Sized,
    {
        let result = device.draw_indexed(quads * 6, first_index);
        self.check(result)?;
        self.stats.draw_calls += 1;
        Ok(())
    }

    /// Convert a device result, dropping every handle if the device was lost.
    fn check<T>(&mut self, result: DeviceResult<T>) -> Result<T, EffectError> {
        result.map_err(|err| match err {
            DeviceError::Lost => self.device_lost(),
            other => {
                tracing::error!("Quad effect '{}': {}", self.label, other);
                EffectError::Device(other)
            }
        })
    }

    fn device_lost(&mut self) -> EffectError {
        tracing::error!(
            "Quad effect '{}': device lost, dropping GPU resources",
            self.label
        );
        self.resources = None;
        self.reset_ring();
        EffectError::DeviceLost
    }

    fn reset_ring(&mut self) {
        self.vertex_cursor = 0;
        self.index_cursor = 0;
        self.current_state = None;
    }
}

fn clamp_ring_capacity(capacity: usize) -> usize {
    if capacity > MAX_RING_QUADS {
        tracing::warn!(
            "Quad effect capacity {} exceeds the u16 index range, clamped to {}",
            capacity,
            MAX_RING_QUADS
        );
        MAX_RING_QUADS
    } else if capacity == 0 {
        tracing::warn!("Quad effect capacity 0 raised to 1");
        1
    } else {
        capacity
    }
}

fn create_gpu_resources<D>(
    device: &D,
    label: &str,
    desc: &EffectDescriptor,
    vertex_bytes: usize,
    index_count: usize,
) -> Result<GpuResources, EffectError>
where
    D: GraphicsDevice + ?Sized,
{
    let vertex_label = format!("{} Vertex Buffer", label);
    let vertex_buffer = device.create_buffer(&BufferDescriptor {
        label: Some(&vertex_label),
        size: vertex_bytes as u64,
        kind: BufferKind::Vertex,
    })?;

    let index_label = format!("{} Index Buffer", label);
    let index_buffer = match device.create_buffer(&BufferDescriptor {
        label: Some(&index_label),
        size: (index_count * 2) as u64,
        kind: BufferKind::Index,
    }) {
        Ok(buffer) => buffer,
        Err(err) => {
            device.delete_buffer(vertex_buffer);
            return Err(err.into());
        }
    };

    let program = match device.create_program(&ProgramDescriptor {
        label: Some(label),
        vertex_source: desc.vertex_source,
        fragment_source: desc.fragment_source,
        layout: &desc.layout,
        uniform_size: desc.uniform_size,
    }) {
        Ok(program) => program,
        Err(err) => {
            device.delete_buffer(vertex_buffer);
            device.delete_buffer(index_buffer);
            return Err(err.into());
        }
    };

    Ok(GpuResources {
        program,
        vertex_buffer,
        index_buffer,
    })
}

impl<S> fmt::Debug for QuadEffect<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuadEffect")
            .field("label", &self.label)
            .field("capacity", &self.capacity)
            .field("vertex_cursor", &self.vertex_cursor)
            .field("index_cursor", &self.index_cursor)
            .field("has_resources", &self.resources.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ortho_maps_viewport_corners() {
        let projection = ortho_projection(800.0, 600.0);

        let top_left = projection * Vec4::new(0.0, 0.0, 0.25, 1.0);
        let bottom_right = projection * Vec4::new(800.0, 600.0, 0.25, 1.0);
        let center = projection * Vec4::new(400.0, 300.0, 0.0, 1.0);

        assert_eq!(top_left, Vec4::new(-1.0, 1.0, 0.25, 1.0));
        assert_eq!(bottom_right, Vec4::new(1.0, -1.0, 0.25, 1.0));
        assert_eq!(center, Vec4::new(0.0, 0.0, 0.0, 1.0));
    }

    #[test]
    fn test_quad_indices_winding() {
        assert_eq!(quad_indices(wgpu::FrontFace::Cw), [0, 1, 2, 0, 2, 3]);
        assert_eq!(quad_indices(wgpu::FrontFace::Ccw), [0, 2, 1, 0, 3, 2]);
    }

    #[test]
    fn test_ring_capacity_clamp() {
        assert_eq!(clamp_ring_capacity(0), 1);
        assert_eq!(clamp_ring_capacity(100), 100);
        assert_eq!(clamp_ring_capacity(MAX_RING_QUADS * 2), MAX_RING_QUADS);
    }

    #[test]
    fn test_new_effect_has_no_resources() {
        let effect: QuadEffect<u32> = QuadEffect::new("empty");
        assert!(!effect.has_resources());
        assert_eq!(effect.capacity(), 0);
        assert_eq!(effect.current_state(), None);
    }

    #[test]
    fn test_apply_viewport_stores_projection() {
        let mut effect: QuadEffect<u32> = QuadEffect::new("viewport");
        let projection = effect.apply_viewport(2.0, 2.0);
        assert_eq!(*effect.projection(), projection);
        assert_eq!(projection.x_axis.x, 1.0);

        // Degenerate sizes fall back to a 1x1 viewport
        let clamped = effect.apply_viewport(0.0, -5.0);
        assert_eq!(clamped, ortho_projection(1.0, 1.0));
    }
}
