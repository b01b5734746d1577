//! Fixed-function render state and the diffing cache devices keep.

use crate::gpu_types::{BufferId, ProgramId, TextureId};

/// Predefined blend modes.
///
/// Use these to configure how source and destination colors are combined
/// between submissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendMode {
    /// No blending - source completely replaces destination.
    ///
    /// Use for: opaque sprites drawn front-to-back.
    Opaque,

    /// Standard alpha blending for transparent content.
    ///
    /// Formula: `src.rgb * src.a + dst.rgb * (1 - src.a)`
    ///
    /// Use for: sprites with transparency, drawn back-to-front.
    #[default]
    Alpha,

    /// Additive blending - colors are added together.
    ///
    /// Formula: `src.rgb * src.a + dst.rgb`
    ///
    /// Use for: Glow effects, particles, light sources.
    Additive,

    /// Custom blend state for advanced use cases.
    Custom(wgpu::BlendState),
}

impl BlendMode {
    /// Convert to wgpu BlendState.
    pub fn to_blend_state(self) -> Option<wgpu::BlendState> {
        match self {
            BlendMode::Opaque => Some(wgpu::BlendState::REPLACE),
            BlendMode::Alpha => Some(wgpu::BlendState::ALPHA_BLENDING),
            BlendMode::Additive => Some(wgpu::BlendState {
                color: wgpu::BlendComponent {
                    src_factor: wgpu::BlendFactor::SrcAlpha,
                    dst_factor: wgpu::BlendFactor::One,
                    operation: wgpu::BlendOperation::Add,
                },
                alpha: wgpu::BlendComponent {
                    src_factor: wgpu::BlendFactor::One,
                    dst_factor: wgpu::BlendFactor::One,
                    operation: wgpu::BlendOperation::Add,
                },
            }),
            BlendMode::Custom(state) => Some(state),
        }
    }

    /// Create a color target state with this blend mode.
    pub fn to_color_target_state(self, format: wgpu::TextureFormat) -> wgpu::ColorTargetState {
        wgpu::ColorTargetState {
            format,
            blend: self.to_blend_state(),
            write_mask: wgpu::ColorWrites::ALL,
        }
    }
}

impl From<wgpu::BlendState> for BlendMode {
    fn from(state: wgpu::BlendState) -> Self {
        BlendMode::Custom(state)
    }
}

/// Rasterizer configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RasterState {
    pub cull_mode: Option<wgpu::Face>,
    /// Winding of front-facing triangles in clip space. Quad index
    /// generation follows this so culling never drops sprites.
    pub front_face: wgpu::FrontFace,
}

impl Default for RasterState {
    fn default() -> Self {
        Self {
            cull_mode: None,
            front_face: wgpu::FrontFace::Cw,
        }
    }
}

/// Depth test configuration. Sprite depth normally only drives sorting, so
/// the default leaves the hardware test off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthStencilState {
    pub depth_test: bool,
    pub depth_write: bool,
    pub compare: wgpu::CompareFunction,
}

impl Default for DepthStencilState {
    fn default() -> Self {
        Self {
            depth_test: false,
            depth_write: false,
            compare: wgpu::CompareFunction::LessEqual,
        }
    }
}

impl DepthStencilState {
    /// Effective comparison function (`Always` when the test is disabled).
    pub fn effective_compare(&self) -> wgpu::CompareFunction {
        if self.depth_test {
            self.compare
        } else {
            wgpu::CompareFunction::Always
        }
    }
}

/// The full fixed-function state applied before a draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RenderState {
    pub blend: BlendMode,
    pub raster: RasterState,
    pub depth_stencil: DepthStencilState,
}

impl RenderState {
    pub fn with_blend(mut self, blend: BlendMode) -> Self {
        self.blend = blend;
        self
    }
}

/// Number of texture units tracked by [`StateCache`].
pub const MAX_TEXTURE_SLOTS: usize = 4;

/// Last-applied device state, used to skip redundant driver work.
///
/// Every `apply_*`/`bind_*` method returns `true` when the new value differs
/// from the cached one (and updates the cache), `false` when the call can be
/// skipped.
#[derive(Debug, Clone, Default)]
pub struct StateCache {
    render_state: Option<RenderState>,
    program: Option<ProgramId>,
    buffers: Option<(BufferId, BufferId)>,
    textures: [Option<TextureId>; MAX_TEXTURE_SLOTS],
}

impl StateCache {
    pub fn apply_render_state(&mut self, state: &RenderState) -> bool {
        replace_if_changed(&mut self.render_state, *state)
    }

    pub fn bind_program(&mut self, program: ProgramId) -> bool {
        replace_if_changed(&mut self.program, program)
    }

    pub fn bind_buffers(&mut self, vertex: BufferId, index: BufferId) -> bool {
        replace_if_changed(&mut self.buffers, (vertex, index))
    }

    /// Slots past [`MAX_TEXTURE_SLOTS`] are never cached and always report a change.
    pub fn bind_texture(&mut self, slot: u32, texture: TextureId) -> bool {
        match self.textures.get_mut(slot as usize) {
            Some(cached) => replace_if_changed(cached, texture),
            None => true,
        }
    }

    pub fn render_state(&self) -> Option<&RenderState> {
        self.render_state.as_ref()
    }

    pub fn program(&self) -> Option<ProgramId> {
        self.program
    }

    pub fn texture(&self, slot: u32) -> Option<TextureId> {
        self.textures.get(slot as usize).copied().flatten()
    }

    /// Drop cached bindings that refer to a deleted resource.
    pub fn forget_program(&mut self, program: ProgramId) {
        if self.program == Some(program) {
            self.program = None;
        }
    }

    pub fn forget_buffer(&mut self, buffer: BufferId) {
        if matches!(self.buffers, Some((v, i)) if v == buffer || i == buffer) {
            self.buffers = None;
        }
    }

    pub fn forget_texture(&mut self, texture: TextureId) {
        for slot in &mut self.textures {
            if *slot == Some(texture) {
                *slot = None;
            }
        }
    }

    /// Forget everything, e.g. after the device was lost or a new frame began.
    pub fn invalidate(&mut self) {
        *self = Self::default();
    }
}

fn replace_if_changed<T: PartialEq>(slot: &mut Option<T>, value: T) -> bool {
    if slot.as_ref() == Some(&value) {
        false
    } else {
        *slot = Some(value);
        true
    }
}
