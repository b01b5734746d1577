//! Trait abstracting the graphics device the batcher submits to.
//!
//! The `GraphicsDevice` trait is the full surface the quad pipeline needs:
//! buffers with sub-range upload, programs, textures, fixed-function state
//! with redundant-change elimination, and indexed draws. Both a real `wgpu`
//! backend and [`MockDevice`](crate::MockDevice) implement it.

use crate::error::{DeviceResult, ProgramError};
use crate::gpu_types::*;
use crate::layout::VertexLayout;
use crate::state::RenderState;

/// Trait abstracting GPU resource creation and draw submission.
///
/// # Borrow Checking Pattern
///
/// Methods take `&self` and return small `Copy` handles. This allows:
/// - Callbacks invoked by the batcher to receive `&D` while the batcher
///   itself is mutably borrowed
/// - Implementations to share one device between several effects (via Arc)
/// - Mock implementations to record calls through interior mutability
///
/// # Render state
///
/// Implementations keep a [`StateCache`](crate::StateCache) and skip
/// `apply_render_state`, `bind_*` calls that would not change anything.
/// Callers therefore never need their own diffing.
///
/// # Example
///
/// ```rust,no_run
/// use tessera_gpu::{BufferDescriptor, BufferKind, GraphicsDevice};
///
/// fn upload_quad_indices(device: &dyn GraphicsDevice) {
///     let buffer = device
///         .create_buffer(&BufferDescriptor {
///             label: Some("indices"),
///             size: 12,
///             kind: BufferKind::Index,
///         })
///         .unwrap();
///     let indices: [u16; 6] = [0, 1, 2, 0, 2, 3];
///     device
///         .upload_region(buffer, 0, bytemuck::cast_slice(&indices))
///         .unwrap();
/// }
/// ```
pub trait GraphicsDevice: Send + Sync {
    // Buffer operations

    /// Create a buffer of `desc.size` bytes.
    fn create_buffer(&self, desc: &BufferDescriptor) -> DeviceResult<BufferId>;

    /// Release a buffer. Unknown handles are ignored.
    fn delete_buffer(&self, buffer: BufferId);

    /// Copy `data` into the buffer starting at byte `offset`.
    ///
    /// Only the given range is transferred. Uploads are ordered with respect
    /// to draws: a draw sees every upload issued before it and none issued
    /// after it.
    fn upload_region(&self, buffer: BufferId, offset: u64, data: &[u8]) -> DeviceResult<()>;

    // Program operations

    /// Compile both stages and link them against `desc.layout`.
    fn create_program(&self, desc: &ProgramDescriptor) -> Result<ProgramId, ProgramError>;

    fn delete_program(&self, program: ProgramId);

    fn bind_program(&self, program: ProgramId);

    /// Replace the program's global uniform block.
    fn set_uniforms(&self, program: ProgramId, data: &[u8]) -> DeviceResult<()>;

    /// Bind the vertex and index buffers and enable the attributes of `layout`.
    fn bind_buffers(&self, vertex: BufferId, index: BufferId, layout: &VertexLayout);

    // Texture operations

    /// Create an RGBA8 texture from `pixels` (`desc.byte_len()` bytes).
    fn create_texture(&self, desc: &TextureDescriptor, pixels: &[u8]) -> DeviceResult<TextureId>;

    fn delete_texture(&self, texture: TextureId);

    fn bind_texture(&self, slot: u32, texture: TextureId);

    // State and draws

    /// Apply blend/raster/depth-stencil state; redundant applies are skipped.
    fn apply_render_state(&self, state: &RenderState);

    /// Draw `index_count` `u16` indices starting at index `first_index` of the
    /// bound index buffer as a triangle list.
    fn draw_indexed(&self, index_count: u32, first_index: u32) -> DeviceResult<()>;

    /// Whether the device has been lost. Every handle is invalid once this
    /// returns `true`.
    fn is_lost(&self) -> bool;
}
