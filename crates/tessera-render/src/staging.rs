//! Typed writes into the vertex staging region of one buffering pass.

use bytemuck::Pod;
use tessera_gpu::{AttributeSlot, VertexLayout};

/// Write access to the vertices of the current buffering pass.
///
/// Vertices are addressed relative to the start of the pass: quad `q` of the
/// pass owns vertices `4 * q .. 4 * q + 4`. Resolve attribute slots once per
/// pass with [`slot`](Self::slot), then write with [`put`](Self::put) in the
/// per-vertex loop.
///
/// Writing outside the pass's region panics.
pub struct VertexWriter<'a> {
    bytes: &'a mut [u8],
    stride: usize,
    layout: &'a VertexLayout,
}

impl<'a> VertexWriter<'a> {
    pub(crate) fn new(bytes: &'a mut [u8], layout: &'a VertexLayout) -> Self {
        Self {
            bytes,
            stride: layout.stride() as usize,
            layout,
        }
    }

    pub fn layout(&self) -> &VertexLayout {
        self.layout
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Number of vertices this pass may write.
    pub fn vertex_count(&self) -> usize {
        self.bytes.len() / self.stride
    }

    pub fn slot(&self, name: &str) -> Option<AttributeSlot> {
        self.layout.slot(name)
    }

    /// Write one attribute of vertex `vertex`.
    #[inline]
    pub fn put<T: Pod>(&mut self, vertex: usize, slot: AttributeSlot, value: T) {
        let src = bytemuck::bytes_of(&value);
        debug_assert!(src.len() <= slot.size, "attribute value larger than its slot");
        let start = vertex * self.stride + slot.offset;
        self.bytes[start..start + src.len()].copy_from_slice(src);
    }

    /// Write a whole vertex record at once. `V` must be exactly one stride long.
    #[inline]
    pub fn put_vertex<V: Pod>(&mut self, vertex: usize, value: &V) {
        let src = bytemuck::bytes_of(value);
        debug_assert_eq!(src.len(), self.stride, "vertex type does not match stride");
        let start = vertex * self.stride;
        self.bytes[start..start + src.len()].copy_from_slice(src);
    }
}
