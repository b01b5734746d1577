//! Opaque GPU resource handles and creation descriptors.
//!
//! Devices own the real resources and hand out small copyable ids. Callers
//! never see a `wgpu::Buffer` directly, which keeps the batching code free of
//! lifetimes and lets the mock device stand in for a real one.

use std::fmt;

use crate::layout::VertexLayout;

macro_rules! gpu_handle {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u32);

        impl $name {
            /// Wrap a raw id. Only devices should mint handles.
            pub const fn from_raw(raw: u32) -> Self {
                Self(raw)
            }

            /// The raw id.
            pub const fn raw(self) -> u32 {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Debug::fmt(self, f)
            }
        }
    };
}

gpu_handle!(
    /// Handle to a device buffer.
    BufferId,
    "Buffer"
);
gpu_handle!(
    /// Handle to a linked shader program (vertex + fragment stage).
    ProgramId,
    "Program"
);
gpu_handle!(
    /// Handle to a sampled 2D texture.
    TextureId,
    "Texture"
);

/// What a buffer is bound as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferKind {
    Vertex,
    /// Index buffer holding `u16` indices.
    Index,
    Uniform,
}

impl BufferKind {
    /// Usage flags a wgpu-backed device needs for this kind of buffer.
    pub fn to_wgpu_usage(self) -> wgpu::BufferUsages {
        let usage = match self {
            BufferKind::Vertex => wgpu::BufferUsages::VERTEX,
            BufferKind::Index => wgpu::BufferUsages::INDEX,
            BufferKind::Uniform => wgpu::BufferUsages::UNIFORM,
        };
        usage | wgpu::BufferUsages::COPY_DST
    }
}

#[derive(Debug, Clone)]
pub struct BufferDescriptor<'a> {
    pub label: Option<&'a str>,
    /// Size in bytes.
    pub size: u64,
    pub kind: BufferKind,
}

/// Everything a device needs to compile and link a program.
#[derive(Debug, Clone)]
pub struct ProgramDescriptor<'a> {
    pub label: Option<&'a str>,
    /// WGSL source with a `vs_main` entry point.
    pub vertex_source: &'a str,
    /// WGSL source with a `fs_main` entry point.
    pub fragment_source: &'a str,
    /// Layout of one vertex record; attribute `i` is bound to shader location `i`.
    pub layout: &'a VertexLayout,
    /// Size in bytes of the global uniform block (group 0, binding 0).
    pub uniform_size: u64,
}

/// An RGBA8 texture. Pixel upload happens at creation; there is no streaming.
#[derive(Debug, Clone)]
pub struct TextureDescriptor<'a> {
    pub label: Option<&'a str>,
    pub width: u32,
    pub height: u32,
    /// Nearest-neighbour sampling when `false`, linear when `true`.
    pub filter_linear: bool,
}

impl TextureDescriptor<'_> {
    /// Expected length of the pixel slice passed alongside this descriptor.
    pub fn byte_len(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_debug_format() {
        assert_eq!(format!("{:?}", BufferId::from_raw(7)), "Buffer#7");
        assert_eq!(ProgramId::from_raw(2).to_string(), "Program#2");
    }

    #[test]
    fn test_buffer_usage_includes_copy_dst() {
        for kind in [BufferKind::Vertex, BufferKind::Index, BufferKind::Uniform] {
            assert!(kind.to_wgpu_usage().contains(wgpu::BufferUsages::COPY_DST));
        }
        assert!(BufferKind::Index.to_wgpu_usage().contains(wgpu::BufferUsages::INDEX));
    }

    #[test]
    fn test_texture_byte_len() {
        let desc = TextureDescriptor {
            label: None,
            width: 4,
            height: 2,
            filter_linear: false,
        };
        assert_eq!(desc.byte_len(), 32);
    }
}
