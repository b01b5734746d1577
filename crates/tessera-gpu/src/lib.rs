//! Graphics device abstraction for Tessera.
//!
//! This crate defines the narrow device surface the quad batcher draws
//! through, along with the plain-data types that cross it.
//!
//! # Overview
//!
//! The main components are:
//!
//! - [`GraphicsDevice`] - Trait abstracting buffers, programs, textures, state and draws
//! - [`VertexLayout`] - Declarative description of an interleaved vertex record
//! - [`RenderState`] / [`StateCache`] - Fixed-function state and redundant-change elimination
//! - `MockDevice` - Recording implementation for testing (requires `mock` feature)
//!
//! # Example
//!
//! ```rust
//! # #[cfg(feature = "mock")]
//! # {
//! use tessera_gpu::{BufferDescriptor, BufferKind, GraphicsDevice, MockDevice};
//!
//! // Create a mock device for testing
//! let mock = MockDevice::new();
//!
//! // Use it like a real device
//! let buffer = mock
//!     .create_buffer(&BufferDescriptor {
//!         label: Some("test_buffer"),
//!         size: 1024,
//!         kind: BufferKind::Vertex,
//!     })
//!     .unwrap();
//!
//! // Verify operations in tests
//! assert_eq!(mock.count_buffer_creates(), 1);
//! assert_eq!(mock.buffer_contents(buffer).unwrap().len(), 1024);
//! # }
//! ```
//!
//! # Design Philosophy
//!
//! ## 1. Handles, not resources
//!
//! Devices hand out `Copy` ids ([`BufferId`], [`ProgramId`], [`TextureId`]).
//! Nothing that crosses the trait carries a lifetime.
//!
//! ## 2. Interior Mutability
//!
//! Every trait method takes `&self`. Implementations guard their state with a
//! mutex so one device can be shared between several effects.
//!
//! ## 3. Object Safety
//!
//! `GraphicsDevice` is object-safe (`dyn GraphicsDevice`), so tests and tools
//! can treat the real and mock devices uniformly.

pub mod device;
pub mod error;
pub mod gpu_types;
pub mod layout;
#[cfg(feature = "mock")]
pub mod mock_render;
pub mod state;

// Re-export main types at crate root
pub use device::GraphicsDevice;
pub use error::{DeviceError, DeviceResult, ProgramError, ShaderStage};
pub use gpu_types::*;
pub use layout::{AttributeSlot, ElementType, LayoutError, VertexAttribute, VertexLayout};
#[cfg(feature = "mock")]
pub use mock_render::*;
pub use state::{
    BlendMode, DepthStencilState, MAX_TEXTURE_SLOTS, RasterState, RenderState, StateCache,
};
