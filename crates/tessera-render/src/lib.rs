//! Tessera Render - quad batching and ring-buffered submission.
//!
//! Collects textured quads into a [`QuadBatch`], orders them with an
//! in-place heap sort, and submits them through a [`QuadEffect`] that streams
//! geometry into a fixed-size ring and issues one draw per run of equal
//! state tokens.
//!
//! # Frame loop
//!
//! ```rust,no_run
//! use tessera_gpu::TextureId;
//! use tessera_render::{
//!     bind_texture, sprite_vertices, upload_projection, DepthOrder, EffectDescriptor,
//!     GraphicsContext, QuadBatch, QuadEffect, QuadParams, WgpuDevice, WgpuDeviceDescriptor,
//! };
//!
//! # fn run(target: &wgpu::TextureView, texture: TextureId) -> Result<(), Box<dyn std::error::Error>> {
//! let context = GraphicsContext::new_owned_sync()?;
//! let device = WgpuDevice::new(context, WgpuDeviceDescriptor::default());
//!
//! let mut effect = QuadEffect::new("sprites");
//! effect.create_resources(&device, &EffectDescriptor::sprites(1024, 800.0, 600.0))?;
//! let mut batch = QuadBatch::new(4096);
//!
//! batch.add(texture, &QuadParams::new(10.0, 20.0).with_depth(0.5))?;
//! batch.sort_by_depth(DepthOrder::BackToFront);
//!
//! effect
//!     .make_current(&device, upload_projection)?
//!     .draw_batch(&device, &batch, sprite_vertices, bind_texture)?;
//! device.submit(target, None, None)?;
//! batch.flush();
//! # Ok(())
//! # }
//! ```
//!
//! State tokens are any `Copy + PartialEq` value. Sprites use the texture
//! handle; a tile renderer might use a palette index. The effect never looks
//! inside a token, it only compares adjacent ones and hands changed ones to
//! the state-apply callback.

pub mod batch;
pub mod color;
pub mod context;
pub mod effect;
pub mod error;
pub mod sort;
pub mod sprite;
pub mod staging;
pub mod wgpu_device;

pub use batch::{BatchError, MAX_BATCH_QUADS, QuadBatch, QuadParams, QuadRef};
pub use color::{Color, PackedColor};
pub use context::{GraphicsContext, GraphicsContextDescriptor};
pub use effect::{
    EffectDescriptor, EffectStats, MAX_RING_QUADS, QuadEffect, ortho_projection, quad_indices,
};
pub use error::{EffectError, GraphicsError};
pub use sort::{DepthOrder, back_to_front, front_to_back};
pub use sprite::{
    SPRITE_FRAGMENT_SHADER, SPRITE_UNIFORM_SIZE, SPRITE_VERTEX_SHADER, SpriteVertex,
    bind_texture, sprite_vertices, upload_projection,
};
pub use staging::VertexWriter;
pub use wgpu_device::{WgpuDevice, WgpuDeviceDescriptor};
