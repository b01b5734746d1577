//! The standard textured sprite: vertex format, shaders, generator and callbacks.
//!
//! These plug into [`QuadEffect`] for the common case where the state token
//! is the texture to bind:
//!
//! - [`EffectDescriptor::sprites`](crate::EffectDescriptor::sprites) sets up the program and layout
//! - [`upload_projection`] is the `make_current` setup callback
//! - [`sprite_vertices`] is the vertex generator
//! - [`bind_texture`] is the state-apply callback

use bytemuck::{Pod, Zeroable};
use tessera_core::math::Mat4;
use tessera_core::profiling::profile_function;
use tessera_gpu::{
    AttributeSlot, DeviceResult, ElementType, GraphicsDevice, ProgramId, TextureId,
    VertexAttribute, VertexLayout,
};

use crate::batch::QuadBatch;
use crate::color::PackedColor;
use crate::effect::QuadEffect;
use crate::error::EffectError;
use crate::staging::VertexWriter;

/// One corner of a sprite quad.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct SpriteVertex {
    pub position: [f32; 2],
    pub tex_coord: [f32; 2],
    pub color: PackedColor,
}

static_assertions::const_assert_eq!(std::mem::size_of::<SpriteVertex>(), 20);

impl SpriteVertex {
    /// Layout matching the field order; attribute `i` is shader location `i`.
    pub fn layout() -> VertexLayout {
        VertexLayout::new(std::mem::size_of::<SpriteVertex>() as u32)
            .with(VertexAttribute::new("position", ElementType::F32, 0, 2))
            .with(VertexAttribute::new("tex_coord", ElementType::F32, 8, 2))
            .with(VertexAttribute::new("color", ElementType::U8, 16, 4).normalized())
    }
}

/// Size of the sprite program's uniform block (one `mat4x4<f32>`).
pub const SPRITE_UNIFORM_SIZE: u64 = std::mem::size_of::<Mat4>() as u64;

pub const SPRITE_VERTEX_SHADER: &str = r#"
struct Globals {
    projection: mat4x4<f32>,
};

@group(0) @binding(0)
var<uniform> globals: Globals;

struct VertexInput {
    @location(0) position: vec2<f32>,
    @location(1) tex_coord: vec2<f32>,
    @location(2) color: vec4<f32>,
};

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) tex_coord: vec2<f32>,
    @location(1) color: vec4<f32>,
};

@vertex
fn vs_main(input: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    out.clip_position = globals.projection * vec4<f32>(input.position, 0.0, 1.0);
    out.tex_coord = input.tex_coord;
    out.color = input.color;
    return out;
}
"#;

pub const SPRITE_FRAGMENT_SHADER: &str = r#"
@group(1) @binding(0)
var sprite_texture: texture_2d<f32>;
@group(1) @binding(1)
var sprite_sampler: sampler;

struct FragmentInput {
    @location(0) tex_coord: vec2<f32>,
    @location(1) color: vec4<f32>,
};

@fragment
fn fs_main(input: FragmentInput) -> @location(0) vec4<f32> {
    return textureSample(sprite_texture, sprite_sampler, input.tex_coord) * input.color;
}
"#;

/// Vertex generator for any layout with `position`, `tex_coord` and `color`
/// attributes.
///
/// Writes four corners (TL, TR, BR, BL) per quad for draw-order positions
/// `offset..offset + count`. Fails with [`EffectError::MissingAttribute`]
/// before writing anything if the layout lacks one of the three.
pub fn sprite_vertices<S>(
    writer: &mut VertexWriter<'_>,
    batch: &QuadBatch<S>,
    offset: usize,
    count: usize,
) -> Result<(), EffectError>
where
    S: Copy + PartialEq,
{
    profile_function!();

    let position = required_slot(writer, "position")?;
    let tex_coord = required_slot(writer, "tex_coord")?;
    let color = required_slot(writer, "color")?;

    for (q, &index) in batch.order()[offset..offset + count].iter().enumerate() {
        let quad = batch.quad(index);
        let corners = quad.corners();
        let tex_coords = quad.tex_coords();
        for corner in 0..4 {
            let vertex = q * 4 + corner;
            writer.put(vertex, position, corners[corner].to_array());
            writer.put(vertex, tex_coord, tex_coords[corner].to_array());
            writer.put(vertex, color, quad.color);
        }
    }
    Ok(())
}

fn required_slot(
    writer: &VertexWriter<'_>,
    name: &'static str,
) -> Result<AttributeSlot, EffectError> {
    writer.slot(name).ok_or_else(|| {
        tracing::error!("Vertex layout has no '{}' attribute", name);
        EffectError::MissingAttribute(name)
    })
}

/// `make_current` setup callback that uploads the projection as the whole
/// uniform block.
pub fn upload_projection<S, D>(
    _effect: &QuadEffect<S>,
    device: &D,
    program: ProgramId,
    projection: &Mat4,
) -> DeviceResult<()>
where
    D: GraphicsDevice + ?Sized,
{
    device.set_uniforms(program, bytemuck::bytes_of(projection))
}

/// State-apply callback for texture tokens: binds the texture to slot 0.
pub fn bind_texture<D>(
    _effect: &QuadEffect<TextureId>,
    device: &D,
    _program: ProgramId,
    texture: &TextureId,
) -> DeviceResult<()>
where
    D: GraphicsDevice + ?Sized,
{
    device.bind_texture(0, *texture);
    Ok(())
}
