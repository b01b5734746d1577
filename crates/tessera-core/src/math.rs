//! Math types used across Tessera.
//!
//! Re-exports the SIMD-accelerated [`glam`] types. `Mat4` and `Vec2` are the
//! only ones the renderer needs on its hot path; `glam` is built with the
//! `bytemuck` feature so matrices can be uploaded with `bytemuck::bytes_of`.
//!
//! ```
//! use tessera_core::math::{Mat4, Vec2, Vec4};
//!
//! let projection = Mat4::IDENTITY;
//! let p = projection * Vec4::new(10.0, 20.0, 0.0, 1.0);
//! assert_eq!(Vec2::new(p.x, p.y), Vec2::new(10.0, 20.0));
//! ```

pub use glam::*;

/// Rotate `point` around the origin by `radians`, counter-clockwise in a
/// y-up frame (clockwise on a y-down screen).
#[inline]
pub fn rotate(point: Vec2, radians: f32) -> Vec2 {
    if radians == 0.0 {
        return point;
    }
    let (sin, cos) = radians.sin_cos();
    Vec2::new(point.x * cos - point.y * sin, point.x * sin + point.y * cos)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotate_zero_is_identity() {
        let p = Vec2::new(3.0, -4.0);
        assert_eq!(rotate(p, 0.0), p);
    }

    #[test]
    fn test_rotate_quarter_turn() {
        let p = rotate(Vec2::new(1.0, 0.0), std::f32::consts::FRAC_PI_2);
        assert!(p.x.abs() < 1e-6);
        assert!((p.y - 1.0).abs() < 1e-6);
    }
}
