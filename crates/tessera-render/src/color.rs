/// An RGBA color with `f32` components in the `0.0..=1.0` range.
///
/// Used for clear colors and as the friendly way to build a
/// [`PackedColor`] tint:
///
/// ```
/// use tessera_render::{Color, PackedColor};
///
/// let half_red = Color::rgba(1.0, 0.0, 0.0, 0.5);
/// assert_eq!(half_red.pack(), PackedColor::rgba(255, 0, 0, 128));
///
/// let orange = Color::from_hex(0xFF8800);
/// assert_eq!(orange.pack().to_array(), [255, 136, 0, 255]);
/// ```
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const WHITE: Color = Color::rgb(1.0, 1.0, 1.0);
    pub const BLACK: Color = Color::rgb(0.0, 0.0, 0.0);
    pub const TRANSPARENT: Color = Color::rgba(0.0, 0.0, 0.0, 0.0);

    /// Create a color from RGB components with full opacity (alpha = 1.0).
    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Create a color from a 24-bit RGB hex value (e.g. `0xFF8800`).
    pub fn from_hex(hex: u32) -> Self {
        PackedColor::from_hex((hex << 8) | 0xFF).unpack()
    }

    /// Quantize to 8 bits per channel, rounding to nearest.
    pub fn pack(self) -> PackedColor {
        let q = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
        PackedColor::rgba(q(self.r), q(self.g), q(self.b), q(self.a))
    }

    /// Convert to the equivalent `wgpu::Color` (f64 components).
    pub fn to_wgpu(self) -> wgpu::Color {
        wgpu::Color {
            r: self.r as f64,
            g: self.g as f64,
            b: self.b as f64,
            a: self.a as f64,
        }
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::WHITE
    }
}

impl From<[f32; 4]> for Color {
    fn from(arr: [f32; 4]) -> Self {
        Self::rgba(arr[0], arr[1], arr[2], arr[3])
    }
}

/// A tint color packed as four bytes in R, G, B, A memory order.
///
/// This is what a quad stores and what ends up in the vertex record; the
/// shader reads it as a normalized `unorm8x4`.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, bytemuck::Pod, bytemuck::Zeroable)]
pub struct PackedColor([u8; 4]);

impl PackedColor {
    pub const WHITE: PackedColor = PackedColor([255; 4]);
    pub const TRANSPARENT: PackedColor = PackedColor([0; 4]);

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self([r, g, b, a])
    }

    /// Unpack a 32-bit `0xRRGGBBAA` value.
    pub const fn from_hex(hex: u32) -> Self {
        Self(hex.to_be_bytes())
    }

    pub const fn to_array(self) -> [u8; 4] {
        self.0
    }

    pub const fn alpha(self) -> u8 {
        self.0[3]
    }

    /// Expand to floating point.
    pub fn unpack(self) -> Color {
        let [r, g, b, a] = self.0.map(|c| c as f32 / 255.0);
        Color::rgba(r, g, b, a)
    }
}

impl Default for PackedColor {
    fn default() -> Self {
        Self::WHITE
    }
}

impl From<Color> for PackedColor {
    fn from(color: Color) -> Self {
        color.pack()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_rounds_and_clamps() {
        assert_eq!(Color::rgba(2.0, -1.0, 0.5, 1.0).pack(), PackedColor::rgba(255, 0, 128, 255));
    }

    #[test]
    fn test_packed_hex_order() {
        let c = PackedColor::from_hex(0x11223344);
        assert_eq!(c.to_array(), [0x11, 0x22, 0x33, 0x44]);
        assert_eq!(c.alpha(), 0x44);
        assert_eq!(bytemuck::bytes_of(&c), &[0x11, 0x22, 0x33, 0x44]);
    }

    #[test]
    fn test_unpack_round_trip() {
        let c = PackedColor::rgba(0, 51, 102, 255);
        assert_eq!(c.unpack().pack(), c);
        assert_eq!(Color::from_hex(0x000000), Color::BLACK);
    }
}
