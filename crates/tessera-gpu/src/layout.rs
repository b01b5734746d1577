//! Declarative description of an interleaved vertex record.
//!
//! A [`VertexLayout`] lists named attributes with their byte offset, element
//! type and component count. It is interpreted once when a program is created
//! (to build the device's attribute bindings) and once per buffering pass (to
//! resolve [`AttributeSlot`]s for the vertex writer). The per-vertex hot loop
//! never looks at names.

use std::borrow::Cow;
use std::fmt;

/// Scalar type of one attribute component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    F32,
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
}

impl ElementType {
    /// Size of one component in bytes.
    pub const fn size(self) -> u32 {
        match self {
            ElementType::U8 | ElementType::I8 => 1,
            ElementType::U16 | ElementType::I16 => 2,
            ElementType::F32 | ElementType::U32 | ElementType::I32 => 4,
        }
    }
}

/// One named field of a vertex record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    pub name: Cow<'static, str>,
    pub element_type: ElementType,
    pub byte_offset: u32,
    pub component_count: u8,
    /// Integer components are read as `0.0..=1.0` (or `-1.0..=1.0`) floats.
    pub normalize: bool,
}

impl VertexAttribute {
    pub fn new(
        name: impl Into<Cow<'static, str>>,
        element_type: ElementType,
        byte_offset: u32,
        component_count: u8,
    ) -> Self {
        Self {
            name: name.into(),
            element_type,
            byte_offset,
            component_count,
            normalize: false,
        }
    }

    /// Mark integer components as normalized.
    pub fn normalized(mut self) -> Self {
        self.normalize = true;
        self
    }

    /// Size of the whole attribute in bytes.
    pub fn size(&self) -> u32 {
        self.element_type.size() * self.component_count as u32
    }

    /// The matching wgpu vertex format, if wgpu can express it.
    pub fn to_wgpu_format(&self) -> Option<wgpu::VertexFormat> {
        use wgpu::VertexFormat as F;

        let format = match (self.element_type, self.component_count, self.normalize) {
            (ElementType::F32, 1, _) => F::Float32,
            (ElementType::F32, 2, _) => F::Float32x2,
            (ElementType::F32, 3, _) => F::Float32x3,
            (ElementType::F32, 4, _) => F::Float32x4,
            (ElementType::U8, 2, true) => F::Unorm8x2,
            (ElementType::U8, 4, true) => F::Unorm8x4,
            (ElementType::U8, 2, false) => F::Uint8x2,
            (ElementType::U8, 4, false) => F::Uint8x4,
            (ElementType::I8, 2, true) => F::Snorm8x2,
            (ElementType::I8, 4, true) => F::Snorm8x4,
            (ElementType::I8, 2, false) => F::Sint8x2,
            (ElementType::I8, 4, false) => F::Sint8x4,
            (ElementType::U16, 2, true) => F::Unorm16x2,
            (ElementType::U16, 4, true) => F::Unorm16x4,
            (ElementType::U16, 2, false) => F::Uint16x2,
            (ElementType::U16, 4, false) => F::Uint16x4,
            (ElementType::I16, 2, true) => F::Snorm16x2,
            (ElementType::I16, 4, true) => F::Snorm16x4,
            (ElementType::I16, 2, false) => F::Sint16x2,
            (ElementType::I16, 4, false) => F::Sint16x4,
            (ElementType::U32, 1, false) => F::Uint32,
            (ElementType::U32, 2, false) => F::Uint32x2,
            (ElementType::U32, 3, false) => F::Uint32x3,
            (ElementType::U32, 4, false) => F::Uint32x4,
            (ElementType::I32, 1, false) => F::Sint32,
            (ElementType::I32, 2, false) => F::Sint32x2,
            (ElementType::I32, 3, false) => F::Sint32x3,
            (ElementType::I32, 4, false) => F::Sint32x4,
            _ => return None,
        };
        Some(format)
    }
}

/// A resolved attribute: where it lives inside one vertex record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeSlot {
    pub offset: usize,
    pub size: usize,
}

/// Ordered attribute list plus the record stride.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexLayout {
    stride: u32,
    attributes: Vec<VertexAttribute>,
}

impl VertexLayout {
    /// Empty layout with the given record size in bytes.
    pub fn new(stride: u32) -> Self {
        Self {
            stride,
            attributes: Vec::new(),
        }
    }

    /// Append an attribute. Its position in the list is its shader location.
    pub fn with(mut self, attribute: VertexAttribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }

    pub fn attributes(&self) -> &[VertexAttribute] {
        &self.attributes
    }

    /// Resolve a named attribute to its slot.
    pub fn slot(&self, name: &str) -> Option<AttributeSlot> {
        self.attributes
            .iter()
            .find(|attr| attr.name == name)
            .map(|attr| AttributeSlot {
                offset: attr.byte_offset as usize,
                size: attr.size() as usize,
            })
    }

    /// Check the layout is usable by a device.
    pub fn validate(&self) -> Result<(), LayoutError> {
        if self.stride == 0 || self.stride % 4 != 0 {
            return Err(LayoutError::BadStride(self.stride));
        }
        for (i, attr) in self.attributes.iter().enumerate() {
            if attr.component_count == 0 || attr.component_count > 4 {
                return Err(LayoutError::BadComponentCount {
                    name: attr.name.to_string(),
                    count: attr.component_count,
                });
            }
            if attr.byte_offset + attr.size() > self.stride {
                return Err(LayoutError::OutOfBounds {
                    name: attr.name.to_string(),
                    end: attr.byte_offset + attr.size(),
                    stride: self.stride,
                });
            }
            if self.attributes[..i].iter().any(|other| other.name == attr.name) {
                return Err(LayoutError::DuplicateName(attr.name.to_string()));
            }
        }
        Ok(())
    }
}

/// Reasons a [`VertexLayout`] is rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutError {
    /// Stride is zero or not a multiple of 4.
    BadStride(u32),
    BadComponentCount { name: String, count: u8 },
    /// Attribute extends past the end of the record.
    OutOfBounds { name: String, end: u32, stride: u32 },
    DuplicateName(String),
}

impl fmt::Display for LayoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayoutError::BadStride(stride) => {
                write!(f, "Vertex stride {} must be a non-zero multiple of 4", stride)
            }
            LayoutError::BadComponentCount { name, count } => {
                write!(f, "Attribute '{}' has {} components (expected 1-4)", name, count)
            }
            LayoutError::OutOfBounds { name, end, stride } => write!(
                f,
                "Attribute '{}' ends at byte {} but the vertex stride is {}",
                name, end, stride
            ),
            LayoutError::DuplicateName(name) => {
                write!(f, "Attribute '{}' is declared more than once", name)
            }
        }
    }
}

impl std::error::Error for LayoutError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn sprite_layout() -> VertexLayout {
        VertexLayout::new(20)
            .with(VertexAttribute::new("position", ElementType::F32, 0, 2))
            .with(VertexAttribute::new("tex_coord", ElementType::F32, 8, 2))
            .with(VertexAttribute::new("color", ElementType::U8, 16, 4).normalized())
    }

    #[test]
    fn test_slot_lookup() {
        let layout = sprite_layout();
        assert_eq!(
            layout.slot("tex_coord"),
            Some(AttributeSlot { offset: 8, size: 8 })
        );
        assert_eq!(layout.slot("color"), Some(AttributeSlot { offset: 16, size: 4 }));
        assert_eq!(layout.slot("normal"), None);
    }

    #[test]
    fn test_validate_accepts_sprite_layout() {
        assert_eq!(sprite_layout().validate(), Ok(()));
    }

    #[test]
    fn test_validate_rejects_overflowing_attribute() {
        let layout = VertexLayout::new(16)
            .with(VertexAttribute::new("position", ElementType::F32, 8, 3));
        assert!(matches!(
            layout.validate(),
            Err(LayoutError::OutOfBounds { end: 20, stride: 16, .. })
        ));
    }

    #[test]
    fn test_validate_rejects_bad_stride_and_duplicates() {
        assert_eq!(VertexLayout::new(10).validate(), Err(LayoutError::BadStride(10)));

        let dup = VertexLayout::new(16)
            .with(VertexAttribute::new("a", ElementType::F32, 0, 2))
            .with(VertexAttribute::new("a", ElementType::F32, 8, 2));
        assert_eq!(dup.validate(), Err(LayoutError::DuplicateName("a".into())));
    }

    #[test]
    fn test_wgpu_formats() {
        let layout = sprite_layout();
        let formats: Vec<_> = layout
            .attributes()
            .iter()
            .map(|a| a.to_wgpu_format())
            .collect();
        assert_eq!(
            formats,
            vec![
                Some(wgpu::VertexFormat::Float32x2),
                Some(wgpu::VertexFormat::Float32x2),
                Some(wgpu::VertexFormat::Unorm8x4),
            ]
        );
        let odd = VertexAttribute::new("odd", ElementType::U8, 0, 3);
        assert_eq!(odd.to_wgpu_format(), None);
    }
}
