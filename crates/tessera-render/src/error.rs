use std::fmt;

use tessera_gpu::{DeviceError, LayoutError, ProgramError};

/// Errors reported by [`QuadEffect`](crate::QuadEffect).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EffectError {
    /// Shader compilation or program linking failed.
    Program(ProgramError),
    /// The vertex layout was rejected before anything was created.
    Layout(LayoutError),
    /// A buffer operation or draw failed.
    Device(DeviceError),
    /// The device was lost. The effect has dropped its resources; call
    /// `create_resources` again once a device is available.
    DeviceLost,
    /// The effect has no GPU resources (never created, deleted, or lost).
    NoResources,
    /// A vertex generator needs an attribute the effect's layout lacks.
    MissingAttribute(&'static str),
}

impl fmt::Display for EffectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EffectError::Program(err) => write!(f, "Program creation failed: {}", err),
            EffectError::Layout(err) => write!(f, "Invalid vertex layout: {}", err),
            EffectError::Device(err) => write!(f, "Device error: {}", err),
            EffectError::DeviceLost => write!(f, "Graphics device was lost"),
            EffectError::NoResources => write!(f, "Quad effect has no GPU resources"),
            EffectError::MissingAttribute(name) => {
                write!(f, "Vertex layout has no '{}' attribute", name)
            }
        }
    }
}

impl std::error::Error for EffectError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EffectError::Program(err) => Some(err),
            EffectError::Layout(err) => Some(err),
            EffectError::Device(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ProgramError> for EffectError {
    fn from(err: ProgramError) -> Self {
        EffectError::Program(err)
    }
}

impl From<LayoutError> for EffectError {
    fn from(err: LayoutError) -> Self {
        EffectError::Layout(err)
    }
}

impl From<DeviceError> for EffectError {
    fn from(err: DeviceError) -> Self {
        match err {
            DeviceError::Lost => EffectError::DeviceLost,
            other => EffectError::Device(other),
        }
    }
}

/// Errors from creating a [`GraphicsContext`](crate::GraphicsContext).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphicsError {
    /// No adapter matched the requested options.
    NoAdapter,
    /// The adapter refused to create a device.
    DeviceCreationFailed(String),
}

impl fmt::Display for GraphicsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphicsError::NoAdapter => write!(f, "Failed to find a suitable GPU adapter"),
            GraphicsError::DeviceCreationFailed(msg) => {
                write!(f, "Failed to create device: {}", msg)
            }
        }
    }
}

impl std::error::Error for GraphicsError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lost_device_maps_to_device_lost() {
        assert_eq!(EffectError::from(DeviceError::Lost), EffectError::DeviceLost);
        assert!(matches!(
            EffectError::from(DeviceError::NotBound("program")),
            EffectError::Device(DeviceError::NotBound("program"))
        ));
    }

    #[test]
    fn test_error_source_chain() {
        use std::error::Error;

        let err = EffectError::from(LayoutError::BadStride(6));
        assert!(err.source().is_some());
        assert!(err.to_string().contains("stride 6"));
        assert!(EffectError::NoResources.source().is_none());
    }

    #[test]
    fn test_missing_attribute_display() {
        let err = EffectError::MissingAttribute("tex_coord");
        assert_eq!(err.to_string(), "Vertex layout has no 'tex_coord' attribute");
    }
}
