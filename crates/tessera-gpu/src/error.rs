//! Errors reported by graphics devices.

use std::fmt;

/// Which step of program creation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    VertexCompile,
    FragmentCompile,
    Link,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::VertexCompile => write!(f, "vertex shader compilation"),
            ShaderStage::FragmentCompile => write!(f, "fragment shader compilation"),
            ShaderStage::Link => write!(f, "program link"),
        }
    }
}

/// Structured diagnostic for a failed program build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramError {
    pub stage: ShaderStage,
    /// Source text of the failing stage (both stages for link errors).
    pub source: String,
    /// Diagnostic log produced by the compiler or driver.
    pub log: String,
}

impl ProgramError {
    pub fn new(stage: ShaderStage, source: impl Into<String>, log: impl Into<String>) -> Self {
        Self {
            stage,
            source: source.into(),
            log: log.into(),
        }
    }
}

impl fmt::Display for ProgramError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.stage, self.log)
    }
}

impl std::error::Error for ProgramError {}

/// Errors from buffer, texture and draw operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// The device (GPU context) was lost; every handle it issued is invalid.
    Lost,

    /// A handle that this device never issued, or already deleted.
    InvalidHandle {
        kind: &'static str,
        id: u32,
    },

    /// Write past the end of a buffer.
    OutOfBounds {
        id: u32,
        offset: u64,
        len: u64,
        size: u64,
    },

    /// Offset or length not aligned to the device's copy alignment.
    Misaligned {
        offset: u64,
        len: u64,
        alignment: u64,
    },

    /// A draw was issued without the required bindings.
    NotBound(&'static str),

    /// Resource creation was rejected by the backend.
    Creation(String),
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::Lost => write!(f, "Graphics device was lost"),
            DeviceError::InvalidHandle { kind, id } => {
                write!(f, "Invalid {} handle #{}", kind, id)
            }
            DeviceError::OutOfBounds {
                id,
                offset,
                len,
                size,
            } => write!(
                f,
                "Write of {} bytes at offset {} overflows buffer #{} ({} bytes)",
                len, offset, id, size
            ),
            DeviceError::Misaligned {
                offset,
                len,
                alignment,
            } => write!(
                f,
                "Upload of {} bytes at offset {} is not {}-byte aligned",
                len, offset, alignment
            ),
            DeviceError::NotBound(what) => write!(f, "Draw issued with no {} bound", what),
            DeviceError::Creation(msg) => write!(f, "Resource creation failed: {}", msg),
        }
    }
}

impl std::error::Error for DeviceError {}

/// Result type for device operations.
pub type DeviceResult<T> = Result<T, DeviceError>;
