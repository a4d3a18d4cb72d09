// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the reconstruction pipeline
//!
//! Only conditions that abort a tick or a user command are errors. The
//! frequent, expected outcomes of a live capture (an acquisition timeout, a
//! frame the tracker could not align) are ordinary values returned by
//! [`FrameSource::acquire`](crate::backends::sensor::FrameSource::acquire) and
//! [`ReconstructionEngine::integrate`](crate::backends::engine::ReconstructionEngine::integrate).

use crate::pipelines::reconstruction::SessionState;
use std::fmt;

/// Result type alias using FusionError
pub type FusionResult<T> = Result<T, FusionError>;

/// Main error type
#[derive(Debug, Clone)]
pub enum FusionError {
    /// Depth sensor or stream errors
    Sensor(SensorError),
    /// Reconstruction engine errors
    Engine(EngineError),
    /// Mesh export or reload errors
    Mesh(MeshError),
    /// Invalid configuration, raised at construction
    Config(String),
    /// Operation requires a running session
    NotRunning(SessionState),
    /// Another thread panicked while holding the volume lock
    LockPoisoned,
    /// Generic error with message
    Other(String),
}

/// Depth sensor errors
///
/// Any of these leaves the stream in an unknown state; the session treats
/// them as fatal for the current stream.
#[derive(Debug, Clone, PartialEq)]
pub enum SensorError {
    /// No depth sensor is connected
    NoSensorFound,
    /// Frame requested before the depth stream was opened
    StreamNotOpen,
    /// Opening or reading the stream failed
    StreamFailed(String),
    /// Source frame byte length differs from the depth buffer capacity
    BufferSizeMismatch { expected: usize, actual: usize },
    /// Sensor went away during operation
    Disconnected,
}

/// Reconstruction engine errors
#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Volume or image buffers could not be created
    Creation(String),
    /// Depth-to-float conversion failed
    Conversion(String),
    /// Unexpected failure inside integration (not a tracking failure)
    Integration(String),
    /// Ray-casting the volume failed
    Raycast(String),
    /// Shading the point cloud failed
    Shade(String),
    /// Mesh extraction failed
    Extraction(String),
    /// Clearing the volume failed
    Reset(String),
}

/// Mesh export and reload errors
#[derive(Debug, Clone, PartialEq)]
pub enum MeshError {
    /// Mesh does not satisfy the triangle-list layout
    InvalidMesh(String),
    /// Filesystem error
    Io(String),
    /// Malformed mesh file
    Parse(String),
    /// File extension is neither stl nor obj
    UnsupportedFormat(String),
    /// Reload requested before any mesh was saved
    NothingSaved,
}

impl FusionError {
    /// Whether the error should halt the capture loop
    ///
    /// Mesh errors are reported to the operator but leave the session usable.
    pub fn is_fatal(&self) -> bool {
        match self {
            FusionError::Sensor(_) | FusionError::LockPoisoned => true,
            FusionError::Engine(e) => !matches!(e, EngineError::Extraction(_)),
            FusionError::Config(_) | FusionError::NotRunning(_) => true,
            FusionError::Mesh(_) | FusionError::Other(_) => false,
        }
    }
}

impl fmt::Display for FusionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FusionError::Sensor(e) => write!(f, "Sensor error: {}", e),
            FusionError::Engine(e) => write!(f, "Reconstruction error: {}", e),
            FusionError::Mesh(e) => write!(f, "Mesh error: {}", e),
            FusionError::Config(msg) => write!(f, "Configuration error: {}", msg),
            FusionError::NotRunning(state) => write!(f, "Session is not running ({:?})", state),
            FusionError::LockPoisoned => write!(f, "Reconstruction volume lock poisoned"),
            FusionError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorError::NoSensorFound => write!(f, "No depth sensor found"),
            SensorError::StreamNotOpen => write!(f, "Depth stream is not open"),
            SensorError::StreamFailed(msg) => write!(f, "Depth stream failed: {}", msg),
            SensorError::BufferSizeMismatch { expected, actual } => write!(
                f,
                "Depth frame is {} bytes, buffer holds {} bytes",
                actual, expected
            ),
            SensorError::Disconnected => write!(f, "Depth sensor disconnected"),
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Creation(msg) => write!(f, "Failed to create reconstruction: {}", msg),
            EngineError::Conversion(msg) => write!(f, "Depth conversion failed: {}", msg),
            EngineError::Integration(msg) => write!(f, "Integration failed: {}", msg),
            EngineError::Raycast(msg) => write!(f, "Point cloud calculation failed: {}", msg),
            EngineError::Shade(msg) => write!(f, "Shading failed: {}", msg),
            EngineError::Extraction(msg) => write!(f, "Mesh extraction failed: {}", msg),
            EngineError::Reset(msg) => write!(f, "Failed to reset reconstruction: {}", msg),
        }
    }
}

impl fmt::Display for MeshError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MeshError::InvalidMesh(msg) => write!(f, "Invalid mesh: {}", msg),
            MeshError::Io(msg) => write!(f, "I/O error: {}", msg),
            MeshError::Parse(msg) => write!(f, "Malformed mesh file: {}", msg),
            MeshError::UnsupportedFormat(ext) => write!(f, "Unsupported mesh format: {}", ext),
            MeshError::NothingSaved => write!(f, "No mesh has been saved yet"),
        }
    }
}

impl std::error::Error for FusionError {}
impl std::error::Error for SensorError {}
impl std::error::Error for EngineError {}
impl std::error::Error for MeshError {}

impl From<SensorError> for FusionError {
    fn from(err: SensorError) -> Self {
        FusionError::Sensor(err)
    }
}

impl From<EngineError> for FusionError {
    fn from(err: EngineError) -> Self {
        FusionError::Engine(err)
    }
}

impl From<MeshError> for FusionError {
    fn from(err: MeshError) -> Self {
        FusionError::Mesh(err)
    }
}

impl From<std::io::Error> for MeshError {
    fn from(err: std::io::Error) -> Self {
        MeshError::Io(err.to_string())
    }
}

impl From<String> for FusionError {
    fn from(msg: String) -> Self {
        FusionError::Other(msg)
    }
}

impl From<&str> for FusionError {
    fn from(msg: &str) -> Self {
        FusionError::Other(msg.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(FusionError::Sensor(SensorError::Disconnected).is_fatal());
        assert!(FusionError::Engine(EngineError::Integration("gpu".into())).is_fatal());
        assert!(!FusionError::Engine(EngineError::Extraction("empty".into())).is_fatal());
        assert!(!FusionError::Mesh(MeshError::NothingSaved).is_fatal());
    }

    #[test]
    fn test_buffer_mismatch_message() {
        let err = SensorError::BufferSizeMismatch {
            expected: 16,
            actual: 12,
        };
        assert_eq!(err.to_string(), "Depth frame is 12 bytes, buffer holds 16 bytes");
    }
}
