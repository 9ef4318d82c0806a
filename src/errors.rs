// SPDX-License-Identifier: MPL-2.0

//! Error types for the camera session

use crate::backends::camera::BackendError;
use crate::backends::camera::parameters::NegotiationFailure;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Main error type
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AppError {
    /// Camera-related errors
    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),
    /// Still capture errors
    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
    /// Storage/filesystem errors
    #[error("Storage error: {0}")]
    Storage(String),
    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

/// Camera-specific errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CameraError {
    /// No camera with the requested facing
    #[error("No camera devices found")]
    NoCameraFound,
    /// An operation needed an open camera
    #[error("Camera is not open")]
    NotOpen,
    /// Request not valid in the current session state
    #[error("Invalid state: {0}")]
    InvalidState(String),
    /// Parameter negotiation did not produce a usable configuration
    #[error("Negotiation failed: {0}")]
    Negotiation(#[from] NegotiationFailure),
    /// Error raised by the hardware boundary
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),
}

/// Still capture errors, reported through the picture error callback
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CaptureError {
    /// The session is not previewing
    #[error("Camera is not previewing")]
    NotPreviewing,
    /// No camera is open
    #[error("No camera available")]
    NoCamera,
    /// The hardware refused or failed the capture
    #[error("Capture failed: {0}")]
    Hardware(String),
}

impl From<BackendError> for AppError {
    fn from(err: BackendError) -> Self {
        AppError::Camera(CameraError::Backend(err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Config(err.to_string())
    }
}

// Conversion from String for ad-hoc messages
impl From<String> for AppError {
    fn from(msg: String) -> Self {
        AppError::Other(msg)
    }
}

impl From<&str> for AppError {
    fn from(msg: &str) -> Self {
        AppError::Other(msg.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_error_nests_under_camera() {
        let err: AppError = BackendError::Busy.into();
        assert_eq!(err, AppError::Camera(CameraError::Backend(BackendError::Busy)));
        assert_eq!(err.to_string(), "Camera error: Backend error: Camera is busy");
    }

    #[test]
    fn test_capture_error_display() {
        let err: AppError = CaptureError::NotPreviewing.into();
        assert_eq!(err.to_string(), "Capture error: Camera is not previewing");
    }

    #[test]
    fn test_io_error_is_storage() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert!(matches!(AppError::from(io), AppError::Storage(_)));
    }
}
