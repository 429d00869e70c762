use thiserror::Error;

/// Errors surfaced by the window subsystem.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlatformError {
    /// Width or height non-positive or above the capture ceiling, or a far edge past `i32`.
    #[error("invalid capture rectangle {width}x{height} at ({x}, {y})")]
    InvalidRectangle {
        x: i32,
        y: i32,
        width: i32,
        height: i32,
    },

    #[error("unknown capture mode: {0}")]
    UnknownCaptureMode(String),

    #[error("unknown event type: {0}")]
    UnknownEventKind(String),

    #[error("capture backend failure: {0}")]
    BackendFailure(String),

    /// The display connection could not be established or was lost. Not recoverable in-process.
    #[error("display connection failure: {0}")]
    ConnectionFailure(String),

    #[error("failed to acquire {0}")]
    ResourceAcquisition(String),

    #[error("not supported on this platform: {0}")]
    Unsupported(&'static str),
}

impl PlatformError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, PlatformError::ConnectionFailure(_))
    }

    pub fn resource(what: impl Into<String>) -> Self {
        PlatformError::ResourceAcquisition(what.into())
    }

    pub fn backend(detail: impl Into<String>) -> Self {
        PlatformError::BackendFailure(detail.into())
    }

    pub fn connection(detail: impl Into<String>) -> Self {
        PlatformError::ConnectionFailure(detail.into())
    }
}

pub type Result<T> = std::result::Result<T, PlatformError>;
