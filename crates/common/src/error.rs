//! Error types shared across montage crates.

/// Top-level error type for composition, export, and session operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Invalid geometry for {locator}: {width}x{height}")]
    InvalidGeometry {
        locator: String,
        width: f64,
        height: f64,
    },

    #[error("Source unreadable: {locator}: {reason}")]
    SourceUnreadable { locator: String, reason: String },

    #[error("No clips to compose")]
    EmptyInput,

    #[error("None of the clips could be probed")]
    NoValidClip,

    #[error("Export produced no usable output: {path}")]
    EmptyOutput { path: String },

    #[error("Encoder failure: {reason}")]
    EncoderFailure { reason: String },

    #[error("Job cancelled")]
    Cancelled,

    #[error("Invalid trim for clip {index}: {message}")]
    InvalidTrim { index: usize, message: String },

    #[error("Session error: {message}")]
    Session { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Unsupported operation: {message}")]
    Unsupported { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using EngineError.
pub type EngineResult<T> = Result<T, EngineError>;

/// Cloneable discriminant of [`EngineError`], used where a status has to be
/// copied between tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    InvalidGeometry,
    SourceUnreadable,
    EmptyInput,
    NoValidClip,
    EmptyOutput,
    EncoderFailure,
    Cancelled,
    InvalidTrim,
    Internal,
}

impl EngineError {
    pub fn source_unreadable(locator: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SourceUnreadable {
            locator: locator.into(),
            reason: reason.into(),
        }
    }

    pub fn encoder(reason: impl Into<String>) -> Self {
        Self::EncoderFailure {
            reason: reason.into(),
        }
    }

    pub fn session(msg: impl Into<String>) -> Self {
        Self::Session {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported {
            message: msg.into(),
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            Self::InvalidGeometry { .. } => FailureKind::InvalidGeometry,
            Self::SourceUnreadable { .. } => FailureKind::SourceUnreadable,
            Self::EmptyInput => FailureKind::EmptyInput,
            Self::NoValidClip => FailureKind::NoValidClip,
            Self::EmptyOutput { .. } => FailureKind::EmptyOutput,
            Self::EncoderFailure { .. } => FailureKind::EncoderFailure,
            Self::Cancelled => FailureKind::Cancelled,
            Self::InvalidTrim { .. } => FailureKind::InvalidTrim,
            _ => FailureKind::Internal,
        }
    }

    /// Only encoder failures are worth repeating with identical parameters.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::EncoderFailure { .. })
    }

    /// Cancellation is an internal supersession signal and never shown to users.
    pub fn is_user_visible(&self) -> bool {
        !matches!(self, Self::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_encoder_failures_retry() {
        assert!(EngineError::encoder("x264 exited 1").is_retryable());
        assert!(!EngineError::NoValidClip.is_retryable());
        assert!(!EngineError::Cancelled.is_retryable());
    }

    #[test]
    fn test_cancelled_is_not_user_visible() {
        assert!(!EngineError::Cancelled.is_user_visible());
        assert!(EngineError::EmptyInput.is_user_visible());
    }

    #[test]
    fn test_kind_maps_ambient_errors_to_internal() {
        let err = EngineError::session("index out of range");
        assert_eq!(err.kind(), FailureKind::Internal);
        assert_eq!(
            EngineError::source_unreadable("a.mp4", "no video").kind(),
            FailureKind::SourceUnreadable
        );
    }
}
