use crate::error_handler::ErrorCategory;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CurateError {
    #[error("Probe failed for {path}: {reason}")]
    ProbeFailure { path: PathBuf, reason: String },

    #[error("Target codec '{codec}' is not available in the encode backend (available: {available})")]
    EncodeBackendUnavailable { codec: String, available: String },

    #[error("Encoding {path} failed: {diagnostic}")]
    EncodeFailure { path: PathBuf, diagnostic: String },

    #[error("Re-encoded {path} is not smaller ({new_size} >= {original_size} bytes)")]
    SizeRegression {
        path: PathBuf,
        original_size: u64,
        new_size: u64,
    },

    #[error("{operation} failed for {path}: {source}")]
    Filesystem {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Directory not found: {0}")]
    DirectoryNotFound(PathBuf),

    #[error("Refusing to modify protected directory: {0}")]
    ProtectedDirectory(PathBuf),

    #[error("External tool not found: {0}")]
    ToolNotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CurateError {
    pub fn filesystem(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CurateError::Filesystem {
            operation,
            path: path.into(),
            source,
        }
    }

    /// Batch-fatal errors abort the whole run; everything else is isolated to one file.
    pub fn category(&self) -> ErrorCategory {
        match self {
            CurateError::DirectoryNotFound(_)
            | CurateError::EncodeBackendUnavailable { .. }
            | CurateError::ProtectedDirectory(_)
            | CurateError::ToolNotFound(_)
            | CurateError::Config(_) => ErrorCategory::Fatal,

            CurateError::ProbeFailure { .. }
            | CurateError::EncodeFailure { .. }
            | CurateError::Filesystem { .. }
            | CurateError::Io(_) => ErrorCategory::Recoverable,

            CurateError::SizeRegression { .. } => ErrorCategory::Optional,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.category() == ErrorCategory::Fatal
    }
}

pub type Result<T> = std::result::Result<T, CurateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_fatal_kinds() {
        assert!(CurateError::DirectoryNotFound(PathBuf::from("/nope")).is_fatal());
        assert!(CurateError::EncodeBackendUnavailable {
            codec: "av1".into(),
            available: "h264".into(),
        }
        .is_fatal());
        assert!(CurateError::ToolNotFound("ffmpeg".into()).is_fatal());
        assert!(CurateError::ProtectedDirectory(PathBuf::from("/")).is_fatal());
    }

    #[test]
    fn test_per_file_kinds_are_not_fatal() {
        let cases = [
            CurateError::ProbeFailure {
                path: "a.mp4".into(),
                reason: "timeout".into(),
            },
            CurateError::EncodeFailure {
                path: "a.mp4".into(),
                diagnostic: "exit 1".into(),
            },
            CurateError::SizeRegression {
                path: "a.mp4".into(),
                original_size: 10,
                new_size: 12,
            },
            CurateError::filesystem(
                "rename",
                "a.mp4",
                std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
            ),
        ];
        for err in cases {
            assert!(!err.is_fatal(), "{} should not be fatal", err);
        }
    }

    #[test]
    fn test_size_regression_is_soft() {
        let err = CurateError::SizeRegression {
            path: "a.mp4".into(),
            original_size: 10,
            new_size: 10,
        };
        assert_eq!(err.category(), ErrorCategory::Optional);
        assert!(err.to_string().contains("not smaller"));
    }
}
