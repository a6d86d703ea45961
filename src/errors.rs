use crate::device::CaptureError;
use crate::storage::StorageError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum LapseErrorKind {
    /// The capture device had no frame buffer to hand out. The session keeps running.
    CaptureUnavailable,
    /// A frame write (or the session directory creation) failed.
    StorageWriteFailed,
    /// No free session directory index is left below the bound.
    NamespaceExhausted,
    /// A tick was requested while no session is running.
    NotRunning,
    /// The storage medium could not be mounted.
    MountFailed,
    /// The session worker did not answer within the request deadline.
    Timeout,
    /// The session worker has shut down.
    WorkerGone,
    /// Configuration could not be read, parsed or validated.
    Config,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LapseError {
    pub kind: LapseErrorKind,
    pub message: String,
}

impl LapseError {
    pub fn capture_unavailable(error: CaptureError) -> Self {
        Self {
            kind: LapseErrorKind::CaptureUnavailable,
            message: format!("camera capture failed: {error}"),
        }
    }

    pub fn storage_write_failed(path: &str, error: StorageError) -> Self {
        Self {
            kind: LapseErrorKind::StorageWriteFailed,
            message: format!("write to {path} failed: {error}"),
        }
    }

    pub fn namespace_exhausted(bound: u32) -> Self {
        Self {
            kind: LapseErrorKind::NamespaceExhausted,
            message: format!("no free session directory below index {bound}"),
        }
    }

    pub fn not_running() -> Self {
        Self {
            kind: LapseErrorKind::NotRunning,
            message: "no timelapse session is running".to_string(),
        }
    }

    pub fn mount_failed(error: StorageError) -> Self {
        Self {
            kind: LapseErrorKind::MountFailed,
            message: format!("card mount failed: {error}"),
        }
    }

    pub fn timeout() -> Self {
        Self {
            kind: LapseErrorKind::Timeout,
            message: "timeout".to_string(),
        }
    }

    pub fn worker_gone() -> Self {
        Self {
            kind: LapseErrorKind::WorkerGone,
            message: "session worker has shut down".to_string(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self {
            kind: LapseErrorKind::Config,
            message: message.into(),
        }
    }

    /// Whether the failed operation left a running session behind.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.kind,
            LapseErrorKind::CaptureUnavailable | LapseErrorKind::NotRunning
        )
    }
}

impl std::fmt::Display for LapseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for LapseError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_error_message_carries_cause() {
        let error = LapseError::capture_unavailable(CaptureError::PoolExhausted { capacity: 2 });
        assert_eq!(error.kind, LapseErrorKind::CaptureUnavailable);
        assert!(error.to_string().contains("camera capture failed"));
        assert!(error.is_recoverable());
    }

    #[test]
    fn test_write_failure_is_not_recoverable() {
        let error = LapseError::storage_write_failed(
            "/lapse000/pic00000.jpg",
            StorageError::ShortWrite {
                path: "/lapse000/pic00000.jpg".to_string(),
                expected: 10,
                written: 3,
            },
        );
        assert_eq!(error.kind, LapseErrorKind::StorageWriteFailed);
        assert!(error.to_string().contains("/lapse000/pic00000.jpg"));
        assert!(!error.is_recoverable());
    }

    #[test]
    fn test_namespace_exhausted_names_bound() {
        let error = LapseError::namespace_exhausted(10_000);
        assert_eq!(error.to_string(), "no free session directory below index 10000");
    }
}
