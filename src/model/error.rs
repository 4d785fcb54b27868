use thiserror::Error;

/// Cause of a failed storage call, coarse enough for callers to pick a recovery policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    PermissionDenied,
    Transient,
    InvalidArgument,
    Unknown,
}

impl ErrorKind {
    /// Maps an HTTP status returned by an object store to a kind.
    pub fn from_status(status: u16) -> Self {
        match status {
            404 => ErrorKind::NotFound,
            401 | 403 => ErrorKind::PermissionDenied,
            408 | 429 | 500..=599 => ErrorKind::Transient,
            400..=499 => ErrorKind::InvalidArgument,
            _ => ErrorKind::Unknown,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Transient)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::PermissionDenied => "permission_denied",
            ErrorKind::Transient => "transient",
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::Unknown => "unknown",
        }
    }
}

#[derive(Error, Clone, Debug, PartialEq, Eq)]
#[error("{message}")]
pub struct FSError {
    pub kind: ErrorKind,
    pub message: String,
}

impl FSError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, message)
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }
}

impl From<std::io::Error> for FSError {
    fn from(err: std::io::Error) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound,
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
            std::io::ErrorKind::InvalidInput | std::io::ErrorKind::InvalidData => {
                ErrorKind::InvalidArgument
            }
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::Interrupted => ErrorKind::Transient,
            _ => ErrorKind::Unknown,
        };

        FSError::new(kind, err.to_string())
    }
}
