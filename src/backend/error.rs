//! Error types for the backend abstraction.
//!
//! One error type is shared by every adapter so the orchestrator can make
//! retry/fatal decisions without matching on backend-specific types.

use std::fmt;
use std::io;

use crate::error::ErrorCategory;

/// Result type alias for backend operations
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Unified error type for backend operations
#[derive(Debug)]
pub enum BackendError {
    /// I/O error occurred during backend operation
    Io(io::Error),

    /// Path not found on backend
    NotFound { path: String, backend: String },

    /// Permission denied accessing resource
    PermissionDenied { path: String, message: String },

    /// Authentication failed
    AuthenticationFailed { backend: String, message: String },

    /// Connection failed to remote backend
    ConnectionFailed { backend: String, endpoint: String },

    /// Operation timed out (covers both `--contimeout` and `--timeout`)
    Timeout {
        operation: String,
        duration_secs: u64,
    },

    /// Invalid configuration for backend
    InvalidConfig { backend: String, message: String },

    /// Capability not implemented by this backend: covers `CantCopy`,
    /// `CantMove`, `CantDirMove`, and plain unsupported operations. The
    /// orchestrator falls back to generic download-and-upload on this.
    Unsupported { backend: String, operation: String },

    /// Same-backend directory move target already exists (`ErrDirExists`).
    DirExists { path: String },

    /// Path is invalid or malformed
    InvalidPath { path: String, reason: String },

    /// Resource already exists (e.g., during exclusive create)
    AlreadyExists { path: String },

    /// Directory is not empty (e.g., during `Rmdir`)
    DirectoryNotEmpty { path: String },

    /// Object cannot produce a hash of the requested kind. Callers must
    /// treat this as "unknown", never "unequal" (§4.3 edge policy).
    HashUnsupported { kind: String },

    /// Backend refuses to store an object under this name (e.g. `thumbs.db`
    /// on a case-insensitive store). The upload is skipped, not failed.
    DisallowedName { path: String, reason: String },

    /// Listing observed a reset mid-delta or an entry outside the declared
    /// root. The listing is aborted; this is fatal to the run.
    ListingInconsistency { backend: String, message: String },

    /// Network error during remote operation
    Network { message: String },

    /// Generic backend error with context
    Other { backend: String, message: String },
}

impl BackendError {
    /// Check if this error is retriable (transient)
    pub fn is_retriable(&self) -> bool {
        match self {
            BackendError::Timeout { .. } => true,
            BackendError::ConnectionFailed { .. } => true,
            BackendError::Network { .. } => true,
            BackendError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::TimedOut
                    | io::ErrorKind::Interrupted
                    | io::ErrorKind::WouldBlock
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
            ),
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, BackendError::NotFound { .. })
    }

    pub fn is_auth_error(&self) -> bool {
        matches!(self, BackendError::AuthenticationFailed { .. })
    }

    /// True for the capability-mismatch family the orchestrator should
    /// silently fall back on rather than surface as a run error.
    pub fn is_capability_mismatch(&self) -> bool {
        matches!(
            self,
            BackendError::Unsupported { .. } | BackendError::DirExists { .. }
        )
    }

    pub fn backend_name(&self) -> Option<&str> {
        match self {
            BackendError::NotFound { backend, .. }
            | BackendError::AuthenticationFailed { backend, .. }
            | BackendError::ConnectionFailed { backend, .. }
            | BackendError::InvalidConfig { backend, .. }
            | BackendError::Unsupported { backend, .. }
            | BackendError::ListingInconsistency { backend, .. }
            | BackendError::Other { backend, .. } => Some(backend),
            _ => None,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            BackendError::Io(_) => ErrorCategory::IoError,
            BackendError::NotFound { .. }
            | BackendError::InvalidPath { .. }
            | BackendError::AlreadyExists { .. }
            | BackendError::DirectoryNotEmpty { .. }
            | BackendError::DirExists { .. } => ErrorCategory::Filesystem,
            BackendError::AuthenticationFailed { .. } => ErrorCategory::Security,
            BackendError::ConnectionFailed { .. } | BackendError::Network { .. } => {
                ErrorCategory::Network
            }
            BackendError::Timeout { .. } => ErrorCategory::Network,
            BackendError::InvalidConfig { .. } => ErrorCategory::Configuration,
            BackendError::PermissionDenied { .. } => ErrorCategory::Security,
            BackendError::Unsupported { .. } => ErrorCategory::Validation,
            BackendError::HashUnsupported { .. } => ErrorCategory::Validation,
            BackendError::DisallowedName { .. } => ErrorCategory::Filesystem,
            BackendError::ListingInconsistency { .. } => ErrorCategory::IoError,
            BackendError::Other { .. } => ErrorCategory::Unknown,
        }
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::Io(err) => write!(f, "I/O error: {}", err),
            BackendError::NotFound { path, backend } => {
                write!(f, "path not found on {}: {}", backend, path)
            }
            BackendError::PermissionDenied { path, message } => {
                write!(f, "permission denied for {}: {}", path, message)
            }
            BackendError::AuthenticationFailed { backend, message } => {
                write!(f, "authentication failed for {}: {}", backend, message)
            }
            BackendError::ConnectionFailed { backend, endpoint } => {
                write!(f, "connection to {} ({}) failed", backend, endpoint)
            }
            BackendError::Timeout {
                operation,
                duration_secs,
            } => write!(
                f,
                "operation '{}' timed out after {}s",
                operation, duration_secs
            ),
            BackendError::InvalidConfig { backend, message } => {
                write!(f, "invalid configuration for {}: {}", backend, message)
            }
            BackendError::Unsupported { backend, operation } => {
                write!(f, "operation '{}' not supported by backend {}", operation, backend)
            }
            BackendError::DirExists { path } => write!(f, "directory already exists: {}", path),
            BackendError::InvalidPath { path, reason } => {
                write!(f, "invalid path {}: {}", path, reason)
            }
            BackendError::AlreadyExists { path } => write!(f, "path already exists: {}", path),
            BackendError::DirectoryNotEmpty { path } => {
                write!(f, "directory not empty: {}", path)
            }
            BackendError::HashUnsupported { kind } => {
                write!(f, "hash kind {} not supported", kind)
            }
            BackendError::DisallowedName { path, reason } => {
                write!(f, "disallowed name {}: {}", path, reason)
            }
            BackendError::ListingInconsistency { backend, message } => {
                write!(f, "listing inconsistency on {}: {}", backend, message)
            }
            BackendError::Network { message } => write!(f, "network error: {}", message),
            BackendError::Other { backend, message } => {
                write!(f, "backend error on {}: {}", backend, message)
            }
        }
    }
}

impl std::error::Error for BackendError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BackendError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for BackendError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => BackendError::NotFound {
                path: String::new(),
                backend: "unknown".to_string(),
            },
            io::ErrorKind::PermissionDenied => BackendError::PermissionDenied {
                path: String::new(),
                message: err.to_string(),
            },
            io::ErrorKind::AlreadyExists => BackendError::AlreadyExists { path: String::new() },
            _ => BackendError::Io(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_is_retriable() {
        let err = BackendError::Timeout {
            operation: "read".into(),
            duration_secs: 30,
        };
        assert!(err.is_retriable());
    }

    #[test]
    fn not_found_is_not_retriable() {
        let err = BackendError::NotFound {
            path: "/test".into(),
            backend: "local".into(),
        };
        assert!(!err.is_retriable());
        assert!(err.is_not_found());
    }

    #[test]
    fn display_auth_failure() {
        let err = BackendError::AuthenticationFailed {
            backend: "ssh".into(),
            message: "invalid credentials".into(),
        };
        assert_eq!(
            err.to_string(),
            "authentication failed for ssh: invalid credentials"
        );
    }

    #[test]
    fn io_not_found_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let backend_err: BackendError = io_err.into();
        assert!(backend_err.is_not_found());
    }

    #[test]
    fn capability_mismatch_detection() {
        let err = BackendError::Unsupported {
            backend: "s3".into(),
            operation: "copy".into(),
        };
        assert!(err.is_capability_mismatch());
        assert!(!err.is_retriable());
    }

    #[test]
    fn hash_unsupported_is_validation_category() {
        let err = BackendError::HashUnsupported { kind: "sha1".into() };
        assert_eq!(err.category(), ErrorCategory::Validation);
    }
}
