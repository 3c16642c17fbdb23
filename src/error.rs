/*!
 * Top-level error type for Relay
 */

use std::fmt;
use std::io;

use crate::backend::error::BackendError;

pub type Result<T> = std::result::Result<T, RelayError>;

#[derive(Debug)]
pub enum RelayError {
    /// Named remote absent from the config file. Fatal to the current invocation.
    NotFoundInConfig(String),

    /// Configuration file could not be read or parsed.
    Config(String),

    /// Filter rule source (pattern, rules-from file, files-from manifest) is malformed.
    Filter(String),

    /// I/O error outside of any backend (e.g. reading the config file itself).
    Io(io::Error),

    /// Error surfaced by a backend adapter.
    Backend(BackendError),

    /// Whole-run retry budget (`--retries`) was exhausted while errors remained.
    RetriesExhausted { attempts: u32 },

    /// Generic error with message.
    Other(String),
}

impl RelayError {
    /// Errors that should abort the current invocation outright rather than
    /// being folded into the run's error count and retried.
    pub fn is_fatal(&self) -> bool {
        match self {
            RelayError::NotFoundInConfig(_) => true,
            RelayError::Config(_) => true,
            RelayError::Filter(_) => true,
            RelayError::RetriesExhausted { .. } => true,
            RelayError::Io(_) => false,
            RelayError::Backend(e) => !e.is_retriable() && e.is_auth_error(),
            RelayError::Other(_) => false,
        }
    }

    /// Errors worth a whole-run retry (§4.5): transient I/O or backend errors.
    pub fn is_retriable(&self) -> bool {
        match self {
            RelayError::Backend(e) => e.is_retriable(),
            RelayError::Io(e) => Self::is_io_transient(e),
            _ => false,
        }
    }

    fn is_io_transient(io_err: &io::Error) -> bool {
        use io::ErrorKind::*;
        matches!(
            io_err.kind(),
            ConnectionRefused
                | ConnectionReset
                | ConnectionAborted
                | NotConnected
                | BrokenPipe
                | TimedOut
                | Interrupted
                | WouldBlock
                | WriteZero
        )
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            RelayError::NotFoundInConfig(_) => ErrorCategory::Configuration,
            RelayError::Config(_) => ErrorCategory::Configuration,
            RelayError::Filter(_) => ErrorCategory::Validation,
            RelayError::Io(_) => ErrorCategory::IoError,
            RelayError::Backend(e) => e.category(),
            RelayError::RetriesExhausted { .. } => ErrorCategory::Retry,
            RelayError::Other(_) => ErrorCategory::Unknown,
        }
    }
}

/// Error category for classification and reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    IoError,
    Configuration,
    Network,
    Security,
    Filesystem,
    Retry,
    Unknown,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Validation => write!(f, "validation"),
            ErrorCategory::IoError => write!(f, "io"),
            ErrorCategory::Configuration => write!(f, "configuration"),
            ErrorCategory::Network => write!(f, "network"),
            ErrorCategory::Security => write!(f, "security"),
            ErrorCategory::Filesystem => write!(f, "filesystem"),
            ErrorCategory::Retry => write!(f, "retry"),
            ErrorCategory::Unknown => write!(f, "unknown"),
        }
    }
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayError::NotFoundInConfig(name) => {
                write!(f, "remote {:?} not found in config", name)
            }
            RelayError::Config(msg) => write!(f, "configuration error: {}", msg),
            RelayError::Filter(msg) => write!(f, "filter error: {}", msg),
            RelayError::Io(err) => write!(f, "I/O error: {}", err),
            RelayError::Backend(err) => write!(f, "{}", err),
            RelayError::RetriesExhausted { attempts } => {
                write!(f, "all {} retry attempts exhausted with errors remaining", attempts)
            }
            RelayError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for RelayError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RelayError::Io(err) => Some(err),
            RelayError::Backend(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for RelayError {
    fn from(err: io::Error) -> Self {
        RelayError::Io(err)
    }
}

impl From<BackendError> for RelayError {
    fn from(err: BackendError) -> Self {
        RelayError::Backend(err)
    }
}
