//! Error types for upload sessions and store calls.

use std::error::Error as StdError;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::session::SessionState;

/// Result type alias for uploader operations.
pub type Result<T, E = UploadError> = std::result::Result<T, E>;

/// Result type alias for a single object store call.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Shared, cloneable error source.
pub type BoxError = Arc<dyn StdError + Send + Sync>;

/// Primary error type for all uploader operations.
#[derive(Debug, Clone, Error)]
pub enum UploadError {
    /// A caller-supplied argument is missing or out of range.
    #[error("invalid argument `{name}`: {reason}")]
    InvalidArgument { name: &'static str, reason: String },

    /// Credentials were used after being disposed.
    #[error("credentials have been disposed")]
    CredentialsDisposed,

    /// Reading the source file failed.
    #[error("unable to read `{}`: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: Arc<std::io::Error>,
    },

    /// A store call that is not retried failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Every attempt for a part failed.
    #[error("unable to upload part {part_number} after {attempts} attempt(s)")]
    PartExhausted {
        part_number: u32,
        attempts: u32,
        #[source]
        source: StoreError,
    },

    /// Completion was requested with gaps in the recorded parts.
    #[error("parts missing before completion: {missing:?}")]
    IncompleteParts { missing: Vec<u32> },

    /// The session state machine refused a transition.
    #[error("invalid session transition from {from} to {to}")]
    InvalidTransition { from: SessionState, to: SessionState },
}

impl UploadError {
    /// Creates an invalid argument error.
    pub fn invalid_argument(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            name,
            reason: reason.into(),
        }
    }

    /// Creates an I/O error for the given path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source: Arc::new(source),
        }
    }

    /// Returns true if retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Store(_))
    }
}

/// Store call that produced a [`StoreError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    Connect,
    Initiate,
    UploadPart,
    Complete,
    Abort,
    List,
}

impl StoreOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Initiate => "initiate multipart upload",
            Self::UploadPart => "upload part",
            Self::Complete => "complete multipart upload",
            Self::Abort => "abort multipart upload",
            Self::List => "list multipart uploads",
        }
    }
}

impl fmt::Display for StoreOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of a single store call.
#[derive(Debug, Clone, Error)]
#[error("{operation} failed: {source}")]
pub struct StoreError {
    operation: StoreOperation,
    #[source]
    source: BoxError,
}

impl StoreError {
    /// Wraps an underlying client error.
    pub fn new(
        operation: StoreOperation,
        source: impl Into<Box<dyn StdError + Send + Sync>>,
    ) -> Self {
        Self {
            operation,
            source: Arc::from(source.into()),
        }
    }

    /// Creates an error from a plain message.
    pub fn message(operation: StoreOperation, message: impl Into<String>) -> Self {
        Self::new(operation, message.into())
    }

    /// Returns the operation that failed.
    pub fn operation(&self) -> StoreOperation {
        self.operation
    }
}
