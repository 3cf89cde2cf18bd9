//! Error types for the response pipeline.

use std::path::PathBuf;

use thiserror::Error;

/// Stable code carried by [`ResponseError::Aborted`].
pub const ABORT_CODE: &str = "ERR_RESPONSE_ABORTED";

/// Failures of the underlying transport primitive.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The peer went away while bytes were still queued.
    #[error("peer disconnected")]
    Disconnected,

    /// The transport was already closed locally.
    #[error("transport closed")]
    Closed,

    /// The transport acknowledged an offset outside the pending chunk.
    #[error("acknowledged offset {acknowledged} outside pending chunk [{start}, {end}]")]
    OffsetRegression { start: u64, end: u64, acknowledged: u64 },

    /// The body source ran dry before the declared size was reached.
    #[error("body ended after {written} of {expected} bytes")]
    ShortBody { written: u64, expected: u64 },

    /// The body source produced more than the declared size.
    #[error("body of {expected} bytes overrun, source reached {written}")]
    BodyOverrun { written: u64, expected: u64 },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Whether this failure means the peer is gone rather than a local fault.
    pub fn is_disconnect(&self) -> bool {
        match self {
            TransportError::Disconnected => true,
            TransportError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }
}

/// Errors surfaced by response operations.
#[derive(Error, Debug)]
pub enum ResponseError {
    /// Status or headers mutated after they were sent.
    #[error("cannot {0} after headers are sent")]
    State(&'static str),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A path escaped its root directory.
    #[error("forbidden path: {}", .0.display())]
    Forbidden(PathBuf),

    /// The peer disconnected mid-response.
    #[error("response aborted ({code})")]
    Aborted { code: &'static str },

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The off-thread reader (or a stat call) failed.
    #[error("failed to read {}: {message}", path.display())]
    FileRead { path: PathBuf, message: String, not_found: bool },

    /// No handler matched the request's Accept header.
    #[error("not acceptable, supported types: {}", types.join(", "))]
    NotAcceptable { types: Vec<String> },

    #[error("json encoding failed: {0}")]
    Json(#[from] serde_json::Error),
}

impl ResponseError {
    pub fn aborted() -> Self {
        ResponseError::Aborted { code: ABORT_CODE }
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, ResponseError::Aborted { .. })
    }

    pub(crate) fn file_read(path: impl Into<PathBuf>, err: &std::io::Error) -> Self {
        ResponseError::FileRead {
            path: path.into(),
            message: err.to_string(),
            not_found: err.kind() == std::io::ErrorKind::NotFound,
        }
    }

    /// Machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            ResponseError::State(_) => "ERR_HEADERS_SENT",
            ResponseError::InvalidArgument(_) => "ERR_INVALID_ARG",
            ResponseError::Forbidden(_) => "ERR_FORBIDDEN",
            ResponseError::Aborted { code } => code,
            ResponseError::Transport(_) => "ERR_TRANSPORT",
            ResponseError::FileRead { not_found: true, .. } => "ENOENT",
            ResponseError::FileRead { .. } => "ERR_FILE_READ",
            ResponseError::NotAcceptable { .. } => "ERR_NOT_ACCEPTABLE",
            ResponseError::Json(_) => "ERR_JSON",
        }
    }

    /// The HTTP status an application would usually answer this error with.
    pub fn status(&self) -> u16 {
        match self {
            ResponseError::InvalidArgument(_) => 400,
            ResponseError::Forbidden(_) => 403,
            ResponseError::FileRead { not_found: true, .. } => 404,
            ResponseError::NotAcceptable { .. } => 406,
            _ => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, ResponseError>;
