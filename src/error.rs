//! Error taxonomy for request processing.
//!
//! Every error that can reach a client maps onto exactly one [`Status`], which is
//! surfaced verbatim in the response envelope. Startup failures are not part of
//! this taxonomy; they travel as `anyhow::Error` up to `main`.

use crate::protocol::Status;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// A request line (or datagram) that cannot be turned into a [`crate::protocol::Request`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("empty request")]
    Empty,

    #[error("request is not valid UTF-8")]
    NotUtf8,

    #[error("unknown method `{0}`")]
    UnknownMethod(String),

    #[error("argument is {0} bytes long")]
    PathTooLong(usize),

    #[error("request line exceeds {0} bytes")]
    LineTooLong(usize),

    #[error("missing or invalid sequence number")]
    MissingSequence,
}

impl ProtocolError {
    pub fn status(&self) -> Status {
        match self {
            // Over-long input hits a server-side bound rather than the grammar.
            ProtocolError::PathTooLong(_) | ProtocolError::LineTooLong(_) => Status::InternalError,
            _ => Status::BadRequest,
        }
    }
}

/// Authentication failures.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("credentials must look like `login;password`")]
    Malformed,

    #[error("credential store {path} is unreadable")]
    StoreUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("login or password rejected")]
    Rejected,
}

impl AuthError {
    pub fn status(&self) -> Status {
        match self {
            AuthError::Malformed => Status::BadRequest,
            AuthError::StoreUnavailable { .. } => Status::InternalError,
            AuthError::Rejected => Status::Forbidden,
        }
    }
}

/// Filesystem failures while resolving or listing directories.
#[derive(Debug, Error)]
pub enum FsError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("no such directory: {0}")]
    NotFound(String),

    #[error("not a directory: {0}")]
    NotADirectory(String),

    #[error("{0} lies outside the session root")]
    OutsideRoot(String),

    #[error("{path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

impl FsError {
    /// Maps an OS error for `path` onto the matching variant.
    pub fn from_io(path: impl Into<String>, err: io::Error) -> Self {
        let path = path.into();
        match err.kind() {
            io::ErrorKind::PermissionDenied => FsError::PermissionDenied(path),
            io::ErrorKind::NotFound => FsError::NotFound(path),
            io::ErrorKind::NotADirectory => FsError::NotADirectory(path),
            _ => FsError::Io { path, source: err },
        }
    }

    pub fn status(&self) -> Status {
        match self {
            FsError::PermissionDenied(_) | FsError::OutsideRoot(_) => Status::Forbidden,
            FsError::NotFound(_) => Status::NotFound,
            FsError::NotADirectory(_) => Status::NotDir,
            FsError::Io { .. } => Status::InternalError,
        }
    }
}

/// The registry has no free slot and cannot grow any further.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("session registry is full ({capacity} slots)")]
pub struct CapacityError {
    pub capacity: usize,
}
