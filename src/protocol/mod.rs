//! Wire protocol for the terminal session service.
//!
//! Requests are single text lines: `[SEQ SP] METHOD SP PATH CRLF`.
//! The connection-oriented transport answers with a status line followed by a
//! `LENGTH` header and the body; the datagram transport prefixes every frame with
//! the request's sequence number and fits the whole response into one datagram.
//!
//! - **Tables (`mod.rs`)**: method and status lookup tables indexed by enum value.
//! - **Codec (`codec.rs`)**: request decoding/encoding and response envelopes.
//! - **Chunked writer (`chunked.rs`)**: streams bodies larger than one buffer.

pub mod chunked;
pub mod codec;

pub use chunked::ChunkedWriter;
pub use codec::{
    decode_datagram, decode_request, encode_datagram_reply, envelope_head, minimal_datagram_reply,
    minimal_reply,
};
#[cfg(test)]
pub use codec::{encode_request, parse_length_header, parse_status_line};

/// Maximum length (bytes) of a request argument.
pub const MAX_PATH_LEN: usize = 255;

/// Default size of a session's I/O buffer.
pub const DEFAULT_BUFFER_SIZE: usize = 1024;

/// Argument used when a request omits one.
pub const DEFAULT_PATH: &str = ".";

const METHOD_NAMES: [&str; 6] = ["AUTH", "LS", "CD", "KILL", "WHO", "LOGOUT"];

const STATUS_TABLE: [(&str, &str); 7] = [
    ("200", "OK"),
    ("400", "Bad Request"),
    ("403", "Forbidden"),
    ("404", "Not Found"),
    ("405", "Not a Directory"),
    ("408", "Request Timeout"),
    ("500", "Internal Server Error"),
];

/// Request methods understood by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Auth = 0,
    Ls = 1,
    Cd = 2,
    Kill = 3,
    Who = 4,
    Logout = 5,
}

impl Method {
    pub const ALL: [Method; 6] = [
        Method::Auth,
        Method::Ls,
        Method::Cd,
        Method::Kill,
        Method::Who,
        Method::Logout,
    ];

    /// Returns the wire name of the method.
    pub fn as_str(&self) -> &'static str {
        METHOD_NAMES[*self as usize]
    }

    /// Looks a method up by its exact wire name.
    pub fn from_name(name: &str) -> Option<Method> {
        METHOD_NAMES
            .iter()
            .position(|candidate| *candidate == name)
            .map(|idx| Method::ALL[idx])
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Response status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Ok = 0,
    BadRequest = 1,
    Forbidden = 2,
    NotFound = 3,
    NotDir = 4,
    RequestTimeout = 5,
    InternalError = 6,
}

impl Status {
    #[cfg(test)]
    pub const ALL: [Status; 7] = [
        Status::Ok,
        Status::BadRequest,
        Status::Forbidden,
        Status::NotFound,
        Status::NotDir,
        Status::RequestTimeout,
        Status::InternalError,
    ];

    /// Three-digit numeric code, e.g. `"403"`.
    pub fn code(&self) -> &'static str {
        STATUS_TABLE[*self as usize].0
    }

    /// Reason phrase, e.g. `"Forbidden"`.
    pub fn text(&self) -> &'static str {
        STATUS_TABLE[*self as usize].1
    }

    #[cfg(test)]
    pub fn from_code(code: &str) -> Option<Status> {
        STATUS_TABLE
            .iter()
            .position(|(candidate, _)| *candidate == code)
            .map(|idx| Status::ALL[idx])
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.code(), self.text())
    }
}

/// A decoded request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Sequence number (datagram transport only).
    pub seq: Option<u32>,
    pub method: Method,
    pub path: String,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            seq: None,
            method,
            path: path.into(),
        }
    }

    pub fn with_seq(mut self, seq: u32) -> Self {
        self.seq = Some(seq);
        self
    }
}

/// Response body, independent of the transport that frames it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Body {
    #[default]
    Empty,
    /// A one-line message (framed with a trailing CRLF on the stream transport).
    Message(String),
    /// Pre-terminated lines, e.g. a directory listing.
    Lines(Vec<String>),
}

impl Body {
    /// Number of body bytes announced in the stream transport's `LENGTH` header.
    pub fn stream_len(&self) -> usize {
        match self {
            Body::Empty => 0,
            Body::Message(msg) if msg.is_empty() => 0,
            Body::Message(msg) => msg.len() + 2,
            Body::Lines(lines) => lines.iter().map(String::len).sum(),
        }
    }
}

/// Status plus body produced by a command handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: Status,
    pub body: Body,
}

impl Response {
    pub fn empty(status: Status) -> Self {
        Self {
            status,
            body: Body::Empty,
        }
    }

    pub fn message(status: Status, msg: impl Into<String>) -> Self {
        Self {
            status,
            body: Body::Message(msg.into()),
        }
    }

    pub fn lines(status: Status, lines: Vec<String>) -> Self {
        Self {
            status,
            body: Body::Lines(lines),
        }
    }
}
