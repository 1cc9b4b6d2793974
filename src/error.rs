use std::fmt;

use serde_json::Error as JSONError;

/// Error kinds a caller can see, one per row of the taxonomy table.
///
/// Most of these never reach a caller directly — the directory and the
/// protocol dispatcher recover locally and report failure as a return value
/// or as an `Outcome` error (see `directory::handler`) instead of raising.
/// Only the handful of variants that represent a programmer error
/// (`NotReady`) are meant to be propagated as an `Err`.
#[derive(Debug)]
pub enum ErrorKind {
    /// Frame could not be decoded, or was missing required fields.
    MalformedFrame(String),
    /// A call targeted a path with no registered handler.
    UnknownMethod,
    /// A handler populated `Outcome::errors`.
    RpcLogicError(String),
    /// A URI could not be parsed, after CURIE expansion.
    InvalidUri(String),
    /// `MethodHandler` could not bind the request's arguments.
    ArgumentMismatch(String),
    /// `addHandler`/`mount` was given a name already present at that node.
    DuplicateName(String),
    /// A `mount` would have introduced a cycle in the directory graph.
    Cyclic,
    /// An RPC caller's deadline elapsed before a response arrived.
    Timeout,
    /// An operation was attempted against a connection that isn't ready.
    NotReady,
    JSONError(JSONError),
}

#[derive(Debug)]
pub struct Error {
    pub kind: ErrorKind,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Error {
        Error { kind }
    }

    fn get_description(&self) -> String {
        format!("intercom error: {}", self.kind.description())
    }

    #[inline]
    pub fn get_kind(self) -> ErrorKind {
        self.kind
    }
}

impl ErrorKind {
    pub fn description(&self) -> String {
        match *self {
            ErrorKind::MalformedFrame(ref s) => format!("malformed frame: {}", s),
            ErrorKind::UnknownMethod => "undefined method".to_string(),
            ErrorKind::RpcLogicError(ref s) => s.clone(),
            ErrorKind::InvalidUri(ref s) => format!("invalid uri: {}", s),
            ErrorKind::ArgumentMismatch(ref s) => s.clone(),
            ErrorKind::DuplicateName(ref s) => format!("duplicate name: {}", s),
            ErrorKind::Cyclic => "mount would introduce a cycle".to_string(),
            ErrorKind::Timeout => "operation timed out".to_string(),
            ErrorKind::NotReady => "connection is not ready".to_string(),
            ErrorKind::JSONError(ref e) => e.to_string(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.get_description())
    }
}

impl std::error::Error for Error {}

impl From<JSONError> for Error {
    fn from(e: JSONError) -> Error {
        Error::new(ErrorKind::JSONError(e))
    }
}

pub type IntercomResult<T> = std::result::Result<T, Error>;
