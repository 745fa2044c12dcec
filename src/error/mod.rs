//! Error subsystem.
//!
//! # Data Flow
//! ```text
//! Guard / pipe / hook failure
//!     → SessionError (domain taxonomy, status code + closing flag)
//!     → ErrorFilter (nearest boundary, per connection)
//!     → close(code, reason)  OR  in-band {"event":"error"} frame
//! ```
//!
//! # Design Decisions
//! - Errors are caught at the nearest connection boundary, never propagated
//!   across connections and never out of the router
//! - A closing error terminates the connection; a non-closing one keeps it
//!   open and sends a best-effort error frame
//! - Unrecognized errors are logged and swallowed

pub mod filter;
pub mod status;

pub use filter::{ErrorFilter, LogErrorFilter};
pub use status::Status;

use thiserror::Error;

/// Classification of a [`SessionError`].
///
/// `Other` marks failures that did not originate from the session layer;
/// the filter logs those without touching the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    AccessDenied,
    BadRequest,
    NotFound,
    InternalServerError,
    ServiceUnavailable,
    RateLimitExceeded,
    Other,
}

impl ErrorKind {
    fn status(self) -> Status {
        match self {
            ErrorKind::AccessDenied => Status::AccessDenied,
            ErrorKind::BadRequest => Status::BadRequest,
            ErrorKind::NotFound => Status::NotFound,
            ErrorKind::InternalServerError | ErrorKind::Other => Status::InternalServerError,
            ErrorKind::ServiceUnavailable => Status::ServiceUnavailable,
            ErrorKind::RateLimitExceeded => Status::TooManyRequests,
        }
    }
}

/// Domain error carrying a close code, a message and a closing flag.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct SessionError {
    kind: ErrorKind,
    message: String,
    closing: bool,
}

impl SessionError {
    fn from_kind(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: kind.status().reason().to_string(),
            closing: false,
        }
    }

    pub fn access_denied() -> Self {
        Self::from_kind(ErrorKind::AccessDenied)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::BadRequest,
            message: message.into(),
            closing: false,
        }
    }

    pub fn not_found() -> Self {
        Self::from_kind(ErrorKind::NotFound)
    }

    pub fn internal() -> Self {
        Self::from_kind(ErrorKind::InternalServerError)
    }

    pub fn service_unavailable() -> Self {
        Self::from_kind(ErrorKind::ServiceUnavailable)
    }

    /// Rate-limit violations always terminate the connection.
    pub fn rate_limited() -> Self {
        Self {
            kind: ErrorKind::RateLimitExceeded,
            message: Status::TooManyRequests.reason().to_string(),
            closing: true,
        }
    }

    /// Replace the default status message.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Flag this error as connection-closing.
    pub fn closing(mut self) -> Self {
        self.closing = true;
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn code(&self) -> u16 {
        self.kind.status().code()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_closing(&self) -> bool {
        self.closing
    }

    /// True for errors from the session taxonomy, false for wrapped
    /// application failures.
    pub fn is_domain(&self) -> bool {
        self.kind != ErrorKind::Other
    }
}

impl From<anyhow::Error> for SessionError {
    fn from(err: anyhow::Error) -> Self {
        Self {
            kind: ErrorKind::Other,
            message: format!("{err:#}"),
            closing: false,
        }
    }
}
