//! Close-status table.
//!
//! WebSocket close codes 4000-4999 are reserved for application use, so
//! every outcome gets a code in that range mirroring its HTTP cousin
//! (4403 = access denied, 4429 = too many requests, ...). The code is sent
//! either as the close code or inside an in-band error frame.

/// Session outcome statuses, each pairing a close code with a reason string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Created,
    BadRequest,
    Unauthorized,
    AccessDenied,
    NotFound,
    TooManyRequests,
    InternalServerError,
    ServiceUnavailable,
}

impl Status {
    /// Numeric close code in the application-reserved range.
    pub fn code(self) -> u16 {
        match self {
            Status::Ok => 4200,
            Status::Created => 4201,
            Status::BadRequest => 4400,
            Status::Unauthorized => 4401,
            Status::AccessDenied => 4403,
            Status::NotFound => 4404,
            Status::TooManyRequests => 4429,
            Status::InternalServerError => 4500,
            Status::ServiceUnavailable => 4503,
        }
    }

    /// Human-readable status string.
    pub fn reason(self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::Created => "Created",
            Status::BadRequest => "Bad Request",
            Status::Unauthorized => "Unauthorized",
            Status::AccessDenied => "Access Denied",
            Status::NotFound => "Not Found",
            Status::TooManyRequests => "Too Many Requests",
            Status::InternalServerError => "Internal Server Error",
            Status::ServiceUnavailable => "Service Unavailable",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.code(), self.reason())
    }
}
