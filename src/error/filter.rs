//! Centralized error-to-wire translation.

use serde_json::json;

use crate::error::{ErrorKind, SessionError};
use crate::net::connection::Socket;
use crate::observability::metrics;

/// Translates a [`SessionError`] into a connection outcome.
///
/// The router and every controller accept an override, so applications can
/// customize formatting and logging without touching dispatch code.
pub trait ErrorFilter: Send + Sync {
    /// Handle an error raised on `socket`'s connection, if one is available.
    ///
    /// Must never panic and must never close any other connection.
    fn handle(&self, err: &SessionError, socket: Option<&dyn Socket>);
}

/// Default filter: closing errors close the connection with their status
/// code, non-closing ones get a best-effort in-band error frame.
/// Unrecognized errors are logged and swallowed.
#[derive(Debug, Default)]
pub struct LogErrorFilter;

impl ErrorFilter for LogErrorFilter {
    fn handle(&self, err: &SessionError, socket: Option<&dyn Socket>) {
        metrics::record_error(err.code());

        if err.kind() == ErrorKind::Other {
            tracing::error!(error = %err, "unhandled session error");
            return;
        }

        match socket {
            Some(ws) if ws.is_open() => {
                if err.is_closing() {
                    ws.close(err.code(), err.message());
                } else {
                    let frame = json!({
                        "event": "error",
                        "data": {
                            "message": err.message(),
                            "code": err.code(),
                        }
                    });
                    ws.send_text(frame.to_string());
                }
            }
            _ => {}
        }

        tracing::debug!(code = err.code(), error = %err, "session error handled");
    }
}
