//! Server error taxonomy.
//!
//! Errors discovered while processing a request are surfaced as a
//! protocol-shaped error reply correlated to the request; the session never
//! aborts on per-request errors. Only [`Error::Fatal`] terminates the
//! process.

use crate::debugger;
use crate::transport::TransportError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed transport frame.
    #[error("framing: {0}")]
    Framing(#[from] TransportError),
    /// Missing or ill-typed required field.
    #[error("{0}")]
    Schema(String),
    /// Command not present in the adapter's table.
    #[error("Unknown request: \"{0}\"")]
    UnknownCommand(String),
    /// Operation not allowed in the current lifecycle state.
    #[error("{0}")]
    StateViolation(String),
    /// Debugger backend rejected the operation.
    #[error(transparent)]
    Debugger(#[from] debugger::Error),
    /// Unrecoverable internal fault.
    #[error("fatal: {0}")]
    Fatal(String),
}

impl Error {
    /// True when the session loop must stop instead of replying and
    /// continuing.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Fatal(_))
    }
}

/// Transforms `Result` into `Option` and logs the error if it occurs.
#[macro_export]
macro_rules! weak_error {
    ($res: expr) => {
        match $res {
            Ok(value) => Some(value),
            Err(e) => {
                log::warn!(target: "session", "{:#}", e);
                None
            }
        }
    };
    ($res: expr, $msg: tt) => {
        match $res {
            Ok(value) => Some(value),
            Err(e) => {
                log::warn!(target: "session", concat!($msg, ": {:#}"), e);
                None
            }
        }
    };
}
