//! SDK error types.

use std::sync::Arc;

use jsdebug_protocol::DecodeError;
use thiserror::Error;

use crate::state::SessionState;

/// Errors surfaced by session operations.
///
/// Cloneable so one failure can be delivered to every caller waiting on a
/// shared fetch.
#[derive(Debug, Clone, Error)]
pub enum SdkError {
    /// Connection-level failure. Fatal to the session.
    #[error("transport error: {0}")]
    Transport(String),

    /// A message did not match the expected shape.
    #[error("protocol decode error: {0}")]
    Decode(Arc<DecodeError>),

    /// A message decoded but is inconsistent (bad cast, dangling ref).
    #[error("protocol logic error: {0}")]
    ProtocolLogic(String),

    /// The VM reported a failure for a command.
    #[error("{command} failed: {message}")]
    Remote {
        /// The command name.
        command: String,
        /// The VM's message, verbatim.
        message: String,
    },

    /// The session was detached before the reply arrived.
    #[error("connection closed")]
    Disconnected,

    /// The caller cancelled the command.
    #[error("command cancelled")]
    Cancelled,

    /// The operation is not valid in the current session state.
    #[error("cannot {operation}: session is in {state:?} state")]
    InvalidState {
        /// The attempted operation.
        operation: &'static str,
        /// The state the session was in.
        state: SessionState,
    },

    /// The suspend context the request belonged to is gone.
    #[error("suspend context dismissed")]
    ContextDismissed,

    /// The breakpoint id is not known to the coordinator.
    #[error("unknown breakpoint {0}")]
    UnknownBreakpoint(String),

    /// A caller-supplied value was rejected before anything was sent.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An internal cache invariant was violated.
    #[error("cache consistency violation: {0}")]
    CacheConsistency(String),
}

impl From<DecodeError> for SdkError {
    fn from(err: DecodeError) -> Self {
        SdkError::Decode(Arc::new(err))
    }
}

impl From<serde_json::Error> for SdkError {
    fn from(err: serde_json::Error) -> Self {
        SdkError::Decode(Arc::new(DecodeError::Json(err)))
    }
}
