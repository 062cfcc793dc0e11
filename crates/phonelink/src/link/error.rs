//! Remote link error types.

use super::state::LinkState;

/// Errors that can occur on the remote link.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LinkError {
    #[error("not connected")]
    NotConnected,

    #[error("invalid link transition: {from} -> {to}")]
    InvalidTransition { from: LinkState, to: LinkState },

    #[error("connection error: {0}")]
    Connection(String),

    #[error("connect timed out after {0}s")]
    Timeout(u64),

    #[error("peer is not keeping up, message dropped")]
    Backpressure,
}
