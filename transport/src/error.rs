use thiserror::Error;

use crate::endpoint::SessionId;

#[derive(Debug, Error)]
pub enum TransportError {
    /// No in-order data is ready; retry after the next readiness event.
    #[error("operation would block")]
    WouldBlock,

    #[error("unknown session {0}")]
    UnknownSession(SessionId),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
