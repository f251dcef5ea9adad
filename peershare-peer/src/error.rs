use std::path::PathBuf;

use peershare_core::protocol::FieldError;
use peershare_core::{Name, NameError, PduError};
use thiserror::Error;

/// Errors surfaced by peer operations. Each aborts only the operation that hit it.
#[derive(Debug, Error)]
pub enum PeerError {
    /// Network or file I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid content name: {0}")]
    InvalidName(#[from] NameError),

    #[error("content '{0}' already registered")]
    AlreadyPublished(Name),

    #[error("content '{0}' not registered")]
    NotPublished(Name),

    #[error("cannot open file '{}': {source}", .path.display())]
    FileOpen {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to create transfer listener: {0}")]
    Listener(std::io::Error),

    /// The index socket has no usable (non-wildcard IPv4) local address.
    #[error("could not determine local IP address")]
    NoLocalAddress,

    /// The index answered with an `E` PDU; the message is kept verbatim.
    #[error("{0}")]
    Rejected(String),

    #[error("invalid reply: {0}")]
    InvalidReply(String),

    #[error("timed out waiting for index reply")]
    Timeout,

    /// The serving peer sent `E` mid-transfer.
    #[error("{0}")]
    TransferAborted(String),

    #[error("transfer ended before final chunk")]
    Incomplete,

    #[error("pdu error: {0}")]
    Pdu(#[from] PduError),
}

impl From<FieldError> for PeerError {
    fn from(e: FieldError) -> Self {
        PeerError::InvalidReply(e.to_string())
    }
}
