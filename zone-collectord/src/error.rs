//! Error types for zone-collectord.

use std::path::PathBuf;
use std::time::Duration;
use hickory_proto::op::ResponseCode;
use thiserror::Error;

/// Errors surfaced by a poll cycle or at startup.
///
/// Corrupt or missing state files are not an error: the store recovers
/// them as an empty document.
#[derive(Debug, Error)]
pub enum CollectorError {
    /// Invalid configuration, fatal at startup
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Zone transfer failed, the cycle is aborted
    #[error("Zone transfer for {domain} failed: {source}")]
    Transfer {
        domain: String,
        #[source]
        source: TransferError,
    },

    /// The updated document could not be persisted
    #[error("Failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Ways a zone transfer can fail.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("DNS protocol error: {0}")]
    Proto(#[from] hickory_proto::error::ProtoError),

    #[error("transfer did not complete within {0:?}")]
    Timeout(Duration),

    #[error("server answered {0}")]
    Refused(ResponseCode),

    #[error("malformed transfer: {0}")]
    Malformed(String),
}
