//! Wire-level error taxonomy

use std::time::Duration;
use thiserror::Error;

/// Errors produced by the transport and protocol layers.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WireError {
    #[error("unexpected status code: {0}")]
    HttpStatus(u16),

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unsupported protocol in repository URL: {0}")]
    UnsupportedProtocol(String),

    #[error("git subprocess failed: {0}")]
    Subprocess(String),

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("malformed pkt-line: {0}")]
    PktLine(String),

    #[error("unexpected non-sideband packet in packfile section")]
    Sideband,

    #[error("remote error: {0}")]
    Remote(String),

    #[error("invalid ref line: {0}")]
    RefLine(String),

    #[error("unexpected response section: {0}")]
    Section(String),

    #[error("all {attempts} fetch attempts failed: {detail}")]
    RetriesExhausted { attempts: u32, detail: String },

    #[error("push rejected: {0}")]
    PushRejected(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
