//! Error types for the SMTP client.

use std::io;

use thiserror::Error;

/// Why a command could not be completed.
///
/// Reply codes are not errors at this level: every command returns the
/// server's [`Response`](super::Response) and the caller decides.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The reply did not follow the `code[-| ]text` line format.
    #[error("Failed to parse SMTP response: {0}")]
    ParseError(String),

    #[error("Reply exceeds {limit} bytes")]
    ResponseTooLarge { limit: usize },

    #[error("TLS error: {0}")]
    TlsError(String),

    #[error("Connection closed unexpectedly")]
    ConnectionClosed,

    #[error("Reply is not valid UTF-8: {0}")]
    Utf8Error(#[from] std::str::Utf8Error),
}

pub type Result<T> = std::result::Result<T, ClientError>;
