//! Client error types.

use lpbank_proto::FrameError;
use thiserror::Error;

/// Errors from the terminal client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Could not reach the server.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        /// Address we tried.
        addr: String,
        /// Underlying socket error.
        source: std::io::Error,
    },

    /// Reading or writing the socket or terminal failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// An outgoing line could not be framed.
    #[error("framing error: {0}")]
    Frame(#[from] FrameError),
}
