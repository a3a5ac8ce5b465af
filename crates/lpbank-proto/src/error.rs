//! Framing errors.

use thiserror::Error;

/// Errors produced at the byte/envelope boundary.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The payload contains the reserved terminator and cannot be framed.
    #[error("payload contains the reserved terminator at byte {position}")]
    TerminatorInPayload {
        /// Byte offset of the first terminator in the payload.
        position: usize,
    },

    /// Serializing a packet failed.
    #[error("failed to serialize packet: {0}")]
    Serialize(#[from] serde_json::Error),
}
