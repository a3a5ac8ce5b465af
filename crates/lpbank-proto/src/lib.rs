//! LP Bank wire protocol.
//!
//! Every logical message travels as one or more JSON packets of the form
//! `{"type": <origin>, "message": <chunk>}` written back to back on a stream
//! connection. The end of a logical message is marked by a single reserved
//! code point, [`TERMINATOR`] (U+00A0, NO-BREAK SPACE), at the end of a chunk.
//!
//! ```text
//! {"type":"teller","message":"hello "}{"type":"teller","message":"next "}
//! └──────────────── packet ────────────────┘└──────────────── packet ───────────────┘
//! ```
//!
//! There is no length prefix: [`Framer::feed`] relies on a streaming JSON
//! decoder for packet boundaries and on the terminator for message
//! boundaries, so it is indifferent to how the bytes were split across reads.
//!
//! [`screen`] holds the full-screen redraw that the client and the server
//! console share.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod envelope;
mod error;
mod framer;
pub mod screen;

pub use envelope::{Envelope, Origin};
pub use error::FrameError;
pub use framer::{Framer, MAX_MESSAGE_LEN, MAX_PENDING_BYTES, TERMINATOR, encode, sanitize};
