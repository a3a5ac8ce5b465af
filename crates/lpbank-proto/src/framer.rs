//! Terminator-delimited framing over a raw byte stream.
//!
//! ## Decoding
//!
//! [`Framer::feed`] appends each read to an accumulation buffer and pulls as
//! many complete JSON packets out of it as are available. Incomplete trailing
//! bytes stay buffered until the next read. Each packet's chunk is appended to
//! the message being assembled; every terminator inside a chunk completes one
//! envelope and whatever follows the last terminator starts the next one.
//!
//! A malformed packet is dropped and the decoder resynchronizes at the next
//! `{`. One corrupt read never tears down the connection.

use bytes::{Buf, Bytes, BytesMut};
use tracing::warn;

use crate::{
    envelope::{Envelope, Packet},
    error::FrameError,
};

/// End-of-message marker (U+00A0, NO-BREAK SPACE).
pub const TERMINATOR: char = '\u{a0}';

/// Maximum undecoded bytes buffered while waiting for a packet to complete.
pub const MAX_PENDING_BYTES: usize = 64 * 1024;

/// Maximum length of a logical message assembled from chunks.
pub const MAX_MESSAGE_LEN: usize = 16 * 1024;

/// Serialize an envelope into one transport-ready packet.
///
/// The terminator is appended to the payload, so the payload itself must not
/// contain it. Pass user-entered text through [`sanitize`] first.
///
/// # Errors
///
/// Returns `FrameError::TerminatorInPayload` if the payload contains
/// [`TERMINATOR`].
pub fn encode(envelope: &Envelope) -> Result<Bytes, FrameError> {
    if let Some(position) = envelope.message.find(TERMINATOR) {
        return Err(FrameError::TerminatorInPayload { position });
    }

    let mut message = String::with_capacity(envelope.message.len() + TERMINATOR.len_utf8());
    message.push_str(&envelope.message);
    message.push(TERMINATOR);

    let packet = Packet { origin: envelope.origin, message };
    Ok(Bytes::from(serde_json::to_vec(&packet)?))
}

/// Replace every terminator in user text with a plain space.
pub fn sanitize(text: &str) -> String {
    text.replace(TERMINATOR, " ")
}

/// Stateful per-connection decoder.
#[derive(Debug, Default)]
pub struct Framer {
    /// Raw bytes not yet parsed into a packet.
    pending: BytesMut,
    /// Text of the logical message being assembled.
    partial: String,
    /// Packets or buffers discarded as malformed or oversized.
    dropped: u64,
}

impl Framer {
    /// Create an empty framer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one physical read and return every envelope it completes, in
    /// terminator order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Envelope> {
        self.pending.extend_from_slice(chunk);
        let mut envelopes = Vec::new();

        loop {
            let (next, consumed) = {
                let mut packets =
                    serde_json::Deserializer::from_slice(&self.pending).into_iter::<Packet>();
                let next = packets.next();
                (next, packets.byte_offset())
            };

            match next {
                // Only whitespace left.
                None => {
                    self.pending.clear();
                    break;
                },
                Some(Ok(packet)) => {
                    self.pending.advance(consumed);
                    self.absorb(packet, &mut envelopes);
                },
                Some(Err(e)) if e.is_eof() => {
                    if self.pending.len() > MAX_PENDING_BYTES {
                        warn!(buffered = self.pending.len(), "discarding oversized packet");
                        self.pending.clear();
                        self.dropped += 1;
                    }
                    break;
                },
                Some(Err(e)) => {
                    warn!(error = %e, "dropping malformed packet");
                    self.dropped += 1;
                    self.resync();
                },
            }
        }

        envelopes
    }

    /// Number of packets or buffers dropped so far.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Whether bytes or text are buffered awaiting completion.
    pub fn has_partial(&self) -> bool {
        !self.pending.is_empty() || !self.partial.is_empty()
    }

    fn absorb(&mut self, packet: Packet, out: &mut Vec<Envelope>) {
        let mut rest = packet.message.as_str();

        while let Some(idx) = rest.find(TERMINATOR) {
            self.partial.push_str(&rest[..idx]);
            out.push(Envelope::new(packet.origin, std::mem::take(&mut self.partial)));
            rest = &rest[idx + TERMINATOR.len_utf8()..];
        }

        self.partial.push_str(rest);

        if self.partial.len() > MAX_MESSAGE_LEN {
            warn!(len = self.partial.len(), "discarding oversized message");
            self.partial.clear();
            self.dropped += 1;
        }
    }

    /// Skip past the current packet start to the next candidate `{`.
    fn resync(&mut self) {
        match self.pending.iter().skip(1).position(|&b| b == b'{') {
            Some(offset) => self.pending.advance(offset + 1),
            None => self.pending.clear(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Origin;

    fn wire(origin: Origin, message: &str) -> Vec<u8> {
        encode(&Envelope::new(origin, message)).unwrap().to_vec()
    }

    #[test]
    fn encode_appends_terminator() {
        let bytes = encode(&Envelope::bank("hi")).unwrap();
        assert_eq!(&bytes[..], "{\"type\":\"bank\",\"message\":\"hi\u{a0}\"}".as_bytes());
    }

    #[test]
    fn encode_rejects_terminator_in_payload() {
        let result = encode(&Envelope::bank("a\u{a0}b"));
        assert!(matches!(result, Err(FrameError::TerminatorInPayload { position: 1 })));
    }

    #[test]
    fn sanitize_replaces_terminator() {
        assert_eq!(sanitize("a\u{a0}b"), "a b");
        assert!(encode(&Envelope::bank(sanitize("x\u{a0}"))).is_ok());
    }

    #[test]
    fn single_packet_decodes() {
        let mut framer = Framer::new();
        let out = framer.feed(&wire(Origin::Customer, "hello"));
        assert_eq!(out, vec![Envelope::new(Origin::Customer, "hello")]);
        assert!(!framer.has_partial());
    }

    #[test]
    fn two_packets_in_one_read() {
        let mut bytes = wire(Origin::Teller, "one");
        bytes.extend(wire(Origin::Teller, "two"));

        let mut framer = Framer::new();
        let out = framer.feed(&bytes);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].message, "one");
        assert_eq!(out[1].message, "two");
    }

    #[test]
    fn partial_packet_waits_for_rest() {
        let bytes = wire(Origin::Bank, "split me");
        let (head, tail) = bytes.split_at(10);

        let mut framer = Framer::new();
        assert!(framer.feed(head).is_empty());
        assert!(framer.has_partial());
        assert_eq!(framer.feed(tail), vec![Envelope::bank("split me")]);
    }

    #[test]
    fn chunks_without_terminator_accumulate() {
        let first = br#"{"type":"customer","message":"hel"}"#;
        let second = "{\"type\":\"customer\",\"message\":\"lo\u{a0}\"}".as_bytes();

        let mut framer = Framer::new();
        assert!(framer.feed(first).is_empty());
        assert_eq!(framer.feed(second), vec![Envelope::new(Origin::Customer, "hello")]);
    }

    #[test]
    fn text_after_terminator_is_kept_for_next_message() {
        let packet = "{\"type\":\"teller\",\"message\":\"a\u{a0}b\u{a0}c\"}".as_bytes();
        let closing = "{\"type\":\"teller\",\"message\":\"d\u{a0}\"}".as_bytes();

        let mut framer = Framer::new();
        let out = framer.feed(packet);
        assert_eq!(out.iter().map(|e| e.message.as_str()).collect::<Vec<_>>(), ["a", "b"]);

        let out = framer.feed(closing);
        assert_eq!(out, vec![Envelope::new(Origin::Teller, "cd")]);
    }

    #[test]
    fn malformed_packet_is_dropped_and_stream_continues() {
        let mut bytes = b"{not json}".to_vec();
        bytes.extend(wire(Origin::Customer, "still here"));

        let mut framer = Framer::new();
        let out = framer.feed(&bytes);
        assert_eq!(out, vec![Envelope::new(Origin::Customer, "still here")]);
        assert_eq!(framer.dropped(), 1);
    }

    #[test]
    fn wrong_shape_is_dropped() {
        let mut framer = Framer::new();
        assert!(framer.feed(br#"{"type":"vault","message":"x"}"#).is_empty());
        assert!(framer.dropped() >= 1);
        assert_eq!(framer.feed(&wire(Origin::Bank, "ok")), vec![Envelope::bank("ok")]);
    }

    #[test]
    fn oversized_pending_buffer_is_discarded() {
        let mut framer = Framer::new();
        let mut bytes = br#"{"type":"bank","message":""#.to_vec();
        bytes.extend(std::iter::repeat_n(b'x', MAX_PENDING_BYTES + 1));

        assert!(framer.feed(&bytes).is_empty());
        assert_eq!(framer.dropped(), 1);
        assert!(!framer.has_partial());
    }

    #[test]
    fn whitespace_between_packets_is_ignored() {
        let mut bytes = wire(Origin::Bank, "a");
        bytes.extend(b" \n");
        bytes.extend(wire(Origin::Bank, "b"));

        let mut framer = Framer::new();
        assert_eq!(framer.feed(&bytes).len(), 2);
        assert_eq!(framer.dropped(), 0);
    }
}
