//! Decoded message envelopes.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Who an envelope claims to come from.
///
/// Serialized lowercase in the `type` field of every packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    /// The server itself (system notices and relayed chat).
    Bank,
    /// A customer client.
    Customer,
    /// A teller client.
    Teller,
}

impl Origin {
    /// Wire name of this origin.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bank => "bank",
            Self::Customer => "customer",
            Self::Teller => "teller",
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One logical message: the origin tag and the text payload without its
/// terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Sender role context.
    pub origin: Origin,
    /// Payload text.
    pub message: String,
}

impl Envelope {
    /// Create an envelope.
    pub fn new(origin: Origin, message: impl Into<String>) -> Self {
        Self { origin, message: message.into() }
    }

    /// Envelope originating from the bank.
    pub fn bank(message: impl Into<String>) -> Self {
        Self::new(Origin::Bank, message)
    }
}

/// On-the-wire packet. `message` is a chunk of a logical message and may or
/// may not end with the terminator.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct Packet {
    #[serde(rename = "type")]
    pub(crate) origin: Origin,
    pub(crate) message: String,
}
