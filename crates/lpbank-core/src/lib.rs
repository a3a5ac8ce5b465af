//! LP Bank core logic.
//!
//! Everything here is Sans-IO: the [`Bank`] consumes [`BankEvent`]s and
//! returns [`BankAction`]s for the caller to execute. Connections are only
//! observed through the [`Connection`] trait (an id and a "closed"
//! predicate), so the same code runs under tokio, turmoil or plain unit tests.
//!
//! ## Architecture
//!
//! ```text
//! Bank
//!   ├─ ConnectionRegistry    (tellers, waiting customers, serving pairs)
//!   ├─ router                (command parsing, chat relay)
//!   ├─ session               (pairing / transaction state machine)
//!   └─ DisconnectSupervisor  (evicts closed connections, notifies peers)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod amount;
mod bank;
pub mod env;
mod participant;
mod registry;
pub mod router;
pub mod session;
mod supervisor;

pub use amount::{AmountError, parse_amount};
pub use bank::{Bank, BankAction, BankConfig, BankEvent};
pub use env::Environment;
pub use participant::{
    Connection, ConnectionId, Customer, CustomerId, Member, Participant, Role, SessionId, Teller,
    Transaction, TransactionKind,
};
pub use registry::{ConnectionRegistry, RegistryError};
pub use session::{PairingState, SessionError};
pub use supervisor::DisconnectSupervisor;
