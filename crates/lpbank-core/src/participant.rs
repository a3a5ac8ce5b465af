//! Participants: customers and tellers, and the connection handle they own.

use std::{fmt, fmt::Write as _, time::Instant};

use lpbank_proto::Origin;

/// Opaque identifier the transport assigns to a connection.
pub type ConnectionId = u64;

/// Sequence-assigned customer number, starting at 1.
pub type CustomerId = u64;

/// A bidirectional byte-stream endpoint as seen by the bank.
///
/// The bank never reads or writes through this trait; it only needs to name
/// the connection in its actions and to observe whether it has closed.
pub trait Connection {
    /// Transport-assigned id, used to address [`crate::BankAction`]s.
    fn id(&self) -> ConnectionId;

    /// Whether the underlying transport has closed.
    fn is_closed(&self) -> bool;
}

/// Teller session identifier (`xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(String);

impl SessionId {
    /// Format 16 random bytes as hyphenated hex groups.
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        let mut id = String::with_capacity(36);
        for (i, byte) in bytes.iter().enumerate() {
            if matches!(i, 4 | 6 | 8 | 10) {
                id.push('-');
            }
            // Writing to a String cannot fail.
            let _ = write!(id, "{byte:02x}");
        }
        Self(id)
    }

    /// The full id.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First hex group, for log lines and the server summary.
    pub fn short(&self) -> &str {
        self.0.split('-').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Participant role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// A bank customer.
    Customer,
    /// A bank teller.
    Teller,
}

impl From<Role> for Origin {
    fn from(role: Role) -> Self {
        match role {
            Role::Customer => Self::Customer,
            Role::Teller => Self::Teller,
        }
    }
}

/// Handle naming a registered participant without borrowing it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Member {
    /// Customer by number.
    Customer(CustomerId),
    /// Teller by session id.
    Teller(SessionId),
}

impl Member {
    /// Role of the named participant.
    pub fn role(&self) -> Role {
        match self {
            Self::Customer(_) => Role::Customer,
            Self::Teller(_) => Role::Teller,
        }
    }
}

/// Balance-changing request kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionKind {
    /// Take money out; subject to the balance check.
    Withdraw,
    /// Put money in.
    Deposit,
}

impl TransactionKind {
    /// Verb used in prompts ("WITHDRAW", "DEPOSIT").
    pub fn verb(self) -> &'static str {
        match self {
            Self::Withdraw => "WITHDRAW",
            Self::Deposit => "DEPOSIT",
        }
    }

    /// Noun used in notices ("WITHDRAWAL", "DEPOSIT").
    pub fn noun(self) -> &'static str {
        match self {
            Self::Withdraw => "WITHDRAWAL",
            Self::Deposit => "DEPOSIT",
        }
    }
}

/// A customer's outstanding transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Transaction {
    /// Nothing outstanding.
    #[default]
    Idle,
    /// Request started; waiting for the initiator to type an amount.
    AwaitingAmount {
        /// What is being requested.
        kind: TransactionKind,
        /// Who started it and therefore supplies the amount.
        initiator: Role,
    },
    /// Amount known; waiting for the teller to approve or deny.
    Pending {
        /// What is being requested.
        kind: TransactionKind,
        /// Requested amount.
        amount: u64,
    },
}

/// A connected customer.
#[derive(Debug)]
pub struct Customer<C> {
    pub(crate) id: CustomerId,
    pub(crate) conn: C,
    pub(crate) balance: u64,
    pub(crate) teller: Option<SessionId>,
    pub(crate) transaction: Transaction,
}

impl<C> Customer<C> {
    pub(crate) fn new(id: CustomerId, conn: C, balance: u64) -> Self {
        Self { id, conn, balance, teller: None, transaction: Transaction::Idle }
    }

    /// Customer number.
    pub fn id(&self) -> CustomerId {
        self.id
    }

    /// Owning connection.
    pub fn conn(&self) -> &C {
        &self.conn
    }

    /// Current balance.
    pub fn balance(&self) -> u64 {
        self.balance
    }

    /// Teller currently serving this customer.
    pub fn teller(&self) -> Option<&SessionId> {
        self.teller.as_ref()
    }

    /// Whether a teller is serving this customer.
    pub fn is_being_served(&self) -> bool {
        self.teller.is_some()
    }

    /// Whether a transaction is outstanding.
    pub fn is_transacting(&self) -> bool {
        self.transaction != Transaction::Idle
    }

    /// Outstanding transaction.
    pub fn transaction(&self) -> Transaction {
        self.transaction
    }

    /// Withdraw `amount` if it is strictly less than the balance.
    ///
    /// Returns whether the withdrawal was applied. A withdrawal that would
    /// empty the account exactly is refused.
    pub fn withdraw(&mut self, amount: u64) -> bool {
        if amount < self.balance {
            self.balance -= amount;
            true
        } else {
            false
        }
    }

    /// Deposit `amount`, saturating at `u64::MAX`.
    pub fn deposit(&mut self, amount: u64) {
        self.balance = self.balance.saturating_add(amount);
    }
}

/// A connected teller.
#[derive(Debug)]
pub struct Teller<C> {
    pub(crate) id: SessionId,
    pub(crate) conn: C,
    pub(crate) customer: Option<CustomerId>,
    pub(crate) paired_at: Option<Instant>,
}

impl<C> Teller<C> {
    pub(crate) fn new(id: SessionId, conn: C) -> Self {
        Self { id, conn, customer: None, paired_at: None }
    }

    /// Session id.
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Owning connection.
    pub fn conn(&self) -> &C {
        &self.conn
    }

    /// Customer currently assigned.
    pub fn customer(&self) -> Option<CustomerId> {
        self.customer
    }

    /// When the current pairing started.
    pub fn paired_at(&self) -> Option<Instant> {
        self.paired_at
    }
}

/// A participant evicted from or removed by the registry.
#[derive(Debug)]
pub enum Participant<C> {
    /// A customer.
    Customer(Customer<C>),
    /// A teller.
    Teller(Teller<C>),
}

impl<C> Participant<C> {
    /// Role of this participant.
    pub fn role(&self) -> Role {
        match self {
            Self::Customer(_) => Role::Customer,
            Self::Teller(_) => Role::Teller,
        }
    }

    /// Owning connection.
    pub fn conn(&self) -> &C {
        match self {
            Self::Customer(c) => &c.conn,
            Self::Teller(t) => &t.conn,
        }
    }
}
