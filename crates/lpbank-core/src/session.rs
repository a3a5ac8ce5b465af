//! Pairing session state machine.
//!
//! A session binds one teller to one customer:
//!
//! ```text
//!   Unassigned ──claim──▶ Paired ──withdraw/deposit──▶ Transacting
//!        ▲                  │  ▲                             │
//!        └──end/next────────┘  └────approve/deny/cancel──────┘
//!
//!   any state ──disconnect/exit──▶ Ended
//! ```
//!
//! Every function returns the actions to execute or a [`SessionError`]. An
//! error means nothing was mutated, except `InvalidAmount`, which leaves an
//! open request waiting for another amount.

use std::time::Instant;

use thiserror::Error;
use tracing::{debug, info};

use crate::{
    amount::{AmountError, parse_amount},
    bank::BankAction,
    participant::{Connection, CustomerId, Member, Role, SessionId, Teller, Transaction, TransactionKind},
    registry::{ConnectionRegistry, RegistryError},
};

/// Sent to a customer whose session a teller ended.
pub const SESSION_ENDED: &str = "[ YOUR SESSION HAS ENDED. PLEASE WAIT FOR THE NEXT AVAILABLE TELLER ]";

/// Where a customer stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingState {
    /// Waiting for a teller.
    Unassigned,
    /// Paired with a teller, nothing outstanding.
    Paired,
    /// Paired with a transaction outstanding.
    Transacting,
    /// Gone from the registry.
    Ended,
}

/// Errors from session operations. All are reported to the initiator as a
/// notice; none is fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The sender has no active pairing.
    #[error("no active pairing")]
    NotPaired,

    /// A customer tried a teller-only command.
    #[error("only tellers may do that")]
    TellerOnly,

    /// Claim of a customer someone else is serving.
    #[error("customer {0} is already being served")]
    AlreadyPaired(CustomerId),

    /// Claim while still serving someone.
    #[error("already serving customer {0}")]
    Busy(CustomerId),

    /// Claim of a customer that is not connected.
    #[error("customer {0} is not waiting")]
    NoSuchCustomer(CustomerId),

    /// Nobody is waiting.
    #[error("no customers are waiting")]
    NoCustomersWaiting,

    /// The amount did not parse.
    #[error("invalid amount: {0}")]
    InvalidAmount(#[from] AmountError),

    /// Withdrawal not strictly less than the balance.
    #[error("insufficient balance: requested {requested}, balance {balance}")]
    InsufficientBalance {
        /// Requested withdrawal.
        requested: u64,
        /// Balance at the time.
        balance: u64,
    },

    /// A second transaction while one is open.
    #[error("a transaction is already in progress")]
    TransactionInProgress,

    /// Approve, deny or cancel with nothing open.
    #[error("no transaction is pending")]
    NoPendingTransaction,

    /// Malformed command arguments.
    #[error("usage: {0}")]
    Usage(&'static str),

    /// Registry lookup failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl SessionError {
    /// Chat-style notice describing this error to a participant in `role`.
    pub fn notice(&self, role: Role) -> String {
        match self {
            Self::NotPaired => match role {
                Role::Teller => "[ NO CLIENT SELECTED. TYPE \"next\" TO CHOOSE A CLIENT ]".to_string(),
                Role::Customer => "[ PLEASE WAIT FOR THE NEXT AVAILABLE TELLER ]".to_string(),
            },
            Self::TellerOnly => "[ ONLY A TELLER CAN DO THAT ]".to_string(),
            Self::AlreadyPaired(id) => format!("[ CUSTOMER {id} IS ALREADY BEING SERVED ]"),
            Self::Busy(id) => format!("[ YOU ARE SERVING CUSTOMER {id}. TYPE \"end\" FIRST ]"),
            Self::NoSuchCustomer(id) => format!("[ CUSTOMER {id} IS NOT WAITING ]"),
            Self::NoCustomersWaiting => "[ NO CUSTOMERS ARE WAITING ]".to_string(),
            Self::InvalidAmount(_) => "[ INVALID AMOUNT. PLEASE TRY AGAIN ]".to_string(),
            Self::InsufficientBalance { requested, balance } => {
                format!("[ INSUFFICIENT FUNDS: {requested} REQUESTED, BALANCE IS {balance} ]")
            },
            Self::TransactionInProgress => "[ A TRANSACTION IS ALREADY IN PROGRESS ]".to_string(),
            Self::NoPendingTransaction => "[ NO TRANSACTION IS PENDING ]".to_string(),
            Self::Usage(usage) => format!("[ USAGE: {usage} ]"),
            Self::Registry(e) => format!("[ {} ]", e.to_string().to_uppercase()),
        }
    }
}

/// Current state of a customer's session.
pub fn state<C: Connection>(registry: &ConnectionRegistry<C>, customer: CustomerId) -> PairingState {
    match registry.customer(customer) {
        None => PairingState::Ended,
        Some(c) if !c.is_being_served() => PairingState::Unassigned,
        Some(c) if c.is_transacting() => PairingState::Transacting,
        Some(_) => PairingState::Paired,
    }
}

/// The pairing `member` takes part in, as (teller, customer).
pub fn pair_of<C: Connection>(
    registry: &ConnectionRegistry<C>,
    member: &Member,
) -> Result<(SessionId, CustomerId), SessionError> {
    match member {
        Member::Teller(id) => {
            let customer = registry.teller(id).and_then(Teller::customer).ok_or(SessionError::NotPaired)?;
            Ok((id.clone(), customer))
        },
        Member::Customer(id) => {
            let teller = registry
                .customer(*id)
                .and_then(|c| c.teller().cloned())
                .ok_or(SessionError::NotPaired)?;
            Ok((teller, *id))
        },
    }
}

/// Teller claims a customer.
///
/// With `target` the teller must be idle and the customer waiting. Without
/// it (the `next` command) any current session is ended first and the
/// oldest waiting customer, other than the one just released, is claimed.
pub fn claim<C: Connection>(
    registry: &mut ConnectionRegistry<C>,
    teller: &SessionId,
    target: Option<CustomerId>,
    now: Instant,
) -> Result<Vec<BankAction>, SessionError> {
    let current = registry
        .teller(teller)
        .ok_or_else(|| RegistryError::TellerNotFound(teller.clone()))?
        .customer();

    let mut actions = Vec::new();
    let customer = match target {
        Some(id) => {
            if let Some(current) = current {
                return Err(SessionError::Busy(current));
            }
            if registry.is_serving(id) {
                return Err(SessionError::AlreadyPaired(id));
            }
            if registry.customer(id).is_none() {
                return Err(SessionError::NoSuchCustomer(id));
            }
            id
        },
        None => {
            let candidate = registry.next_unpaired();
            match (current, candidate) {
                (None, None) => return Err(SessionError::NoCustomersWaiting),
                (Some(_), None) => {
                    actions.extend(end(registry, teller)?);
                    actions.extend(teller_notice(
                        registry,
                        teller,
                        SessionError::NoCustomersWaiting.notice(Role::Teller),
                    ));
                    return Ok(actions);
                },
                (Some(_), Some(id)) => {
                    actions.extend(end(registry, teller)?);
                    id
                },
                (None, Some(id)) => id,
            }
        },
    };

    registry.move_to_serving(customer, teller, now).map_err(|e| match e {
        RegistryError::AlreadyServed { customer, .. } => SessionError::AlreadyPaired(customer),
        RegistryError::CustomerNotFound(customer) => SessionError::NoSuchCustomer(customer),
        other => SessionError::Registry(other),
    })?;

    let balance = registry.customer(customer).map_or(0, |c| c.balance());
    info!(customer, teller = teller.short(), "pairing started");

    actions.extend(announce(
        registry,
        teller,
        customer,
        format!("[ NOW SERVING CUSTOMER {customer}. BALANCE: {balance} ]"),
        format!("[ A TELLER IS NOW SERVING YOU. BALANCE: {balance} ]"),
    ));
    Ok(actions)
}

/// Teller concludes its current session; the customer returns to the queue.
pub fn end<C: Connection>(
    registry: &mut ConnectionRegistry<C>,
    teller: &SessionId,
) -> Result<Vec<BankAction>, SessionError> {
    let customer = registry.teller(teller).and_then(Teller::customer).ok_or(SessionError::NotPaired)?;
    let customer_conn = registry.customer(customer).map(|c| c.conn().id());

    let restored = registry.release(customer)?;
    info!(customer, teller = teller.short(), restored, "pairing ended");

    let mut actions =
        teller_notice(registry, teller, format!("[ SESSION WITH CUSTOMER {customer} ENDED ]"));
    if let (true, Some(conn_id)) = (restored, customer_conn) {
        actions.push(BankAction::notice(conn_id, SESSION_ENDED));
    }
    Ok(actions)
}

/// Either party opens a withdrawal or deposit.
///
/// With an inline amount the request goes straight to approval; otherwise
/// the initiator is prompted and its next chat line is taken as the amount.
pub fn begin_transaction<C: Connection>(
    registry: &mut ConnectionRegistry<C>,
    member: &Member,
    kind: TransactionKind,
    amount: Option<&str>,
) -> Result<Vec<BankAction>, SessionError> {
    let (teller, customer_id) = pair_of(registry, member)?;
    let customer = registry.customer_mut(customer_id).ok_or(SessionError::NotPaired)?;
    if customer.is_transacting() {
        return Err(SessionError::TransactionInProgress);
    }

    let initiator = member.role();
    customer.transaction = Transaction::AwaitingAmount { kind, initiator };
    debug!(customer = customer_id, ?kind, ?initiator, "transaction opened");

    if let Some(text) = amount {
        return supply_amount(registry, member, text);
    }

    let prompt = format!("[ ENTER THE AMOUNT TO {} ]", kind.verb());
    let (teller_text, customer_text) = match initiator {
        Role::Customer => {
            (format!("[ CUSTOMER {customer_id} IS PREPARING A {} ]", kind.noun()), prompt)
        },
        Role::Teller => (prompt, format!("[ YOUR TELLER IS PREPARING A {} ]", kind.noun())),
    };
    Ok(announce(registry, &teller, customer_id, teller_text, customer_text))
}

/// Whether the customer in `member`'s pairing is waiting on an amount typed
/// by `member`.
pub fn awaiting_amount_from<C: Connection>(registry: &ConnectionRegistry<C>, member: &Member) -> bool {
    pair_of(registry, member)
        .ok()
        .and_then(|(_, customer)| registry.customer(customer))
        .is_some_and(|c| {
            matches!(c.transaction(), Transaction::AwaitingAmount { initiator, .. } if initiator == member.role())
        })
}

/// Supply the amount for an open request.
pub fn supply_amount<C: Connection>(
    registry: &mut ConnectionRegistry<C>,
    member: &Member,
    text: &str,
) -> Result<Vec<BankAction>, SessionError> {
    let (teller, customer_id) = pair_of(registry, member)?;
    let customer = registry.customer_mut(customer_id).ok_or(SessionError::NotPaired)?;
    let Transaction::AwaitingAmount { kind, .. } = customer.transaction else {
        return Err(SessionError::NoPendingTransaction);
    };

    let amount = parse_amount(text)?;
    customer.transaction = Transaction::Pending { kind, amount };
    debug!(customer = customer_id, amount, "transaction awaiting approval");

    Ok(announce(
        registry,
        &teller,
        customer_id,
        format!(
            "[ CUSTOMER {customer_id} REQUESTS A {} OF {amount}. TYPE \"approve\" OR \"deny\" ]",
            kind.noun()
        ),
        format!("[ {} OF {amount} REQUESTED. WAITING FOR TELLER APPROVAL ]", kind.noun()),
    ))
}

/// Teller approves or denies the pending transaction. Either way the
/// session returns to `Paired`.
pub fn resolve<C: Connection>(
    registry: &mut ConnectionRegistry<C>,
    teller: &SessionId,
    approve: bool,
) -> Result<Vec<BankAction>, SessionError> {
    let customer_id = registry.teller(teller).and_then(Teller::customer).ok_or(SessionError::NotPaired)?;
    let customer = registry.customer_mut(customer_id).ok_or(SessionError::NotPaired)?;
    let Transaction::Pending { kind, amount } = customer.transaction else {
        return Err(SessionError::NoPendingTransaction);
    };
    customer.transaction = Transaction::Idle;

    let noun = kind.noun();
    let (teller_text, customer_text) = if approve {
        let applied = match kind {
            TransactionKind::Withdraw => customer.withdraw(amount),
            TransactionKind::Deposit => {
                customer.deposit(amount);
                true
            },
        };
        let balance = customer.balance();
        if applied {
            info!(customer = customer_id, amount, balance, ?kind, "transaction applied");
            (
                format!("[ {noun} OF {amount} FOR CUSTOMER {customer_id} APPROVED. NEW BALANCE: {balance} ]"),
                format!("[ {noun} OF {amount} APPROVED. NEW BALANCE: {balance} ]"),
            )
        } else {
            info!(customer = customer_id, amount, balance, "withdrawal refused");
            let notice = SessionError::InsufficientBalance { requested: amount, balance }
                .notice(Role::Customer);
            (notice.clone(), notice)
        }
    } else {
        let line = format!("[ {noun} OF {amount} DENIED ]");
        (line.clone(), line)
    };

    Ok(announce(registry, teller, customer_id, teller_text, customer_text))
}

/// Abandon an open request from either side.
pub fn cancel<C: Connection>(
    registry: &mut ConnectionRegistry<C>,
    member: &Member,
) -> Result<Vec<BankAction>, SessionError> {
    let (teller, customer_id) = pair_of(registry, member)?;
    let customer = registry.customer_mut(customer_id).ok_or(SessionError::NotPaired)?;
    let kind = match customer.transaction {
        Transaction::Idle => return Err(SessionError::NoPendingTransaction),
        Transaction::AwaitingAmount { kind, .. } | Transaction::Pending { kind, .. } => kind,
    };
    customer.transaction = Transaction::Idle;

    let line = format!("[ {} CANCELLED ]", kind.noun());
    Ok(announce(registry, &teller, customer_id, line.clone(), line))
}

/// Bank-origin notices to both sides of a pairing. A side that is no longer
/// registered is skipped.
pub(crate) fn announce<C: Connection>(
    registry: &ConnectionRegistry<C>,
    teller: &SessionId,
    customer: CustomerId,
    teller_text: String,
    customer_text: String,
) -> Vec<BankAction> {
    let mut actions = teller_notice(registry, teller, teller_text);
    if let Some(c) = registry.customer(customer) {
        actions.push(BankAction::notice(c.conn().id(), customer_text));
    }
    actions
}

fn teller_notice<C: Connection>(
    registry: &ConnectionRegistry<C>,
    teller: &SessionId,
    text: String,
) -> Vec<BankAction> {
    registry.teller(teller).map(|t| BankAction::notice(t.conn().id(), text)).into_iter().collect()
}
