//! Message routing.
//!
//! Decides whether an incoming line is a command or chat, drives the
//! [`session`](crate::session) state machine accordingly, and builds the
//! per-recipient envelopes for relayed chat.

use std::time::Instant;

use lpbank_proto::{Envelope, Origin, sanitize};
use tracing::{debug, info};

use crate::{
    amount::parse_amount,
    bank::BankAction,
    participant::{
        Connection, ConnectionId, Customer, CustomerId, Member, Role, SessionId, Teller,
        TransactionKind,
    },
    registry::ConnectionRegistry,
    session::{self, SessionError},
    supervisor,
};

/// Sent to a teller whose customer vanished.
pub const CLIENT_DISCONNECTED: &str = "[ CLIENT DISCONNECTED. TYPE \"next\" TO CHOOSE A NEW CLIENT ]";

/// Sent to a customer whose teller vanished.
pub const TELLER_DISCONNECTED: &str =
    "[ YOUR TELLER DISCONNECTED. PLEASE WAIT FOR THE NEXT AVAILABLE TELLER ]";

/// Sent to a participant leaving with `exit`.
pub const GOODBYE: &str = "[ GOODBYE ]";

/// A parsed input line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    /// Teller: end the current session and claim the next customer.
    Next,
    /// Teller: claim a specific customer.
    Serve(CustomerId),
    /// Teller: conclude the current session.
    End,
    /// Teller: approve the pending transaction.
    Approve,
    /// Teller: deny the pending transaction.
    Deny,
    /// Teller: list waiting customers.
    List,
    /// Either: open a withdrawal or deposit, optionally with its amount.
    Transaction {
        /// Withdraw or deposit.
        kind: TransactionKind,
        /// Inline amount text.
        amount: Option<&'a str>,
    },
    /// Either: abandon the open transaction.
    Cancel,
    /// Customer: show the balance.
    Balance,
    /// Either: leave the bank.
    Exit,
    /// Recognized command with bad arguments.
    Usage(&'static str),
    /// Free-form chat.
    Chat(&'a str),
}

impl<'a> Command<'a> {
    /// Parse a line typed by a participant in `role`. Command words are
    /// case-insensitive; anything unrecognized is chat.
    pub fn parse(role: Role, line: &'a str) -> Self {
        let line = line.trim();
        let (word, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let arg = Some(rest.trim()).filter(|a| !a.is_empty());

        match (role, word.to_ascii_lowercase().as_str(), arg) {
            (_, "exit", None) => Self::Exit,
            (_, "cancel", None) => Self::Cancel,
            (_, "withdraw", amount) => Self::Transaction { kind: TransactionKind::Withdraw, amount },
            (_, "deposit", amount) => Self::Transaction { kind: TransactionKind::Deposit, amount },
            (Role::Customer, "balance", None) => Self::Balance,
            (Role::Teller, "next", None) => Self::Next,
            (Role::Teller, "end", None) => Self::End,
            (Role::Teller, "approve", None) => Self::Approve,
            (Role::Teller, "deny", None) => Self::Deny,
            (Role::Teller, "list", None) => Self::List,
            (Role::Teller, "serve", arg) => match arg.map(parse_amount) {
                Some(Ok(id)) => Self::Serve(id),
                _ => Self::Usage("serve <customer number>"),
            },
            _ => Self::Chat(line),
        }
    }
}

/// Route one line from a registered participant.
///
/// Errors never escape: they become a notice to the sender.
pub fn route<C: Connection>(
    registry: &mut ConnectionRegistry<C>,
    sender: &Member,
    line: &str,
    now: Instant,
) -> Vec<BankAction> {
    let line = line.trim();
    if line.is_empty() {
        return Vec::new();
    }
    let Some(sender_conn) = conn_of(registry, sender) else {
        return Vec::new();
    };

    let command = Command::parse(sender.role(), line);
    debug!(?sender, ?command, "routing line");

    let result = match command {
        Command::Chat(text) if session::awaiting_amount_from(registry, sender) => {
            session::supply_amount(registry, sender, text)
        },
        Command::Chat(text) => relay(registry, sender, text),
        Command::Next => as_teller(sender).and_then(|t| session::claim(registry, t, None, now)),
        Command::Serve(id) => {
            as_teller(sender).and_then(|t| session::claim(registry, t, Some(id), now))
        },
        Command::End => as_teller(sender).and_then(|t| session::end(registry, t)),
        Command::Approve => as_teller(sender).and_then(|t| session::resolve(registry, t, true)),
        Command::Deny => as_teller(sender).and_then(|t| session::resolve(registry, t, false)),
        Command::List => Ok(vec![BankAction::notice(sender_conn, waiting_list(registry))]),
        Command::Transaction { kind, amount } => {
            session::begin_transaction(registry, sender, kind, amount)
        },
        Command::Cancel => session::cancel(registry, sender),
        Command::Balance => balance(registry, sender),
        Command::Exit => Ok(depart(registry, sender_conn)),
        Command::Usage(usage) => Err(SessionError::Usage(usage)),
    };

    match result {
        Ok(actions) => actions,
        Err(e) => {
            debug!(?sender, error = %e, "command refused");
            vec![BankAction::notice(sender_conn, e.notice(sender.role()))]
        },
    }
}

/// Build the two relay envelopes for one chat line.
///
/// The teller sees `(you) ` on its own lines and `(Customer N) ` on the
/// customer's; the customer sees `[ TELLER ] ` and `[ YOU ] ` respectively.
/// The first action goes to the teller, the second to the customer.
pub fn update_chat<C: Connection>(
    speaker: Role,
    teller: &Teller<C>,
    customer: &Customer<C>,
    body: &str,
) -> [BankAction; 2] {
    let body = sanitize(body);
    let (teller_line, customer_line) = match speaker {
        Role::Teller => (format!("(you) {body}"), format!("[ TELLER ] {body}")),
        Role::Customer => (format!("(Customer {}) {body}", customer.id()), format!("[ YOU ] {body}")),
    };

    let origin = Origin::from(speaker);
    [
        BankAction::Send { conn_id: teller.conn().id(), envelope: Envelope::new(origin, teller_line) },
        BankAction::Send {
            conn_id: customer.conn().id(),
            envelope: Envelope::new(origin, customer_line),
        },
    ]
}

fn relay<C: Connection>(
    registry: &ConnectionRegistry<C>,
    sender: &Member,
    text: &str,
) -> Result<Vec<BankAction>, SessionError> {
    let (teller_id, customer_id) = session::pair_of(registry, sender)?;
    let teller = registry.teller(&teller_id).ok_or(SessionError::NotPaired)?;
    let customer = registry.customer(customer_id).ok_or(SessionError::NotPaired)?;
    Ok(update_chat(sender.role(), teller, customer, text).into())
}

fn balance<C: Connection>(
    registry: &ConnectionRegistry<C>,
    sender: &Member,
) -> Result<Vec<BankAction>, SessionError> {
    let Member::Customer(id) = sender else {
        return Err(SessionError::Usage("balance is only available to customers"));
    };
    let customer = registry.customer(*id).ok_or(SessionError::NotPaired)?;
    Ok(vec![BankAction::notice(customer.conn().id(), format!("[ BALANCE: {} ]", customer.balance()))])
}

fn waiting_list<C: Connection>(registry: &ConnectionRegistry<C>) -> String {
    let waiting: Vec<String> = registry.waiting().map(|c| c.id().to_string()).collect();
    if waiting.is_empty() {
        SessionError::NoCustomersWaiting.notice(Role::Teller)
    } else {
        format!("[ WAITING CUSTOMERS: {} ]", waiting.join(", "))
    }
}

/// Explicit session end: remove the sender, tell its counterpart, close.
fn depart<C: Connection>(registry: &mut ConnectionRegistry<C>, conn_id: ConnectionId) -> Vec<BankAction> {
    let Some(departed) = registry.remove(conn_id) else {
        return Vec::new();
    };
    info!(conn = conn_id, role = ?departed.role(), "participant left");

    let mut actions = supervisor::notify_counterpart(registry, &departed);
    actions.push(BankAction::notice(conn_id, GOODBYE));
    actions.push(BankAction::Close { conn_id, reason: "participant left".to_string() });
    actions
}

fn as_teller(sender: &Member) -> Result<&SessionId, SessionError> {
    match sender {
        Member::Teller(id) => Ok(id),
        Member::Customer(_) => Err(SessionError::TellerOnly),
    }
}

fn conn_of<C: Connection>(registry: &ConnectionRegistry<C>, member: &Member) -> Option<ConnectionId> {
    match member {
        Member::Teller(id) => registry.teller(id).map(|t| t.conn().id()),
        Member::Customer(id) => registry.customer(*id).map(|c| c.conn().id()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn teller_commands() {
        assert_eq!(Command::parse(Role::Teller, "next"), Command::Next);
        assert_eq!(Command::parse(Role::Teller, "  NEXT "), Command::Next);
        assert_eq!(Command::parse(Role::Teller, "serve 3"), Command::Serve(3));
        assert_eq!(Command::parse(Role::Teller, "serve x"), Command::Usage("serve <customer number>"));
        assert_eq!(Command::parse(Role::Teller, "approve"), Command::Approve);
    }

    #[test]
    fn teller_words_are_chat_for_customers() {
        assert_eq!(Command::parse(Role::Customer, "next"), Command::Chat("next"));
        assert_eq!(Command::parse(Role::Customer, "approve"), Command::Chat("approve"));
    }

    #[test]
    fn transaction_with_and_without_amount() {
        assert_eq!(
            Command::parse(Role::Customer, "withdraw $50"),
            Command::Transaction { kind: TransactionKind::Withdraw, amount: Some("$50") }
        );
        assert_eq!(
            Command::parse(Role::Teller, "deposit"),
            Command::Transaction { kind: TransactionKind::Deposit, amount: None }
        );
    }

    #[test]
    fn command_word_with_trailing_text_is_chat() {
        assert_eq!(Command::parse(Role::Teller, "next please"), Command::Chat("next please"));
        assert_eq!(Command::parse(Role::Customer, "exit now"), Command::Chat("exit now"));
    }
}
