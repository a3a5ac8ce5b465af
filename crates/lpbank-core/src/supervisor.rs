//! Disconnect supervisor.
//!
//! Transports do not reliably push close notifications, so the bank polls:
//! every inbound event and every timer tick runs a sweep that evicts
//! closed connections and repairs the pairing of any survivor.

use tracing::{debug, info};

use crate::{
    bank::BankAction,
    participant::{Connection, Participant, Teller},
    registry::ConnectionRegistry,
    router::{CLIENT_DISCONNECTED, TELLER_DISCONNECTED},
};

/// Runs sweeps and keeps eviction counters.
#[derive(Debug, Default)]
pub struct DisconnectSupervisor {
    sweeps: u64,
    evicted: u64,
}

impl DisconnectSupervisor {
    /// Create a supervisor with zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Evict every closed participant and notify surviving counterparts.
    ///
    /// A counterpart evicted in the same sweep is treated as already
    /// cleaned up. A sweep with nothing closed changes nothing and returns
    /// no actions.
    pub fn sweep<C: Connection>(&mut self, registry: &mut ConnectionRegistry<C>) -> Vec<BankAction> {
        self.sweeps += 1;

        let evicted = registry.remove_closed();
        if evicted.is_empty() {
            return Vec::new();
        }
        self.evicted += evicted.len() as u64;
        debug!(count = evicted.len(), "evicted closed connections");

        let mut actions = Vec::new();
        for departed in &evicted {
            actions.extend(notify_counterpart(registry, departed));
        }
        actions
    }

    /// Sweeps run so far.
    pub fn sweeps(&self) -> u64 {
        self.sweeps
    }

    /// Participants evicted so far.
    pub fn evicted(&self) -> u64 {
        self.evicted
    }
}

/// End the pairing of a participant that is gone from the registry.
///
/// A surviving teller has its reference cleared and is told to pick a new
/// client; a surviving customer goes back to the waiting queue.
pub(crate) fn notify_counterpart<C: Connection>(
    registry: &mut ConnectionRegistry<C>,
    departed: &Participant<C>,
) -> Vec<BankAction> {
    match departed {
        Participant::Customer(customer) => {
            info!(customer = customer.id(), "customer disconnected");
            let Some(teller_id) = customer.teller() else {
                return Vec::new();
            };

            let still_paired =
                registry.teller(teller_id).and_then(Teller::customer) == Some(customer.id());
            if !still_paired {
                return Vec::new();
            }
            registry.clear_teller(teller_id);

            registry
                .teller(teller_id)
                .map(|t| BankAction::notice(t.conn().id(), CLIENT_DISCONNECTED))
                .into_iter()
                .collect()
        },
        Participant::Teller(teller) => {
            info!(teller = teller.id().short(), "teller disconnected");
            let Some(customer_id) = teller.customer() else {
                return Vec::new();
            };

            let customer_conn = registry
                .customer(customer_id)
                .filter(|c| c.teller() == Some(teller.id()))
                .map(|c| c.conn().id());
            let Some(conn_id) = customer_conn else {
                return Vec::new();
            };

            match registry.release(customer_id) {
                Ok(true) => vec![BankAction::notice(conn_id, TELLER_DISCONNECTED)],
                Ok(false) | Err(_) => Vec::new(),
            }
        },
    }
}
