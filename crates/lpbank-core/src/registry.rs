//! Connection registry.
//!
//! Holds every live participant in exactly one of three ordered collections:
//!
//! - `tellers`: all connected tellers
//! - `customers`: connected customers waiting for a teller
//! - `serving`: customers currently paired with a teller
//!
//! A customer only ever moves between `customers` and `serving`. Insertion
//! order is kept across every operation except removal.

use std::time::Instant;

use thiserror::Error;

use crate::participant::{
    Connection, ConnectionId, Customer, CustomerId, Member, Participant, SessionId, Teller,
    Transaction,
};

/// Errors from registry operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// No connected customer has this number.
    #[error("customer {0} is not connected")]
    CustomerNotFound(CustomerId),

    /// No connected teller has this id.
    #[error("teller {0} is not connected")]
    TellerNotFound(SessionId),

    /// The customer is already paired.
    #[error("customer {customer} is already being served by teller {teller}")]
    AlreadyServed {
        /// Customer that was asked for.
        customer: CustomerId,
        /// Teller serving it.
        teller: SessionId,
    },

    /// The teller is already paired.
    #[error("teller {teller} is already serving customer {customer}")]
    TellerBusy {
        /// Teller that was asked for.
        teller: SessionId,
        /// Customer it serves.
        customer: CustomerId,
    },

    /// The customer is connected but not in the serving collection.
    #[error("customer {0} is not being served")]
    NotServed(CustomerId),
}

/// Live participants, partitioned by role and pairing.
#[derive(Debug)]
pub struct ConnectionRegistry<C> {
    tellers: Vec<Teller<C>>,
    customers: Vec<Customer<C>>,
    serving: Vec<Customer<C>>,
    customer_count: CustomerId,
    initial_balance: u64,
}

impl<C: Connection> ConnectionRegistry<C> {
    /// Create an empty registry; new customers start with `initial_balance`.
    pub fn new(initial_balance: u64) -> Self {
        Self {
            tellers: Vec::new(),
            customers: Vec::new(),
            serving: Vec::new(),
            customer_count: 0,
            initial_balance,
        }
    }

    /// Register a customer and return its sequence number.
    pub fn add_customer(&mut self, conn: C) -> CustomerId {
        self.customer_count += 1;
        let id = self.customer_count;
        self.customers.push(Customer::new(id, conn, self.initial_balance));
        id
    }

    /// Register a teller under `id`.
    pub fn add_teller(&mut self, conn: C, id: SessionId) -> SessionId {
        self.tellers.push(Teller::new(id.clone(), conn));
        id
    }

    /// Pair a waiting customer with an idle teller.
    ///
    /// Moves the customer from the waiting collection to the serving
    /// collection and sets both pairing references. Nothing is mutated on
    /// error.
    pub fn move_to_serving(
        &mut self,
        customer: CustomerId,
        teller: &SessionId,
        now: Instant,
    ) -> Result<(), RegistryError> {
        let teller_idx = self.teller_index(teller)?;
        if let Some(current) = self.tellers[teller_idx].customer {
            return Err(RegistryError::TellerBusy { teller: teller.clone(), customer: current });
        }

        if let Some(served) = self.serving.iter().find(|c| c.id == customer) {
            let serving_teller = served.teller.clone().unwrap_or_else(|| teller.clone());
            return Err(RegistryError::AlreadyServed { customer, teller: serving_teller });
        }

        let idx = self
            .customers
            .iter()
            .position(|c| c.id == customer)
            .ok_or(RegistryError::CustomerNotFound(customer))?;

        let mut moved = self.customers.remove(idx);
        moved.teller = Some(teller.clone());
        moved.transaction = Transaction::Idle;
        self.serving.push(moved);

        let teller = &mut self.tellers[teller_idx];
        teller.customer = Some(customer);
        teller.paired_at = Some(now);

        Ok(())
    }

    /// End a pairing.
    ///
    /// Clears both pairing references and any outstanding transaction. The
    /// customer goes back to the end of the waiting collection if its
    /// connection is still live, otherwise it is dropped. Returns whether
    /// the customer was restored.
    pub fn release(&mut self, customer: CustomerId) -> Result<bool, RegistryError> {
        let idx = match self.serving.iter().position(|c| c.id == customer) {
            Some(idx) => idx,
            None if self.customers.iter().any(|c| c.id == customer) => {
                return Err(RegistryError::NotServed(customer));
            },
            None => return Err(RegistryError::CustomerNotFound(customer)),
        };

        let mut released = self.serving.remove(idx);
        if let Some(teller_id) = released.teller.take() {
            if let Some(teller) = self.tellers.iter_mut().find(|t| t.id == teller_id) {
                if teller.customer == Some(customer) {
                    teller.customer = None;
                    teller.paired_at = None;
                }
            }
        }
        released.transaction = Transaction::Idle;

        if released.conn.is_closed() {
            Ok(false)
        } else {
            self.customers.push(released);
            Ok(true)
        }
    }

    /// Clear a teller's pairing reference after its customer vanished.
    ///
    /// Returns the customer it was paired with, if any.
    pub fn clear_teller(&mut self, teller: &SessionId) -> Option<CustomerId> {
        let teller = self.tellers.iter_mut().find(|t| &t.id == teller)?;
        teller.paired_at = None;
        teller.customer.take()
    }

    /// Evict every participant whose connection has closed.
    ///
    /// Each collection is partitioned into a fresh vector rather than
    /// removed from by index while iterating. Calling this again with no
    /// newly closed connection returns nothing and changes nothing.
    pub fn remove_closed(&mut self) -> Vec<Participant<C>> {
        let mut evicted = Vec::new();

        let (closed, live): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.tellers).into_iter().partition(|t| t.conn.is_closed());
        self.tellers = live;
        evicted.extend(closed.into_iter().map(Participant::Teller));

        for collection in [&mut self.customers, &mut self.serving] {
            let (closed, live): (Vec<_>, Vec<_>) =
                std::mem::take(collection).into_iter().partition(|c| c.conn.is_closed());
            *collection = live;
            evicted.extend(closed.into_iter().map(Participant::Customer));
        }

        evicted
    }

    /// Remove the participant owning `conn_id`, wherever it is.
    pub fn remove(&mut self, conn_id: ConnectionId) -> Option<Participant<C>> {
        if let Some(idx) = self.tellers.iter().position(|t| t.conn.id() == conn_id) {
            return Some(Participant::Teller(self.tellers.remove(idx)));
        }
        for collection in [&mut self.customers, &mut self.serving] {
            if let Some(idx) = collection.iter().position(|c| c.conn.id() == conn_id) {
                return Some(Participant::Customer(collection.remove(idx)));
            }
        }
        None
    }

    /// Find who owns a connection.
    pub fn member(&self, conn_id: ConnectionId) -> Option<Member> {
        if let Some(teller) = self.tellers.iter().find(|t| t.conn.id() == conn_id) {
            return Some(Member::Teller(teller.id.clone()));
        }
        self.all_customers().find(|c| c.conn.id() == conn_id).map(|c| Member::Customer(c.id))
    }

    /// Look up a customer, waiting or serving.
    pub fn customer(&self, id: CustomerId) -> Option<&Customer<C>> {
        self.all_customers().find(|c| c.id == id)
    }

    /// Mutable customer lookup, waiting or serving.
    pub fn customer_mut(&mut self, id: CustomerId) -> Option<&mut Customer<C>> {
        self.customers.iter_mut().chain(self.serving.iter_mut()).find(|c| c.id == id)
    }

    /// Look up a teller.
    pub fn teller(&self, id: &SessionId) -> Option<&Teller<C>> {
        self.tellers.iter().find(|t| &t.id == id)
    }

    /// Whether the customer is in the serving collection.
    pub fn is_serving(&self, id: CustomerId) -> bool {
        self.serving.iter().any(|c| c.id == id)
    }

    /// Oldest waiting customer whose connection is still open.
    pub fn next_unpaired(&self) -> Option<CustomerId> {
        self.customers.iter().find(|c| !c.conn.is_closed()).map(|c| c.id)
    }

    /// Connected tellers in arrival order.
    pub fn tellers(&self) -> impl Iterator<Item = &Teller<C>> {
        self.tellers.iter()
    }

    /// Waiting customers in queue order.
    pub fn waiting(&self) -> impl Iterator<Item = &Customer<C>> {
        self.customers.iter()
    }

    /// Customers currently being served.
    pub fn serving(&self) -> impl Iterator<Item = &Customer<C>> {
        self.serving.iter()
    }

    /// Total registered participants.
    pub fn len(&self) -> usize {
        self.tellers.len() + self.customers.len() + self.serving.len()
    }

    /// Whether no participant is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check that every pairing reference is mirrored by its counterpart
    /// and that collection membership agrees with the references.
    pub fn pairings_consistent(&self) -> bool {
        let customers_ok = self.customers.iter().all(|c| c.teller.is_none())
            && self.serving.iter().all(|c| {
                c.teller
                    .as_ref()
                    .and_then(|id| self.teller(id))
                    .is_some_and(|t| t.customer == Some(c.id))
            });

        let tellers_ok = self.tellers.iter().all(|t| match t.customer {
            None => true,
            Some(id) => self.serving.iter().any(|c| c.id == id && c.teller.as_ref() == Some(&t.id)),
        });

        customers_ok && tellers_ok
    }

    fn all_customers(&self) -> impl Iterator<Item = &Customer<C>> {
        self.customers.iter().chain(self.serving.iter())
    }

    fn teller_index(&self, id: &SessionId) -> Result<usize, RegistryError> {
        self.tellers
            .iter()
            .position(|t| &t.id == id)
            .ok_or_else(|| RegistryError::TellerNotFound(id.clone()))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    };

    use super::*;

    /// Connection stub whose closed flag is shared with the test.
    #[derive(Debug, Clone)]
    pub(crate) struct StubConn {
        pub(crate) id: ConnectionId,
        pub(crate) closed: Arc<AtomicBool>,
    }

    impl StubConn {
        pub(crate) fn new(id: ConnectionId) -> Self {
            Self { id, closed: Arc::new(AtomicBool::new(false)) }
        }

        pub(crate) fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    impl Connection for StubConn {
        fn id(&self) -> ConnectionId {
            self.id
        }

        fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }
    }

    pub(crate) fn teller_id(n: u8) -> SessionId {
        SessionId::from_bytes([n; 16])
    }

    #[test]
    fn customers_are_numbered_from_one() {
        let mut registry = ConnectionRegistry::new(100);
        assert_eq!(registry.add_customer(StubConn::new(1)), 1);
        assert_eq!(registry.add_customer(StubConn::new(2)), 2);
        assert_eq!(registry.customer(1).map(Customer::balance), Some(100));
        assert_eq!(registry.next_unpaired(), Some(1));
    }

    #[test]
    fn move_to_serving_sets_both_references() {
        let mut registry = ConnectionRegistry::new(100);
        let c1 = registry.add_customer(StubConn::new(1));
        let t1 = registry.add_teller(StubConn::new(2), teller_id(1));

        registry.move_to_serving(c1, &t1, Instant::now()).unwrap();

        assert_eq!(registry.customer(c1).unwrap().teller(), Some(&t1));
        assert_eq!(registry.teller(&t1).unwrap().customer(), Some(c1));
        assert!(registry.is_serving(c1));
        assert_eq!(registry.next_unpaired(), None);
        assert!(registry.pairings_consistent());
    }

    #[test]
    fn move_to_serving_rejects_already_served_customer() {
        let mut registry = ConnectionRegistry::new(100);
        let c1 = registry.add_customer(StubConn::new(1));
        let t1 = registry.add_teller(StubConn::new(2), teller_id(1));
        let t2 = registry.add_teller(StubConn::new(3), teller_id(2));
        registry.move_to_serving(c1, &t1, Instant::now()).unwrap();

        let result = registry.move_to_serving(c1, &t2, Instant::now());
        assert_eq!(result, Err(RegistryError::AlreadyServed { customer: c1, teller: t1 }));
        assert_eq!(registry.teller(&t2).unwrap().customer(), None);
    }

    #[test]
    fn move_to_serving_rejects_busy_teller() {
        let mut registry = ConnectionRegistry::new(100);
        let c1 = registry.add_customer(StubConn::new(1));
        let c2 = registry.add_customer(StubConn::new(2));
        let t1 = registry.add_teller(StubConn::new(3), teller_id(1));
        registry.move_to_serving(c1, &t1, Instant::now()).unwrap();

        let result = registry.move_to_serving(c2, &t1, Instant::now());
        assert!(matches!(result, Err(RegistryError::TellerBusy { customer: 1, .. })));
        assert!(!registry.is_serving(c2));
    }

    #[test]
    fn release_returns_live_customer_to_back_of_queue() {
        let mut registry = ConnectionRegistry::new(100);
        let c1 = registry.add_customer(StubConn::new(1));
        let c2 = registry.add_customer(StubConn::new(2));
        let t1 = registry.add_teller(StubConn::new(3), teller_id(1));
        registry.move_to_serving(c1, &t1, Instant::now()).unwrap();

        assert_eq!(registry.release(c1), Ok(true));

        let queue: Vec<_> = registry.waiting().map(Customer::id).collect();
        assert_eq!(queue, [c2, c1]);
        assert_eq!(registry.teller(&t1).unwrap().customer(), None);
        assert!(registry.pairings_consistent());
    }

    #[test]
    fn release_drops_closed_customer() {
        let mut registry = ConnectionRegistry::new(100);
        let conn = StubConn::new(1);
        let c1 = registry.add_customer(conn.clone());
        let t1 = registry.add_teller(StubConn::new(2), teller_id(1));
        registry.move_to_serving(c1, &t1, Instant::now()).unwrap();

        conn.close();
        assert_eq!(registry.release(c1), Ok(false));
        assert!(registry.customer(c1).is_none());
    }

    #[test]
    fn release_of_waiting_customer_is_an_error() {
        let mut registry = ConnectionRegistry::new(100);
        let c1 = registry.add_customer(StubConn::new(1));
        assert_eq!(registry.release(c1), Err(RegistryError::NotServed(c1)));
        assert_eq!(registry.release(99), Err(RegistryError::CustomerNotFound(99)));
    }

    #[test]
    fn remove_closed_evicts_adjacent_entries() {
        let mut registry = ConnectionRegistry::new(100);
        let conns: Vec<_> = (1..=4).map(StubConn::new).collect();
        for conn in &conns {
            registry.add_customer(conn.clone());
        }
        conns[1].close();
        conns[2].close();

        let evicted = registry.remove_closed();
        assert_eq!(evicted.len(), 2);
        let queue: Vec<_> = registry.waiting().map(Customer::id).collect();
        assert_eq!(queue, [1, 4]);
    }

    #[test]
    fn remove_closed_is_idempotent() {
        let mut registry = ConnectionRegistry::new(100);
        let conn = StubConn::new(1);
        registry.add_customer(conn.clone());
        registry.add_teller(StubConn::new(2), teller_id(1));
        conn.close();

        assert_eq!(registry.remove_closed().len(), 1);
        assert!(registry.remove_closed().is_empty());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn remove_by_connection() {
        let mut registry = ConnectionRegistry::new(100);
        registry.add_customer(StubConn::new(1));
        let t1 = registry.add_teller(StubConn::new(2), teller_id(1));

        assert_eq!(registry.member(2), Some(Member::Teller(t1)));
        assert!(matches!(registry.remove(2), Some(Participant::Teller(_))));
        assert!(registry.member(2).is_none());
        assert!(registry.remove(2).is_none());
    }

    #[test]
    fn clear_teller_returns_previous_customer() {
        let mut registry = ConnectionRegistry::new(100);
        let c1 = registry.add_customer(StubConn::new(1));
        let t1 = registry.add_teller(StubConn::new(2), teller_id(1));
        registry.move_to_serving(c1, &t1, Instant::now()).unwrap();

        assert_eq!(registry.clear_teller(&t1), Some(c1));
        assert_eq!(registry.clear_teller(&t1), None);
    }
}
