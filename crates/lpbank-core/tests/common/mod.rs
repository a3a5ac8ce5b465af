//! Shared fixtures for bank tests.

#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Instant,
};

use lpbank_core::{
    Bank, BankAction, BankConfig, BankEvent, Connection, ConnectionId, CustomerId, Environment,
    Member, SessionId,
};
use lpbank_proto::{Envelope, Origin};

/// Deterministic environment: session ids derive from a counter.
#[derive(Clone, Default)]
pub struct TestEnv {
    counter: Arc<AtomicU64>,
}

impl Environment for TestEnv {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        let n = self.counter.fetch_add(1, Ordering::SeqCst).to_be_bytes();
        for (i, byte) in buffer.iter_mut().enumerate() {
            *byte = n[i % n.len()].wrapping_add(i as u8);
        }
    }
}

/// Connection whose closed flag the test flips.
#[derive(Debug, Clone)]
pub struct StubConn {
    id: ConnectionId,
    closed: Arc<AtomicBool>,
}

impl StubConn {
    pub fn close(&self) {
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

/// A bank plus the connections attached to it.
pub struct Floor {
    pub bank: Bank<TestEnv, StubConn>,
    conns: HashMap<ConnectionId, (StubConn, Origin)>,
    next_conn: ConnectionId,
}

impl Floor {
    pub fn new() -> Self {
        Self::with_config(BankConfig::default())
    }

    pub fn with_config(config: BankConfig) -> Self {
        Self { bank: Bank::new(TestEnv::default(), config), conns: HashMap::new(), next_conn: 1 }
    }

    /// Accept a connection without identifying it.
    pub fn accept(&mut self, origin: Origin) -> (ConnectionId, Vec<BankAction>) {
        let id = self.next_conn;
        self.next_conn += 1;
        let conn = StubConn { id, closed: Arc::new(AtomicBool::new(false)) };
        self.conns.insert(id, (conn.clone(), origin));
        (id, self.bank.process_event(BankEvent::Accepted { conn }))
    }

    /// Accept and identify a connection.
    pub fn connect(&mut self, origin: Origin) -> ConnectionId {
        let (id, _) = self.accept(origin);
        self.send(id, origin, "");
        id
    }

    /// Send a line with the connection's own origin.
    pub fn say(&mut self, conn_id: ConnectionId, text: &str) -> Vec<BankAction> {
        let origin = self.conns[&conn_id].1;
        self.send(conn_id, origin, text)
    }

    pub fn send(&mut self, conn_id: ConnectionId, origin: Origin, text: &str) -> Vec<BankAction> {
        self.bank.process_event(BankEvent::EnvelopeReceived {
            conn_id,
            envelope: Envelope::new(origin, text),
        })
    }

    pub fn drop_conn(&mut self, conn_id: ConnectionId) {
        self.conns[&conn_id].0.close();
    }

    pub fn tick(&mut self) -> Vec<BankAction> {
        self.bank.process_event(BankEvent::Tick)
    }

    pub fn customer_id(&self, conn_id: ConnectionId) -> CustomerId {
        match self.bank.registry().member(conn_id) {
            Some(Member::Customer(id)) => id,
            other => panic!("connection {conn_id} is not a customer: {other:?}"),
        }
    }

    pub fn teller_id(&self, conn_id: ConnectionId) -> SessionId {
        match self.bank.registry().member(conn_id) {
            Some(Member::Teller(id)) => id,
            other => panic!("connection {conn_id} is not a teller: {other:?}"),
        }
    }

    pub fn balance(&self, conn_id: ConnectionId) -> u64 {
        self.bank.registry().customer(self.customer_id(conn_id)).unwrap().balance()
    }
}

/// Messages sent to `conn_id` in `actions`.
pub fn sent_to(actions: &[BankAction], conn_id: ConnectionId) -> Vec<String> {
    actions
        .iter()
        .filter_map(|a| match a {
            BankAction::Send { conn_id: target, envelope } if *target == conn_id => {
                Some(envelope.message.clone())
            },
            _ => None,
        })
        .collect()
}
