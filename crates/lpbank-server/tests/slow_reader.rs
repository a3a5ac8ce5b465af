//! A peer that stops reading is dropped instead of buffering without end.

use std::time::Duration;

use lpbank_core::{BankConfig, router::CLIENT_DISCONNECTED};
use lpbank_proto::{Envelope, Framer, Origin, encode};
use lpbank_server::{BankHandle, SystemEnv, serve_connection, spawn_bank};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWriteExt, DuplexStream},
    time::timeout,
};

const WAIT: Duration = Duration::from_secs(10);

fn frame(role: Origin, line: &str) -> Vec<u8> {
    encode(&Envelope::new(role, line)).expect("encode").to_vec()
}

/// Attach one in-memory connection to the bank, with `buffer` bytes of
/// socket buffering in each direction.
fn attach(bank: &BankHandle, buffer: usize) -> DuplexStream {
    let (client, server) = tokio::io::duplex(buffer);
    tokio::spawn(serve_connection(server, bank.clone()));
    client
}

/// Read until a message satisfying `pred` arrives.
async fn read_until<R: AsyncRead + Unpin>(
    reader: &mut R,
    framer: &mut Framer,
    pred: impl Fn(&str) -> bool,
) {
    timeout(WAIT, async {
        let mut buf = [0u8; 4096];
        loop {
            let n = reader.read(&mut buf).await.expect("read");
            assert!(n > 0, "bank closed the connection");
            if framer.feed(&buf[..n]).iter().any(|e| pred(&e.message)) {
                return;
            }
        }
    })
    .await
    .expect("timed out waiting for message");
}

#[tokio::test]
async fn customer_that_stops_reading_is_disconnected() {
    let (bank, _task) = spawn_bank(SystemEnv::new(), BankConfig::default(), Duration::from_millis(20));

    // Tiny buffer so the customer's side backs up almost at once.
    let mut customer = attach(&bank, 64);
    customer.write_all(&frame(Origin::Customer, "")).await.expect("join");
    let mut customer_framer = Framer::new();
    read_until(&mut customer, &mut customer_framer, |m| m.starts_with("[ WELCOME")).await;

    let teller = attach(&bank, 1 << 16);
    let (mut teller_rx, mut teller_tx) = tokio::io::split(teller);
    let mut teller_framer = Framer::new();
    teller_tx.write_all(&frame(Origin::Teller, "")).await.expect("join");
    teller_tx.write_all(&frame(Origin::Teller, "next")).await.expect("next");
    read_until(&mut teller_rx, &mut teller_framer, |m| m.starts_with("[ NOW SERVING CUSTOMER 1")).await;

    // The customer never reads again while the teller keeps talking.
    let chatter = tokio::spawn(async move {
        let mut burst = Vec::new();
        for i in 0..3000 {
            burst.extend(frame(Origin::Teller, &format!("line {i}")));
        }
        teller_tx.write_all(&burst).await.expect("write");
        teller_tx
    });

    read_until(&mut teller_rx, &mut teller_framer, |m| m == CLIENT_DISCONNECTED).await;
    drop(chatter);
    drop(customer);
}
