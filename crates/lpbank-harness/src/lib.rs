//! Deterministic simulation harness for LP Bank.
//!
//! Runs the real server connection handling over turmoil's simulated
//! network with a seeded [`SimEnv`], so a scenario replays identically for
//! the same seed. Virtual time makes the disconnect sweep and message
//! latency cost nothing in wall-clock time.
//!
//! # Example
//!
//! ```rust,ignore
//! use lpbank_harness::{SimPeer, bank_address, run_bank};
//! use lpbank_proto::Origin;
//!
//! let mut sim = turmoil::Builder::new().build();
//! sim.host("bank", || run_bank(7, Default::default()));
//! sim.client("customer", async {
//!     let mut customer = SimPeer::join(&bank_address(), Origin::Customer).await?;
//!     customer.expect_prefix("[ WELCOME").await?;
//!     Ok(())
//! });
//! sim.run().unwrap();
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod sim_bank;
mod sim_env;

pub use sim_bank::{BANK_HOST, BANK_PORT, SWEEP_INTERVAL, SimPeer, bank_address, run_bank};
pub use sim_env::SimEnv;
