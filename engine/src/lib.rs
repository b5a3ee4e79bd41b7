//! Synchronize multisig proposals with a remote ledger and expose them as observable client state.
//!
//! # Overview
//!
//! Proposals live in a contract on a ledger this crate does not control. The only way to observe
//! or change them is through a wallet session that can `simulate` (read) or `send` and `wait`
//! (write) contract calls. Reads may fail transiently when the wallet's local storage races with
//! itself; writes may time out without revealing whether they were included.
//!
//! The crate is layered, leaves first:
//!
//! - [ledger]: the [ledger::Node] and [ledger::Wallet] seams to the external collaborators.
//! - [gateway::Gateway]: binds the contract once per session, retries transient read failures with
//!   exponential backoff, and bounds writes with a deadline.
//! - [repository::Repository]: maps ledger records into [multisig_model::Proposal]s, sweeps all
//!   proposals strictly sequentially, and dispatches mutations.
//! - [cache::SignatureCache]: a device-local, fail-open hint of which proposals the current account
//!   signed.
//! - [store::Store]: the observable [store::Snapshot] consumed by presentation code, reloaded after
//!   every mutation.
//!
//! # Sequencing
//!
//! Reads that share a wallet session are not safe to run concurrently. Every [gateway::Gateway],
//! [repository::Repository], and [store::Store] operation takes `&mut self`, so a session can only
//! have one call in flight, and bulk loads await each proposal in increasing id order.
//!
//! # Mutation Results
//!
//! A successful mutation is reported separately from the reload that follows it (see
//! [store::Outcome]), so a failed refresh can never hide that a write was included.

mod config;
pub use config::Config;
mod error;
pub use error::Error;

pub mod cache;
pub mod gateway;
pub mod ledger;
#[cfg(any(test, feature = "mocks"))]
pub mod mocks;
pub mod repository;
pub mod store;
