//! Typed proposals, derived status, and input validation for a multisig client.
//!
//! Everything in this crate is a pure function of its inputs. Ledger reads are mapped into
//! [Proposal]s by `multisig-engine`; this crate only describes what a proposal is and what can be
//! derived from it.
//!
//! # Status
//!
//! A [Proposal]'s [ProposalStatus] is never stored. It is derived from `(executed,
//! signature_count, threshold)`:
//!
//! - `executed` if the ledger reports the proposal as executed.
//! - `ready` if enough signatures were collected to reach the threshold.
//! - `pending` otherwise.
//!
//! [ProposalStatus::Expired] is part of the taxonomy but no combination of modeled fields
//! produces it (the ledger's expiry is measured in blocks, which are not read).

use thiserror::Error;

mod address;
pub use address::{Address, EthAddress};
pub mod format;
mod proposal;
pub use proposal::{
    status, Operation, OperationType, Proposal, ProposalId, ProposalStatus, SignatureHint, Stats,
};
pub mod validation;

/// Errors that can occur when validating caller input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    #[error("invalid ethereum address: {0}")]
    InvalidEthAddress(String),
    #[error("invalid threshold: {0} (must be an integer of at least 1)")]
    InvalidThreshold(String),
    #[error("invalid amount: {0} (must be an integer greater than 0)")]
    InvalidAmount(String),
    #[error("unknown operation type: {0}")]
    UnknownOperationType(u8),
}
