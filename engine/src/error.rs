use crate::ledger::{Failure, TxHash};
use multisig_model::Address;
use thiserror::Error;

/// Messages that identify a read failure as a race in the wallet's local storage rather than a
/// fault of the call itself. Matched case-insensitively.
const TRANSIENT_MARKERS: [&str; 3] = ["transaction", "idbobjectstore", "indexeddb"];

/// Errors that can occur when synchronizing with the ledger.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("contract not found at {0}")]
    ContractNotFound(Address),
    #[error("wallet not connected")]
    WalletNotConnected,
    #[error("transient storage error: {0}")]
    TransientStorage(String),
    #[error("ledger error: {0}")]
    Ledger(String),
    #[error("timed out waiting for {0} (inclusion unknown)")]
    Timeout(TxHash),
    #[error("validation failed: {0}")]
    Validation(#[from] multisig_model::Error),
    #[error("unexpected response to {0}")]
    UnexpectedResponse(&'static str),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("signature cache: {0}")]
    Cache(#[from] crate::cache::Error),
}

impl Error {
    /// Classify a failed read by its message.
    pub fn from_read(failure: Failure) -> Self {
        let message = failure.message().to_lowercase();
        if TRANSIENT_MARKERS.iter().any(|m| message.contains(m)) {
            return Self::TransientStorage(failure.into_message());
        }
        Self::Ledger(failure.into_message())
    }

    /// Whether retrying the same read may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientStorage(_))
    }
}

impl From<Failure> for Error {
    fn from(failure: Failure) -> Self {
        Self::Ledger(failure.into_message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("Failed to execute 'put' on 'IDBObjectStore': The transaction is not active" => true; "inactive transaction")]
    #[test_case("IndexedDB connection closed" => true; "indexeddb")]
    #[test_case("TransactionInactiveError" => true; "case insensitive")]
    #[test_case("Assertion failed: not a signer" => false; "assertion")]
    #[test_case("Contract not registered" => false; "not registered")]
    fn test_classify(message: &str) -> bool {
        Error::from_read(Failure::new(message)).is_transient()
    }

    #[test]
    fn test_permanent_by_default() {
        let error: Error = Failure::new("transaction reverted").into();
        assert_eq!(error, Error::Ledger("transaction reverted".into()));
        assert!(!error.is_transient());
    }
}
