//! Device-local record of which proposals the current account has signed.
//!
//! The ledger does not reveal who signed a proposal, so the client remembers its own signatures.
//! The record is only a hint for presentation: it is never authoritative, it does not survive a
//! change of device, and it fails open. If storage is unavailable, nothing is considered signed
//! and marking is silently skipped.

use commonware_runtime::{Blob as _, Storage};
use multisig_model::{Address, ProposalId, SignatureHint};
use std::{
    collections::{BTreeMap, HashMap},
    future::Future,
};
use thiserror::Error;
use tracing::{debug, warn};

/// Value stored for a signed proposal.
const SIGNED: &str = "true";

/// Name of the blob holding the entries of a [Durable] backend.
const BLOB: &[u8] = b"signatures";

/// Errors that can occur when accessing a [Backend].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("storage unavailable")]
    Unavailable,
    #[error("storage failure: {0}")]
    Storage(String),
    #[error("encoding failure: {0}")]
    Encoding(String),
}

impl From<commonware_runtime::Error> for Error {
    fn from(err: commonware_runtime::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

/// A string key-value store.
///
/// Reads are served from memory. Writes may touch storage and resolve once the value is durable.
pub trait Backend: Send + Sync + 'static {
    fn get(&self, key: &str) -> Result<Option<String>, Error>;

    fn set(&mut self, key: &str, value: &str) -> impl Future<Output = Result<(), Error>> + Send;
}

/// A [Backend] that lives as long as the process.
#[derive(Clone, Debug, Default)]
pub struct Memory {
    entries: HashMap<String, String>,
}

impl Backend for Memory {
    fn get(&self, key: &str) -> Result<Option<String>, Error> {
        Ok(self.entries.get(key).cloned())
    }

    async fn set(&mut self, key: &str, value: &str) -> Result<(), Error> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// A [Backend] persisted in a single blob of a runtime [Storage] partition.
///
/// All entries are loaded when the backend is initialized. Every [Backend::set] rewrites the blob
/// as a JSON object and syncs it before returning. Contents that fail to decode are discarded
/// (and replaced on the next write), so a torn write costs hints rather than the session.
///
/// Only one [Durable] may be open on a partition at a time.
pub struct Durable<E: Storage> {
    blob: E::Blob,
    entries: BTreeMap<String, String>,
}

impl<E: Storage> Durable<E> {
    /// Open (or create) the backend stored in `partition`.
    pub async fn init(context: &E, partition: &str) -> Result<Self, Error> {
        let (blob, len) = context.open(partition, BLOB).await?;
        let entries = if len == 0 {
            BTreeMap::new()
        } else {
            let len = usize::try_from(len).map_err(|_| Error::Encoding("blob too large".into()))?;
            let raw = blob.read_at(vec![0u8; len], 0).await?;
            match serde_json::from_slice(raw.as_ref()) {
                Ok(entries) => entries,
                Err(err) => {
                    warn!(partition, ?err, "discarding unreadable signature cache");
                    BTreeMap::new()
                }
            }
        };
        debug!(partition, entries = entries.len(), "opened signature cache");
        Ok(Self { blob, entries })
    }
}

impl<E: Storage> Backend for Durable<E> {
    fn get(&self, key: &str) -> Result<Option<String>, Error> {
        Ok(self.entries.get(key).cloned())
    }

    async fn set(&mut self, key: &str, value: &str) -> Result<(), Error> {
        let mut entries = self.entries.clone();
        entries.insert(key.to_string(), value.to_string());
        let raw = serde_json::to_vec(&entries).map_err(|e| Error::Encoding(e.to_string()))?;
        let len = raw.len() as u64;
        self.blob.write_at(raw, 0).await?;
        self.blob.resize(len).await?;
        self.blob.sync().await?;
        self.entries = entries;
        Ok(())
    }
}

/// A [Backend] that always fails, as when local storage is disabled.
#[derive(Clone, Copy, Debug, Default)]
pub struct Unavailable;

impl Backend for Unavailable {
    fn get(&self, _: &str) -> Result<Option<String>, Error> {
        Err(Error::Unavailable)
    }

    async fn set(&mut self, _: &str, _: &str) -> Result<(), Error> {
        Err(Error::Unavailable)
    }
}

/// Remembers which proposals an account signed on this device.
pub struct SignatureCache<B: Backend> {
    backend: B,
}

impl<B: Backend> SignatureCache<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    fn key(account: &Address, id: ProposalId) -> String {
        format!("signed_{account}_{id}")
    }

    /// Whether `account` is known to have signed `id`. Storage errors read as `false`.
    pub fn has(&self, account: &Address, id: ProposalId) -> bool {
        matches!(self.hint(account, id), SignatureHint::Signed)
    }

    /// What the cache knows about `account`'s signature on `id`.
    pub fn hint(&self, account: &Address, id: ProposalId) -> SignatureHint {
        match self.backend.get(&Self::key(account, id)) {
            Ok(Some(value)) if value == SIGNED => SignatureHint::Signed,
            Ok(_) => SignatureHint::NotSigned,
            Err(_) => SignatureHint::Unavailable,
        }
    }

    /// Record that `account` signed `id`. Storage errors are logged and ignored.
    pub async fn mark(&mut self, account: &Address, id: ProposalId) {
        if let Err(err) = self.backend.set(&Self::key(account, id), SIGNED).await {
            warn!(%account, %id, ?err, "failed to record signature");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks;
    use commonware_macros::test_traced;
    use commonware_runtime::{deterministic, Blob as _, Runner};

    #[test_traced]
    fn test_mark() {
        deterministic::Runner::default().start(|_| async move {
            let mut cache = SignatureCache::new(Memory::default());
            let alice = mocks::address(1);
            let bob = mocks::address(2);
            let id = ProposalId::new(3);

            assert!(!cache.has(&alice, id));
            assert_eq!(cache.hint(&alice, id), SignatureHint::NotSigned);
            cache.mark(&alice, id).await;
            assert!(cache.has(&alice, id));

            // Scoped to account and proposal
            assert!(!cache.has(&bob, id));
            assert!(!cache.has(&alice, ProposalId::new(4)));
        });
    }

    #[test]
    fn test_key() {
        let key = SignatureCache::<Memory>::key(&mocks::address(0x0f), ProposalId::new(12));
        assert_eq!(key, format!("signed_0x{}_12", "0f".repeat(32)));
    }

    #[test_traced]
    fn test_unavailable_fails_open() {
        deterministic::Runner::default().start(|_| async move {
            let mut cache = SignatureCache::new(Unavailable);
            let alice = mocks::address(1);
            let id = ProposalId::new(1);

            cache.mark(&alice, id).await;
            assert!(!cache.has(&alice, id));
            assert_eq!(cache.hint(&alice, id), SignatureHint::Unavailable);
        });
    }

    #[test_traced]
    fn test_durable_persists() {
        deterministic::Runner::default().start(|context| async move {
            let alice = mocks::address(1);
            let mut cache =
                SignatureCache::new(Durable::init(&context, "signatures").await.unwrap());
            cache.mark(&alice, ProposalId::new(1)).await;
            cache.mark(&alice, ProposalId::new(2)).await;
            drop(cache);

            // Reopening the partition restores every mark
            let reopened =
                SignatureCache::new(Durable::init(&context, "signatures").await.unwrap());
            assert!(reopened.has(&alice, ProposalId::new(1)));
            assert!(reopened.has(&alice, ProposalId::new(2)));
            assert!(!reopened.has(&alice, ProposalId::new(3)));
            drop(reopened);

            // Partitions are independent
            let other = SignatureCache::new(Durable::init(&context, "other").await.unwrap());
            assert!(!other.has(&alice, ProposalId::new(1)));
        });
    }

    #[test_traced]
    fn test_durable_discards_corrupt() {
        deterministic::Runner::default().start(|context| async move {
            let (blob, _) = context.open("signatures", BLOB).await.unwrap();
            blob.write_at(b"not json".to_vec(), 0).await.unwrap();
            blob.sync().await.unwrap();
            drop(blob);

            let alice = mocks::address(1);
            let mut cache =
                SignatureCache::new(Durable::init(&context, "signatures").await.unwrap());
            assert_eq!(cache.hint(&alice, ProposalId::new(1)), SignatureHint::NotSigned);

            // The next mark replaces the unreadable contents
            cache.mark(&alice, ProposalId::new(1)).await;
            drop(cache);
            let reopened =
                SignatureCache::new(Durable::init(&context, "signatures").await.unwrap());
            assert!(reopened.has(&alice, ProposalId::new(1)));
        });
    }
}
