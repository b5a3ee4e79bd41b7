//! Observable client state for presentation code.
//!
//! The [Store] owns a [Snapshot] of the last loaded proposals and stats, and moves through
//! [Phase]s as loads run: `Idle -> Loading -> {Loaded, Failed}`. Every mutation passes through
//! `Loading` and ends with a full reload, whether or not the mutation itself succeeded, so the
//! snapshot reflects the ledger after any attempt (including one that timed out).
//!
//! # Reporting
//!
//! Errors are reported twice: stored in [Snapshot::error] for display and returned to the caller.
//! A mutation that succeeded returns an [Outcome] carrying the reload result separately, so a
//! failed reload never hides that the mutation was included. Input rejected by validation is not
//! followed by a reload, since nothing was sent.

use crate::{
    cache::Backend,
    ledger::{Node, Wallet},
    repository::{Assignment, Repository},
    Error,
};
use commonware_runtime::{Clock, Metrics};
use futures::channel::mpsc;
use multisig_model::{Operation, Proposal, ProposalId, ProposalStatus, Stats};
use tracing::{debug, warn};

/// Load state of a [Store].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Idle,
    Loading,
    Loaded,
    Failed,
}

/// Everything presentation code can observe.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub proposals: Vec<Proposal>,
    pub stats: Option<Stats>,
    pub phase: Phase,
    pub error: Option<String>,
}

/// Result of a successful mutation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Outcome<T> {
    /// Value produced by the mutation.
    pub value: T,

    /// Result of the reload that followed.
    pub refresh: Result<(), Error>,
}

/// Governance settings as seen by the connected account.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Settings {
    pub threshold: u32,
    pub total_signers: u32,
    pub is_signer: bool,
}

/// Observable proposal state backed by a [Repository].
pub struct Store<E: Clock + Metrics, N: Node, W: Wallet, B: Backend> {
    repository: Repository<E, N, W, B>,
    snapshot: Snapshot,
    subscribers: Vec<mpsc::UnboundedSender<Snapshot>>,
}

impl<E: Clock + Metrics, N: Node, W: Wallet, B: Backend> Store<E, N, W, B> {
    pub fn new(repository: Repository<E, N, W, B>) -> Self {
        Self {
            repository,
            snapshot: Snapshot::default(),
            subscribers: Vec::new(),
        }
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn repository(&self) -> &Repository<E, N, W, B> {
        &self.repository
    }

    /// Receive the current snapshot and every subsequent change.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<Snapshot> {
        let (sender, receiver) = mpsc::unbounded();
        let _ = sender.unbounded_send(self.snapshot.clone());
        self.subscribers.push(sender);
        receiver
    }

    fn publish(&mut self) {
        let snapshot = &self.snapshot;
        self.subscribers
            .retain(|sender| sender.unbounded_send(snapshot.clone()).is_ok());
    }

    fn begin(&mut self) {
        self.snapshot.phase = Phase::Loading;
        self.snapshot.error = None;
        self.publish();
    }

    fn fail(&mut self, err: &Error) {
        warn!(?err, "store action failed");
        self.snapshot.phase = Phase::Failed;
        self.snapshot.error = Some(err.to_string());
        self.publish();
    }

    fn loaded(&mut self) {
        self.snapshot.phase = Phase::Loaded;
        self.publish();
    }

    /// Replace the proposals with a fresh sweep without changing the phase.
    async fn reload(&mut self) -> Result<(), Error> {
        let proposals = self.repository.load_all().await?;
        self.snapshot.proposals = proposals;
        Ok(())
    }

    /// Reload all proposals.
    pub async fn load_proposals(&mut self) -> Result<(), Error> {
        self.begin();
        match self.reload().await {
            Ok(()) => {
                self.loaded();
                Ok(())
            }
            Err(err) => {
                self.fail(&err);
                Err(err)
            }
        }
    }

    /// Reload all proposals and recompute [Stats] against the live threshold.
    pub async fn load_stats(&mut self) -> Result<Stats, Error> {
        self.begin();
        match self.sweep().await {
            Ok(stats) => {
                self.loaded();
                Ok(stats)
            }
            Err(err) => {
                self.fail(&err);
                Err(err)
            }
        }
    }

    async fn sweep(&mut self) -> Result<Stats, Error> {
        let threshold = self.repository.threshold().await?;
        let total_signers = self.repository.signer_count().await?;
        let next = self.repository.next_id().await?;
        let proposals = self.repository.load_all().await?;
        let stats = Stats::compute(threshold, total_signers, next, &proposals);
        self.snapshot.proposals = proposals;
        self.snapshot.stats = Some(stats.clone());
        Ok(stats)
    }

    /// Reload after a mutation attempt and settle the reported result.
    async fn settle<T>(&mut self, result: Result<T, Error>) -> Result<Outcome<T>, Error> {
        if let Err(err @ Error::Validation(_)) = &result {
            self.fail(err);
            return result.map(|value| Outcome {
                value,
                refresh: Ok(()),
            });
        }
        let refresh = self.reload().await;
        match result {
            Ok(value) => {
                match &refresh {
                    Ok(()) => self.loaded(),
                    Err(err) => self.fail(err),
                }
                Ok(Outcome { value, refresh })
            }
            Err(err) => {
                if let Err(reload) = &refresh {
                    debug!(?reload, "reload after failed mutation also failed");
                }
                self.fail(&err);
                Err(err)
            }
        }
    }

    /// Propose `operation`, then reload.
    ///
    /// The returned [Assignment] is confirmed if the reload shows `operation` stored under the
    /// expected id.
    pub async fn create_proposal(
        &mut self,
        operation: Operation,
    ) -> Result<Outcome<Assignment>, Error> {
        self.begin();
        let expected = operation.clone();
        let result = self.repository.create(operation).await;
        let mut outcome = self.settle(result).await?;
        if outcome.refresh.is_ok() {
            let id = outcome.value.id();
            if self.by_id(id).is_some_and(|p| p.operation == expected) {
                outcome.value = Assignment::Confirmed(id);
            }
        }
        Ok(outcome)
    }

    /// Sign proposal `id`, then reload.
    pub async fn sign_proposal(&mut self, id: ProposalId) -> Result<Outcome<()>, Error> {
        self.begin();
        let result = self.repository.sign(id).await;
        self.settle(result).await
    }

    /// Execute proposal `id`, then reload.
    pub async fn execute_proposal(&mut self, id: ProposalId) -> Result<Outcome<()>, Error> {
        self.begin();
        let result = self.repository.execute(id).await;
        self.settle(result).await
    }

    /// Read the threshold, signer count, and whether the connected account is a signer.
    ///
    /// This does not touch the loaded proposals. A failure is recorded like any other.
    pub async fn load_settings(&mut self) -> Result<Settings, Error> {
        match self.settings().await {
            Ok(settings) => Ok(settings),
            Err(err) => {
                self.fail(&err);
                Err(err)
            }
        }
    }

    async fn settings(&mut self) -> Result<Settings, Error> {
        let account = self.repository.account().await?;
        let threshold = self.repository.threshold().await?;
        let total_signers = self.repository.signer_count().await?;
        let is_signer = self.repository.is_signer(account).await?;
        Ok(Settings {
            threshold,
            total_signers,
            is_signer,
        })
    }

    /// Dismiss the current error.
    pub fn clear_error(&mut self) {
        if self.snapshot.error.is_none() {
            return;
        }
        self.snapshot.error = None;
        if self.snapshot.phase == Phase::Failed {
            self.snapshot.phase = Phase::Idle;
        }
        self.publish();
    }

    /// Loaded proposals still collecting signatures.
    pub fn pending(&self) -> Vec<&Proposal> {
        self.with_status(ProposalStatus::Pending)
    }

    /// Loaded proposals that were executed.
    pub fn executed(&self) -> Vec<&Proposal> {
        self.with_status(ProposalStatus::Executed)
    }

    fn with_status(&self, status: ProposalStatus) -> Vec<&Proposal> {
        self.snapshot
            .proposals
            .iter()
            .filter(|p| p.status() == status)
            .collect()
    }

    pub fn by_id(&self, id: ProposalId) -> Option<&Proposal> {
        self.snapshot.proposals.iter().find(|p| p.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cache::{Memory, SignatureCache, Unavailable},
        gateway::{Config, Gateway},
        ledger::{Call, ProposalRecord},
        mocks::{self, Ledger},
    };
    use commonware_macros::test_traced;
    use commonware_runtime::{deterministic, Runner};
    use futures::StreamExt;
    use multisig_model::{validation, OperationType, SignatureHint};

    type Context = deterministic::Context;

    const CONTRACT: u8 = 0xAA;

    fn ledger(context: &Context) -> Ledger<Context> {
        Ledger::new(
            context.clone(),
            mocks::address(CONTRACT),
            [mocks::address(1), mocks::address(2), mocks::address(3)],
            2,
        )
    }

    fn store_with<B: Backend>(
        context: &Context,
        label: &str,
        wallet: Ledger<Context>,
        node: &Ledger<Context>,
        backend: B,
    ) -> Store<Context, Ledger<Context>, Ledger<Context>, B> {
        let gateway = Gateway::new(
            context.with_label(label),
            node.clone(),
            wallet,
            Config::new(mocks::address(CONTRACT)),
        );
        Store::new(Repository::new(gateway, SignatureCache::new(backend)))
    }

    fn store(
        context: &Context,
        ledger: &Ledger<Context>,
        signer: u8,
    ) -> Store<Context, Ledger<Context>, Ledger<Context>, Memory> {
        store_with(
            context,
            &format!("signer_{signer}"),
            ledger.connect(mocks::address(signer)),
            ledger,
            Memory::default(),
        )
    }

    fn record(id: u64, signature_count: u32, executed: bool) -> ProposalRecord {
        ProposalRecord {
            proposal_id: id,
            operation_type: OperationType::AddSigner.into(),
            proposer: mocks::address(1),
            target_address: mocks::address(10 + id as u8),
            signature_count,
            executed,
            created_at: id,
            ..Default::default()
        }
    }

    fn ids(proposals: &[&Proposal]) -> Vec<u64> {
        proposals.iter().map(|p| p.id.get()).collect()
    }

    #[test_traced]
    fn test_load_proposals() {
        deterministic::Runner::default().start(|context| async move {
            let ledger = ledger(&context);
            ledger.insert(record(1, 2, false));
            ledger.insert(record(2, 1, false));
            ledger.insert(record(3, 2, true));
            let mut store = store(&context, &ledger, 1);
            let mut updates = store.subscribe();

            store.load_proposals().await.unwrap();
            let snapshot = store.snapshot();
            assert_eq!(snapshot.phase, Phase::Loaded);
            assert_eq!(snapshot.error, None);
            assert_eq!(snapshot.proposals.len(), 3);

            assert_eq!(ids(&store.pending()), vec![2]);
            assert_eq!(ids(&store.executed()), vec![3]);
            assert_eq!(
                store.by_id(ProposalId::new(1)).map(|p| p.status()),
                Some(ProposalStatus::Ready)
            );
            assert!(store.by_id(ProposalId::new(4)).is_none());

            let phases: Vec<_> = [
                updates.next().await.unwrap(),
                updates.next().await.unwrap(),
                updates.next().await.unwrap(),
            ]
            .into_iter()
            .map(|s| s.phase)
            .collect();
            assert_eq!(phases, vec![Phase::Idle, Phase::Loading, Phase::Loaded]);
        });
    }

    #[test_traced]
    fn test_load_stats() {
        deterministic::Runner::default().start(|context| async move {
            let ledger = ledger(&context);
            ledger.insert(record(1, 2, false));
            ledger.insert(record(2, 1, false));
            ledger.insert(record(3, 2, true));
            let mut store = store(&context, &ledger, 1);

            let stats = store.load_stats().await.unwrap();
            assert_eq!(
                stats,
                Stats {
                    threshold: 2,
                    total_signers: 3,
                    pending_proposals: 1,
                    executed_proposals: 1,
                    total_proposals: 3,
                }
            );
            assert_eq!(store.snapshot().stats, Some(stats));
            assert_eq!(store.snapshot().proposals.len(), 3);
        });
    }

    #[test_traced]
    fn test_load_failure() {
        deterministic::Runner::default().start(|context| async move {
            let ledger = ledger(&context);
            let mut store = store(&context, &ledger, 1);
            ledger.fail_reads(Some(Call::GetNextProposalId), "Assertion failed: halted", 1);

            let result = store.load_proposals().await;
            assert!(matches!(result, Err(Error::Ledger(_))));
            assert_eq!(store.snapshot().phase, Phase::Failed);
            assert!(store.snapshot().error.as_ref().unwrap().contains("halted"));

            store.clear_error();
            assert_eq!(store.snapshot().phase, Phase::Idle);
            assert_eq!(store.snapshot().error, None);
        });
    }

    #[test_traced]
    fn test_create_then_load() {
        deterministic::Runner::default().start(|context| async move {
            let ledger = ledger(&context);
            let mut store = store(&context, &ledger, 1);

            let operation = validation::change_threshold("3").unwrap();
            let outcome = store.create_proposal(operation).await.unwrap();
            assert_eq!(outcome.refresh, Ok(()));
            assert_eq!(outcome.value, Assignment::Confirmed(ProposalId::new(1)));

            store.load_proposals().await.unwrap();
            let proposal = store.by_id(ProposalId::new(1)).unwrap();
            assert_eq!(proposal.operation_type(), OperationType::ChangeThreshold);
            assert_eq!(proposal.operation, Operation::ChangeThreshold { threshold: 3 });
        });
    }

    #[test_traced]
    fn test_create_unconfirmed_without_reload() {
        deterministic::Runner::default().start(|context| async move {
            let ledger = ledger(&context);
            ledger.insert(record(1, 0, false));
            let mut store = store(&context, &ledger, 1);

            // The proposal is created but the reload that would confirm its id fails
            ledger.fail_reads_after(
                Some(Call::GetNextProposalId),
                "Assertion failed: halted",
                1,
                1,
            );
            let outcome = store
                .create_proposal(Operation::ChangeThreshold { threshold: 3 })
                .await
                .unwrap();
            assert_eq!(outcome.value, Assignment::Provisional(ProposalId::new(2)));
            assert!(matches!(outcome.refresh, Err(Error::Ledger(_))));
            assert_eq!(store.snapshot().phase, Phase::Failed);
            assert_eq!(ledger.record(2).new_threshold, 3);
        });
    }

    #[test_traced]
    fn test_create_rejects_invalid() {
        deterministic::Runner::default().start(|context| async move {
            let ledger = ledger(&context);
            let mut store = store(&context, &ledger, 1);

            let result = store
                .create_proposal(Operation::ExecuteTransaction {
                    token: Default::default(),
                    recipient: Default::default(),
                    amount: 0,
                })
                .await;
            assert!(matches!(result, Err(Error::Validation(_))));
            assert_eq!(store.snapshot().phase, Phase::Failed);
            assert!(ledger.calls().is_empty());
        });
    }

    #[test_traced]
    fn test_sign_survives_failed_reload() {
        deterministic::Runner::default().start(|context| async move {
            let ledger = ledger(&context);
            ledger.insert(record(1, 0, false));
            let mut store = store(&context, &ledger, 1);
            ledger.fail_reads(Some(Call::GetNextProposalId), "Assertion failed: halted", 1);

            let outcome = store.sign_proposal(ProposalId::new(1)).await.unwrap();
            assert!(matches!(outcome.refresh, Err(Error::Ledger(_))));
            assert_eq!(ledger.record(1).signature_count, 1);
            assert!(store
                .repository()
                .cache()
                .has(&mocks::address(1), ProposalId::new(1)));
            assert_eq!(store.snapshot().phase, Phase::Failed);
            assert!(store.snapshot().error.is_some());

            store.load_proposals().await.unwrap();
            let proposal = store.by_id(ProposalId::new(1)).unwrap();
            assert_eq!(proposal.signed, SignatureHint::Signed);
            assert!(!proposal.can_sign());
        });
    }

    #[test_traced]
    fn test_failed_mutation_still_reloads() {
        deterministic::Runner::default().start(|context| async move {
            let ledger = ledger(&context);
            ledger.insert(record(1, 0, false));
            let mut store = store(&context, &ledger, 1);
            store.sign_proposal(ProposalId::new(1)).await.unwrap();

            let before = ledger.calls().len();
            let result = store.sign_proposal(ProposalId::new(1)).await;
            assert!(matches!(result, Err(Error::Ledger(msg)) if msg.contains("nullifier")));
            assert!(ledger.calls()[before..].contains(&Call::GetNextProposalId));
            assert_eq!(store.snapshot().phase, Phase::Failed);
            assert!(store.snapshot().error.as_ref().unwrap().contains("nullifier"));
            assert_eq!(store.snapshot().proposals.len(), 1);
        });
    }

    #[test_traced]
    fn test_execute_timeout_reveals_outcome() {
        deterministic::Runner::default().start(|context| async move {
            let ledger = ledger(&context);
            ledger.insert(record(1, 2, false));
            let mut store = store(&context, &ledger, 1);
            ledger.stall_writes(true);

            let result = store.execute_proposal(ProposalId::new(1)).await;
            assert!(matches!(result, Err(Error::Timeout(_))));

            // The reload shows what the ledger actually did
            assert_eq!(ids(&store.executed()), vec![1]);
            assert!(ledger.signers().contains(&mocks::address(11)));
        });
    }

    #[test_traced]
    fn test_full_flow() {
        deterministic::Runner::default().start(|context| async move {
            let ledger = ledger(&context);
            let mut alice = store(&context, &ledger, 1);
            let gateway = Gateway::new(
                context.with_label("bob"),
                ledger.clone(),
                ledger.connect(mocks::address(2)),
                Config::new(mocks::address(CONTRACT)),
            );
            let mut bob = Store::new(Repository::new(
                gateway,
                SignatureCache::new(Memory::default()),
            ));

            let operation = validation::add_signer(&mocks::address(4).to_string()).unwrap();
            let id = alice.create_proposal(operation).await.unwrap().value.id();
            alice.sign_proposal(id).await.unwrap();
            assert_eq!(ids(&alice.pending()), vec![1]);

            bob.sign_proposal(id).await.unwrap();
            assert!(bob.by_id(id).unwrap().can_execute());
            bob.execute_proposal(id).await.unwrap();

            let stats = alice.load_stats().await.unwrap();
            assert_eq!(stats.total_signers, 4);
            assert_eq!(stats.executed_proposals, 1);
            assert_eq!(stats.pending_proposals, 0);

            // Nothing is executed without enough signatures
            for snapshot in [alice.snapshot(), bob.snapshot()] {
                assert!(!snapshot.proposals.is_empty());
                for proposal in snapshot.proposals.iter().filter(|p| p.executed) {
                    assert!(proposal.signature_count >= proposal.threshold);
                    assert_eq!(proposal.status(), ProposalStatus::Executed);
                }
            }
            assert_eq!(alice.by_id(id).unwrap().signature_count, 2);
        });
    }

    #[test_traced]
    fn test_settings() {
        deterministic::Runner::default().start(|context| async move {
            let ledger = ledger(&context);
            let mut store = store(&context, &ledger, 1);
            assert_eq!(
                store.load_settings().await.unwrap(),
                Settings {
                    threshold: 2,
                    total_signers: 3,
                    is_signer: true,
                }
            );

            let mut outsider = store_with(
                &context,
                "outsider",
                ledger.connect(mocks::address(9)),
                &ledger,
                Memory::default(),
            );
            assert!(!outsider.load_settings().await.unwrap().is_signer);

            let mut disconnected = store_with(
                &context,
                "disconnected",
                ledger.disconnect(),
                &ledger,
                Memory::default(),
            );
            assert_eq!(
                disconnected.load_settings().await,
                Err(Error::WalletNotConnected)
            );
            assert_eq!(disconnected.snapshot().phase, Phase::Failed);
        });
    }

    #[test_traced]
    fn test_unavailable_cache() {
        deterministic::Runner::default().start(|context| async move {
            let ledger = ledger(&context);
            ledger.insert(record(1, 0, false));
            let mut store = store_with(
                &context,
                "unavailable",
                ledger.connect(mocks::address(1)),
                &ledger,
                Unavailable,
            );

            store.sign_proposal(ProposalId::new(1)).await.unwrap();
            let proposal = store.by_id(ProposalId::new(1)).unwrap();
            assert_eq!(proposal.signed, SignatureHint::Unavailable);
            assert!(proposal.can_sign());
        });
    }
}
