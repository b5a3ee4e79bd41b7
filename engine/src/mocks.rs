//! An in-memory multisig ledger for testing and simulation.
//!
//! [Ledger] implements both [Node] and [Wallet] over a shared contract state. Each handle carries
//! its own connected account (see [Ledger::connect]), so several signers can act on the same
//! contract. Faults can be injected per call, and the handle records every call it served along
//! with the highest number of calls observed in flight at once.

use crate::ledger::{
    Call, Failure, Instance, Node, ProposalRecord, Receipt, TxHash, Value, Wallet,
};
use commonware_runtime::Clock;
use multisig_model::{Address, OperationType};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::{
    collections::{BTreeMap, BTreeSet, HashMap, HashSet},
    sync::{Arc, Mutex},
    time::Duration,
};

/// Maximum number of signers the contract accepts.
pub const MAX_SIGNERS: usize = 20;

/// Message reported for a simulated storage race.
pub const STORAGE_RACE: &str =
    "Failed to execute 'put' on 'IDBObjectStore': The transaction is not active.";

/// Deterministic address derived from `seed`.
pub fn address(seed: u8) -> Address {
    Address::new([seed; Address::LENGTH])
}

/// A failure to report for matching calls.
struct Fault {
    /// Matches every call when `None`.
    call: Option<Call>,
    message: String,
    /// Matching calls to let through before failing.
    skip: usize,
    remaining: usize,
}

impl Fault {
    fn take(faults: &mut [Fault], call: &Call) -> Option<Failure> {
        let fault = faults.iter_mut().find(|f| {
            f.remaining > 0 && f.call.as_ref().map_or(true, |expected| expected == call)
        })?;
        if fault.skip > 0 {
            fault.skip -= 1;
            return None;
        }
        fault.remaining -= 1;
        Some(Failure::new(fault.message.clone()))
    }
}

struct State {
    contract: Address,
    registered: bool,
    registrations: usize,

    signers: BTreeSet<Address>,
    threshold: u32,
    next_id: u64,
    proposals: BTreeMap<u64, ProposalRecord>,
    nullifiers: HashSet<(Address, u64)>,
    height: u64,
    included: HashMap<TxHash, u64>,

    latency: Duration,
    read_faults: Vec<Fault>,
    write_faults: Vec<Fault>,
    stalled: bool,
    transient_rate: f64,
    rng: StdRng,

    calls: Vec<Call>,
    in_flight: usize,
    max_in_flight: usize,
}

impl State {
    fn record(&self, id: u64) -> ProposalRecord {
        self.proposals.get(&id).cloned().unwrap_or_default()
    }

    fn view(&mut self, contract: Address, call: Call) -> Result<Value, Failure> {
        self.calls.push(call.clone());
        if let Some(failure) = Fault::take(&mut self.read_faults, &call) {
            return Err(failure);
        }
        if self.transient_rate > 0.0 && self.rng.gen_bool(self.transient_rate) {
            return Err(Failure::new(STORAGE_RACE));
        }
        if !self.registered || contract != self.contract {
            return Err(Failure::new(format!("contract {contract} not registered")));
        }
        match call {
            Call::GetNextProposalId => Ok(Value::Integer(self.next_id.into())),
            Call::GetProposal(id) => Ok(Value::Proposal(self.record(id.get()))),
            Call::GetThreshold => Ok(Value::Integer(self.threshold.into())),
            Call::GetSignerCount => Ok(Value::Integer(self.signers.len() as u128)),
            Call::IsSigner(address) => Ok(Value::Bool(self.signers.contains(&address))),
            other => Err(Failure::new(format!(
                "{} is not a view function",
                other.method()
            ))),
        }
    }

    fn submit(&mut self, from: Address, contract: Address, call: Call) -> Result<TxHash, Failure> {
        self.calls.push(call.clone());
        if let Some(failure) = Fault::take(&mut self.write_faults, &call) {
            return Err(failure);
        }
        if !self.registered || contract != self.contract {
            return Err(Failure::new(format!("contract {contract} not registered")));
        }
        if !self.signers.contains(&from) {
            return Err(Failure::new("Assertion failed: caller is not a signer"));
        }
        match call {
            Call::ProposeAddSigner(target) => {
                self.propose(from, OperationType::AddSigner, |r| r.target_address = target)
            }
            Call::ProposeRemoveSigner(target) => {
                self.propose(from, OperationType::RemoveSigner, |r| r.target_address = target)
            }
            Call::ProposeChangeThreshold(threshold) => {
                if threshold == 0 {
                    return Err(Failure::new("Assertion failed: threshold must be positive"));
                }
                self.propose(from, OperationType::ChangeThreshold, |r| {
                    r.new_threshold = threshold
                })
            }
            Call::ProposeExecuteTransaction {
                token,
                recipient,
                amount,
            } => self.propose(from, OperationType::ExecuteTransaction, |r| {
                r.transaction_token = token;
                r.transaction_recipient = recipient;
                r.transaction_amount = amount;
            }),
            Call::SignProposal(id) => self.sign(from, id.get())?,
            Call::ExecuteProposal(id) => self.execute(id.get())?,
            other => {
                return Err(Failure::new(format!(
                    "{} cannot be sent",
                    other.method()
                )))
            }
        }
        self.height += 1;
        let mut hash = [0u8; 32];
        hash[24..].copy_from_slice(&self.height.to_be_bytes());
        let tx = TxHash::new(hash);
        self.included.insert(tx, self.height);
        Ok(tx)
    }

    fn propose(
        &mut self,
        proposer: Address,
        operation: OperationType,
        fill: impl FnOnce(&mut ProposalRecord),
    ) {
        let id = self.next_id;
        let mut record = ProposalRecord {
            proposal_id: id,
            operation_type: operation.into(),
            proposer,
            created_at: self.height,
            ..Default::default()
        };
        fill(&mut record);
        self.proposals.insert(id, record);
        self.next_id += 1;
    }

    fn sign(&mut self, signer: Address, id: u64) -> Result<(), Failure> {
        let record = self
            .proposals
            .get_mut(&id)
            .ok_or_else(|| Failure::new("Assertion failed: proposal does not exist"))?;
        if record.executed {
            return Err(Failure::new("Assertion failed: proposal already executed"));
        }
        if !self.nullifiers.insert((signer, id)) {
            return Err(Failure::new("Assertion failed: nullifier already exists"));
        }
        record.signature_count += 1;
        Ok(())
    }

    fn execute(&mut self, id: u64) -> Result<(), Failure> {
        let record = self
            .proposals
            .get(&id)
            .cloned()
            .ok_or_else(|| Failure::new("Assertion failed: proposal does not exist"))?;
        if record.executed {
            return Err(Failure::new("Assertion failed: proposal already executed"));
        }
        if record.signature_count < self.threshold {
            return Err(Failure::new("Assertion failed: not enough signatures"));
        }
        match OperationType::try_from(record.operation_type) {
            Ok(OperationType::AddSigner) => {
                if self.signers.len() >= MAX_SIGNERS {
                    return Err(Failure::new("Assertion failed: too many signers"));
                }
                self.signers.insert(record.target_address);
            }
            Ok(OperationType::RemoveSigner) => {
                if self.signers.len() <= self.threshold as usize {
                    return Err(Failure::new("Assertion failed: would drop below threshold"));
                }
                self.signers.remove(&record.target_address);
            }
            Ok(OperationType::ChangeThreshold) => {
                if record.new_threshold as usize > self.signers.len() {
                    return Err(Failure::new("Assertion failed: threshold exceeds signers"));
                }
                self.threshold = record.new_threshold;
            }
            Ok(OperationType::ExecuteTransaction) => {}
            Err(_) => return Err(Failure::new("Assertion failed: unknown operation")),
        }
        if let Some(record) = self.proposals.get_mut(&id) {
            record.executed = true;
        }
        Ok(())
    }
}

/// A handle to an in-memory multisig contract, connected as one account.
#[derive(Clone)]
pub struct Ledger<E: Clock> {
    context: E,
    account: Option<Address>,
    state: Arc<Mutex<State>>,
}

impl<E: Clock> Ledger<E> {
    /// Deploy a multisig at `contract` governed by `signers` and `threshold`.
    ///
    /// The returned handle is not connected to any account.
    pub fn new(
        context: E,
        contract: Address,
        signers: impl IntoIterator<Item = Address>,
        threshold: u32,
    ) -> Self {
        let state = State {
            contract,
            registered: false,
            registrations: 0,
            signers: signers.into_iter().collect(),
            threshold,
            next_id: 1,
            proposals: BTreeMap::new(),
            nullifiers: HashSet::new(),
            height: 0,
            included: HashMap::new(),
            latency: Duration::from_millis(10),
            read_faults: Vec::new(),
            write_faults: Vec::new(),
            stalled: false,
            transient_rate: 0.0,
            rng: StdRng::seed_from_u64(0),
            calls: Vec::new(),
            in_flight: 0,
            max_in_flight: 0,
        };
        Self {
            context,
            account: None,
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// A handle to the same contract connected as `account`.
    pub fn connect(&self, account: Address) -> Self {
        Self {
            context: self.context.clone(),
            account: Some(account),
            state: self.state.clone(),
        }
    }

    /// A handle to the same contract with no connected account.
    pub fn disconnect(&self) -> Self {
        Self {
            context: self.context.clone(),
            account: None,
            state: self.state.clone(),
        }
    }

    /// Set how long every call takes to resolve.
    pub fn set_latency(&self, latency: Duration) {
        self.state().latency = latency;
    }

    /// Fail the next `times` reads matching `call` (any read if `None`) with `message`.
    pub fn fail_reads(&self, call: Option<Call>, message: &str, times: usize) {
        self.fail_reads_after(call, message, 0, times);
    }

    /// Like [Ledger::fail_reads], but only after `skip` matching reads succeeded.
    pub fn fail_reads_after(&self, call: Option<Call>, message: &str, skip: usize, times: usize) {
        self.state().read_faults.push(Fault {
            call,
            message: message.to_string(),
            skip,
            remaining: times,
        });
    }

    /// Reject the next `times` submissions with `message`.
    pub fn fail_writes(&self, message: &str, times: usize) {
        self.state().write_faults.push(Fault {
            call: None,
            message: message.to_string(),
            skip: 0,
            remaining: times,
        });
    }

    /// Fail each read with a storage race with probability `rate`.
    pub fn set_transient_rate(&self, rate: f64, seed: u64) {
        let mut state = self.state();
        state.transient_rate = rate.clamp(0.0, 1.0);
        state.rng = StdRng::seed_from_u64(seed);
    }

    /// Apply submitted transactions but never report their inclusion.
    pub fn stall_writes(&self, stalled: bool) {
        self.state().stalled = stalled;
    }

    /// Store `record` directly, bypassing proposal and signing rules.
    pub fn insert(&self, record: ProposalRecord) {
        let mut state = self.state();
        state.next_id = state.next_id.max(record.proposal_id + 1);
        state.proposals.insert(record.proposal_id, record);
    }

    /// Change the live threshold directly.
    pub fn set_threshold(&self, threshold: u32) {
        self.state().threshold = threshold;
    }

    pub fn threshold(&self) -> u32 {
        self.state().threshold
    }

    pub fn signers(&self) -> Vec<Address> {
        self.state().signers.iter().copied().collect()
    }

    pub fn record(&self, id: u64) -> ProposalRecord {
        self.state().record(id)
    }

    /// Every call served so far, in order.
    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    /// Number of times the contract was registered with a wallet.
    pub fn registrations(&self) -> usize {
        self.state().registrations
    }

    /// Highest number of calls in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.state().max_in_flight
    }

    /// Reject calls made on behalf of an account other than the connected one.
    fn authorize(&self, from: Address) -> Result<(), Failure> {
        match self.account {
            Some(account) if account == from => Ok(()),
            _ => Err(Failure::new(format!("account {from} is not connected"))),
        }
    }

    fn enter(&self) -> Duration {
        let mut state = self.state();
        state.in_flight += 1;
        state.max_in_flight = state.max_in_flight.max(state.in_flight);
        state.latency
    }

    fn exit(&self) {
        self.state().in_flight -= 1;
    }
}

impl<E: Clock> Node for Ledger<E> {
    async fn contract(&self, address: Address) -> Result<Option<Instance>, Failure> {
        let contract = self.state().contract;
        Ok((address == contract).then_some(Instance { address }))
    }
}

impl<E: Clock> Wallet for Ledger<E> {
    async fn account(&self) -> Result<Option<Address>, Failure> {
        Ok(self.account)
    }

    async fn register(&mut self, instance: Instance) -> Result<(), Failure> {
        let mut state = self.state();
        if instance.address != state.contract {
            return Err(Failure::new(format!(
                "no contract at {}",
                instance.address
            )));
        }
        state.registered = true;
        state.registrations += 1;
        Ok(())
    }

    async fn simulate(
        &mut self,
        from: Address,
        contract: Address,
        call: Call,
    ) -> Result<Value, Failure> {
        self.authorize(from)?;
        let latency = self.enter();
        self.context.sleep(latency).await;
        let result = self.state().view(contract, call);
        self.exit();
        result
    }

    async fn send(
        &mut self,
        from: Address,
        contract: Address,
        call: Call,
    ) -> Result<TxHash, Failure> {
        self.authorize(from)?;
        let latency = self.enter();
        self.context.sleep(latency).await;
        let result = self.state().submit(from, contract, call);
        self.exit();
        result
    }

    async fn wait(&mut self, tx: TxHash) -> Result<Receipt, Failure> {
        let (latency, stalled, block) = {
            let state = self.state();
            (state.latency, state.stalled, state.included.get(&tx).copied())
        };
        if stalled {
            futures::future::pending::<()>().await;
        }
        self.context.sleep(latency).await;
        let block = block.ok_or_else(|| Failure::new(format!("unknown transaction {tx}")))?;
        Ok(Receipt { tx, block })
    }
}
