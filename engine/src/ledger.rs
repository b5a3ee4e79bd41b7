//! Interfaces to the external node and wallet session.
//!
//! The engine never talks to a ledger directly. A [Node] resolves the deployed contract and a
//! [Wallet] (the active session of a wallet extension) simulates and submits [Call]s on behalf of
//! its account. Both report failures as raw [Failure] messages; classification into transient or
//! permanent errors is done by [crate::gateway::Gateway].

use commonware_utils::hex;
use multisig_model::{Address, EthAddress, Operation, ProposalId};
use std::{fmt, future::Future};

/// A failure reported by the node or wallet, described only by its message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Failure(String);

impl Failure {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    pub fn message(&self) -> &str {
        &self.0
    }

    pub fn into_message(self) -> String {
        self.0
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A deployed contract as known by the node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Instance {
    pub address: Address,
}

/// Hash of a submitted transaction.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxHash([u8; 32]);

impl TxHash {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex(&self.0))
    }
}

impl fmt::Debug for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Proof that a transaction was included.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Receipt {
    pub tx: TxHash,
    pub block: u64,
}

/// A contract method invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    GetNextProposalId,
    GetProposal(ProposalId),
    GetThreshold,
    GetSignerCount,
    IsSigner(Address),
    ProposeAddSigner(Address),
    ProposeRemoveSigner(Address),
    ProposeChangeThreshold(u32),
    ProposeExecuteTransaction {
        token: EthAddress,
        recipient: EthAddress,
        amount: u128,
    },
    SignProposal(ProposalId),
    ExecuteProposal(ProposalId),
}

impl Call {
    /// Name of the contract method.
    pub fn method(&self) -> &'static str {
        match self {
            Self::GetNextProposalId => "get_next_proposal_id",
            Self::GetProposal(_) => "get_proposal",
            Self::GetThreshold => "get_threshold",
            Self::GetSignerCount => "get_signer_count",
            Self::IsSigner(_) => "is_signer",
            Self::ProposeAddSigner(_) => "propose_add_signer",
            Self::ProposeRemoveSigner(_) => "propose_remove_signer",
            Self::ProposeChangeThreshold(_) => "propose_change_threshold",
            Self::ProposeExecuteTransaction { .. } => "propose_execute_transaction",
            Self::SignProposal(_) => "sign_proposal",
            Self::ExecuteProposal(_) => "execute_proposal",
        }
    }
}

impl From<Operation> for Call {
    fn from(operation: Operation) -> Self {
        match operation {
            Operation::AddSigner { signer } => Self::ProposeAddSigner(signer),
            Operation::RemoveSigner { signer } => Self::ProposeRemoveSigner(signer),
            Operation::ChangeThreshold { threshold } => Self::ProposeChangeThreshold(threshold),
            Operation::ExecuteTransaction {
                token,
                recipient,
                amount,
            } => Self::ProposeExecuteTransaction {
                token,
                recipient,
                amount,
            },
        }
    }
}

/// A proposal exactly as the contract stores it.
///
/// Fields that do not apply to the proposal's operation are zeroed. A record with
/// `operation_type == 0` means no proposal exists at the requested id.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProposalRecord {
    pub proposal_id: u64,
    pub operation_type: u8,
    pub proposer: Address,
    pub target_address: Address,
    pub new_threshold: u32,
    pub transaction_token: EthAddress,
    pub transaction_recipient: EthAddress,
    pub transaction_amount: u128,
    pub signature_count: u32,
    pub executed: bool,
    pub created_at: u64,
}

/// Result of simulating a view call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Value {
    Integer(u128),
    Bool(bool),
    Proposal(ProposalRecord),
}

/// Conversion from a simulated [Value] into the type a caller expects.
pub trait FromValue: Sized {
    /// Returns `None` if the value has the wrong shape.
    fn from_value(value: Value) -> Option<Self>;
}

impl FromValue for u64 {
    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Integer(v) => v.try_into().ok(),
            _ => None,
        }
    }
}

impl FromValue for u32 {
    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Integer(v) => v.try_into().ok(),
            _ => None,
        }
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Bool(v) => Some(v),
            _ => None,
        }
    }
}

impl FromValue for ProposalId {
    fn from_value(value: Value) -> Option<Self> {
        u64::from_value(value).map(ProposalId::new)
    }
}

impl FromValue for ProposalRecord {
    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Proposal(record) => Some(record),
            _ => None,
        }
    }
}

/// Node that hosts deployed contracts.
pub trait Node: Clone + Send + Sync + 'static {
    /// Look up the contract deployed at `address`.
    fn contract(
        &self,
        address: Address,
    ) -> impl Future<Output = Result<Option<Instance>, Failure>> + Send;
}

/// An active wallet session.
pub trait Wallet: Clone + Send + Sync + 'static {
    /// The connected account, if any.
    fn account(&self) -> impl Future<Output = Result<Option<Address>, Failure>> + Send;

    /// Make a contract known to the wallet so it can build calls against it.
    fn register(&mut self, instance: Instance) -> impl Future<Output = Result<(), Failure>> + Send;

    /// Evaluate a view call without submitting anything.
    fn simulate(
        &mut self,
        from: Address,
        contract: Address,
        call: Call,
    ) -> impl Future<Output = Result<Value, Failure>> + Send;

    /// Sign and submit a call as a transaction.
    fn send(
        &mut self,
        from: Address,
        contract: Address,
        call: Call,
    ) -> impl Future<Output = Result<TxHash, Failure>> + Send;

    /// Wait until a submitted transaction is included.
    ///
    /// This may never resolve; callers bound it with their own deadline.
    fn wait(&mut self, tx: TxHash) -> impl Future<Output = Result<Receipt, Failure>> + Send;
}
