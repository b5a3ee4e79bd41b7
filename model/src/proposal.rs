use crate::{Address, Error, EthAddress};
use std::fmt;

/// Ledger-assigned identifier of a proposal.
///
/// Identifiers start at `1` and increase monotonically. `0` never identifies a proposal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProposalId(u64);

impl ProposalId {
    /// The first identifier the ledger assigns.
    pub const FIRST: Self = Self(1);

    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn get(self) -> u64 {
        self.0
    }

    /// Returns all identifiers assigned before `self` (when `self` is the ledger's next id).
    pub fn assigned(self) -> impl Iterator<Item = ProposalId> {
        (Self::FIRST.0..self.0).map(Self)
    }
}

impl From<u64> for ProposalId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for ProposalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of governed action a proposal performs.
///
/// The discriminants match the ledger encoding. `0` is reserved for "no proposal" and has no
/// variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum OperationType {
    AddSigner = 1,
    RemoveSigner = 2,
    ChangeThreshold = 3,
    ExecuteTransaction = 4,
}

impl OperationType {
    /// Human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::AddSigner => "Add Signer",
            Self::RemoveSigner => "Remove Signer",
            Self::ChangeThreshold => "Change Threshold",
            Self::ExecuteTransaction => "Execute Transaction",
        }
    }
}

impl TryFrom<u8> for OperationType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::AddSigner),
            2 => Ok(Self::RemoveSigner),
            3 => Ok(Self::ChangeThreshold),
            4 => Ok(Self::ExecuteTransaction),
            other => Err(Error::UnknownOperationType(other)),
        }
    }
}

impl From<OperationType> for u8 {
    fn from(value: OperationType) -> Self {
        value as u8
    }
}

/// A governed action together with the fields its mutation requires.
///
/// This is both the payload of a loaded [Proposal] and the only accepted input when creating one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Operation {
    AddSigner {
        signer: Address,
    },
    RemoveSigner {
        signer: Address,
    },
    ChangeThreshold {
        threshold: u32,
    },
    ExecuteTransaction {
        token: EthAddress,
        recipient: EthAddress,
        amount: u128,
    },
}

impl Operation {
    pub fn kind(&self) -> OperationType {
        match self {
            Self::AddSigner { .. } => OperationType::AddSigner,
            Self::RemoveSigner { .. } => OperationType::RemoveSigner,
            Self::ChangeThreshold { .. } => OperationType::ChangeThreshold,
            Self::ExecuteTransaction { .. } => OperationType::ExecuteTransaction,
        }
    }

    /// Check the invariants that the type system does not.
    pub fn validate(&self) -> Result<(), Error> {
        match self {
            Self::ChangeThreshold { threshold: 0 } => Err(Error::InvalidThreshold("0".into())),
            Self::ExecuteTransaction { amount: 0, .. } => Err(Error::InvalidAmount("0".into())),
            _ => Ok(()),
        }
    }
}

/// Workflow status of a proposal, derived from its fields.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProposalStatus {
    Pending,
    Ready,
    Executed,
    Expired,
}

impl fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = match self {
            Self::Pending => "pending",
            Self::Ready => "ready",
            Self::Executed => "executed",
            Self::Expired => "expired",
        };
        f.write_str(status)
    }
}

/// Derive the [ProposalStatus] of a proposal.
pub fn status(executed: bool, signature_count: u32, threshold: u32) -> ProposalStatus {
    if executed {
        return ProposalStatus::Executed;
    }
    if signature_count >= threshold {
        return ProposalStatus::Ready;
    }
    ProposalStatus::Pending
}

/// Whether the current account signed a proposal, according to the device-local cache.
///
/// This is a hint for gating UI actions. The ledger's nullifiers are the only authority on
/// whether a signature exists.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SignatureHint {
    Signed,
    #[default]
    NotSigned,
    /// The cache could not be read.
    Unavailable,
}

/// A proposal as observed on the ledger.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Proposal {
    pub id: ProposalId,
    pub operation: Operation,

    /// Number of signatures collected (never decreases).
    pub signature_count: u32,

    /// Quorum requirement captured when the proposal was loaded. This may differ from the live
    /// threshold if it changed since.
    pub threshold: u32,

    /// Once set, never reverts.
    pub executed: bool,

    pub proposer: Option<Address>,
    pub created_at: Option<u64>,

    /// Local hint of whether the current account already signed.
    pub signed: SignatureHint,
}

impl Proposal {
    pub fn operation_type(&self) -> OperationType {
        self.operation.kind()
    }

    pub fn status(&self) -> ProposalStatus {
        status(self.executed, self.signature_count, self.threshold)
    }

    /// Whether a sign action should be offered to the current account.
    ///
    /// A `false` hint does not prevent the ledger from rejecting a duplicate signature.
    pub fn can_sign(&self) -> bool {
        !self.executed
            && self.status() == ProposalStatus::Pending
            && self.signed != SignatureHint::Signed
    }

    /// Whether an execute action should be offered.
    pub fn can_execute(&self) -> bool {
        !self.executed && self.status() == ProposalStatus::Ready
    }
}

/// Aggregate counts over every proposal of a multisig.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Stats {
    /// Live threshold at the time the stats were computed.
    pub threshold: u32,
    pub total_signers: u32,

    /// Unexecuted proposals below the live threshold.
    pub pending_proposals: usize,
    pub executed_proposals: usize,

    /// Number of identifiers the ledger has assigned.
    pub total_proposals: u64,
}

impl Stats {
    /// Compute stats from a full sweep of proposals.
    ///
    /// Pending proposals are counted against the live `threshold`, not each proposal's captured
    /// threshold.
    pub fn compute(
        threshold: u32,
        total_signers: u32,
        next_id: ProposalId,
        proposals: &[Proposal],
    ) -> Self {
        let pending_proposals = proposals
            .iter()
            .filter(|p| !p.executed && p.signature_count < threshold)
            .count();
        let executed_proposals = proposals.iter().filter(|p| p.executed).count();
        Self {
            threshold,
            total_signers,
            pending_proposals,
            executed_proposals,
            total_proposals: next_id.get().saturating_sub(1),
        }
    }
}
