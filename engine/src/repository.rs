//! Assemble [Proposal]s from ledger records and dispatch proposal mutations.

use crate::{
    cache::{Backend, SignatureCache},
    gateway::Gateway,
    ledger::{Call, Node, ProposalRecord, Wallet},
    Error,
};
use commonware_runtime::{Clock, Metrics};
use multisig_model::{Address, Operation, OperationType, Proposal, ProposalId, SignatureHint};
use tracing::{debug, info, warn};

/// Identifier given to a newly created proposal.
///
/// The ledger does not return the id it assigns, so [Repository::create] reads the next id before
/// submitting and reports it as [Assignment::Provisional]. Another proposal created concurrently
/// (by any signer) may take that id instead. It becomes [Assignment::Confirmed] only once a reload
/// shows the same operation stored under it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Assignment {
    Provisional(ProposalId),
    Confirmed(ProposalId),
}

impl Assignment {
    pub fn id(&self) -> ProposalId {
        match self {
            Self::Provisional(id) | Self::Confirmed(id) => *id,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed(_))
    }
}

/// Proposal reads and mutations for one wallet session.
pub struct Repository<E: Clock + Metrics, N: Node, W: Wallet, B: Backend> {
    gateway: Gateway<E, N, W>,
    cache: SignatureCache<B>,
}

impl<E: Clock + Metrics, N: Node, W: Wallet, B: Backend> Repository<E, N, W, B> {
    pub fn new(gateway: Gateway<E, N, W>, cache: SignatureCache<B>) -> Self {
        Self { gateway, cache }
    }

    pub fn cache(&self) -> &SignatureCache<B> {
        &self.cache
    }

    /// The account of the connected wallet.
    pub async fn account(&self) -> Result<Address, Error> {
        self.gateway.account().await
    }

    /// The id the ledger will assign to the next proposal.
    pub async fn next_id(&mut self) -> Result<ProposalId, Error> {
        self.gateway.read(Call::GetNextProposalId).await
    }

    /// The live signature threshold.
    pub async fn threshold(&mut self) -> Result<u32, Error> {
        self.gateway.read(Call::GetThreshold).await
    }

    pub async fn signer_count(&mut self) -> Result<u32, Error> {
        self.gateway.read(Call::GetSignerCount).await
    }

    pub async fn is_signer(&mut self, address: Address) -> Result<bool, Error> {
        self.gateway.read(Call::IsSigner(address)).await
    }

    /// Load a single proposal, capturing the live threshold.
    ///
    /// Returns `None` if no proposal exists at `id`.
    pub async fn load_one(&mut self, id: ProposalId) -> Result<Option<Proposal>, Error> {
        let account = self.account().await?;
        self.fetch(&account, id).await
    }

    /// Load every assigned proposal in increasing id order.
    ///
    /// Each proposal is read only after the previous one resolved. A proposal that fails to load
    /// (including the read of its threshold) is logged and left out of the result.
    pub async fn load_all(&mut self) -> Result<Vec<Proposal>, Error> {
        let account = self.account().await?;
        let next = self.next_id().await?;

        let mut proposals = Vec::new();
        for id in next.assigned() {
            match self.fetch(&account, id).await {
                Ok(Some(proposal)) => proposals.push(proposal),
                Ok(None) => {}
                Err(err) => warn!(%id, ?err, "skipping proposal"),
            }
        }
        debug!(next = %next, loaded = proposals.len(), "loaded proposals");
        Ok(proposals)
    }

    async fn fetch(
        &mut self,
        account: &Address,
        id: ProposalId,
    ) -> Result<Option<Proposal>, Error> {
        let record: ProposalRecord = self.gateway.read(Call::GetProposal(id)).await?;
        if record.operation_type == 0 {
            return Ok(None);
        }
        let threshold = self.threshold().await?;
        let signed = self.cache.hint(account, id);
        assemble(id, record, threshold, signed).map(Some)
    }

    /// Propose `operation` and return the id it is expected to receive.
    ///
    /// The operation is validated before anything is read or submitted.
    pub async fn create(&mut self, operation: Operation) -> Result<Assignment, Error> {
        operation.validate()?;
        let kind = operation.kind();
        let id = self.next_id().await?;
        let receipt = self.gateway.write(operation.into()).await?;
        info!(%id, kind = kind.label(), block = receipt.block, "proposed");
        Ok(Assignment::Provisional(id))
    }

    /// Sign proposal `id` and remember the signature on this device.
    ///
    /// Nothing prevents signing twice locally; the ledger rejects duplicates.
    pub async fn sign(&mut self, id: ProposalId) -> Result<(), Error> {
        let account = self.account().await?;
        let receipt = self.gateway.write(Call::SignProposal(id)).await?;
        info!(%id, block = receipt.block, "signed");
        self.cache.mark(&account, id).await;
        Ok(())
    }

    pub async fn execute(&mut self, id: ProposalId) -> Result<(), Error> {
        let receipt = self.gateway.write(Call::ExecuteProposal(id)).await?;
        info!(%id, block = receipt.block, "executed");
        Ok(())
    }
}

/// Build a [Proposal] from a record of an existing proposal.
fn assemble(
    id: ProposalId,
    record: ProposalRecord,
    threshold: u32,
    signed: SignatureHint,
) -> Result<Proposal, Error> {
    let kind = OperationType::try_from(record.operation_type)
        .map_err(|_| Error::UnexpectedResponse("get_proposal"))?;
    let operation = match kind {
        OperationType::AddSigner => Operation::AddSigner {
            signer: record.target_address,
        },
        OperationType::RemoveSigner => Operation::RemoveSigner {
            signer: record.target_address,
        },
        OperationType::ChangeThreshold => Operation::ChangeThreshold {
            threshold: record.new_threshold,
        },
        OperationType::ExecuteTransaction => Operation::ExecuteTransaction {
            token: record.transaction_token,
            recipient: record.transaction_recipient,
            amount: record.transaction_amount,
        },
    };
    Ok(Proposal {
        id,
        operation,
        signature_count: record.signature_count,
        threshold,
        executed: record.executed,
        proposer: (!record.proposer.is_zero()).then_some(record.proposer),
        created_at: (record.created_at != 0).then_some(record.created_at),
        signed,
    })
}
