//! Parse raw caller input into an [Operation].
//!
//! Every constructor rejects malformed input with an [Error] before anything is submitted to the
//! ledger.

use crate::{Address, Error, EthAddress, Operation};

/// Build an [Operation::AddSigner] from a textual address.
pub fn add_signer(signer: &str) -> Result<Operation, Error> {
    let signer: Address = signer.trim().parse()?;
    Ok(Operation::AddSigner { signer })
}

/// Build an [Operation::RemoveSigner] from a textual address.
pub fn remove_signer(signer: &str) -> Result<Operation, Error> {
    let signer: Address = signer.trim().parse()?;
    Ok(Operation::RemoveSigner { signer })
}

/// Build an [Operation::ChangeThreshold] from a textual integer.
pub fn change_threshold(threshold: &str) -> Result<Operation, Error> {
    let threshold: u32 = threshold
        .trim()
        .parse()
        .map_err(|_| Error::InvalidThreshold(threshold.to_string()))?;
    let operation = Operation::ChangeThreshold { threshold };
    operation.validate()?;
    Ok(operation)
}

/// Build an [Operation::ExecuteTransaction] from textual addresses and an integer amount (in
/// the token's smallest unit).
pub fn execute_transaction(
    token: &str,
    recipient: &str,
    amount: &str,
) -> Result<Operation, Error> {
    let token: EthAddress = token.trim().parse()?;
    let recipient: EthAddress = recipient.trim().parse()?;
    let amount: u128 = amount
        .trim()
        .parse()
        .map_err(|_| Error::InvalidAmount(amount.to_string()))?;
    let operation = Operation::ExecuteTransaction {
        token,
        recipient,
        amount,
    };
    operation.validate()?;
    Ok(operation)
}
