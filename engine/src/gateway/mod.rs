//! Reliable access to the multisig contract through a wallet session.
//!
//! The [Gateway] resolves and registers the contract once per session, retries reads that fail
//! because of transient wallet storage races, and bounds every write with a deadline.
//!
//! # Reads
//!
//! A read is simulated at most [Config::read_attempts] times. Only failures classified as
//! [Error::TransientStorage] are retried; the wait before retry `n` (starting at 1) is
//! `retry_base_delay * 2^(n-1)`. Any other failure is returned immediately.
//!
//! # Writes
//!
//! A write is submitted once and never retried. If inclusion is not observed within
//! [Config::write_timeout], [Error::Timeout] is returned. The transaction may still be included
//! later, so callers should reload state rather than assume the write was dropped.

use crate::{
    ledger::{Call, FromValue, Instance, Node, Receipt, Wallet},
    Error,
};
use commonware_macros::select;
use commonware_runtime::{Clock, Metrics as RuntimeMetrics};
use multisig_model::Address;
use std::time::Duration;
use tracing::{debug, info, warn};

mod config;
pub use config::*;
mod metrics;

/// Access to a single multisig contract through a wallet session.
pub struct Gateway<E: Clock + RuntimeMetrics, N: Node, W: Wallet> {
    context: E,
    node: N,
    wallet: W,
    cfg: Config,

    instance: Option<Instance>,

    metrics: metrics::Metrics,
}

impl<E: Clock + RuntimeMetrics, N: Node, W: Wallet> Gateway<E, N, W> {
    /// Create a new gateway. The contract is not resolved until the first call.
    pub fn new(context: E, node: N, wallet: W, cfg: Config) -> Self {
        let metrics = metrics::Metrics::init(context.clone());
        Self {
            context,
            node,
            wallet,
            cfg,
            instance: None,
            metrics,
        }
    }

    /// Address of the contract this gateway talks to.
    pub fn contract(&self) -> Address {
        self.cfg.contract
    }

    /// The account of the connected wallet.
    pub async fn account(&self) -> Result<Address, Error> {
        self.wallet
            .account()
            .await
            .map_err(Error::from)?
            .ok_or(Error::WalletNotConnected)
    }

    /// Resolve the contract and register it with the wallet, once per gateway.
    async fn bind(&mut self) -> Result<(), Error> {
        if self.instance.is_some() {
            return Ok(());
        }
        let address = self.cfg.contract;
        let instance = self
            .node
            .contract(address)
            .await?
            .ok_or(Error::ContractNotFound(address))?;
        self.wallet.register(instance.clone()).await?;
        info!(contract = %address, "registered contract");
        self.instance = Some(instance);
        Ok(())
    }

    /// Delay before retry `attempt` (starting at 1).
    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.cfg.retry_base_delay.saturating_mul(factor)
    }

    /// Simulate a view call, retrying transient failures.
    pub async fn read<T: FromValue>(&mut self, call: Call) -> Result<T, Error> {
        let from = self.account().await?;
        self.bind().await?;
        let contract = self.cfg.contract;
        let method = call.method();
        let attempts = self.cfg.read_attempts.max(1);
        let mut attempt = 1;
        loop {
            self.metrics.reads.inc();
            let error = match self.wallet.simulate(from, contract, call.clone()).await {
                Ok(value) => return T::from_value(value).ok_or(Error::UnexpectedResponse(method)),
                Err(failure) => Error::from_read(failure),
            };
            if !error.is_transient() || attempt >= attempts {
                debug!(method, attempt, ?error, "read failed");
                return Err(error);
            }
            let delay = self.backoff(attempt);
            debug!(method, attempt, ?delay, ?error, "retrying read");
            self.metrics.retries.inc();
            self.context.sleep(delay).await;
            attempt += 1;
        }
    }

    /// Submit a call as a transaction and wait for its inclusion.
    pub async fn write(&mut self, call: Call) -> Result<Receipt, Error> {
        let from = self.account().await?;
        self.bind().await?;
        let contract = self.cfg.contract;
        let method = call.method();

        self.metrics.writes.inc();
        let tx = self.wallet.send(from, contract, call).await?;
        debug!(method, %tx, "submitted");

        let deadline = self.cfg.write_timeout;
        select! {
            result = self.wallet.wait(tx) => {
                let receipt = result?;
                debug!(method, %tx, block = receipt.block, "included");
                Ok(receipt)
            },
            _ = self.context.sleep(deadline) => {
                self.metrics.timeouts.inc();
                warn!(method, %tx, ?deadline, "inclusion not observed");
                Err(Error::Timeout(tx))
            },
        }
    }
}
