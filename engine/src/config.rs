use crate::{gateway, Error};
use multisig_model::Address;
use serde::{Deserialize, Serialize};
use std::{path::Path, time::Duration};

/// Client configuration, as loaded from a JSON file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Textual address of the multisig contract.
    pub contract: String,

    #[serde(default = "default_read_attempts")]
    pub read_attempts: u32,

    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,

    /// Storage partition backing the signature cache. Signatures are only kept in memory if unset.
    #[serde(default)]
    pub cache_partition: Option<String>,
}

fn default_read_attempts() -> u32 {
    gateway::DEFAULT_READ_ATTEMPTS
}

fn default_retry_base_delay_ms() -> u64 {
    gateway::DEFAULT_RETRY_BASE_DELAY.as_millis() as u64
}

fn default_write_timeout_ms() -> u64 {
    gateway::DEFAULT_WRITE_TIMEOUT.as_millis() as u64
}

impl Config {
    /// Parse and validate a JSON configuration.
    pub fn parse(raw: &str) -> Result<Self, Error> {
        let config: Self = serde_json::from_str(raw).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse, and validate a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        Self::parse(&raw)
    }

    pub fn validate(&self) -> Result<(), Error> {
        self.contract_address()?;
        if self.read_attempts == 0 {
            return Err(Error::Config("read_attempts must be at least 1".into()));
        }
        if let Some(partition) = &self.cache_partition {
            let valid = !partition.is_empty()
                && partition
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
            if !valid {
                return Err(Error::Config(format!(
                    "invalid cache_partition {partition:?} (use ASCII letters, digits, '-' or '_')"
                )));
            }
        }
        Ok(())
    }

    pub fn contract_address(&self) -> Result<Address, Error> {
        self.contract
            .trim()
            .parse()
            .map_err(|e: multisig_model::Error| Error::Config(e.to_string()))
    }

    /// Settings for a [gateway::Gateway].
    pub fn gateway(&self) -> Result<gateway::Config, Error> {
        Ok(gateway::Config {
            contract: self.contract_address()?,
            read_attempts: self.read_attempts,
            retry_base_delay: Duration::from_millis(self.retry_base_delay_ms),
            write_timeout: Duration::from_millis(self.write_timeout_ms),
        })
    }
}
