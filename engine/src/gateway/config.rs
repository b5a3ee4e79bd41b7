use multisig_model::Address;
use std::time::Duration;

/// Default number of attempts for a read (including the first).
pub const DEFAULT_READ_ATTEMPTS: u32 = 3;

/// Default delay before the first retry of a read.
pub const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_millis(100);

/// Default time to wait for a submitted transaction to be included.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(120);

/// Configuration for the [`Gateway`](super::Gateway).
#[derive(Clone, Debug)]
pub struct Config {
    /// Address of the multisig contract.
    pub contract: Address,

    /// Maximum number of attempts for a read that fails transiently. Values below `1` are treated
    /// as `1`.
    pub read_attempts: u32,

    /// Delay before the first retry. Each subsequent retry doubles it.
    pub retry_base_delay: Duration,

    /// How long to wait for a submitted transaction to be included before giving up.
    pub write_timeout: Duration,
}

impl Config {
    /// Create a configuration for `contract` with default retry and timeout settings.
    pub fn new(contract: Address) -> Self {
        Self {
            contract,
            read_attempts: DEFAULT_READ_ATTEMPTS,
            retry_base_delay: DEFAULT_RETRY_BASE_DELAY,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }
}
