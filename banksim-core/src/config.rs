//! Configuration for the banking core

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// Banking core configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// RocksDB configuration
    pub rocksdb: RocksDBConfig,

    /// Ledger engine configuration
    pub ledger: LedgerConfig,

    /// Backoff used when the transaction log write must be retried
    pub retry: RetryConfig,

    /// Notification dispatch configuration
    pub notifications: NotificationConfig,

    /// PIN hashing configuration
    pub security: SecurityConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/banksim"),
            service_name: "banksim-core".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            rocksdb: RocksDBConfig::default(),
            ledger: LedgerConfig::default(),
            retry: RetryConfig::default(),
            notifications: NotificationConfig::default(),
            security: SecurityConfig::default(),
        }
    }
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RocksDBConfig {
    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max write buffers
    pub max_write_buffer_number: i32,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,

    /// fsync the WAL on every commit batch
    pub sync_writes: bool,

    /// Enable statistics
    pub enable_statistics: bool,
}

impl Default for RocksDBConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 64,
            max_write_buffer_number: 4,
            max_background_jobs: 4,
            sync_writes: true,
            enable_statistics: false,
        }
    }
}

/// Ledger engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Smallest balance an account may be opened with
    pub min_opening_balance: Decimal,

    /// Largest amount accepted for a single transfer, deposit or opening balance
    pub max_amount: Decimal,

    /// Maximum wait for an account lock (milliseconds)
    pub lock_timeout_ms: u64,

    /// How long a transfer waits for its log rows before returning (milliseconds)
    pub log_wait_ms: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            min_opening_balance: Decimal::new(5000, 2), // 50.00
            max_amount: Decimal::new(100_000_000_000, 2), // 1,000,000,000.00
            lock_timeout_ms: 5_000,
            log_wait_ms: 2_000,
        }
    }
}

/// Exponential backoff configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Delay before the first retry (milliseconds)
    pub initial_delay_ms: u64,

    /// Upper bound on any single delay (milliseconds)
    pub max_delay_ms: u64,

    /// Growth factor per attempt
    pub backoff_multiplier: f64,

    /// Fraction of the delay randomized either way
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 50,
            max_delay_ms: 5_000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

/// Notification dispatch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Deliver transfer notifications at all
    pub enabled: bool,

    /// Bounded mailbox size; events beyond it are dropped
    pub mailbox_capacity: usize,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mailbox_capacity: 1_000,
        }
    }
}

/// Argon2 cost parameters for PIN hashes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Memory cost (KiB)
    pub pin_hash_memory_kib: u32,

    /// Iterations
    pub pin_hash_iterations: u32,

    /// Lanes
    pub pin_hash_parallelism: u32,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            pin_hash_memory_kib: 19_456,
            pin_hash_iterations: 2,
            pin_hash_parallelism: 1,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(data_dir) = std::env::var("BANKSIM_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(timeout) = std::env::var("BANKSIM_LOCK_TIMEOUT_MS") {
            config.ledger.lock_timeout_ms = timeout.parse().map_err(|e| {
                crate::Error::Config(format!("BANKSIM_LOCK_TIMEOUT_MS: {}", e))
            })?;
        }

        if let Ok(balance) = std::env::var("BANKSIM_MIN_OPENING_BALANCE") {
            config.ledger.min_opening_balance = Decimal::from_str(&balance).map_err(|e| {
                crate::Error::Config(format!("BANKSIM_MIN_OPENING_BALANCE: {}", e))
            })?;
        }

        if let Ok(max) = std::env::var("BANKSIM_MAX_AMOUNT") {
            config.ledger.max_amount = Decimal::from_str(&max)
                .map_err(|e| crate::Error::Config(format!("BANKSIM_MAX_AMOUNT: {}", e)))?;
        }

        Ok(config)
    }

    /// Config rooted at `data_dir` with cheap PIN hashing, for tests and demos
    pub fn for_testing(data_dir: impl Into<PathBuf>) -> Self {
        let mut config = Config::default();
        config.data_dir = data_dir.into();
        config.rocksdb.sync_writes = false;
        config.retry.initial_delay_ms = 1;
        config.retry.max_delay_ms = 20;
        config.security = SecurityConfig {
            pin_hash_memory_kib: 256,
            pin_hash_iterations: 1,
            pin_hash_parallelism: 1,
        };
        config
    }
}
