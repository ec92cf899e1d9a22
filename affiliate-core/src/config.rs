//! Configuration for the affiliate core

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Core configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// RocksDB configuration
    pub rocksdb: RocksDbConfig,

    /// Payout policy defaults
    pub payout: PayoutPolicyConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/affiliate"),
            service_name: "affiliate-core".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            rocksdb: RocksDbConfig::default(),
            payout: PayoutPolicyConfig::default(),
        }
    }
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RocksDbConfig {
    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max write buffers
    pub max_write_buffer_number: i32,

    /// Target file size (MB)
    pub target_file_size_mb: u64,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,

    /// Enable statistics
    pub enable_statistics: bool,
}

impl Default for RocksDbConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 64,
            max_write_buffer_number: 4,
            target_file_size_mb: 64,
            max_background_jobs: 4,
            enable_statistics: false,
        }
    }
}

/// Payout policy defaults applied when an affiliate has no explicit value
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayoutPolicyConfig {
    /// Default minimum payout for new affiliates
    pub default_minimum_payout: Decimal,

    /// Retry budget for failed disbursements
    pub default_max_retries: u32,
}

impl Default for PayoutPolicyConfig {
    fn default() -> Self {
        Self {
            default_minimum_payout: Decimal::new(5000, 2), // 50.00
            default_max_retries: 3,
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

        if let Ok(data_dir) = std::env::var("AFFILIATE_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(retries) = std::env::var("AFFILIATE_PAYOUT_MAX_RETRIES") {
            config.payout.default_max_retries = retries
                .parse()
                .map_err(|e| crate::Error::Config(format!("Invalid max retries: {}", e)))?;
        }

        Ok(config)
    }
}
