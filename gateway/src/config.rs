// gateway/src/config.rs
//! Gateway configuration - bridges, oracles, retry policy

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Registered EVM bridges, one per destination chain
    pub bridges: Vec<BridgeConfig>,

    /// Registered price oracles
    #[serde(default)]
    pub oracles: Vec<OracleConfig>,

    /// Outbound transaction retry policy
    #[serde(default)]
    pub retry: RetryConfig,

    /// Confirmations before a dispatched transaction is final
    #[serde(default = "default_confirmations")]
    pub confirmation_threshold: u32,

    /// Polling interval in seconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Bridge identifier (also the destination chain id)
    pub bridge_id: u64,

    /// Bridge endpoint URL
    pub endpoint: String,

    /// Flat dispatch fee
    // u64 here: the TOML deserializer has no u128 support; the
    // dispatcher widens at its boundary
    #[serde(default)]
    pub fee: u64,

    /// Minimum transfer amount accepted
    pub min_transfer: u64,

    /// Maximum transfer amount accepted
    pub max_transfer: u64,

    #[serde(default = "default_true")]
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Oracle identifier
    pub oracle_id: u64,

    /// Token symbol this oracle prices
    pub token: String,

    /// Price decimals
    #[serde(default = "default_decimals")]
    pub decimals: u8,

    /// Maximum age of a price update in seconds before it is stale
    #[serde(default = "default_heartbeat")]
    pub heartbeat_interval: u64,

    #[serde(default = "default_true")]
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum retry attempts per logical transaction
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial backoff in seconds
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff: u64,

    /// Backoff ceiling in seconds
    #[serde(default = "default_max_backoff")]
    pub max_backoff: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_retries: default_max_retries(),
            initial_backoff: default_initial_backoff(),
            max_backoff: default_max_backoff(),
        }
    }
}

fn default_confirmations() -> u32 {
    12
}

fn default_poll_interval() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

fn default_decimals() -> u8 {
    8
}

fn default_heartbeat() -> u64 {
    300
}

fn default_max_retries() -> u32 {
    5
}

fn default_initial_backoff() -> u64 {
    2
}

fn default_max_backoff() -> u64 {
    120
}

impl GatewayConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: GatewayConfig =
            toml::from_str(&content).context("Failed to parse config file")?;

        config.validate()?;

        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.bridges.is_empty() {
            anyhow::bail!("At least one bridge must be configured");
        }

        for bridge in &self.bridges {
            if bridge.endpoint.is_empty() {
                anyhow::bail!("Endpoint for bridge {} cannot be empty", bridge.bridge_id);
            }
            if bridge.min_transfer > bridge.max_transfer {
                anyhow::bail!(
                    "Bridge {} min_transfer exceeds max_transfer",
                    bridge.bridge_id
                );
            }
        }

        for oracle in &self.oracles {
            if oracle.token.is_empty() {
                anyhow::bail!("Token for oracle {} cannot be empty", oracle.oracle_id);
            }
            if oracle.heartbeat_interval == 0 {
                anyhow::bail!("Heartbeat for oracle {} must be positive", oracle.oracle_id);
            }
        }

        if self.retry.initial_backoff == 0 {
            anyhow::bail!("Initial backoff must be positive");
        }
        if self.retry.initial_backoff > self.retry.max_backoff {
            anyhow::bail!("Initial backoff exceeds max backoff");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> GatewayConfig {
        toml::from_str(
            r#"
            confirmation_threshold = 3

            [[bridges]]
            bridge_id = 8453
            endpoint = "https://bridge.base.example"
            min_transfer = 10
            max_transfer = 1000000

            [[oracles]]
            oracle_id = 1
            token = "USDT"
            heartbeat_interval = 60
            "#,
        )
        .unwrap()
    }

    #[test]
    fn test_parse_and_defaults() {
        let config = base_config();
        config.validate().unwrap();

        assert_eq!(config.confirmation_threshold, 3);
        assert_eq!(config.poll_interval, 10);
        assert!(config.bridges[0].active);
        assert_eq!(config.oracles[0].decimals, 8);
        assert_eq!(config.retry.max_retries, 5);
    }

    #[test]
    fn test_bridge_bounds_parse_at_u64_range() {
        let config: GatewayConfig = toml::from_str(
            r#"
            [[bridges]]
            bridge_id = 1
            endpoint = "https://bridge.example"
            fee = 1000
            min_transfer = 1
            max_transfer = 18000000000000000000
            "#,
        )
        .unwrap();
        config.validate().unwrap();
        assert_eq!(config.bridges[0].max_transfer, 18_000_000_000_000_000_000);
    }

    #[test]
    fn test_rejects_no_bridges() {
        let mut config = base_config();
        config.bridges.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_inverted_transfer_bounds() {
        let mut config = base_config();
        config.bridges[0].min_transfer = 2_000_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_backoff() {
        let mut config = base_config();
        config.retry.initial_backoff = 0;
        assert!(config.validate().is_err());
    }
}
