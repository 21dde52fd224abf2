//! Configuration for the engine

use crate::{Error, Result};
use governance::{GovernanceParameters, TreasuryGenesis};
use ledger_core::{Address, Amount};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// Bounded command mailbox size
    pub mailbox_capacity: usize,

    /// Gas price stamped on receipts
    pub gas_price: Amount,

    /// Addresses allowed to cancel any proposal and issue emergency commands
    pub guardians: Vec<Address>,

    /// Initial governance parameters
    pub governance: GovernanceParameters,

    /// Treasury genesis
    pub treasury: TreasuryGenesis,

    /// Event bus configuration
    pub event_bus: EventBusConfig,

    /// Analytics configuration
    pub analytics: AnalyticsConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: "fee-governance-engine".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            mailbox_capacity: 1000,
            gas_price: Amount::new(20_000_000_000), // 20 gwei
            guardians: Vec::new(),
            governance: GovernanceParameters::default(),
            treasury: TreasuryGenesis::default(),
            event_bus: EventBusConfig::default(),
            analytics: AnalyticsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Event bus configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventBusConfig {
    /// Messages buffered per channel before slow subscribers lag
    pub channel_capacity: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            channel_capacity: event_bus::DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Analytics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    /// Hours of market samples kept per pool
    pub retention_hours: u64,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            retention_hours: 90 * 24, // longest analytics period
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    pub level: String,

    /// Emit JSON lines
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| Error::Config(format!("{}={}: {}", name, value, e)))
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();

        if let Ok(name) = std::env::var("ENGINE_SERVICE_NAME") {
            config.service_name = name;
        }

        if let Ok(v) = std::env::var("ENGINE_MAILBOX_CAPACITY") {
            config.mailbox_capacity = parse_env("ENGINE_MAILBOX_CAPACITY", &v)?;
        }

        if let Ok(v) = std::env::var("ENGINE_GAS_PRICE") {
            config.gas_price = parse_env("ENGINE_GAS_PRICE", &v)?;
        }

        if let Ok(v) = std::env::var("ENGINE_GUARDIANS") {
            config.guardians = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| parse_env("ENGINE_GUARDIANS", s))
                .collect::<Result<_>>()?;
        }

        if let Ok(v) = std::env::var("ENGINE_CHANNEL_CAPACITY") {
            config.event_bus.channel_capacity = parse_env("ENGINE_CHANNEL_CAPACITY", &v)?;
        }

        if let Ok(v) = std::env::var("ENGINE_ANALYTICS_RETENTION_HOURS") {
            config.analytics.retention_hours = parse_env("ENGINE_ANALYTICS_RETENTION_HOURS", &v)?;
        }

        if let Ok(level) = std::env::var("ENGINE_LOG_LEVEL") {
            config.logging.level = level;
        }

        if let Ok(v) = std::env::var("ENGINE_LOG_JSON") {
            config.logging.json = parse_env("ENGINE_LOG_JSON", &v)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check ranges
    pub fn validate(&self) -> Result<()> {
        if self.mailbox_capacity == 0 {
            return Err(Error::Config("mailbox_capacity must be at least 1".to_string()));
        }
        if self.event_bus.channel_capacity == 0 {
            return Err(Error::Config("event_bus.channel_capacity must be at least 1".to_string()));
        }
        if self.analytics.retention_hours < 24 {
            return Err(Error::Config(format!(
                "analytics.retention_hours {} is below one day",
                self.analytics.retention_hours
            )));
        }
        let unique: BTreeSet<&Address> = self.guardians.iter().collect();
        if unique.len() != self.guardians.len() {
            return Err(Error::Config("duplicate guardian address".to_string()));
        }
        self.governance.validate()?;
        governance::Treasury::new(self.treasury.clone())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.service_name, "fee-governance-engine");
        assert_eq!(config.mailbox_capacity, 1000);
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_toml() {
        let config: Config = toml::from_str(
            r#"
            mailbox_capacity = 64
            guardians = ["0x000000000000000000000000000000000000beef"]

            [governance]
            proposalThreshold = "500"
            votingPeriod = 3600
            executionDelay = 600
            passingThreshold = "60"
            quorumThreshold = "20"
            emergencyThreshold = "75"
            emergencyExecutionDelay = 0
            maxProposals = 5
            proposalCooldown = 0
            "#,
        )
        .unwrap();

        assert_eq!(config.mailbox_capacity, 64);
        assert_eq!(config.guardians.len(), 1);
        assert_eq!(config.governance.proposal_threshold, Amount::new(500));
        assert_eq!(config.event_bus.channel_capacity, event_bus::DEFAULT_CHANNEL_CAPACITY);
        config.validate().unwrap();
    }

    #[test]
    fn test_rejects_zero_mailbox() {
        let config = Config {
            mailbox_capacity: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }
}
