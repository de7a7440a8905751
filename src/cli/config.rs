//! Operator configuration file handling
//!
//! The operator config only describes how this CLI signs and aggregates votes
//! for one deployment (the voting domain) and where it logs. Governance
//! parameters that the DAO itself enforces, such as the voting period a
//! proposal actually gets, live in the registry configuration table and only
//! change through an `UPDATE_CONFIG` proposal. The durations here are the
//! operator's local view, used to pick deadlines when preparing submissions.

use covenant::types::Address;
use covenant::voting::VotingDomain;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default log level
const DEFAULT_LOG_LEVEL: &str = "info";

const DEFAULT_VOTING_PERIOD: &str = "7days";
const DEFAULT_CHALLENGE_WINDOW: &str = "1day";

/// Vote message protocol version bound into every signature.
pub const PROTOCOL_VERSION: &str = "1";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CovenantConfig {
    pub governance: GovernanceConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GovernanceConfig {
    /// DAO name, part of the signing domain
    pub dao_name: String,

    pub chain_id: u64,

    /// Address of the voting adapter that verifies submitted results
    pub verifying_address: Address,

    /// Address of the adapter the votes are for
    pub action_id: Address,

    /// Human-readable duration, e.g. "7days" or "36h"
    #[serde(default = "default_voting_period")]
    pub voting_period: String,

    #[serde(default = "default_challenge_window")]
    pub challenge_window: String,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or filter directive (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    pub file: Option<PathBuf>,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_voting_period() -> String {
    DEFAULT_VOTING_PERIOD.to_string()
}

fn default_challenge_window() -> String {
    DEFAULT_CHALLENGE_WINDOW.to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            file: None,
        }
    }
}

impl Default for CovenantConfig {
    fn default() -> Self {
        Self::new("covenant-dao", 1)
    }
}

impl CovenantConfig {
    pub fn new(dao_name: impl Into<String>, chain_id: u64) -> Self {
        Self {
            governance: GovernanceConfig {
                dao_name: dao_name.into(),
                chain_id,
                verifying_address: Address::ZERO,
                action_id: Address::ZERO,
                voting_period: default_voting_period(),
                challenge_window: default_challenge_window(),
            },
            logging: LoggingConfig::default(),
        }
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file '{}': {}", path.display(), e))?;

        let config: CovenantConfig = toml::from_str(&contents)
            .map_err(|e| format!("Failed to parse config file '{}': {}", path.display(), e))?;

        config.governance.voting_period()?;
        config.governance.challenge_window()?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise fall back to defaults
    pub fn load_or_default(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize config: {}", e))?;
        write_with_parents(path, &contents)
    }

    /// Generate default configuration content as a string with comments
    pub fn generate_default_toml(dao_name: &str, chain_id: u64) -> String {
        format!(
            r#"# Covenant operator configuration
#
# These settings describe the voting domain this operator signs and
# aggregates votes for. Parameters the DAO enforces (voting period,
# challenge window) are stored in the registry and change only by vote;
# the durations below must match them for locally computed deadlines
# to be accurate.

[governance]
dao_name = "{dao_name}"
chain_id = {chain_id}

# Address of the voting adapter that verifies submitted results
verifying_address = "{zero}"

# Address of the adapter the votes are for
action_id = "{zero}"

# Human-readable durations ("7days", "36h", "90min")
voting_period = "{voting_period}"
challenge_window = "{challenge_window}"

[logging]
# Log level: trace, debug, info, warn, error
# RUST_LOG overrides this when set
level = "info"

# Log file path (optional, logs to stderr if not specified)
# file = "/var/log/covenant/covenant.log"
"#,
            zero = Address::ZERO,
            voting_period = DEFAULT_VOTING_PERIOD,
            challenge_window = DEFAULT_CHALLENGE_WINDOW,
        )
    }

    /// Create and save a default configuration file
    pub fn create_default(
        config_path: &Path,
        dao_name: &str,
        chain_id: u64,
    ) -> Result<(), Box<dyn std::error::Error>> {
        write_with_parents(config_path, &Self::generate_default_toml(dao_name, chain_id))
    }
}

impl GovernanceConfig {
    pub fn voting_period(&self) -> Result<Duration, Box<dyn std::error::Error>> {
        parse_duration("voting_period", &self.voting_period)
    }

    pub fn challenge_window(&self) -> Result<Duration, Box<dyn std::error::Error>> {
        parse_duration("challenge_window", &self.challenge_window)
    }

    /// Signing domain for vote messages
    pub fn domain(&self) -> VotingDomain {
        VotingDomain {
            name: self.dao_name.clone(),
            version: PROTOCOL_VERSION.to_string(),
            chain_id: self.chain_id,
            verifying_address: self.verifying_address,
            action_id: self.action_id,
        }
    }
}

fn parse_duration(field: &str, input: &str) -> Result<Duration, Box<dyn std::error::Error>> {
    humantime::parse_duration(input)
        .map_err(|e| format!("Invalid duration for {} '{}': {}", field, input, e).into())
}

fn write_with_parents(path: &Path, contents: &str) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
    }

    fs::write(path, contents)
        .map_err(|e| format!("Failed to write config file '{}': {}", path.display(), e))?;

    Ok(())
}

/// Default config file path: `<config dir>/covenant/covenant.toml`
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("covenant")
        .join("covenant.toml")
}
