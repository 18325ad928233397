//! Protocol configuration loading and management.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Full configuration shared by the protocol components.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProtocolConfig {
    /// Pooled escrow settings.
    #[serde(default)]
    pub escrow: EscrowConfig,

    /// Collateral manager settings.
    #[serde(default)]
    pub collateral: CollateralConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscrowConfig {
    /// Fixed-point precision of the escrow scaling factors.
    #[serde(default = "default_precision")]
    pub precision: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollateralConfig {
    /// Length of one grace-period day in seconds.
    #[serde(default = "default_grace_day_seconds")]
    pub grace_day_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log filter directive (trace, debug, info, warn, error, or an env-filter string).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (text, json).
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_precision() -> u64 {
    1_000_000_000_000
}
fn default_grace_day_seconds() -> u64 {
    86_400
}
fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "text".into()
}

impl Default for EscrowConfig {
    fn default() -> Self {
        Self {
            precision: default_precision(),
        }
    }
}

impl Default for CollateralConfig {
    fn default() -> Self {
        Self {
            grace_day_seconds: default_grace_day_seconds(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl ProtocolConfig {
    /// Load config from a TOML file, falling back to defaults for missing fields.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            let config: ProtocolConfig = toml::from_str(&contents)?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save the current config to a TOML file.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Reject values the components cannot operate with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.escrow.precision == 0 {
            anyhow::bail!("escrow.precision must be non-zero");
        }
        if self.collateral.grace_day_seconds == 0 {
            anyhow::bail!("collateral.grace_day_seconds must be non-zero");
        }
        Ok(())
    }
}
