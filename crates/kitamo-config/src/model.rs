use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Longest materialization horizon accepted, in months.
pub const MAX_HORIZON_MONTHS: u32 = 120;

/// Engine settings. Every field has a default so partial files still load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Months of occurrences kept materialized ahead of today.
    #[serde(default = "Config::default_horizon_months")]
    pub horizon_months: u32,
    /// Default length of a balance projection, in days.
    #[serde(default = "Config::default_projection_days")]
    pub projection_days: u32,
    /// A negative balance this many days ahead or closer raises an alert.
    #[serde(default = "Config::default_alert_window_days")]
    pub alert_window_days: u32,
    #[serde(default = "Config::default_log_filter")]
    pub log_filter: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    /// Optional custom directory for the ledger file. Defaults to `~/Documents/Kitamo`.
    pub data_dir: Option<PathBuf>,

    /// Ledger backups kept before the oldest is pruned.
    #[serde(default = "Config::default_backup_retention")]
    pub backup_retention: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            horizon_months: Self::default_horizon_months(),
            projection_days: Self::default_projection_days(),
            alert_window_days: Self::default_alert_window_days(),
            log_filter: Self::default_log_filter(),
            data_dir: None,
            backup_retention: Self::default_backup_retention(),
        }
    }
}

impl Config {
    pub fn default_horizon_months() -> u32 {
        12
    }

    pub fn default_projection_days() -> u32 {
        30
    }

    pub fn default_alert_window_days() -> u32 {
        7
    }

    pub fn default_log_filter() -> String {
        "kitamo=info".into()
    }

    pub fn default_backup_retention() -> usize {
        5
    }

    pub fn resolve_data_dir(&self) -> PathBuf {
        if let Some(path) = &self.data_dir {
            return path.clone();
        }

        let base = dirs::document_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."));

        base.join("Kitamo")
    }

    /// Rejects settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_HORIZON_MONTHS).contains(&self.horizon_months) {
            return Err(ConfigError::Invalid {
                field: "horizon_months",
                reason: format!(
                    "must be between 1 and {MAX_HORIZON_MONTHS}, got {}",
                    self.horizon_months
                ),
            });
        }
        if self.projection_days == 0 {
            return Err(ConfigError::Invalid {
                field: "projection_days",
                reason: "must be at least 1".into(),
            });
        }
        if self.log_filter.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "log_filter",
                reason: "must not be empty".into(),
            });
        }
        Ok(())
    }
}
