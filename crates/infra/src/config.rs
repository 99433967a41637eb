//! Runtime configuration.

use serde::{Deserialize, Serialize};

use bonus_goals::CapPolicy;

pub const ENV_DATE_FORMAT: &str = "BONUS_DATE_FORMAT";
pub const ENV_CAP_POINTS_PER_MONTH: &str = "BONUS_CAP_POINTS_PER_MONTH";
pub const ENV_CAP_DAYS_PER_MONTH: &str = "BONUS_CAP_DAYS_PER_MONTH";
pub const ENV_APPROVAL_LAG_MONTHS: &str = "BONUS_APPROVAL_LAG_MONTHS";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: '{value}' ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BonusConfig {
    /// `chrono` format of the date column in invoice exports.
    pub date_format: String,
    pub cap: CapPolicy,
    /// How many months back the "due for approval" month lies.
    pub approval_lag_months: u32,
}

impl Default for BonusConfig {
    fn default() -> Self {
        Self {
            date_format: "%d.%m.%Y".to_string(),
            cap: CapPolicy::default(),
            approval_lag_months: 3,
        }
    }
}

impl BonusConfig {
    /// Defaults overridden by `BONUS_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each key.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(format) = lookup(ENV_DATE_FORMAT) {
            if format.trim().is_empty() {
                return Err(invalid(ENV_DATE_FORMAT, &format, "must not be empty"));
            }
            config.date_format = format;
        }
        if let Some(raw) = lookup(ENV_CAP_POINTS_PER_MONTH) {
            config.cap.points_per_month = raw
                .trim()
                .parse::<i64>()
                .ok()
                .filter(|v| *v >= 0)
                .ok_or_else(|| invalid(ENV_CAP_POINTS_PER_MONTH, &raw, "expected a non-negative integer"))?;
        }
        if let Some(raw) = lookup(ENV_CAP_DAYS_PER_MONTH) {
            config.cap.days_per_month = raw
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite() && *v > 0.0)
                .ok_or_else(|| invalid(ENV_CAP_DAYS_PER_MONTH, &raw, "expected a positive number"))?;
        }
        if let Some(raw) = lookup(ENV_APPROVAL_LAG_MONTHS) {
            config.approval_lag_months = raw
                .trim()
                .parse::<u32>()
                .map_err(|e| invalid(ENV_APPROVAL_LAG_MONTHS, &raw, &e.to_string()))?;
        }

        Ok(config)
    }
}

fn invalid(key: &'static str, value: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
