//! Risk configuration, loaded once at startup and never mutated.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::domain::MarketSession;

/// How the initial stop distance is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StopMethod {
    /// Delegate to a caller-supplied `CustomStopLoss` hook.
    Custom,
    /// Fixed distance in pips.
    FixedPips { pips: f64 },
    /// The configured floor (`min_stop_pips`).
    Minimum,
    /// The configured ceiling (`max_stop_pips`).
    Maximum,
    /// Distance to the ATR channel bound on the losing side.
    AtrBased,
}

/// How the exit target is handled.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TakeProfitMethod {
    /// No target at open; a per-tick `CustomTakeProfit` hook decides.
    Custom,
    /// Target at `ratio` times the stop distance.
    FixedRatio { ratio: f64 },
    /// Broker-side trailing stop once the trailing trigger is reached.
    TrailingStop,
    /// Engine-driven trailing stop along the ATR channel.
    AtrTrailingStop,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("serialize config: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("invalid config: {field} {reason}")]
    Invalid { field: &'static str, reason: String },
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

/// Risk and protection settings for one engine instance.
///
/// Defaults mirror the classic template bot: 2% risk, 5 pip fixed stop,
/// 1:1 target, protection on, breakeven off.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Percent of balance risked per trade, in [1.0, 5.0].
    pub risk_percent: f64,
    pub stop_method: StopMethod,
    pub min_stop_pips: f64,
    pub max_stop_pips: f64,
    pub take_profit_method: TakeProfitMethod,
    pub breakeven_enabled: bool,
    pub breakeven_trigger_pips: f64,
    pub protection_enabled: bool,
    pub trailing_trigger_pips: f64,
    /// Lookback of the upstream ATR indicator (consumed by the market feed).
    pub atr_length: usize,
    pub atr_multiplier: f64,
    /// Sessions that must all be open for a new entry. Empty = any time.
    pub session: MarketSession,
    pub max_open_positions: usize,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            risk_percent: 2.0,
            stop_method: StopMethod::FixedPips { pips: 5.0 },
            min_stop_pips: 5.0,
            max_stop_pips: 20.0,
            take_profit_method: TakeProfitMethod::FixedRatio { ratio: 1.0 },
            breakeven_enabled: false,
            breakeven_trigger_pips: 5.0,
            protection_enabled: true,
            trailing_trigger_pips: 5.0,
            atr_length: 14,
            atr_multiplier: 1.5,
            session: MarketSession::NONE,
            max_open_positions: 1,
        }
    }
}

impl RiskConfig {
    /// Load and validate a config from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a config from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1.0..=5.0).contains(&self.risk_percent) {
            return Err(invalid(
                "risk_percent",
                format!("must be in [1, 5], got {}", self.risk_percent),
            ));
        }
        if !(self.min_stop_pips.is_finite() && self.min_stop_pips > 0.0) {
            return Err(invalid("min_stop_pips", "must be a positive number"));
        }
        if !(self.max_stop_pips.is_finite() && self.max_stop_pips >= self.min_stop_pips) {
            return Err(invalid(
                "max_stop_pips",
                format!(
                    "must be >= min_stop_pips ({}), got {}",
                    self.min_stop_pips, self.max_stop_pips
                ),
            ));
        }
        if let StopMethod::FixedPips { pips } = self.stop_method {
            if !(pips.is_finite() && pips > 0.0) {
                return Err(invalid("stop_method.pips", "must be a positive number"));
            }
        }
        if let TakeProfitMethod::FixedRatio { ratio } = self.take_profit_method {
            if !(ratio.is_finite() && ratio > 0.0) {
                return Err(invalid("take_profit_method.ratio", "must be a positive number"));
            }
        }
        if !(self.breakeven_trigger_pips.is_finite() && self.breakeven_trigger_pips >= 1.0) {
            return Err(invalid("breakeven_trigger_pips", "must be >= 1"));
        }
        if !(self.trailing_trigger_pips.is_finite() && self.trailing_trigger_pips >= 1.0) {
            return Err(invalid("trailing_trigger_pips", "must be >= 1"));
        }
        if self.atr_length == 0 {
            return Err(invalid("atr_length", "must be >= 1"));
        }
        if !(self.atr_multiplier.is_finite() && self.atr_multiplier > 0.0) {
            return Err(invalid("atr_multiplier", "must be a positive number"));
        }
        if self.max_open_positions == 0 {
            return Err(invalid("max_open_positions", "must be >= 1"));
        }
        Ok(())
    }

    /// Deterministic BLAKE3 hash of the canonical JSON form.
    pub fn fingerprint(&self) -> Result<String, ConfigError> {
        let json = serde_json::to_string(self)?;
        Ok(blake3::hash(json.as_bytes()).to_hex().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        RiskConfig::default().validate().unwrap();
    }

    #[test]
    fn parse_full_toml() {
        let toml = r#"
            risk_percent = 1.5
            min_stop_pips = 6.0
            max_stop_pips = 30.0
            breakeven_enabled = true
            breakeven_trigger_pips = 8.0
            trailing_trigger_pips = 12.0
            atr_length = 21
            atr_multiplier = 2.0
            session = ["london", "new_york"]
            max_open_positions = 2

            [stop_method]
            type = "ATR_BASED"

            [take_profit_method]
            type = "FIXED_RATIO"
            ratio = 1.5
        "#;
        let config = RiskConfig::from_toml(toml).unwrap();
        assert_eq!(config.risk_percent, 1.5);
        assert_eq!(config.stop_method, StopMethod::AtrBased);
        assert_eq!(
            config.take_profit_method,
            TakeProfitMethod::FixedRatio { ratio: 1.5 }
        );
        assert_eq!(config.session, MarketSession::LONDON | MarketSession::NEW_YORK);
        assert_eq!(config.atr_length, 21);
        assert!(config.protection_enabled); // default kept
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config = RiskConfig::from_toml("risk_percent = 3.0").unwrap();
        assert_eq!(config.risk_percent, 3.0);
        assert_eq!(config.stop_method, StopMethod::FixedPips { pips: 5.0 });
        assert_eq!(config.max_open_positions, 1);
    }

    #[test]
    fn fixed_pips_variant_carries_payload() {
        let toml = r#"
            [stop_method]
            type = "FIXED_PIPS"
            pips = 10.0
        "#;
        let config = RiskConfig::from_toml(toml).unwrap();
        assert_eq!(config.stop_method, StopMethod::FixedPips { pips: 10.0 });
    }

    #[test]
    fn risk_percent_out_of_range_is_rejected() {
        let err = RiskConfig::from_toml("risk_percent = 7.5").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "risk_percent",
                ..
            }
        ));
    }

    #[test]
    fn inverted_stop_bounds_are_rejected() {
        let err = RiskConfig::from_toml("min_stop_pips = 25.0\nmax_stop_pips = 20.0").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "max_stop_pips",
                ..
            }
        ));
    }

    #[test]
    fn unknown_method_fails_to_parse() {
        let err = RiskConfig::from_toml("[stop_method]\ntype = \"MARTINGALE\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn fingerprint_is_stable_and_sensitive() {
        let a = RiskConfig::default();
        let b = RiskConfig::default();
        assert_eq!(a.fingerprint().unwrap(), b.fingerprint().unwrap());

        let c = RiskConfig {
            risk_percent: 3.0,
            ..RiskConfig::default()
        };
        assert_ne!(a.fingerprint().unwrap(), c.fingerprint().unwrap());
    }
}
