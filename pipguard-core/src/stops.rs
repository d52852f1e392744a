//! Initial stop-loss selection.
//!
//! Every method produces a distance in pips, which is then clamped to
//! `[min_stop_pips + spread_pips, max_stop_pips]` when protection is on.
//! Adding the spread to the floor keeps a tight stop from sitting inside the
//! spread, where the broker would trigger it immediately.

use tracing::debug;

use crate::config::{RiskConfig, StopMethod};
use crate::domain::{to_pips, Direction, MarketSnapshot};
use crate::error::RiskError;

/// Caller-supplied stop-loss strategy for `StopMethod::Custom`.
pub trait CustomStopLoss: Send + Sync {
    /// Stop distance in pips, or `None` if the strategy is not implemented.
    /// Returning `Some(0.0)` is treated the same as `None`.
    fn stop_pips(&self, direction: Direction, market: &MarketSnapshot) -> Option<f64>;
}

/// ATR channel around the current bar.
///
/// `upper = bar_high + k * atr`, `lower = bar_low - k * atr`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AtrChannel {
    pub upper: f64,
    pub lower: f64,
}

impl AtrChannel {
    pub fn from_market(market: &MarketSnapshot, multiplier: f64) -> Self {
        let band = multiplier * market.atr_value;
        Self {
            upper: market.bar_high + band,
            lower: market.bar_low - band,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.upper.is_finite() && self.lower.is_finite()
    }

    /// Price distance from the entry side of the book to the channel bound
    /// on the losing side: `ask - lower` for Long, `upper - bid` for Short.
    pub fn stop_distance(&self, direction: Direction, market: &MarketSnapshot) -> f64 {
        match direction {
            Direction::Long => market.ask - self.lower,
            Direction::Short => self.upper - market.bid,
        }
    }

    /// Stop price `distance` away from the current price, i.e. the bound itself.
    pub fn trailing_stop(&self, direction: Direction, market: &MarketSnapshot) -> f64 {
        let distance = self.stop_distance(direction, market);
        match direction {
            Direction::Long => market.ask - distance,
            Direction::Short => market.bid + distance,
        }
    }
}

/// Picks the initial stop distance for a new order.
pub struct StopLossSelector<'a> {
    config: &'a RiskConfig,
    custom: Option<&'a dyn CustomStopLoss>,
}

impl<'a> StopLossSelector<'a> {
    pub fn new(config: &'a RiskConfig) -> Self {
        Self {
            config,
            custom: None,
        }
    }

    pub fn with_custom(mut self, custom: Option<&'a dyn CustomStopLoss>) -> Self {
        self.custom = custom;
        self
    }

    /// Stop distance in pips, clamped to the configured bounds.
    pub fn select(&self, direction: Direction, market: &MarketSnapshot) -> Result<f64, RiskError> {
        let raw = self.raw(direction, market)?;
        self.clamp(raw, market.spread_pips)
    }

    /// Unclamped stop distance for the configured method.
    pub fn raw(&self, direction: Direction, market: &MarketSnapshot) -> Result<f64, RiskError> {
        match self.config.stop_method {
            StopMethod::FixedPips { pips } => Ok(pips),
            StopMethod::Minimum => Ok(self.config.min_stop_pips),
            StopMethod::Maximum => Ok(self.config.max_stop_pips),
            StopMethod::AtrBased => self.atr_stop(direction, market),
            StopMethod::Custom => self.custom_stop(direction, market),
        }
    }

    fn atr_stop(&self, direction: Direction, market: &MarketSnapshot) -> Result<f64, RiskError> {
        let channel = AtrChannel::from_market(market, self.config.atr_multiplier);
        let distance = channel.stop_distance(direction, market);
        to_pips(distance, market.pip_size).ok_or(RiskError::InvalidStopDistance {
            stop_pips: f64::NAN,
        })
    }

    fn custom_stop(&self, direction: Direction, market: &MarketSnapshot) -> Result<f64, RiskError> {
        let unimplemented = RiskError::UnimplementedStrategy { hook: "stop-loss" };
        let hook = self.custom.ok_or(unimplemented.clone())?;
        match hook.stop_pips(direction, market) {
            None => Err(unimplemented),
            Some(pips) if pips == 0.0 => Err(unimplemented),
            Some(pips) if !(pips.is_finite() && pips > 0.0) => {
                Err(RiskError::InvalidStopDistance { stop_pips: pips })
            }
            Some(pips) => Ok(pips),
        }
    }

    /// Apply the floor/ceiling bounds and the spread check.
    pub fn clamp(&self, stop_pips: f64, spread_pips: f64) -> Result<f64, RiskError> {
        if !stop_pips.is_finite() {
            return Err(RiskError::InvalidStopDistance { stop_pips });
        }
        if !(spread_pips.is_finite() && spread_pips >= 0.0) {
            return Err(RiskError::InvalidStopDistance { stop_pips });
        }

        let stop = if self.config.protection_enabled {
            let floor = self.config.min_stop_pips + spread_pips;
            let ceiling = self.config.max_stop_pips;
            if floor > ceiling {
                return Err(RiskError::StopBoundViolation {
                    stop_pips: ceiling,
                    spread_pips,
                });
            }
            let clamped = stop_pips.clamp(floor, ceiling);
            if clamped != stop_pips {
                debug!(raw = stop_pips, clamped, floor, ceiling, "stop clamped to bounds");
            }
            clamped
        } else {
            stop_pips
        };

        if stop <= 0.0 {
            return Err(RiskError::InvalidStopDistance { stop_pips: stop });
        }
        if stop <= spread_pips {
            return Err(RiskError::StopBoundViolation {
                stop_pips: stop,
                spread_pips,
            });
        }
        Ok(stop)
    }
}
