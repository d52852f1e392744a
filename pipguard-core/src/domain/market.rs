//! Read-only market, account and instrument snapshots supplied by collaborators.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Convert a price distance into pips, rounded to one decimal place.
///
/// Returns `None` when the pip size is not a positive finite number or the
/// result is not finite.
pub fn to_pips(distance: f64, pip_size: f64) -> Option<f64> {
    if !(pip_size.is_finite() && pip_size > 0.0) {
        return None;
    }
    let pips = (distance / pip_size * 10.0).round() / 10.0;
    pips.is_finite().then_some(pips)
}

/// Price context for the current tick/bar.
///
/// Replaced wholesale on every tick. `atr_value` is NaN when the upstream
/// indicator has not warmed up yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub time: DateTime<Utc>,
    pub bid: f64,
    pub ask: f64,
    pub pip_size: f64,
    pub spread_pips: f64,
    pub atr_value: f64,
    pub bar_high: f64,
    pub bar_low: f64,
}

impl MarketSnapshot {
    /// Quote-only snapshot. Spread is derived from bid/ask; the bar range
    /// collapses to the quote and ATR is unavailable.
    pub fn new(time: DateTime<Utc>, bid: f64, ask: f64, pip_size: f64) -> Self {
        let spread_pips = to_pips(ask - bid, pip_size).unwrap_or(f64::NAN);
        Self {
            time,
            bid,
            ask,
            pip_size,
            spread_pips,
            atr_value: f64::NAN,
            bar_high: ask,
            bar_low: bid,
        }
    }

    pub fn with_bar(mut self, high: f64, low: f64) -> Self {
        self.bar_high = high;
        self.bar_low = low;
        self
    }

    pub fn with_atr(mut self, atr: f64) -> Self {
        self.atr_value = atr;
        self
    }

    pub fn with_spread_pips(mut self, spread_pips: f64) -> Self {
        self.spread_pips = spread_pips;
        self
    }

    /// Price at which a position of `direction` would close.
    pub fn exit_price(&self, direction: super::Direction) -> f64 {
        match direction {
            super::Direction::Long => self.bid,
            super::Direction::Short => self.ask,
        }
    }

    /// Price at which a position of `direction` would open.
    pub fn entry_price(&self, direction: super::Direction) -> f64 {
        match direction {
            super::Direction::Long => self.ask,
            super::Direction::Short => self.bid,
        }
    }
}

/// Account context at the time of an entry decision.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub balance: f64,
    pub leverage: f64,
}

impl AccountSnapshot {
    pub fn new(balance: f64, leverage: f64) -> Self {
        Self { balance, leverage }
    }
}

/// Instrument metadata needed for sizing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolSpec {
    pub name: String,
    pub pip_size: f64,
    /// Account-currency value of one pip for one unit of volume.
    pub pip_value: f64,
    pub min_volume: f64,
    pub volume_step: f64,
}

impl SymbolSpec {
    pub fn new(
        name: impl Into<String>,
        pip_size: f64,
        pip_value: f64,
        min_volume: f64,
        volume_step: f64,
    ) -> Self {
        Self {
            name: name.into(),
            pip_size,
            pip_value,
            min_volume,
            volume_step,
        }
    }

    /// A USD-quoted forex major: 0.0001 pip, 1k unit lots.
    pub fn forex_major(name: impl Into<String>) -> Self {
        Self::new(name, 0.0001, 0.0001, 1_000.0, 1_000.0)
    }

    /// Money lost if a position of `volume` units is stopped out `stop_pips` away.
    pub fn amount_risked(&self, volume: f64, stop_pips: f64) -> f64 {
        volume * stop_pips * self.pip_value
    }

    /// Volume at which a stop of `stop_pips` loses exactly `amount`.
    pub fn volume_for_risk(&self, amount: f64, stop_pips: f64) -> f64 {
        amount / (stop_pips * self.pip_value)
    }

    /// Round a volume down to a whole number of steps.
    pub fn normalize_volume_down(&self, volume: f64) -> f64 {
        // Nudge so that 979999.9999 lands on the 980000 step.
        let steps = (volume / self.volume_step + 1e-9).floor();
        steps * self.volume_step
    }
}
