//! Position sizing from an account-risk budget.
//!
//! # Formula
//! ```text
//! limit  = balance * risk_percent / 100          (money at risk per trade)
//! size   = (balance - limit) * leverage          (leverage headroom)
//! risk   = size * stop_pips * pip_value
//! volume = risk > limit ? limit / (stop_pips * pip_value) : size
//! volume = round_down(max(min_volume, volume), volume_step), never below min_volume
//! ```
//!
//! # Example
//! - Balance: 10,000, risk 2% → limit 200
//! - Leverage 100 → size (10,000 - 200) * 100 = 980,000 units
//! - 10 pip stop at 0.00001 per pip per unit → risk 98 ≤ 200, keep 980,000

use tracing::debug;

use crate::domain::{AccountSnapshot, SymbolSpec};
use crate::error::RiskError;

/// Inputs to one sizing decision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizingRequest<'a> {
    pub risk_percent: f64,
    pub stop_pips: f64,
    pub balance: f64,
    pub leverage: f64,
    /// Pip value, volume minimum and step come from here.
    pub symbol: &'a SymbolSpec,
}

impl<'a> SizingRequest<'a> {
    pub fn new(
        risk_percent: f64,
        stop_pips: f64,
        account: &AccountSnapshot,
        symbol: &'a SymbolSpec,
    ) -> Self {
        Self {
            risk_percent,
            stop_pips,
            balance: account.balance,
            leverage: account.leverage,
            symbol,
        }
    }
}

/// Breakdown of a sizing decision, for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sizing {
    /// Money budget at risk.
    pub limit: f64,
    /// Volume the leverage headroom allows.
    pub leverage_volume: f64,
    /// True when the leverage volume risked more than the budget.
    pub risk_capped: bool,
    /// Final tradable volume.
    pub volume: f64,
}

impl Sizing {
    /// Money lost if the final volume is stopped out `stop_pips` away.
    pub fn risk_at(&self, stop_pips: f64, symbol: &SymbolSpec) -> f64 {
        symbol.amount_risked(self.volume, stop_pips)
    }
}

fn positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

/// Convert a risk percentage and stop distance into a tradable volume.
pub fn size(request: &SizingRequest<'_>) -> Result<Sizing, RiskError> {
    let SizingRequest {
        risk_percent,
        stop_pips,
        balance,
        leverage,
        symbol,
    } = *request;

    if !positive(stop_pips) {
        return Err(RiskError::InvalidStopDistance { stop_pips });
    }
    if !positive(risk_percent) {
        return Err(RiskError::invalid_volume(format!(
            "risk percent must be positive, got {risk_percent}"
        )));
    }
    if !positive(balance) {
        return Err(RiskError::invalid_volume(format!(
            "balance must be positive, got {balance}"
        )));
    }
    if !positive(leverage) {
        return Err(RiskError::invalid_volume(format!(
            "leverage must be positive, got {leverage}"
        )));
    }
    if !positive(symbol.pip_value) {
        return Err(RiskError::invalid_volume(format!(
            "{} pip value must be positive, got {}",
            symbol.name, symbol.pip_value
        )));
    }
    if !positive(symbol.min_volume) || !positive(symbol.volume_step) {
        return Err(RiskError::invalid_volume(format!(
            "{} min volume {} and step {} must be positive",
            symbol.name, symbol.min_volume, symbol.volume_step
        )));
    }

    let limit = balance * risk_percent / 100.0;
    let leverage_volume = (balance - limit) * leverage;
    let risk = symbol.amount_risked(leverage_volume, stop_pips);
    let risk_capped = risk > limit;
    let raw = if risk_capped {
        debug!(symbol = %symbol.name, risk, limit, "leverage volume over budget, sizing to the limit");
        symbol.volume_for_risk(limit, stop_pips)
    } else {
        leverage_volume
    };

    if !raw.is_finite() {
        return Err(RiskError::invalid_volume(format!(
            "volume is not finite for stop {stop_pips} pips"
        )));
    }

    let volume = symbol
        .normalize_volume_down(raw.max(symbol.min_volume))
        .max(symbol.min_volume);

    Ok(Sizing {
        limit,
        leverage_volume,
        risk_capped,
        volume,
    })
}

/// Size against a symbol and account snapshot.
pub fn size_for(
    risk_percent: f64,
    stop_pips: f64,
    account: &AccountSnapshot,
    symbol: &SymbolSpec,
) -> Result<Sizing, RiskError> {
    size(&SizingRequest::new(risk_percent, stop_pips, account, symbol))
}
