//! Take-profit planning at order-open time.

use serde::{Deserialize, Serialize};

use crate::config::TakeProfitMethod;
use crate::domain::{MarketSnapshot, Position};
use crate::error::RiskError;
use crate::lifecycle::PositionCommand;

/// Take-profit decision for a new order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TakeProfitPlan {
    /// Fixed target distance in pips, set with the order.
    Fixed(f64),
    /// No target at open; the lifecycle manager (or a custom hook) owns the exit.
    Dynamic,
}

impl TakeProfitPlan {
    pub fn target_pips(&self) -> Option<f64> {
        match self {
            TakeProfitPlan::Fixed(pips) => Some(*pips),
            TakeProfitPlan::Dynamic => None,
        }
    }
}

/// Caller-supplied per-tick exit logic for `TakeProfitMethod::Custom`.
///
/// Runs after the built-in protection steps. Returned commands pass through
/// the same guards as the built-in ones (finite values, stop ratchet).
pub trait CustomTakeProfit: Send + Sync {
    fn on_tick(&self, position: &Position, market: &MarketSnapshot) -> Vec<PositionCommand>;
}

/// Plan the take-profit for an order with a stop of `stop_pips`.
pub fn plan(method: &TakeProfitMethod, stop_pips: f64) -> Result<TakeProfitPlan, RiskError> {
    match *method {
        TakeProfitMethod::FixedRatio { ratio } => {
            let target = stop_pips * ratio;
            if target.is_finite() && target > 0.0 {
                Ok(TakeProfitPlan::Fixed(target))
            } else {
                Err(RiskError::InvalidStopDistance { stop_pips })
            }
        }
        TakeProfitMethod::TrailingStop
        | TakeProfitMethod::AtrTrailingStop
        | TakeProfitMethod::Custom => Ok(TakeProfitPlan::Dynamic),
    }
}
