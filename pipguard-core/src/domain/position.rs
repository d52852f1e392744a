use serde::{Deserialize, Serialize};

use super::{Direction, InstanceTag, MarketSnapshot, PositionId};

/// Snapshot of an open position as reported by the execution collaborator.
///
/// The engine never mutates this record directly; it issues commands and
/// reads a fresh snapshot on the next tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub label: Option<InstanceTag>,
    pub direction: Direction,
    pub entry_price: f64,
    pub volume: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub trailing_active: bool,
}

/// Protection level derived from a position's observable fields.
///
/// Ordered from least to most protected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ProtectionState {
    Unprotected,
    Protected,
    Breakeven,
    Trailing,
}

impl Position {
    pub fn new(id: PositionId, direction: Direction, entry_price: f64, volume: f64) -> Self {
        Self {
            id,
            label: None,
            direction,
            entry_price,
            volume,
            stop_loss: None,
            take_profit: None,
            trailing_active: false,
        }
    }

    pub fn with_label(mut self, label: InstanceTag) -> Self {
        self.label = Some(label);
        self
    }

    pub fn with_stop(mut self, stop: f64) -> Self {
        self.stop_loss = Some(stop);
        self
    }

    pub fn with_take_profit(mut self, take_profit: f64) -> Self {
        self.take_profit = Some(take_profit);
        self
    }

    pub fn is_owned_by(&self, tag: &InstanceTag) -> bool {
        self.label.as_ref() == Some(tag)
    }

    /// Unrealized profit in pips at the current quote (not rounded).
    pub fn profit_pips(&self, market: &MarketSnapshot) -> f64 {
        let exit = market.exit_price(self.direction);
        (exit - self.entry_price) * self.direction.sign() / market.pip_size
    }

    /// True once the stop sits beyond entry in the profitable direction.
    pub fn stop_beyond_entry(&self) -> bool {
        self.stop_loss
            .is_some_and(|stop| self.direction.is_beyond(stop, self.entry_price))
    }

    /// Price `pips` away from entry on the losing side (negative = profitable side).
    pub fn price_from_entry_pips(&self, pips: f64, pip_size: f64) -> f64 {
        self.entry_price - self.direction.sign() * pips * pip_size
    }

    /// Price `pips` away from entry on the profitable side.
    pub fn target_from_entry_pips(&self, pips: f64, pip_size: f64) -> f64 {
        self.entry_price + self.direction.sign() * pips * pip_size
    }

    pub fn protection_state(&self) -> ProtectionState {
        if self.stop_loss.is_none() {
            ProtectionState::Unprotected
        } else if self.trailing_active {
            ProtectionState::Trailing
        } else if self.stop_beyond_entry() {
            ProtectionState::Breakeven
        } else {
            ProtectionState::Protected
        }
    }
}
