/// Position modification commands
///
/// The lifecycle manager never mutates a position; it emits commands that the
/// execution collaborator applies atomically, one call per command.
use serde::{Deserialize, Serialize};

use crate::domain::{Position, PositionId};

/// Modification request for an open position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum PositionCommand {
    /// Stop `pips` away from entry on the losing side. Negative values put
    /// the stop beyond entry on the profitable side (-1 = breakeven + 1 pip).
    SetStopLossPips { position_id: PositionId, pips: f64 },

    /// Stop at an absolute price.
    SetStopLossPrice { position_id: PositionId, price: f64 },

    /// Target `pips` away from entry on the profitable side.
    SetTakeProfitPips { position_id: PositionId, pips: f64 },

    /// Hand the stop to the broker's trailing-stop mode, keeping the current
    /// price-to-stop distance.
    EnableTrailingStop { position_id: PositionId },
}

impl PositionCommand {
    pub fn position_id(&self) -> PositionId {
        match self {
            PositionCommand::SetStopLossPips { position_id, .. }
            | PositionCommand::SetStopLossPrice { position_id, .. }
            | PositionCommand::SetTakeProfitPips { position_id, .. }
            | PositionCommand::EnableTrailingStop { position_id } => *position_id,
        }
    }

    /// True if every number carried by the command is finite.
    pub fn is_finite(&self) -> bool {
        match self {
            PositionCommand::SetStopLossPips { pips, .. }
            | PositionCommand::SetTakeProfitPips { pips, .. } => pips.is_finite(),
            PositionCommand::SetStopLossPrice { price, .. } => price.is_finite(),
            PositionCommand::EnableTrailingStop { .. } => true,
        }
    }

    /// Absolute stop price this command would set on `position`, if it sets one.
    pub fn stop_price(&self, position: &Position, pip_size: f64) -> Option<f64> {
        match self {
            PositionCommand::SetStopLossPips { pips, .. } => {
                Some(position.price_from_entry_pips(*pips, pip_size))
            }
            PositionCommand::SetStopLossPrice { price, .. } => Some(*price),
            _ => None,
        }
    }

    /// Apply the command to a local copy of the position, the way the broker would.
    pub fn apply_to(&self, position: &mut Position, pip_size: f64) {
        match self {
            PositionCommand::SetStopLossPips { .. } | PositionCommand::SetStopLossPrice { .. } => {
                position.stop_loss = self.stop_price(position, pip_size);
            }
            PositionCommand::SetTakeProfitPips { pips, .. } => {
                position.take_profit = Some(position.target_from_entry_pips(*pips, pip_size));
            }
            PositionCommand::EnableTrailingStop { .. } => {
                position.trailing_active = true;
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PositionCommand::SetStopLossPips { .. } => "set_stop_loss_pips",
            PositionCommand::SetStopLossPrice { .. } => "set_stop_loss_price",
            PositionCommand::SetTakeProfitPips { .. } => "set_take_profit_pips",
            PositionCommand::EnableTrailingStop { .. } => "enable_trailing_stop",
        }
    }
}
