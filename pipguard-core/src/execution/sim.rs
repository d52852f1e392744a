//! In-memory broker.
//!
//! Fills market orders at the touch (Long at ask, Short at bid), applies
//! modifications with broker-side validation, and on every market update
//! closes positions whose stop or target was touched before advancing
//! trailing stops. A stop and target touched on the same update resolve to
//! the stop.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use super::{ExecutionClient, ExecutionError};
use crate::domain::{Direction, MarketSnapshot, Position, PositionId};
use crate::lifecycle::{ratchet, PositionCommand};
use crate::planner::OrderRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    StopLoss,
    TakeProfit,
}

/// A position the broker has closed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClosedPosition {
    pub position: Position,
    pub exit_price: f64,
    pub exit_time: DateTime<Utc>,
    pub reason: CloseReason,
    /// Realized result in pips, positive for a gain.
    pub pips: f64,
}

#[derive(Debug, Clone)]
struct OpenPosition {
    position: Position,
    /// Price-to-stop distance held by broker trailing.
    trail_distance: Option<f64>,
}

/// Simulated execution venue for a single symbol.
#[derive(Debug, Clone)]
pub struct SimBroker {
    market: MarketSnapshot,
    next_id: u64,
    open: BTreeMap<PositionId, OpenPosition>,
    closed: Vec<ClosedPosition>,
}

impl SimBroker {
    pub fn new(market: MarketSnapshot) -> Self {
        Self {
            market,
            next_id: 1,
            open: BTreeMap::new(),
            closed: Vec::new(),
        }
    }

    pub fn market(&self) -> &MarketSnapshot {
        &self.market
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    pub fn closed(&self) -> &[ClosedPosition] {
        &self.closed
    }

    pub fn position(&self, id: PositionId) -> Option<&Position> {
        self.open.get(&id).map(|p| &p.position)
    }

    /// Insert an externally opened position, e.g. one owned by another instance.
    pub fn insert_position(&mut self, mut position: Position) -> PositionId {
        let id = PositionId(self.next_id);
        self.next_id += 1;
        position.id = id;
        let trail_distance = trail_distance_for(&position, &self.market);
        self.open.insert(
            id,
            OpenPosition {
                position,
                trail_distance,
            },
        );
        id
    }

    /// Move to a new quote. Returns the positions closed by this update.
    pub fn update_market(&mut self, market: MarketSnapshot) -> Vec<ClosedPosition> {
        self.market = market;

        let mut hits = Vec::new();
        for (id, open) in &self.open {
            if let Some((price, reason)) = touched(&open.position, &self.market) {
                hits.push((*id, price, reason));
            }
        }

        let mut closed_now = Vec::with_capacity(hits.len());
        for (id, exit_price, reason) in hits {
            let Some(open) = self.open.remove(&id) else {
                continue;
            };
            let position = open.position;
            let pips = (exit_price - position.entry_price) * position.direction.sign()
                / self.market.pip_size;
            info!(position = %id, ?reason, exit_price, pips, "position closed");
            closed_now.push(ClosedPosition {
                position,
                exit_price,
                exit_time: self.market.time,
                reason,
                pips,
            });
        }
        self.closed.extend(closed_now.iter().cloned());

        for open in self.open.values_mut() {
            let Some(distance) = open.trail_distance else {
                continue;
            };
            let position = &mut open.position;
            let exit = self.market.exit_price(position.direction);
            let candidate = exit - position.direction.sign() * distance;
            if let Some(current) = position.stop_loss {
                let tightened = ratchet::tighten(position.direction, Some(current), candidate);
                position.stop_loss = Some(tightened);
            }
        }

        closed_now
    }
}

/// Stop or target touched at the current quote, stop first.
fn touched(position: &Position, market: &MarketSnapshot) -> Option<(f64, CloseReason)> {
    let exit = market.exit_price(position.direction);
    let stop_hit = position.stop_loss.filter(|&stop| match position.direction {
        Direction::Long => exit <= stop,
        Direction::Short => exit >= stop,
    });
    if let Some(stop) = stop_hit {
        return Some((stop, CloseReason::StopLoss));
    }
    let target_hit = position.take_profit.filter(|&target| match position.direction {
        Direction::Long => exit >= target,
        Direction::Short => exit <= target,
    });
    target_hit.map(|target| (target, CloseReason::TakeProfit))
}

fn trail_distance_for(position: &Position, market: &MarketSnapshot) -> Option<f64> {
    if !position.trailing_active {
        return None;
    }
    let stop = position.stop_loss?;
    Some((market.exit_price(position.direction) - stop).abs())
}

fn validate(position: &Position, market: &MarketSnapshot) -> Result<(), &'static str> {
    let exit = market.exit_price(position.direction);
    if let Some(stop) = position.stop_loss {
        if !stop.is_finite() {
            return Err("stop is not a finite price");
        }
        let losing_side = match position.direction {
            Direction::Long => stop < exit,
            Direction::Short => stop > exit,
        };
        if !losing_side {
            return Err("stop is on the wrong side of the market");
        }
    }
    if let Some(target) = position.take_profit {
        if !target.is_finite() {
            return Err("target is not a finite price");
        }
        let winning_side = match position.direction {
            Direction::Long => target > exit,
            Direction::Short => target < exit,
        };
        if !winning_side {
            return Err("target is on the wrong side of the market");
        }
    }
    Ok(())
}

impl ExecutionClient for SimBroker {
    fn positions(&self) -> Vec<Position> {
        self.open.values().map(|p| p.position.clone()).collect()
    }

    fn submit_market_order(&mut self, order: &OrderRequest) -> Result<PositionId, ExecutionError> {
        let reject = |reason: &str| ExecutionError::OrderRejected {
            reason: reason.to_string(),
        };
        if !(order.volume.is_finite() && order.volume > 0.0) {
            return Err(reject("volume must be positive"));
        }
        if !(order.stop_pips.is_finite() && order.stop_pips > 0.0) {
            return Err(reject("stop distance must be positive"));
        }

        let pip = self.market.pip_size;
        let fill = self.market.entry_price(order.direction);
        let mut position = Position::new(PositionId(self.next_id), order.direction, fill, order.volume)
            .with_label(order.label.clone());
        position.stop_loss = Some(position.price_from_entry_pips(order.stop_pips, pip));
        position.take_profit = order
            .take_profit_pips
            .map(|pips| position.target_from_entry_pips(pips, pip));

        validate(&position, &self.market).map_err(reject)?;

        let id = position.id;
        self.next_id += 1;
        info!(
            position = %id,
            direction = %order.direction,
            fill,
            volume = order.volume,
            stop = ?position.stop_loss,
            target = ?position.take_profit,
            "market order filled"
        );
        self.open.insert(
            id,
            OpenPosition {
                position,
                trail_distance: None,
            },
        );
        Ok(id)
    }

    fn execute(&mut self, command: &PositionCommand) -> Result<(), ExecutionError> {
        let id = command.position_id();
        let open = self
            .open
            .get_mut(&id)
            .ok_or(ExecutionError::UnknownPosition(id))?;
        let rejected = |reason: &str| ExecutionError::Rejected {
            position_id: id,
            reason: reason.to_string(),
        };

        if !command.is_finite() {
            return Err(rejected("non-finite value"));
        }
        if matches!(command, PositionCommand::EnableTrailingStop { .. })
            && open.position.stop_loss.is_none()
        {
            return Err(rejected("trailing requires a stop"));
        }

        let mut updated = open.position.clone();
        command.apply_to(&mut updated, self.market.pip_size);
        validate(&updated, &self.market).map_err(rejected)?;

        open.trail_distance = trail_distance_for(&updated, &self.market);
        open.position = updated;
        Ok(())
    }
}
