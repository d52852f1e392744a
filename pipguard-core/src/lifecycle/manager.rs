//! Per-tick protection state machine.
//!
//! For every position owned by this instance, on every tick, in this order:
//!
//! 1. **Unprotected → Protected**: no stop and protection on → stop at
//!    `min_stop_pips + spread_pips` from entry, or that far from the exit
//!    price when the position is already past the entry-relative level.
//! 2. **Protected → Breakeven**: breakeven on, profit above the trigger and
//!    stop not yet beyond entry → stop 1 pip beyond entry.
//! 3. **Trailing** (`TrailingStop`): no target, profit at the trailing
//!    trigger, trailing off → enable broker trailing.
//! 4. **Trailing** (`AtrTrailingStop`): no target. Before breakeven, behaves
//!    like step 2 gated on the trailing trigger. Once the stop is beyond
//!    entry, trails it along the ATR channel, tighten-only.
//! 5. **Custom**: the per-tick custom take-profit hook.
//!
//! Each step sees the effects of the earlier ones: commands are applied to a
//! projected copy of the position as they are emitted. The state itself is
//! never stored. It is re-derived from the broker's position record, so a
//! rejected command is simply re-evaluated on the next tick.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{RiskConfig, TakeProfitMethod};
use crate::domain::{Direction, InstanceTag, MarketSnapshot, Position, PositionId};
use crate::execution::ExecutionClient;
use crate::lifecycle::{ratchet, PositionCommand};
use crate::stops::AtrChannel;
use crate::targets::CustomTakeProfit;

/// A command the execution collaborator refused.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectedCommand {
    pub command: PositionCommand,
    pub reason: String,
}

/// What happened during one tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TickReport {
    /// Owned positions, in visiting order.
    pub visited: Vec<PositionId>,
    /// Commands accepted by the execution collaborator.
    pub issued: Vec<PositionCommand>,
    pub rejected: Vec<RejectedCommand>,
}

impl TickReport {
    pub fn is_quiet(&self) -> bool {
        self.issued.is_empty() && self.rejected.is_empty()
    }
}

/// Drives the protection state machine for one engine instance.
pub struct PositionLifecycleManager {
    config: RiskConfig,
    tag: InstanceTag,
    custom_take_profit: Option<Box<dyn CustomTakeProfit>>,
}

impl PositionLifecycleManager {
    pub fn new(config: RiskConfig, tag: InstanceTag) -> Self {
        Self {
            config,
            tag,
            custom_take_profit: None,
        }
    }

    pub fn with_custom_take_profit(mut self, hook: Box<dyn CustomTakeProfit>) -> Self {
        self.custom_take_profit = Some(hook);
        self
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    pub fn tag(&self) -> &InstanceTag {
        &self.tag
    }

    /// Visit every owned position once, in ascending id order, and send the
    /// resulting commands to `client`.
    ///
    /// The first rejected command for a position ends that position's turn;
    /// later commands were computed assuming it succeeded.
    pub fn on_tick<C>(&self, market: &MarketSnapshot, client: &mut C) -> TickReport
    where
        C: ExecutionClient + ?Sized,
    {
        let mut positions: Vec<Position> = client
            .positions()
            .into_iter()
            .filter(|p| p.is_owned_by(&self.tag))
            .collect();
        positions.sort_by_key(|p| p.id);

        let mut report = TickReport::default();
        for position in &positions {
            report.visited.push(position.id);
            for command in self.evaluate(position, market) {
                match client.execute(&command) {
                    Ok(()) => {
                        info!(
                            position = %position.id,
                            command = command.name(),
                            state = ?position.protection_state(),
                            "position modified"
                        );
                        report.issued.push(command);
                    }
                    Err(err) => {
                        warn!(
                            position = %position.id,
                            command = command.name(),
                            error = %err,
                            "modification rejected, will re-evaluate next tick"
                        );
                        report.rejected.push(RejectedCommand {
                            command,
                            reason: err.to_string(),
                        });
                        break;
                    }
                }
            }
        }
        report
    }

    /// Commands the state machine wants for `position` at `market`.
    ///
    /// Pure: depends only on the config, the position record and the snapshot.
    /// A snapshot without a usable pip size produces no commands.
    pub fn evaluate(&self, position: &Position, market: &MarketSnapshot) -> Vec<PositionCommand> {
        if !(market.pip_size.is_finite() && market.pip_size > 0.0) {
            warn!(
                position = %position.id,
                pip_size = market.pip_size,
                "unusable pip size, position skipped"
            );
            return Vec::new();
        }

        let cfg = &self.config;
        let mut projected = position.clone();
        let mut commands = Vec::new();
        let profit = position.profit_pips(market);

        if projected.stop_loss.is_none() && cfg.protection_enabled {
            let cmd = protective_stop(position, market, cfg.min_stop_pips + market.spread_pips);
            self.push(&mut projected, &mut commands, market, cmd);
        }

        if cfg.breakeven_enabled
            && profit > cfg.breakeven_trigger_pips
            && !projected.stop_beyond_entry()
        {
            let cmd = PositionCommand::SetStopLossPips {
                position_id: position.id,
                pips: -1.0,
            };
            self.push(&mut projected, &mut commands, market, cmd);
        }

        match cfg.take_profit_method {
            TakeProfitMethod::TrailingStop if projected.take_profit.is_none() => {
                if profit >= cfg.trailing_trigger_pips && !projected.trailing_active {
                    let cmd = PositionCommand::EnableTrailingStop {
                        position_id: position.id,
                    };
                    self.push(&mut projected, &mut commands, market, cmd);
                }
            }
            TakeProfitMethod::AtrTrailingStop if projected.take_profit.is_none() => {
                self.atr_trail(&mut projected, &mut commands, market, profit);
            }
            TakeProfitMethod::Custom => {
                if let Some(hook) = &self.custom_take_profit {
                    for cmd in hook.on_tick(&projected, market) {
                        if cmd.position_id() != position.id {
                            warn!(
                                position = %position.id,
                                target = %cmd.position_id(),
                                "custom take-profit addressed another position, ignored"
                            );
                            continue;
                        }
                        self.push(&mut projected, &mut commands, market, cmd);
                    }
                }
            }
            _ => {}
        }

        commands
    }

    fn atr_trail(
        &self,
        projected: &mut Position,
        commands: &mut Vec<PositionCommand>,
        market: &MarketSnapshot,
        profit: f64,
    ) {
        if !projected.stop_beyond_entry() && profit >= self.config.trailing_trigger_pips {
            let cmd = PositionCommand::SetStopLossPips {
                position_id: projected.id,
                pips: -1.0,
            };
            self.push(projected, commands, market, cmd);
        }
        if !projected.stop_beyond_entry() {
            return;
        }

        let channel = AtrChannel::from_market(market, self.config.atr_multiplier);
        if !channel.is_finite() {
            debug!(position = %projected.id, "ATR channel unavailable, trail skipped");
            return;
        }
        let new_stop = channel.trailing_stop(projected.direction, market);
        if ratchet::improves(projected.direction, projected.stop_loss, new_stop) {
            let cmd = PositionCommand::SetStopLossPrice {
                position_id: projected.id,
                price: new_stop,
            };
            self.push(projected, commands, market, cmd);
        }
    }

    /// Guard a command and, if it passes, apply it to the projection.
    fn push(
        &self,
        projected: &mut Position,
        commands: &mut Vec<PositionCommand>,
        market: &MarketSnapshot,
        cmd: PositionCommand,
    ) {
        match check(projected, market, &cmd) {
            Ok(()) => {
                cmd.apply_to(projected, market.pip_size);
                commands.push(cmd);
            }
            Err(reason) => {
                warn!(
                    position = %projected.id,
                    command = cmd.name(),
                    reason,
                    "command suppressed"
                );
            }
        }
    }
}

/// Initial stop `pips` from entry, or `pips` beyond the current exit price
/// when the position is already too deep in loss for the entry-relative level.
fn protective_stop(position: &Position, market: &MarketSnapshot, pips: f64) -> PositionCommand {
    let from_entry = position.price_from_entry_pips(pips, market.pip_size);
    let exit = market.exit_price(position.direction);
    if position.direction.is_beyond(exit, from_entry) {
        return PositionCommand::SetStopLossPips {
            position_id: position.id,
            pips,
        };
    }
    debug!(
        position = %position.id,
        from_entry,
        exit,
        "entry floor through market, protecting from exit price"
    );
    PositionCommand::SetStopLossPrice {
        position_id: position.id,
        price: exit - position.direction.sign() * pips * market.pip_size,
    }
}

/// Guards every command must pass before it reaches the broker.
fn check(position: &Position, market: &MarketSnapshot, cmd: &PositionCommand) -> Result<(), &'static str> {
    if !cmd.is_finite() {
        return Err("non-finite value");
    }

    if let PositionCommand::EnableTrailingStop { .. } = cmd {
        if position.stop_loss.is_none() {
            return Err("trailing needs an existing stop");
        }
        return Ok(());
    }

    if let Some(price) = cmd.stop_price(position, market.pip_size) {
        if !price.is_finite() {
            return Err("non-finite stop price");
        }
        if position.stop_loss.is_some()
            && !ratchet::improves(position.direction, position.stop_loss, price)
        {
            return Err("stop would loosen");
        }
        let through_market = match position.direction {
            Direction::Long => price >= market.bid,
            Direction::Short => price <= market.ask,
        };
        if through_market {
            return Err("stop on the wrong side of the market");
        }
    }

    Ok(())
}
