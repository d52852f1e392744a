//! The bot shell: entry gating plus the per-tick lifecycle pass.

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{ConfigError, RiskConfig};
use crate::domain::{
    in_session, AccountSnapshot, Direction, InstanceTag, MarketSession, MarketSnapshot,
    PositionId, SymbolSpec,
};
use crate::error::RiskError;
use crate::execution::{ExecutionClient, ExecutionError};
use crate::lifecycle::{PositionLifecycleManager, TickReport};
use crate::planner::OrderPlanner;
use crate::stops::CustomStopLoss;
use crate::targets::CustomTakeProfit;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EntryError {
    #[error(transparent)]
    Risk(#[from] RiskError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    OutsideSession,
    MaxPositionsReached,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryOutcome {
    Submitted(PositionId),
    Skipped(SkipReason),
}

/// One engine instance trading one symbol.
///
/// Positions are owned through the instance tag: several engines can share a
/// broker account without touching each other's positions.
pub struct RiskEngine {
    symbol: SymbolSpec,
    lifecycle: PositionLifecycleManager,
    custom_stop: Option<Box<dyn CustomStopLoss>>,
}

impl RiskEngine {
    /// Validates `config` before building the engine.
    pub fn new(config: RiskConfig, symbol: SymbolSpec, tag: InstanceTag) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            symbol,
            lifecycle: PositionLifecycleManager::new(config, tag),
            custom_stop: None,
        })
    }

    pub fn with_custom_stop_loss(mut self, hook: Box<dyn CustomStopLoss>) -> Self {
        self.custom_stop = Some(hook);
        self
    }

    pub fn with_custom_take_profit(mut self, hook: Box<dyn CustomTakeProfit>) -> Self {
        self.lifecycle = self.lifecycle.with_custom_take_profit(hook);
        self
    }

    pub fn config(&self) -> &RiskConfig {
        self.lifecycle.config()
    }

    pub fn tag(&self) -> &InstanceTag {
        self.lifecycle.tag()
    }

    pub fn symbol(&self) -> &SymbolSpec {
        &self.symbol
    }

    pub fn on_tick<C>(&self, market: &MarketSnapshot, client: &mut C) -> TickReport
    where
        C: ExecutionClient + ?Sized,
    {
        self.lifecycle.on_tick(market, client)
    }

    /// Try to open a position in `direction`.
    ///
    /// Gated on the configured session and on the number of positions this
    /// instance already holds. Planning and submission errors abort the
    /// attempt and are returned; nothing is retried.
    pub fn try_enter<C>(
        &self,
        direction: Direction,
        market: &MarketSnapshot,
        account: &AccountSnapshot,
        client: &mut C,
    ) -> Result<EntryOutcome, EntryError>
    where
        C: ExecutionClient + ?Sized,
    {
        let config = self.config();

        if !in_session(MarketSession::active_at(market.time), config.session) {
            debug!(time = %market.time, session = %config.session, "entry skipped outside session");
            return Ok(EntryOutcome::Skipped(SkipReason::OutsideSession));
        }

        let owned = client
            .positions()
            .iter()
            .filter(|p| p.is_owned_by(self.tag()))
            .count();
        if owned >= config.max_open_positions {
            debug!(owned, max = config.max_open_positions, "entry skipped, position limit");
            return Ok(EntryOutcome::Skipped(SkipReason::MaxPositionsReached));
        }

        let order = OrderPlanner::new(config, &self.symbol, self.tag())
            .with_custom_stop(self.custom_stop.as_deref())
            .plan(direction, market, account)
            .map_err(|err| {
                warn!(%direction, error = %err, "entry aborted");
                err
            })?;

        let id = client
            .submit_market_order(&order)
            .map_err(|err| {
                warn!(%direction, error = %err, "entry rejected");
                err
            })?;

        info!(
            position = %id,
            %direction,
            volume = order.volume,
            stop_pips = order.stop_pips,
            take_profit_pips = ?order.take_profit_pips,
            "entry submitted"
        );
        Ok(EntryOutcome::Submitted(id))
    }
}
