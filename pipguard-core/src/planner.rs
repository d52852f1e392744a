//! Entry order planning: stop → size → target.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::RiskConfig;
use crate::domain::{AccountSnapshot, Direction, InstanceTag, MarketSnapshot, SymbolSpec};
use crate::error::RiskError;
use crate::sizing::size_for;
use crate::stops::{CustomStopLoss, StopLossSelector};
use crate::targets;

/// Market order ready for submission.
///
/// Stop and target are distances from the fill price, in pips.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub direction: Direction,
    pub volume: f64,
    pub stop_pips: f64,
    pub take_profit_pips: Option<f64>,
    pub label: InstanceTag,
    pub comment: String,
}

/// Builds entry orders from the risk configuration.
pub struct OrderPlanner<'a> {
    config: &'a RiskConfig,
    symbol: &'a SymbolSpec,
    tag: &'a InstanceTag,
    custom_stop: Option<&'a dyn CustomStopLoss>,
}

impl<'a> OrderPlanner<'a> {
    pub fn new(config: &'a RiskConfig, symbol: &'a SymbolSpec, tag: &'a InstanceTag) -> Self {
        Self {
            config,
            symbol,
            tag,
            custom_stop: None,
        }
    }

    pub fn with_custom_stop(mut self, hook: Option<&'a dyn CustomStopLoss>) -> Self {
        self.custom_stop = hook;
        self
    }

    /// Plan a market order in `direction`.
    ///
    /// The volume is sized against the stop widened by the current spread,
    /// since the spread is paid on top of the stop distance when stopped out.
    pub fn plan(
        &self,
        direction: Direction,
        market: &MarketSnapshot,
        account: &AccountSnapshot,
    ) -> Result<OrderRequest, RiskError> {
        self.check_pip_size(market)?;

        let stop_pips = StopLossSelector::new(self.config)
            .with_custom(self.custom_stop)
            .select(direction, market)?;

        let risked_pips = stop_pips + market.spread_pips;
        let sizing = size_for(self.config.risk_percent, risked_pips, account, self.symbol)?;
        debug!(
            symbol = %self.symbol.name,
            %direction,
            stop_pips,
            risked_pips,
            limit = sizing.limit,
            capped = sizing.risk_capped,
            volume = sizing.volume,
            "sized entry"
        );

        let take_profit = targets::plan(&self.config.take_profit_method, stop_pips)?;

        Ok(OrderRequest {
            direction,
            volume: sizing.volume,
            stop_pips,
            take_profit_pips: take_profit.target_pips(),
            label: self.tag.clone(),
            comment: stop_pips.to_string(),
        })
    }

    /// Pips measured on the snapshot are priced with the symbol's pip value,
    /// so both must use the same pip size.
    fn check_pip_size(&self, market: &MarketSnapshot) -> Result<(), RiskError> {
        let (symbol_pip, market_pip) = (self.symbol.pip_size, market.pip_size);
        let tolerance = 1e-9 * symbol_pip.abs().max(market_pip.abs());
        if (symbol_pip - market_pip).abs() <= tolerance {
            return Ok(());
        }
        Err(RiskError::invalid_volume(format!(
            "{} pip size {symbol_pip} disagrees with market pip size {market_pip}",
            self.symbol.name
        )))
    }
}
