//! pipguard CLI: order planning and CSV replay.
//!
//! Commands:
//! - `plan`: size one entry order from a config and a quote, print it as JSON
//! - `replay`: drive the engine over CSV bars against the simulated broker

mod feed;

use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use pipguard_core::domain::{AccountSnapshot, Direction, InstanceTag, MarketSnapshot, SymbolSpec};
use pipguard_core::execution::{ClosedPosition, SimBroker};
use pipguard_core::planner::{OrderPlanner, OrderRequest};
use pipguard_core::{EntryOutcome, ExecutionClient, RiskConfig, RiskEngine};

#[derive(Parser)]
#[command(name = "pipguard", about = "pipguard: position risk and order lifecycle engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Plan a single entry order and print it as JSON.
    Plan {
        #[command(flatten)]
        common: CommonArgs,

        /// Trade direction: long/buy or short/sell.
        #[arg(long)]
        direction: Direction,

        #[arg(long, default_value_t = 10_000.0)]
        balance: f64,

        #[arg(long, default_value_t = 100.0)]
        leverage: f64,

        #[arg(long)]
        bid: f64,

        #[arg(long)]
        ask: f64,

        /// Current ATR value, in price units.
        #[arg(long)]
        atr: Option<f64>,

        /// Current bar high (defaults to ask).
        #[arg(long)]
        high: Option<f64>,

        /// Current bar low (defaults to bid).
        #[arg(long)]
        low: Option<f64>,
    },
    /// Replay CSV bars through the engine against a simulated broker.
    Replay {
        #[command(flatten)]
        common: CommonArgs,

        /// CSV with columns time,open,high,low,close[,spread_pips].
        #[arg(long)]
        bars: PathBuf,

        /// Entry attempt as BAR:DIRECTION (e.g. 20:long). Repeatable.
        #[arg(long = "entry")]
        entries: Vec<EntrySpec>,

        #[arg(long, default_value_t = 10_000.0)]
        balance: f64,

        #[arg(long, default_value_t = 100.0)]
        leverage: f64,

        /// Spread used for bars without a spread_pips value.
        #[arg(long, default_value_t = 1.0)]
        spread: f64,
    },
}

#[derive(Args)]
struct CommonArgs {
    /// Path to a TOML risk config. Defaults are used when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Instance tag. Defaults to one derived from the config fingerprint.
    #[arg(long)]
    tag: Option<String>,

    #[arg(long, default_value = "EURUSD")]
    symbol: String,

    #[arg(long, default_value_t = 0.0001)]
    pip_size: f64,

    /// Account-currency value of one pip for one unit of volume.
    #[arg(long, default_value_t = 0.0001)]
    pip_value: f64,

    #[arg(long, default_value_t = 1_000.0)]
    min_volume: f64,

    #[arg(long, default_value_t = 1_000.0)]
    volume_step: f64,
}

impl CommonArgs {
    fn load_config(&self) -> Result<RiskConfig> {
        match &self.config {
            Some(path) => RiskConfig::from_file(path)
                .with_context(|| format!("failed to load config {}", path.display())),
            None => Ok(RiskConfig::default()),
        }
    }

    fn tag(&self, config: &RiskConfig) -> Result<InstanceTag> {
        match &self.tag {
            Some(tag) => Ok(InstanceTag::new(tag.clone())),
            None => Ok(InstanceTag::from_fingerprint(&config.fingerprint()?)),
        }
    }

    fn symbol(&self) -> SymbolSpec {
        SymbolSpec::new(
            self.symbol.clone(),
            self.pip_size,
            self.pip_value,
            self.min_volume,
            self.volume_step,
        )
    }
}

/// `BAR:DIRECTION`, e.g. `20:long`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct EntrySpec {
    bar: usize,
    direction: Direction,
}

impl FromStr for EntrySpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (bar, direction) = s
            .split_once(':')
            .ok_or_else(|| format!("expected BAR:DIRECTION, got {s:?}"))?;
        let bar = bar
            .trim()
            .parse()
            .map_err(|_| format!("bad bar index {bar:?}"))?;
        let direction = direction.trim().parse()?;
        Ok(Self { bar, direction })
    }
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Plan {
            common,
            direction,
            balance,
            leverage,
            bid,
            ask,
            atr,
            high,
            low,
        } => run_plan(&common, direction, balance, leverage, bid, ask, atr, high, low),
        Commands::Replay {
            common,
            bars,
            entries,
            balance,
            leverage,
            spread,
        } => run_replay(&common, &bars, &entries, balance, leverage, spread),
    }
}

#[allow(clippy::too_many_arguments)]
fn run_plan(
    common: &CommonArgs,
    direction: Direction,
    balance: f64,
    leverage: f64,
    bid: f64,
    ask: f64,
    atr: Option<f64>,
    high: Option<f64>,
    low: Option<f64>,
) -> Result<()> {
    if ask < bid {
        bail!("ask {ask} is below bid {bid}");
    }
    let config = common.load_config()?;
    let tag = common.tag(&config)?;
    let symbol = common.symbol();

    let market = MarketSnapshot::new(chrono::Utc::now(), bid, ask, symbol.pip_size)
        .with_bar(high.unwrap_or(ask), low.unwrap_or(bid))
        .with_atr(atr.unwrap_or(f64::NAN));
    let account = AccountSnapshot::new(balance, leverage);

    let order: OrderRequest = OrderPlanner::new(&config, &symbol, &tag)
        .plan(direction, &market, &account)
        .context("order planning failed")?;

    println!("{}", serde_json::to_string_pretty(&order)?);
    Ok(())
}

#[derive(Debug, Serialize)]
struct EntryRecord {
    bar: usize,
    direction: Direction,
    #[serde(skip_serializing_if = "Option::is_none")]
    outcome: Option<EntryOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct ReplaySummary {
    tag: InstanceTag,
    bars: usize,
    entries: Vec<EntryRecord>,
    commands_issued: usize,
    commands_rejected: usize,
    closed: Vec<ClosedPosition>,
    open_positions: usize,
    starting_balance: f64,
    final_balance: f64,
}

fn run_replay(
    common: &CommonArgs,
    bars_path: &Path,
    entries: &[EntrySpec],
    starting_balance: f64,
    leverage: f64,
    default_spread: f64,
) -> Result<()> {
    let config = common.load_config()?;
    let tag = common.tag(&config)?;
    let symbol = common.symbol();
    let bars = feed::read_bars_file(bars_path)?;
    let atr = feed::atr(&bars, config.atr_length);

    for entry in entries {
        if entry.bar >= bars.len() {
            bail!("entry at bar {} is past the last bar {}", entry.bar, bars.len() - 1);
        }
    }

    let engine = RiskEngine::new(config, symbol.clone(), tag.clone())?;
    let snapshot = |i: usize| bars[i].snapshot(symbol.pip_size, default_spread, atr[i]);
    let mut broker = SimBroker::new(snapshot(0));

    info!(%tag, bars = bars.len(), entries = entries.len(), "replay started");

    let mut balance = starting_balance;
    let mut records = Vec::new();
    let mut issued = 0;
    let mut rejected = 0;

    for i in 0..bars.len() {
        let market = snapshot(i);
        for closed in broker.update_market(market.clone()) {
            balance += closed.pips * closed.position.volume * symbol.pip_value;
        }

        let report = engine.on_tick(&market, &mut broker);
        issued += report.issued.len();
        rejected += report.rejected.len();

        for entry in entries.iter().filter(|e| e.bar == i) {
            let account = AccountSnapshot::new(balance, leverage);
            let record = match engine.try_enter(entry.direction, &market, &account, &mut broker) {
                Ok(outcome) => EntryRecord {
                    bar: i,
                    direction: entry.direction,
                    outcome: Some(outcome),
                    error: None,
                },
                Err(err) => EntryRecord {
                    bar: i,
                    direction: entry.direction,
                    outcome: None,
                    error: Some(err.to_string()),
                },
            };
            records.push(record);
        }
    }

    let summary = ReplaySummary {
        tag,
        bars: bars.len(),
        entries: records,
        commands_issued: issued,
        commands_rejected: rejected,
        closed: broker.closed().to_vec(),
        open_positions: broker.positions().len(),
        starting_balance,
        final_balance: balance,
    };
    info!(
        closed = summary.closed.len(),
        open = summary.open_positions,
        final_balance = summary.final_balance,
        "replay finished"
    );
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
