//! pipguard core: position risk and order lifecycle for a single-symbol bot.
//!
//! - Position sizing from an account-risk budget
//! - Initial stop-loss selection with floor/ceiling bounds
//! - Take-profit planning at order-open time
//! - Per-tick protection state machine with a tighten-only stop ratchet
//! - Session gating and the execution seam (`ExecutionClient`, `SimBroker`)
//!
//! The engine never owns positions. It reads them from the execution
//! collaborator every tick and writes back only through `PositionCommand`s.

pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod execution;
pub mod lifecycle;
pub mod planner;
pub mod sizing;
pub mod stops;
pub mod targets;

pub use config::{ConfigError, RiskConfig, StopMethod, TakeProfitMethod};
pub use engine::{EntryError, EntryOutcome, RiskEngine, SkipReason};
pub use error::RiskError;
pub use execution::{ExecutionClient, ExecutionError, SimBroker};
pub use lifecycle::{PositionCommand, PositionLifecycleManager, TickReport};
pub use planner::{OrderPlanner, OrderRequest};
