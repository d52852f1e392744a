//! Execution collaborator: the broker seam.
//!
//! The engine reads positions and writes orders and modifications only
//! through [`ExecutionClient`]. [`SimBroker`] is the in-memory implementation
//! used for replay, tests and benchmarks.

pub mod sim;

use thiserror::Error;

use crate::domain::{Position, PositionId};
use crate::lifecycle::PositionCommand;
use crate::planner::OrderRequest;

pub use sim::{CloseReason, ClosedPosition, SimBroker};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExecutionError {
    #[error("position {0} is not open")]
    UnknownPosition(PositionId),

    #[error("modification of position {position_id} rejected: {reason}")]
    Rejected { position_id: PositionId, reason: String },

    #[error("market order rejected: {reason}")]
    OrderRejected { reason: String },
}

/// Reads open positions and applies orders and modifications.
///
/// Each call is atomic from the engine's point of view: it either takes
/// effect in full or returns an error and changes nothing.
pub trait ExecutionClient {
    /// Every open position, including ones owned by other instances.
    fn positions(&self) -> Vec<Position>;

    fn submit_market_order(&mut self, order: &OrderRequest) -> Result<PositionId, ExecutionError>;

    fn execute(&mut self, command: &PositionCommand) -> Result<(), ExecutionError>;
}
