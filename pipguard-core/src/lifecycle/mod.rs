//! Position lifecycle: protection state machine, commands and the stop ratchet.

pub mod command;
pub mod manager;
pub mod ratchet;

pub use command::PositionCommand;
pub use manager::{PositionLifecycleManager, RejectedCommand, TickReport};
