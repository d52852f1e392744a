//! Domain types for pipguard

pub mod direction;
pub mod ids;
pub mod market;
pub mod position;
pub mod session;

pub use direction::Direction;
pub use ids::{InstanceTag, PositionId};
pub use market::{to_pips, AccountSnapshot, MarketSnapshot, SymbolSpec};
pub use position::{Position, ProtectionState};
pub use session::{in_session, MarketSession};
