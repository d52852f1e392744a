//! Risk computation errors.
//!
//! Every numeric failure in sizing or stop selection is normalized into one of
//! these variants so that NaN or a zero-distance stop never reaches an order.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RiskError {
    /// Non-positive or NaN stop distance, or a stop that could not be derived
    /// from the market (bad pip size, NaN ATR).
    #[error("invalid stop distance: {stop_pips} pips")]
    InvalidStopDistance { stop_pips: f64 },

    #[error("invalid volume: {reason}")]
    InvalidVolume { reason: String },

    /// The selected stop cannot sit outside the current spread.
    #[error("stop of {stop_pips} pips falls inside the {spread_pips} pip spread")]
    StopBoundViolation { stop_pips: f64, spread_pips: f64 },

    /// A custom hook is missing or returned the "not implemented" sentinel.
    #[error("custom {hook} strategy is not implemented")]
    UnimplementedStrategy { hook: &'static str },
}

impl RiskError {
    pub(crate) fn invalid_volume(reason: impl Into<String>) -> Self {
        Self::InvalidVolume {
            reason: reason.into(),
        }
    }

    /// True for errors that mean "no usable stop distance".
    ///
    /// An unimplemented custom stop counts: it must never size a position.
    pub fn is_invalid_stop(&self) -> bool {
        matches!(
            self,
            Self::InvalidStopDistance { .. } | Self::UnimplementedStrategy { .. }
        )
    }
}
