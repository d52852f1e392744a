/// Stop-loss ratchet
///
/// **Core Rule:** once a position has a stop, the engine may only move it in
/// the profitable direction. Long stops only rise, Short stops only fall.
///
/// This prevents the "volatility trap": an expanding ATR channel would
/// otherwise widen a trailing stop after a favorable move.
///
/// The ratchet holds no state of its own. The current stop is read from the
/// broker's position record every tick, so a rejected modification cannot
/// leave the ratchet out of sync with the real stop.
use crate::domain::Direction;

/// True if `proposed` strictly tightens `current`.
///
/// With no current stop any finite level is accepted. NaN never improves.
pub fn improves(direction: Direction, current: Option<f64>, proposed: f64) -> bool {
    if !proposed.is_finite() {
        return false;
    }
    match current {
        None => true,
        Some(current) => direction.is_beyond(proposed, current),
    }
}

/// The tighter of `current` and `proposed`.
///
/// # Example
/// ```
/// use pipguard_core::domain::Direction;
/// use pipguard_core::lifecycle::ratchet;
///
/// // Tightening 1.0990 → 1.1001 is allowed
/// assert_eq!(ratchet::tighten(Direction::Long, Some(1.0990), 1.1001), 1.1001);
///
/// // Loosening 1.1001 → 1.0980 is blocked
/// assert_eq!(ratchet::tighten(Direction::Long, Some(1.1001), 1.0980), 1.1001);
/// ```
pub fn tighten(direction: Direction, current: Option<f64>, proposed: f64) -> f64 {
    match current {
        Some(current) if !improves(direction, Some(current), proposed) => current,
        _ => proposed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_tightening_allowed() {
        assert!(improves(Direction::Long, Some(95.0), 100.0));
        assert_eq!(tighten(Direction::Long, Some(95.0), 100.0), 100.0);
    }

    #[test]
    fn long_loosening_blocked() {
        assert!(!improves(Direction::Long, Some(100.0), 90.0));
        assert_eq!(tighten(Direction::Long, Some(100.0), 90.0), 100.0);
    }

    #[test]
    fn short_tightening_allowed() {
        assert!(improves(Direction::Short, Some(105.0), 100.0));
        assert_eq!(tighten(Direction::Short, Some(105.0), 100.0), 100.0);
    }

    #[test]
    fn short_loosening_blocked() {
        assert!(!improves(Direction::Short, Some(100.0), 110.0));
        assert_eq!(tighten(Direction::Short, Some(100.0), 110.0), 100.0);
    }

    #[test]
    fn equal_level_is_not_an_improvement() {
        assert!(!improves(Direction::Long, Some(100.0), 100.0));
        assert!(!improves(Direction::Short, Some(100.0), 100.0));
    }

    #[test]
    fn first_stop_always_accepted() {
        assert!(improves(Direction::Long, None, 95.0));
        assert_eq!(tighten(Direction::Short, None, 105.0), 105.0);
    }

    #[test]
    fn nan_never_improves() {
        assert!(!improves(Direction::Long, None, f64::NAN));
        assert!(!improves(Direction::Long, Some(95.0), f64::NAN));
        assert_eq!(tighten(Direction::Long, Some(95.0), f64::NAN), 95.0);
    }

    #[test]
    fn volatility_trap_scenario() {
        // Price at 110, ATR expands from 5 to 10: 110 - 2*10 = 90 is looser than 95
        assert_eq!(tighten(Direction::Long, Some(95.0), 90.0), 95.0);
    }
}
