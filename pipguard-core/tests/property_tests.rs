//! Property tests for risk invariants.
//!
//! Uses proptest to verify:
//! 1. Sizing: volume is a whole number of steps, never below the minimum, and
//!    never risks more than the budget unless pinned at the minimum
//! 2. Stop bounds: every accepted stop lies inside the configured bounds and
//!    outside the spread, even with adversarial ATR input
//! 3. Ratchet monotonicity: stops may only tighten, never loosen
//! 4. Idempotence: re-evaluating on an unchanged snapshot issues nothing new
//! 5. Stop monotonicity: across any tick path, through the engine and the
//!    simulated broker, a position's stop never moves against the trade

use chrono::{DateTime, Duration};
use proptest::prelude::*;
use pipguard_core::domain::{
    AccountSnapshot, Direction, InstanceTag, MarketSnapshot, Position, PositionId, SymbolSpec,
};
use pipguard_core::execution::SimBroker;
use pipguard_core::lifecycle::ratchet;
use pipguard_core::sizing::{size, SizingRequest};
use pipguard_core::stops::StopLossSelector;
use pipguard_core::{
    EntryOutcome, PositionLifecycleManager, RiskConfig, RiskEngine, RiskError, StopMethod,
    TakeProfitMethod,
};

const PIP: f64 = 0.0001;

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_direction() -> impl Strategy<Value = Direction> {
    prop_oneof![Just(Direction::Long), Just(Direction::Short)]
}

fn arb_price() -> impl Strategy<Value = f64> {
    (0.9..1.5_f64).prop_map(|p| (p * 100_000.0).round() / 100_000.0)
}

/// ATR including the values an unwarmed indicator can produce.
fn arb_atr() -> impl Strategy<Value = f64> {
    prop_oneof![
        4 => (0.00001..0.01_f64),
        1 => Just(f64::NAN),
        1 => Just(f64::INFINITY),
        1 => Just(0.0),
        1 => (-0.01..0.0_f64),
    ]
}

fn arb_stop_method() -> impl Strategy<Value = StopMethod> {
    prop_oneof![
        (0.1..200.0_f64).prop_map(|pips| StopMethod::FixedPips { pips }),
        Just(StopMethod::Minimum),
        Just(StopMethod::Maximum),
        Just(StopMethod::AtrBased),
    ]
}

fn market(bid: f64, spread_pips: f64) -> MarketSnapshot {
    let ask = bid + spread_pips * PIP;
    MarketSnapshot::new(DateTime::from_timestamp(0, 0).unwrap(), bid, ask, PIP)
        .with_spread_pips(spread_pips)
}

// ── 1. Sizing ────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn sizing_respects_minimum_step_and_budget(
        risk_percent in 1.0..5.0_f64,
        stop_pips in 0.5..500.0_f64,
        balance in 100.0..1_000_000.0_f64,
        leverage in 1.0..500.0_f64,
        pip_value in 0.000_001..0.01_f64,
    ) {
        let symbol = SymbolSpec::new("X", PIP, pip_value, 1_000.0, 1_000.0);
        let account = AccountSnapshot::new(balance, leverage);
        let sizing = size(&SizingRequest::new(risk_percent, stop_pips, &account, &symbol)).unwrap();

        prop_assert!(sizing.volume >= symbol.min_volume);
        let steps = sizing.volume / symbol.volume_step;
        prop_assert!((steps - steps.round()).abs() < 1e-6);

        if sizing.volume > symbol.min_volume {
            let risked = sizing.risk_at(stop_pips, &symbol);
            prop_assert!(
                risked <= sizing.limit * (1.0 + 1e-6) + 1e-5,
                "risked {} over budget {}", risked, sizing.limit
            );
        }
    }

    #[test]
    fn sizing_rejects_degenerate_stops(
        stop_pips in prop_oneof![Just(0.0), Just(f64::NAN), (-100.0..0.0_f64)],
    ) {
        let symbol = SymbolSpec::forex_major("EURUSD");
        let account = AccountSnapshot::new(10_000.0, 100.0);
        let err = size(&SizingRequest::new(2.0, stop_pips, &account, &symbol)).unwrap_err();
        let is_invalid_stop = matches!(err, RiskError::InvalidStopDistance { .. });
        prop_assert!(is_invalid_stop);
    }
}

// ── 2. Stop bounds ───────────────────────────────────────────────────

proptest! {
    #[test]
    fn accepted_stops_lie_inside_bounds(
        method in arb_stop_method(),
        direction in arb_direction(),
        bid in arb_price(),
        spread in 0.0..15.0_f64,
        atr in arb_atr(),
        min_stop in 1.0..10.0_f64,
        extra in 0.0..40.0_f64,
        multiplier in 0.5..3.0_f64,
    ) {
        let config = RiskConfig {
            stop_method: method,
            min_stop_pips: min_stop,
            max_stop_pips: min_stop + extra,
            atr_multiplier: multiplier,
            ..RiskConfig::default()
        };
        let m = market(bid, spread)
            .with_bar(bid + 5.0 * PIP, bid - 5.0 * PIP)
            .with_atr(atr);

        match StopLossSelector::new(&config).select(direction, &m) {
            Ok(stop) => {
                prop_assert!(stop.is_finite());
                prop_assert!(stop >= config.min_stop_pips + spread - 1e-9);
                prop_assert!(stop <= config.max_stop_pips + 1e-9);
                prop_assert!(stop > spread);
            }
            Err(err) => {
                let known = matches!(
                    err,
                    RiskError::InvalidStopDistance { .. } | RiskError::StopBoundViolation { .. }
                );
                prop_assert!(known, "unexpected error {:?}", err);
            }
        }
    }

    #[test]
    fn unclamped_stops_still_clear_the_spread(
        pips in 0.1..50.0_f64,
        spread in 0.0..10.0_f64,
    ) {
        let config = RiskConfig {
            stop_method: StopMethod::FixedPips { pips },
            protection_enabled: false,
            ..RiskConfig::default()
        };
        match StopLossSelector::new(&config).select(Direction::Long, &market(1.1, spread)) {
            Ok(stop) => prop_assert!(stop > spread),
            Err(err) => {
                let is_violation = matches!(err, RiskError::StopBoundViolation { .. });
                prop_assert!(is_violation);
            }
        }
    }
}

// ── 3. Ratchet monotonicity ──────────────────────────────────────────

proptest! {
    #[test]
    fn ratchet_never_loosens(
        direction in arb_direction(),
        proposals in prop::collection::vec(prop_oneof![4 => arb_price(), 1 => Just(f64::NAN)], 1..60),
    ) {
        let mut stop: Option<f64> = None;
        for proposed in proposals {
            let before = stop;
            if ratchet::improves(direction, stop, proposed) {
                stop = Some(proposed);
            }
            if let (Some(prev), Some(now)) = (before, stop) {
                match direction {
                    Direction::Long => prop_assert!(now >= prev),
                    Direction::Short => prop_assert!(now <= prev),
                }
            }
            if let Some(now) = stop {
                prop_assert!(now.is_finite());
            }
        }
    }
}

// ── 4. Lifecycle idempotence ─────────────────────────────────────────

fn arb_config() -> impl Strategy<Value = RiskConfig> {
    (
        any::<bool>(),
        any::<bool>(),
        prop_oneof![
            Just(TakeProfitMethod::FixedRatio { ratio: 1.0 }),
            Just(TakeProfitMethod::TrailingStop),
            Just(TakeProfitMethod::AtrTrailingStop),
        ],
        1.0..10.0_f64,
        1.0..10.0_f64,
    )
        .prop_map(|(breakeven, protection, tp, be_trigger, trail_trigger)| RiskConfig {
            breakeven_enabled: breakeven,
            protection_enabled: protection,
            take_profit_method: tp,
            breakeven_trigger_pips: be_trigger,
            trailing_trigger_pips: trail_trigger,
            ..RiskConfig::default()
        })
}

proptest! {
    #[test]
    fn evaluation_is_idempotent(
        config in arb_config(),
        direction in arb_direction(),
        move_pips in -30.0..30.0_f64,
        stop_offset in prop::option::of(-10.0..25.0_f64),
        atr in arb_atr(),
    ) {
        let tag = InstanceTag::new("prop");
        let manager = PositionLifecycleManager::new(config, tag.clone());

        let entry = 1.1000;
        let mut position = Position::new(PositionId(1), direction, entry, 1_000.0).with_label(tag);
        position.stop_loss = stop_offset.map(|pips| position.price_from_entry_pips(pips, PIP));

        let bid = entry + direction.sign() * move_pips * PIP;
        let m = market(bid, 1.5)
            .with_bar(bid + 4.0 * PIP, bid - 4.0 * PIP)
            .with_atr(atr);

        let first = manager.evaluate(&position, &m);
        for cmd in &first {
            prop_assert!(cmd.is_finite());
            cmd.apply_to(&mut position, PIP);
        }

        let second = manager.evaluate(&position, &m);
        prop_assert!(second.is_empty(), "second pass issued {:?} after {:?}", second, first);
    }
}

// ── 5. Stop monotonicity across tick paths ───────────────────────────

fn arb_take_profit() -> impl Strategy<Value = TakeProfitMethod> {
    prop_oneof![
        (0.5..3.0_f64).prop_map(|ratio| TakeProfitMethod::FixedRatio { ratio }),
        Just(TakeProfitMethod::TrailingStop),
        Just(TakeProfitMethod::AtrTrailingStop),
        Just(TakeProfitMethod::Custom),
    ]
}

proptest! {
    #[test]
    fn stop_never_moves_against_the_trade(
        take_profit_method in arb_take_profit(),
        breakeven in any::<bool>(),
        direction in arb_direction(),
        path in prop::collection::vec((-8.0..8.0_f64, arb_atr()), 1..80),
    ) {
        let config = RiskConfig {
            stop_method: StopMethod::FixedPips { pips: 10.0 },
            take_profit_method,
            breakeven_enabled: breakeven,
            breakeven_trigger_pips: 3.0,
            trailing_trigger_pips: 4.0,
            ..RiskConfig::default()
        };
        let symbol = SymbolSpec::forex_major("EURUSD");
        let engine = RiskEngine::new(config, symbol, InstanceTag::new("path")).unwrap();
        let account = AccountSnapshot::new(10_000.0, 100.0);
        let start = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let mut broker = SimBroker::new(market(1.1000, 1.5).with_atr(5.0 * PIP));
        let entry_market = broker.market().clone();
        let outcome = engine
            .try_enter(direction, &entry_market, &account, &mut broker)
            .unwrap();
        let EntryOutcome::Submitted(id) = outcome else {
            return Err(TestCaseError::fail("entry skipped"));
        };

        let mut bid = 1.1000;
        let mut previous = broker.position(id).and_then(|p| p.stop_loss);
        for (i, (move_pips, atr)) in path.into_iter().enumerate() {
            bid += move_pips * PIP;
            let mut m = market(bid, 1.5)
                .with_bar(bid + 3.0 * PIP, bid - 3.0 * PIP)
                .with_atr(atr);
            m.time = start + Duration::minutes(i as i64 + 1);

            broker.update_market(m.clone());
            engine.on_tick(&m, &mut broker);

            let Some(position) = broker.position(id) else {
                break;
            };
            let stop = position.stop_loss;
            prop_assert!(stop.is_some_and(f64::is_finite), "stop lost or non-finite: {:?}", stop);
            if let (Some(prev), Some(now)) = (previous, stop) {
                match direction {
                    Direction::Long => {
                        prop_assert!(now >= prev, "long stop fell {} -> {}", prev, now)
                    }
                    Direction::Short => {
                        prop_assert!(now <= prev, "short stop rose {} -> {}", prev, now)
                    }
                }
            }
            previous = stop;
        }
    }
}
