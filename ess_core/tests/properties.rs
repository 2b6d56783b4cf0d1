use std::time::{Duration, Instant};

use ess_core::mocks::RegisterBank;
use ess_core::{
    Channel, GovernorCfg, Mode, ModeCfg, ModeInput, ModeStateMachine, NightCfg, NightDetector,
    RegisterMap, SurplusCfg, SurplusDetector, WriteGovernor, WriteOutcome,
};
use proptest::prelude::*;

prop_compose! {
    fn pv_trace()(samples in prop::collection::vec((0.0f64..2000.0, 0.0f64..30.0), 1..300))
        -> Vec<(f64, f64)> {
        samples
    }
}

prop_compose! {
    fn mode_inputs()(steps in prop::collection::vec(
        (any::<bool>(), 0.0f64..100.0, any::<bool>(), any::<bool>(), 0u64..60),
        1..200,
    )) -> Vec<(ModeInput, u64)> {
        steps
            .into_iter()
            .map(|(enabled, soc, night, surplus_confirmed, dt)| {
                (ModeInput { enabled, soc, night, surplus_confirmed }, dt)
            })
            .collect()
    }
}

proptest! {
    #[test]
    fn integrator_stays_within_bounds(trace in pv_trace()) {
        let cfg = NightCfg { pv_threshold_w: 200.0, confirm_s: 120.0, decay_factor: 0.25 };
        let mut d = NightDetector::new(cfg.clone());
        for (pv, dt) in trace {
            let night = d.update(pv, dt);
            let acc = d.state().accumulator;
            prop_assert!(acc >= 0.0);
            prop_assert!(acc <= cfg.confirm_s);
            prop_assert_eq!(night, acc >= cfg.confirm_s);
        }
    }

    #[test]
    fn integrator_is_deterministic(trace in pv_trace()) {
        let mut a = NightDetector::new(NightCfg::default());
        let mut b = NightDetector::new(NightCfg::default());
        for (pv, dt) in &trace {
            prop_assert_eq!(a.update(*pv, *dt), b.update(*pv, *dt));
        }
        prop_assert_eq!(a.state(), b.state());
    }

    #[test]
    fn surplus_timer_resets_on_any_miss(trace in pv_trace(), load in 0.0f64..1500.0) {
        let mut d = SurplusDetector::new(SurplusCfg::default());
        for (pv, dt) in trace {
            d.update(load, pv, dt);
            if !d.holds(load, pv) {
                prop_assert_eq!(d.timer().continuous_surplus_seconds, 0.0);
            }
        }
    }

    #[test]
    fn machine_never_jumps_off_to_on_and_on_is_latched(
        start in prop::sample::select(vec![Mode::Off, Mode::ChargerOnly, Mode::On]),
        steps in mode_inputs(),
        night_off in any::<bool>(),
        wait_for_night in any::<bool>(),
    ) {
        let cfg = ModeCfg {
            turn_off_at_night_below_charge_min: night_off,
            require_night_before_restart: wait_for_night,
            ..ModeCfg::default()
        };
        let soc_min = cfg.soc_min;
        let mut m = ModeStateMachine::new(cfg);
        m.adopt(start);
        let mut now = Instant::now();
        for (input, dt) in steps {
            now += Duration::from_secs(dt);
            let before = m.mode();
            let dwelling = m.is_shutting_down();
            let out = m.decide(&input, now);
            let after = m.mode();
            if !input.enabled {
                prop_assert_eq!(out, None);
                prop_assert_eq!(before, after);
                continue;
            }
            prop_assert_eq!(out, Some(after));
            prop_assert!(!(before == Mode::Off && after == Mode::On));
            prop_assert!(!(before == Mode::On && after == Mode::Off));
            if before == Mode::On && input.soc > soc_min {
                prop_assert_eq!(after, Mode::On);
            }
            // without the night override only the shutdown dwell ends ChargerOnly
            if !night_off && before == Mode::ChargerOnly && !dwelling {
                prop_assert_ne!(after, Mode::Off);
            }
        }
    }

    #[test]
    fn governor_respects_gap_and_dedups(
        requests in prop::collection::vec((1u16..5, 0u64..20), 1..100),
    ) {
        let gap = Duration::from_secs(5);
        let cfg = GovernorCfg { mode_gap: gap, ..GovernorCfg::default() };
        let map = RegisterMap::default();
        let mut g = WriteGovernor::new(&map, &cfg);
        let mut link = RegisterBank::new();
        let mut now = Instant::now();
        let mut last: Option<(u16, Instant)> = None;
        for (value, dt) in requests {
            now += Duration::from_secs(dt);
            let out = g.maybe_write(&mut link, Channel::Mode, value, now);
            if out == WriteOutcome::Written {
                if let Some((prev, at)) = last {
                    prop_assert_ne!(prev, value);
                    prop_assert!(now.duration_since(at) >= gap);
                }
                last = Some((value, now));
            }
        }
        let writes = link.writes_to(map.mode_unit, map.mode);
        prop_assert!(writes.windows(2).all(|w| w[0] != w[1]));
    }
}
