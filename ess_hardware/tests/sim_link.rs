use std::sync::Arc;

use ess_hardware::error::HwError;
use ess_hardware::{SimLayout, SimParams, SimulatedLink};
use ess_traits::{ManualClock, RegisterLink};
use rstest::rstest;

fn layout(divisor: f64) -> SimLayout {
    SimLayout {
        read_unit: 100,
        enable: 806,
        soc: 843,
        load_base: 817,
        pv: vec![811, 812],
        soc_divisor: divisor,
        mode_unit: 227,
        mode: 33,
        output_unit: 100,
        output: 2902,
    }
}

#[rstest]
#[case(1.0, 45)]
#[case(10.0, 450)]
fn soc_register_is_scaled(#[case] divisor: f64, #[case] raw: u16) {
    let mut link = SimulatedLink::new(
        layout(divisor),
        SimParams::default(),
        Arc::new(ManualClock::new()),
    );
    assert_eq!(link.read_registers(100, 843, 1).unwrap(), vec![raw]);
}

#[test]
fn load_span_sums_to_base_load() {
    let mut link = SimulatedLink::new(
        layout(1.0),
        SimParams::default(),
        Arc::new(ManualClock::new()),
    );
    let phases = link.read_registers(100, 817, 3).unwrap();
    assert_eq!(phases.iter().map(|v| u32::from(*v)).sum::<u32>(), 450);
}

#[test]
fn charger_only_stores_daytime_surplus() {
    let clock = ManualClock::new();
    let params = SimParams {
        start_phase: 0.5,
        ..SimParams::default()
    };
    let mut link = SimulatedLink::new(layout(1.0), params, Arc::new(clock.clone()));
    link.write_register(227, 33, 1).unwrap();
    clock.advance_secs(60.0);
    link.read_registers(100, 806, 1).unwrap();
    assert!(link.soc() > 45.0);
}

#[test]
fn periodic_read_failures_are_timeouts() {
    let params = SimParams {
        fail_every: 3,
        ..SimParams::default()
    };
    let mut link = SimulatedLink::new(layout(1.0), params, Arc::new(ManualClock::new()));
    assert!(link.read_registers(100, 806, 1).is_ok());
    assert!(link.read_registers(100, 806, 1).is_ok());
    let err = link.read_registers(100, 806, 1).unwrap_err();
    assert!(matches!(err.downcast_ref::<HwError>(), Some(HwError::Timeout)));
}

#[test]
fn disabled_flag_reads_zero() {
    let mut link = SimulatedLink::new(
        layout(1.0),
        SimParams::default(),
        Arc::new(ManualClock::new()),
    );
    link.set_enabled(false);
    assert_eq!(link.read_registers(100, 806, 1).unwrap(), vec![0]);
}
