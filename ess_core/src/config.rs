//! Runtime configuration types for the decision engine.
//!
//! These are the already-validated, unit-converted structs the engine runs on.
//! They are separate from the TOML/env schema in `ess_config`; see
//! `conversions` for the bridge.

use std::time::Duration;

/// Longest shutdown dwell the state machine will schedule.
pub const MAX_OFF_DELAY: Duration = Duration::from_secs(86_400);

/// Where the sampler reads from and the governor writes to.
///
/// Addresses are final wire addresses: the configured address bias has already
/// been applied.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisterMap {
    pub read_unit: u8,
    pub enable: u16,
    pub soc: u16,
    /// First of three consecutive load registers.
    pub load_base: u16,
    pub pv: Vec<u16>,
    /// Raw SOC register value is divided by this to get percent.
    pub soc_divisor: f64,
    pub mode_unit: u8,
    pub mode: u16,
    pub output_unit: u8,
    pub output: u16,
}

impl Default for RegisterMap {
    fn default() -> Self {
        Self {
            read_unit: 100,
            enable: 806,
            soc: 843,
            load_base: 817,
            pv: vec![811, 812, 813],
            soc_divisor: 1.0,
            mode_unit: 227,
            mode: 33,
            output_unit: 100,
            output: 2902,
        }
    }
}

/// Night integrator parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct NightCfg {
    pub pv_threshold_w: f64,
    pub confirm_s: f64,
    pub decay_factor: f64,
}

impl Default for NightCfg {
    fn default() -> Self {
        Self {
            pv_threshold_w: 200.0,
            confirm_s: 1800.0,
            decay_factor: 0.25,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SurplusCfg {
    pub margin_w: f64,
    pub confirm_s: f64,
}

impl Default for SurplusCfg {
    fn default() -> Self {
        Self {
            margin_w: 100.0,
            confirm_s: 60.0,
        }
    }
}

/// Inverter mode state machine thresholds.
#[derive(Debug, Clone, PartialEq)]
pub struct ModeCfg {
    /// Shutdown starts at or below this SOC (percent).
    pub soc_min: f64,
    /// Charger-only hands over to On at or above this SOC (percent).
    pub soc_charge_min: f64,
    /// Charger-only dwell before Off during shutdown.
    pub off_delay: Duration,
    pub turn_off_at_night_below_charge_min: bool,
    /// After a low-SOC shutdown, wait for a night before waking again.
    pub require_night_before_restart: bool,
}

impl Default for ModeCfg {
    fn default() -> Self {
        Self {
            soc_min: 39.0,
            soc_charge_min: 50.0,
            off_delay: Duration::from_secs(30),
            turn_off_at_night_below_charge_min: true,
            require_night_before_restart: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputCfg {
    pub day_value: u16,
    pub night_value: u16,
    pub allow_night_switch: bool,
}

impl Default for OutputCfg {
    fn default() -> Self {
        Self {
            day_value: 1,
            night_value: 2,
            allow_night_switch: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GovernorCfg {
    pub mode_gap: Duration,
    pub output_gap: Duration,
    pub dry_run: bool,
}

impl Default for GovernorCfg {
    fn default() -> Self {
        Self {
            mode_gap: Duration::from_secs(5),
            output_gap: Duration::from_secs(30),
            dry_run: false,
        }
    }
}

/// Everything the control loop needs, grouped per component.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineCfg {
    pub registers: RegisterMap,
    pub night: NightCfg,
    pub surplus: SurplusCfg,
    pub mode: ModeCfg,
    pub output: OutputCfg,
    pub governor: GovernorCfg,
    pub poll_interval: Duration,
}

impl Default for EngineCfg {
    fn default() -> Self {
        Self {
            registers: RegisterMap::default(),
            night: NightCfg::default(),
            surplus: SurplusCfg::default(),
            mode: ModeCfg::default(),
            output: OutputCfg::default(),
            governor: GovernorCfg::default(),
            poll_interval: Duration::from_secs(5),
        }
    }
}
