//! Conversions bridging `ess_config` types to `ess_core` runtime types.
//!
//! Register addresses pick up the configured bias here, once, so nothing
//! downstream has to think about it.

use crate::config::{EngineCfg, GovernorCfg, ModeCfg, NightCfg, OutputCfg, RegisterMap, SurplusCfg};
use crate::util::duration_from_secs;

// ── RegisterMap ──────────────────────────────────────────────────────────────

impl TryFrom<&ess_config::Config> for RegisterMap {
    type Error = eyre::Report;

    fn try_from(c: &ess_config::Config) -> Result<Self, Self::Error> {
        let pv = c
            .registers
            .pv
            .iter()
            .map(|r| c.biased(*r))
            .collect::<eyre::Result<Vec<u16>>>()?;
        Ok(Self {
            read_unit: c.units.read,
            enable: c.biased(c.registers.enable)?,
            soc: c.biased(c.registers.soc)?,
            load_base: c.biased(c.registers.load_base)?,
            pv,
            soc_divisor: c.scaling.soc_divisor,
            mode_unit: c.units.mode,
            mode: c.biased(c.registers.mode)?,
            output_unit: c.units.output,
            output: c.biased(c.output.register)?,
        })
    }
}

// ── Detectors ────────────────────────────────────────────────────────────────

impl From<&ess_config::Night> for NightCfg {
    fn from(c: &ess_config::Night) -> Self {
        Self {
            pv_threshold_w: c.pv_threshold_w,
            confirm_s: c.confirm_s,
            decay_factor: c.decay_factor,
        }
    }
}

impl From<&ess_config::Surplus> for SurplusCfg {
    fn from(c: &ess_config::Surplus) -> Self {
        Self {
            margin_w: c.margin_w,
            confirm_s: c.confirm_s,
        }
    }
}

// ── ModeCfg ──────────────────────────────────────────────────────────────────

impl From<&ess_config::Config> for ModeCfg {
    fn from(c: &ess_config::Config) -> Self {
        Self {
            soc_min: c.soc.min,
            soc_charge_min: c.soc.charge_min,
            off_delay: duration_from_secs(c.shutdown.off_delay_s),
            turn_off_at_night_below_charge_min: c.night.turn_off_below_charge_min,
            require_night_before_restart: c.shutdown.require_night_before_restart,
        }
    }
}

// ── OutputCfg / GovernorCfg ──────────────────────────────────────────────────

impl From<&ess_config::OutputMode> for OutputCfg {
    fn from(c: &ess_config::OutputMode) -> Self {
        Self {
            day_value: c.day_value,
            night_value: c.night_value,
            allow_night_switch: c.allow_night_switch,
        }
    }
}

impl From<&ess_config::Config> for GovernorCfg {
    fn from(c: &ess_config::Config) -> Self {
        Self {
            mode_gap: duration_from_secs(c.timing.min_write_gap_s),
            output_gap: duration_from_secs(c.timing.min_output_write_gap_s),
            dry_run: c.dry_run,
        }
    }
}

// ── EngineCfg ────────────────────────────────────────────────────────────────

impl TryFrom<&ess_config::Config> for EngineCfg {
    type Error = eyre::Report;

    fn try_from(c: &ess_config::Config) -> Result<Self, Self::Error> {
        Ok(Self {
            registers: RegisterMap::try_from(c)?,
            night: (&c.night).into(),
            surplus: (&c.surplus).into(),
            mode: c.into(),
            output: (&c.output).into(),
            governor: c.into(),
            poll_interval: duration_from_secs(c.timing.poll_interval_s),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn bias_is_applied_to_every_address() {
        let mut cfg = ess_config::Config::default();
        cfg.scaling.addr_offset = -1;
        let map = RegisterMap::try_from(&cfg).unwrap();
        assert_eq!(map.enable, 805);
        assert_eq!(map.soc, 842);
        assert_eq!(map.load_base, 816);
        assert_eq!(map.pv, vec![810, 811, 812]);
        assert_eq!(map.mode, 32);
        assert_eq!(map.output, 2901);
    }

    #[test]
    fn defaults_match_engine_defaults() {
        let engine = EngineCfg::try_from(&ess_config::Config::default()).unwrap();
        assert_eq!(engine, EngineCfg::default());
        assert_eq!(engine.mode.off_delay, Duration::from_secs(30));
    }
}
