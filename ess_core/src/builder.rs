//! Type-state builder for `ControlLoop`.
//!
//! `build()` only exists once a register link is set. `try_build()` is always
//! available and reports what is missing at runtime.

use std::cmp::Ordering;
use std::marker::PhantomData;
use std::sync::Arc;

use ess_traits::clock::{Clock, MonotonicClock};
use ess_traits::RegisterLink;

use crate::config::{EngineCfg, MAX_OFF_DELAY};
use crate::control::{ControlLoop, DynLink};
use crate::error::{BuildError, Result};

pub struct Missing;
pub struct Set;

pub struct ControlLoopBuilder<L> {
    link: Option<DynLink>,
    clock: Option<Arc<dyn Clock + Send + Sync>>,
    cfg: Option<EngineCfg>,
    _l: PhantomData<L>,
}

impl Default for ControlLoopBuilder<Missing> {
    fn default() -> Self {
        Self {
            link: None,
            clock: None,
            cfg: None,
            _l: PhantomData,
        }
    }
}

impl<L> ControlLoopBuilder<L> {
    /// Provide a clock; defaults to `MonotonicClock`.
    pub fn with_clock(mut self, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_config(mut self, cfg: EngineCfg) -> Self {
        self.cfg = Some(cfg);
        self
    }

    pub fn try_build(self) -> Result<ControlLoop> {
        let link = self
            .link
            .ok_or_else(|| eyre::Report::new(BuildError::MissingLink))?;
        let cfg = self.cfg.unwrap_or_default();
        validate(&cfg)?;
        let clock: Arc<dyn Clock + Send + Sync> = match self.clock {
            Some(c) => c,
            None => Arc::new(MonotonicClock::new()),
        };
        Ok(ControlLoop::from_parts(link, clock, cfg))
    }
}

impl ControlLoopBuilder<Missing> {
    pub fn with_link(self, link: impl RegisterLink + Send + 'static) -> ControlLoopBuilder<Set> {
        ControlLoopBuilder {
            link: Some(Box::new(link)),
            clock: self.clock,
            cfg: self.cfg,
            _l: PhantomData,
        }
    }
}

impl ControlLoopBuilder<Set> {
    /// Validate and build. Only available once a link is set.
    pub fn build(self) -> Result<ControlLoop> {
        self.try_build()
    }
}

/// Runtime consistency checks. `ess_config::Config::validate` already covers
/// user input; this guards hand-built `EngineCfg`s.
fn validate(cfg: &EngineCfg) -> Result<()> {
    let invalid = |msg| Err(eyre::Report::new(BuildError::InvalidConfig(msg)));
    if cfg.poll_interval.is_zero() {
        return invalid("poll interval must be > 0");
    }
    if cfg.registers.pv.is_empty() {
        return invalid("at least one PV register is required");
    }
    if !(cfg.registers.soc_divisor.is_finite() && cfg.registers.soc_divisor > 0.0) {
        return invalid("soc divisor must be > 0");
    }
    if cfg.mode.soc_min.partial_cmp(&cfg.mode.soc_charge_min) != Some(Ordering::Less) {
        return invalid("soc_min must be below soc_charge_min");
    }
    if cfg.night.confirm_s.is_nan() || cfg.night.confirm_s <= 0.0 {
        return invalid("night confirm seconds must be > 0");
    }
    if !(0.0..1.0).contains(&cfg.night.decay_factor) {
        return invalid("night decay factor must be in [0, 1)");
    }
    if cfg.mode.off_delay > MAX_OFF_DELAY {
        return invalid("off delay must be at most 24h");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::RegisterBank;
    use std::time::Duration;

    #[test]
    fn try_build_without_link_fails() {
        let err = ControlLoop::builder().try_build().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BuildError>(),
            Some(BuildError::MissingLink)
        ));
    }

    #[test]
    fn zero_poll_interval_rejected() {
        let cfg = EngineCfg {
            poll_interval: Duration::ZERO,
            ..EngineCfg::default()
        };
        let err = ControlLoop::builder()
            .with_link(RegisterBank::new())
            .with_config(cfg)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("poll interval"));
    }

    #[test]
    fn oversized_off_delay_rejected() {
        let mut cfg = EngineCfg::default();
        cfg.mode.off_delay = Duration::MAX;
        let err = ControlLoop::builder()
            .with_link(RegisterBank::new())
            .with_config(cfg)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("off delay"));
    }

    #[test]
    fn defaults_build() {
        let lp = ControlLoop::builder()
            .with_link(RegisterBank::new())
            .build()
            .unwrap();
        assert_eq!(lp.poll_interval(), Duration::from_secs(5));
    }
}
