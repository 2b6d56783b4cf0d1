//! Day/night verdict from a leaky integrator over low-PV time.
//!
//! Low PV accumulates elapsed seconds; any brighter sample shrinks the
//! accumulator by the decay factor. Night is exactly
//! `accumulator >= confirm_s`, so a single threshold gives the hysteresis:
//! a long dark stretch is needed to enter night, and short bright spikes
//! (clouds clearing, headlights) only partially erase it.

use crate::config::NightCfg;
use crate::util::sanitize_dt;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IntegratorState {
    /// Seconds of (decayed) low-PV time; always in `[0, confirm_s]`.
    pub accumulator: f64,
    /// Low-PV seconds since the last decay step.
    pub seconds_since_decay_reset: f64,
}

#[derive(Debug, Clone)]
pub struct NightDetector {
    cfg: NightCfg,
    state: IntegratorState,
}

impl NightDetector {
    pub fn new(cfg: NightCfg) -> Self {
        Self {
            cfg,
            state: IntegratorState::default(),
        }
    }

    /// Feed one sample and return the current verdict (`true` = night).
    pub fn update(&mut self, pv_w: f64, dt_seconds: f64) -> bool {
        let dt = sanitize_dt(dt_seconds);
        if pv_w < self.cfg.pv_threshold_w {
            // Saturate at the threshold so one long night does not need
            // many bright samples to decay back to day.
            self.state.accumulator = (self.state.accumulator + dt).min(self.cfg.confirm_s);
            self.state.seconds_since_decay_reset += dt;
        } else {
            self.state.accumulator *= self.cfg.decay_factor;
            self.state.seconds_since_decay_reset = 0.0;
        }
        self.is_night()
    }

    pub fn is_night(&self) -> bool {
        self.state.accumulator >= self.cfg.confirm_s
    }

    pub fn state(&self) -> &IntegratorState {
        &self.state
    }
}
