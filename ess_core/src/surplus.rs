//! Continuous-duration PV surplus detection.

use crate::config::SurplusCfg;
use crate::util::sanitize_dt;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SurplusTimer {
    pub continuous_surplus_seconds: f64,
}

#[derive(Debug, Clone)]
pub struct SurplusDetector {
    cfg: SurplusCfg,
    timer: SurplusTimer,
}

impl SurplusDetector {
    pub fn new(cfg: SurplusCfg) -> Self {
        Self {
            cfg,
            timer: SurplusTimer::default(),
        }
    }

    /// Instantaneous condition: PV exceeds load by more than the margin.
    pub fn holds(&self, load_w: f64, pv_w: f64) -> bool {
        pv_w > load_w + self.cfg.margin_w
    }

    /// Feed one sample and return whether surplus is confirmed.
    pub fn update(&mut self, load_w: f64, pv_w: f64, dt_seconds: f64) -> bool {
        if self.holds(load_w, pv_w) {
            self.timer.continuous_surplus_seconds += sanitize_dt(dt_seconds);
        } else {
            self.timer.continuous_surplus_seconds = 0.0;
        }
        self.is_confirmed()
    }

    pub fn is_confirmed(&self) -> bool {
        self.timer.continuous_surplus_seconds >= self.cfg.confirm_s
    }

    pub fn timer(&self) -> &SurplusTimer {
        &self.timer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn margin_is_strict() {
        let d = SurplusDetector::new(SurplusCfg::default());
        assert!(!d.holds(500.0, 600.0));
        assert!(d.holds(500.0, 600.5));
    }

    #[test]
    fn confirms_after_continuous_duration() {
        let mut d = SurplusDetector::new(SurplusCfg {
            margin_w: 100.0,
            confirm_s: 60.0,
        });
        for _ in 0..11 {
            assert!(!d.update(500.0, 650.0, 5.0));
        }
        assert!(d.update(500.0, 650.0, 5.0));
    }

    #[test]
    fn any_miss_resets_to_zero() {
        let mut d = SurplusDetector::new(SurplusCfg::default());
        d.update(0.0, 1000.0, 500.0);
        assert!(d.is_confirmed());
        assert!(!d.update(1000.0, 1000.0, 5.0));
        assert_eq!(d.timer().continuous_surplus_seconds, 0.0);
    }
}
