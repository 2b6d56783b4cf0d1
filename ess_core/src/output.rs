//! Day/night value for the ESS output-mode register.

use crate::config::OutputCfg;

#[derive(Debug, Clone)]
pub struct DayNightOutputController {
    cfg: OutputCfg,
}

impl DayNightOutputController {
    pub fn new(cfg: OutputCfg) -> Self {
        Self { cfg }
    }

    pub fn target(&self, night: bool) -> u16 {
        if self.cfg.allow_night_switch && night {
            self.cfg.night_value
        } else {
            self.cfg.day_value
        }
    }
}
