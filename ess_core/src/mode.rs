//! Inverter mode state machine.
//!
//! Modes form a small ladder: `Off` wakes into `ChargerOnly` on confirmed
//! daytime surplus, `ChargerOnly` hands over to `On` once the battery holds
//! enough charge, and `On` is latched until the battery drains to the
//! minimum. Shutdown goes through `ChargerOnly` for a fixed dwell before
//! `Off`, so the inverter never drops straight from `On` to `Off` either.

use std::fmt;
use std::time::Instant;

use crate::config::{MAX_OFF_DELAY, ModeCfg};

/// Inverter operating mode as written to the mode register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Off,
    ChargerOnly,
    On,
}

impl Mode {
    pub const fn register_value(self) -> u16 {
        match self {
            Self::ChargerOnly => 1,
            Self::On => 3,
            Self::Off => 4,
        }
    }

    /// Map a raw register value back to a mode; unknown values give `None`.
    pub const fn from_register(value: u16) -> Option<Self> {
        match value {
            1 => Some(Self::ChargerOnly),
            3 => Some(Self::On),
            4 => Some(Self::Off),
            _ => None,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Off => "off",
            Self::ChargerOnly => "charger_only",
            Self::On => "on",
        };
        f.write_str(s)
    }
}

/// Per-cycle inputs to the state machine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModeInput {
    pub enabled: bool,
    pub soc: f64,
    pub night: bool,
    pub surplus_confirmed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeState {
    pub current_mode: Mode,
    /// Set while a low-SOC shutdown is dwelling in `ChargerOnly`.
    pub shutdown_deadline: Option<Instant>,
    /// Wake is suppressed until a night has been seen.
    pub awaiting_night: bool,
}

impl Default for ModeState {
    fn default() -> Self {
        Self {
            current_mode: Mode::Off,
            shutdown_deadline: None,
            awaiting_night: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ModeStateMachine {
    cfg: ModeCfg,
    state: ModeState,
}

impl ModeStateMachine {
    pub fn new(cfg: ModeCfg) -> Self {
        Self {
            cfg,
            state: ModeState::default(),
        }
    }

    pub fn mode(&self) -> Mode {
        self.state.current_mode
    }

    pub fn state(&self) -> &ModeState {
        &self.state
    }

    pub fn is_shutting_down(&self) -> bool {
        self.state.shutdown_deadline.is_some()
    }

    /// Take over the mode observed on the inverter at startup.
    pub fn adopt(&mut self, mode: Mode) {
        self.state = ModeState {
            current_mode: mode,
            ..ModeState::default()
        };
    }

    /// End of the shutdown dwell, clamped to `MAX_OFF_DELAY`.
    fn deadline_from(&self, now: Instant) -> Instant {
        let dwell = self.cfg.off_delay.min(MAX_OFF_DELAY);
        now.checked_add(dwell).unwrap_or(now)
    }

    /// Run one transition step and return the desired mode.
    ///
    /// Returns `None` when the installation is disabled: no transition, no
    /// write request, state untouched.
    pub fn decide(&mut self, input: &ModeInput, now: Instant) -> Option<Mode> {
        if !input.enabled {
            return None;
        }
        if input.night {
            self.state.awaiting_night = false;
        }

        let low_at_night = self.cfg.turn_off_at_night_below_charge_min
            && input.night
            && input.soc < self.cfg.soc_charge_min;

        let next = match (self.state.current_mode, self.state.shutdown_deadline) {
            (Mode::ChargerOnly, Some(deadline)) => {
                if now >= deadline {
                    self.state.shutdown_deadline = None;
                    if self.cfg.require_night_before_restart {
                        self.state.awaiting_night = true;
                    }
                    Mode::Off
                } else {
                    Mode::ChargerOnly
                }
            }
            (Mode::ChargerOnly, None) if low_at_night => Mode::Off,
            (Mode::ChargerOnly, None) if input.soc >= self.cfg.soc_charge_min => Mode::On,
            (Mode::Off, _) if low_at_night => Mode::Off,
            (Mode::Off, _)
                if !input.night && input.surplus_confirmed && !self.state.awaiting_night =>
            {
                Mode::ChargerOnly
            }
            (Mode::On, _) if input.soc <= self.cfg.soc_min => {
                self.state.shutdown_deadline = Some(self.deadline_from(now));
                Mode::ChargerOnly
            }
            (current, _) => current,
        };

        if next != self.state.current_mode {
            tracing::info!(
                from = %self.state.current_mode,
                to = %next,
                soc = input.soc,
                night = input.night,
                "mode transition"
            );
            self.state.current_mode = next;
        }
        Some(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn input(soc: f64, night: bool, surplus: bool) -> ModeInput {
        ModeInput {
            enabled: true,
            soc,
            night,
            surplus_confirmed: surplus,
        }
    }

    #[test]
    fn register_values_round_trip() {
        for m in [Mode::Off, Mode::ChargerOnly, Mode::On] {
            assert_eq!(Mode::from_register(m.register_value()), Some(m));
        }
        assert_eq!(Mode::from_register(2), None);
    }

    #[test]
    fn disabled_freezes() {
        let mut m = ModeStateMachine::new(ModeCfg::default());
        m.adopt(Mode::On);
        let mut i = input(10.0, true, false);
        i.enabled = false;
        assert_eq!(m.decide(&i, Instant::now()), None);
        assert_eq!(m.mode(), Mode::On);
        assert!(!m.is_shutting_down());
    }

    #[test]
    fn off_wakes_into_charger_only_even_when_full() {
        let mut m = ModeStateMachine::new(ModeCfg::default());
        let now = Instant::now();
        assert_eq!(m.decide(&input(95.0, false, true), now), Some(Mode::ChargerOnly));
        assert_eq!(m.decide(&input(95.0, false, true), now), Some(Mode::On));
    }

    #[test]
    fn shutdown_dwells_then_turns_off() {
        let cfg = ModeCfg::default();
        let delay = cfg.off_delay;
        let mut m = ModeStateMachine::new(cfg);
        m.adopt(Mode::On);
        let t0 = Instant::now();
        assert_eq!(m.decide(&input(39.0, false, false), t0), Some(Mode::ChargerOnly));
        assert!(m.is_shutting_down());
        // recovery does not abort the sequence
        let t1 = t0 + delay - Duration::from_secs(1);
        assert_eq!(m.decide(&input(60.0, false, false), t1), Some(Mode::ChargerOnly));
        assert_eq!(m.decide(&input(60.0, false, false), t0 + delay), Some(Mode::Off));
        assert!(!m.is_shutting_down());
    }

    #[test]
    fn oversized_off_delay_is_clamped() {
        let cfg = ModeCfg {
            off_delay: Duration::MAX,
            ..ModeCfg::default()
        };
        let mut m = ModeStateMachine::new(cfg);
        m.adopt(Mode::On);
        let t0 = Instant::now();
        assert_eq!(m.decide(&input(30.0, false, false), t0), Some(Mode::ChargerOnly));
        assert_eq!(m.state().shutdown_deadline, Some(t0 + MAX_OFF_DELAY));
        let almost = t0 + MAX_OFF_DELAY - Duration::from_secs(1);
        assert_eq!(m.decide(&input(30.0, false, false), almost), Some(Mode::ChargerOnly));
        let end = t0 + MAX_OFF_DELAY;
        assert_eq!(m.decide(&input(30.0, false, false), end), Some(Mode::Off));
    }

    #[test]
    fn night_override_beats_wake() {
        let mut m = ModeStateMachine::new(ModeCfg::default());
        let now = Instant::now();
        assert_eq!(m.decide(&input(20.0, true, true), now), Some(Mode::Off));
        m.adopt(Mode::ChargerOnly);
        assert_eq!(m.decide(&input(20.0, true, false), now), Some(Mode::Off));
    }

    #[test]
    fn night_override_can_be_disabled() {
        let cfg = ModeCfg {
            turn_off_at_night_below_charge_min: false,
            ..ModeCfg::default()
        };
        let mut m = ModeStateMachine::new(cfg);
        let now = Instant::now();
        // Off waits for daylight, then wakes on confirmed surplus
        assert_eq!(m.decide(&input(20.0, true, true), now), Some(Mode::Off));
        assert_eq!(m.decide(&input(20.0, false, true), now), Some(Mode::ChargerOnly));
        // a low-SOC night leaves ChargerOnly charging
        assert_eq!(m.decide(&input(20.0, true, false), now), Some(Mode::ChargerOnly));
        assert_eq!(m.decide(&input(45.0, true, false), now), Some(Mode::ChargerOnly));
        assert_eq!(m.decide(&input(50.0, true, false), now), Some(Mode::On));
    }

    #[test]
    fn night_does_not_touch_on() {
        let mut m = ModeStateMachine::new(ModeCfg::default());
        m.adopt(Mode::On);
        assert_eq!(m.decide(&input(45.0, true, false), Instant::now()), Some(Mode::On));
    }

    #[test]
    fn restart_waits_for_night_when_required() {
        let cfg = ModeCfg {
            require_night_before_restart: true,
            off_delay: Duration::ZERO,
            ..ModeCfg::default()
        };
        let mut m = ModeStateMachine::new(cfg);
        m.adopt(Mode::On);
        let now = Instant::now();
        m.decide(&input(30.0, false, false), now);
        assert_eq!(m.decide(&input(30.0, false, false), now), Some(Mode::Off));
        assert!(m.state().awaiting_night);
        assert_eq!(m.decide(&input(30.0, false, true), now), Some(Mode::Off));
        // SOC above charge-min so the night override stays out of the way
        assert_eq!(m.decide(&input(60.0, true, false), now), Some(Mode::Off));
        assert!(!m.state().awaiting_night);
        assert_eq!(m.decide(&input(30.0, false, true), now), Some(Mode::ChargerOnly));
    }
}
