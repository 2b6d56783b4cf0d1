//! The control loop: one sample, one decision, at most one write per channel.

use std::sync::Arc;
use std::time::{Duration, Instant};

use ess_traits::{Clock, RegisterLink};

use crate::config::EngineCfg;
use crate::error::LinkError;
use crate::governor::{Channel, WriteGovernor};
use crate::mode::{Mode, ModeInput, ModeStateMachine};
use crate::night::NightDetector;
use crate::output::DayNightOutputController;
use crate::sampler::{Reading, Sampler};
use crate::status::{CycleReport, CycleStatus};
use crate::surplus::SurplusDetector;
use crate::util::secs_between;

/// Link type owned by the loop.
pub type DynLink = Box<dyn RegisterLink + Send>;

/// What `startup_sync` found on the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupSync {
    pub mode_register: Option<u16>,
    pub output_register: Option<u16>,
    /// Mode the machine starts from.
    pub adopted: Mode,
}

/// Result of a single diagnostic read pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Probe {
    pub reading: Reading,
    pub mode_register: Option<u16>,
    pub output_register: Option<u16>,
}

pub struct ControlLoop {
    pub(crate) link: DynLink,
    pub(crate) clock: Arc<dyn Clock + Send + Sync>,
    pub(crate) sampler: Sampler,
    pub(crate) night: NightDetector,
    pub(crate) surplus: SurplusDetector,
    pub(crate) machine: ModeStateMachine,
    pub(crate) output: DayNightOutputController,
    pub(crate) governor: WriteGovernor,
    pub(crate) poll_interval: Duration,
    /// Timestamp of the last processed (or disabled) sample; dt reference.
    pub(crate) last_sample_at: Option<Instant>,
}

impl core::fmt::Debug for ControlLoop {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ControlLoop")
            .field("mode", &self.machine.mode())
            .field("night", &self.night.is_night())
            .field("surplus", &self.surplus.is_confirmed())
            .field("poll_interval", &self.poll_interval)
            .field("dry_run", &self.governor.is_dry_run())
            .finish_non_exhaustive()
    }
}

impl ControlLoop {
    pub fn builder() -> crate::builder::ControlLoopBuilder<crate::builder::Missing> {
        crate::builder::ControlLoopBuilder::default()
    }

    pub(crate) fn from_parts(
        link: DynLink,
        clock: Arc<dyn Clock + Send + Sync>,
        cfg: EngineCfg,
    ) -> Self {
        let governor = WriteGovernor::new(&cfg.registers, &cfg.governor);
        Self {
            link,
            clock,
            sampler: Sampler::new(cfg.registers),
            night: NightDetector::new(cfg.night),
            surplus: SurplusDetector::new(cfg.surplus),
            machine: ModeStateMachine::new(cfg.mode),
            output: DayNightOutputController::new(cfg.output),
            governor,
            poll_interval: cfg.poll_interval,
            last_sample_at: None,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn clock(&self) -> &Arc<dyn Clock + Send + Sync> {
        &self.clock
    }

    pub fn mode(&self) -> Mode {
        self.machine.mode()
    }

    pub fn machine(&self) -> &ModeStateMachine {
        &self.machine
    }

    pub fn surplus_detector(&self) -> &SurplusDetector {
        &self.surplus
    }

    pub fn governor(&self) -> &WriteGovernor {
        &self.governor
    }

    /// Adopt the inverter's current mode and seed the governor from the
    /// device, so a restart does not re-issue what is already set.
    ///
    /// Read failures are logged and tolerated; the loop then starts from `Off`
    /// with empty write bookkeeping.
    pub fn startup_sync(&mut self) -> StartupSync {
        let mode_register = match self.sampler.read_mode(&mut *self.link) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(error = %e, "could not read mode register at startup");
                None
            }
        };
        let output_register = match self.sampler.read_output_mode(&mut *self.link) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(error = %e, "could not read output-mode register at startup");
                None
            }
        };

        match mode_register.map(|v| (v, Mode::from_register(v))) {
            Some((raw, Some(mode))) => {
                self.machine.adopt(mode);
                self.governor.seed(Channel::Mode, raw);
            }
            Some((raw, None)) => {
                tracing::warn!(raw, "unknown inverter mode at startup; assuming off");
            }
            None => {}
        }
        if let Some(raw) = output_register {
            self.governor.seed(Channel::OutputMode, raw);
        }

        let adopted = self.machine.mode();
        tracing::info!(
            mode = %adopted,
            mode_register = ?mode_register,
            output_register = ?output_register,
            "startup sync"
        );
        StartupSync {
            mode_register,
            output_register,
            adopted,
        }
    }

    /// One read pass plus the two control registers, without deciding anything.
    pub fn probe(&mut self) -> Result<Probe, LinkError> {
        let now = self.clock.now();
        let reading = self.sampler.sample(&mut *self.link, now)?;
        let mode_register = self.sampler.read_mode(&mut *self.link).ok();
        let output_register = self.sampler.read_output_mode(&mut *self.link).ok();
        Ok(Probe {
            reading,
            mode_register,
            output_register,
        })
    }

    /// Run one control cycle. Never fails: link errors are reported in the
    /// returned status and retried next cycle.
    pub fn step(&mut self) -> CycleReport {
        let now = self.clock.now();

        let reading = match self.sampler.sample(&mut *self.link, now) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "read pass failed; skipping cycle");
                return self.skipped(CycleStatus::ReadFailed(e), None);
            }
        };

        if !reading.enabled {
            // Freeze decisions but move the dt reference so the disabled
            // stretch is not integrated on resume.
            self.last_sample_at = Some(now);
            tracing::info!(mode = %self.machine.mode(), "disabled; no action");
            return self.skipped(CycleStatus::Disabled, Some(reading));
        }

        let dt = self
            .last_sample_at
            .map_or(0.0, |prev| secs_between(prev, now));
        self.last_sample_at = Some(now);

        let night = self.night.update(reading.pv_w, dt);
        let surplus_confirmed = self
            .surplus
            .update(reading.load_w, reading.pv_w, dt);

        let input = ModeInput {
            enabled: true,
            soc: reading.soc,
            night,
            surplus_confirmed,
        };
        let desired = self.machine.decide(&input, now);
        let output_target = self.output.target(night);

        let mode_write = desired.map(|mode| {
            self.governor
                .maybe_write(&mut *self.link, Channel::Mode, mode.register_value(), now)
        });
        let output_write =
            self.governor
                .maybe_write(&mut *self.link, Channel::OutputMode, output_target, now);

        let state = self.night.state();
        tracing::info!(
            soc = reading.soc,
            load_w = reading.load_w,
            pv_w = reading.pv_w,
            night,
            night_accum_s = state.accumulator,
            surplus = self.surplus.holds(reading.load_w, reading.pv_w),
            surplus_confirmed,
            mode = %self.machine.mode(),
            shutting_down = self.machine.is_shutting_down(),
            awaiting_night = self.machine.state().awaiting_night,
            output_target,
            "cycle"
        );

        CycleReport {
            status: CycleStatus::Applied,
            reading: Some(reading),
            night,
            surplus_confirmed,
            mode: self.machine.mode(),
            output_target: Some(output_target),
            mode_write,
            output_write: Some(output_write),
        }
    }

    fn skipped(&self, status: CycleStatus, reading: Option<Reading>) -> CycleReport {
        CycleReport {
            status,
            reading,
            night: self.night.is_night(),
            surplus_confirmed: self.surplus.is_confirmed(),
            mode: self.machine.mode(),
            output_target: None,
            mode_write: None,
            output_write: None,
        }
    }
}
