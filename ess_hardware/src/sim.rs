//! Simulated GX device: a small battery/PV/load plant behind a register map.
//!
//! The plant advances on every read of the enable register (the first read
//! of each pass) using the injected clock, sped up by `SimParams::speedup`.
//! Mode writes feed back into the plant: `On` lets the battery carry the
//! load, `ChargerOnly` only stores PV surplus, `Off` leaves it idle.

use std::collections::HashMap;
use std::f64::consts::PI;
use std::sync::Arc;
use std::time::Instant;

use ess_traits::{BoxError, Clock, RegisterLink};

use crate::error::HwError;

const MODE_CHARGER_ONLY: u16 = 1;
const MODE_ON: u16 = 3;
const MODE_OFF: u16 = 4;

/// Register addresses the simulated device answers on.
#[derive(Debug, Clone, PartialEq)]
pub struct SimLayout {
    pub read_unit: u8,
    pub enable: u16,
    pub soc: u16,
    pub load_base: u16,
    pub pv: Vec<u16>,
    pub soc_divisor: f64,
    pub mode_unit: u8,
    pub mode: u16,
    pub output_unit: u8,
    pub output: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimParams {
    pub capacity_wh: f64,
    pub initial_soc: f64,
    pub base_load_w: f64,
    pub peak_pv_w: f64,
    /// Simulated seconds in one day.
    pub day_s: f64,
    /// Simulated seconds per real second.
    pub speedup: f64,
    /// Fraction of the day that has passed at start (0.25 = sunrise).
    pub start_phase: f64,
    /// Fail every n-th read with a timeout; 0 disables.
    pub fail_every: u32,
}

impl Default for SimParams {
    fn default() -> Self {
        Self {
            capacity_wh: 5000.0,
            initial_soc: 45.0,
            base_load_w: 450.0,
            peak_pv_w: 3000.0,
            day_s: 86_400.0,
            speedup: 60.0,
            start_phase: 0.25,
            fail_every: 0,
        }
    }
}

#[derive(Debug)]
struct Plant {
    soc: f64,
    sim_time_s: f64,
    last: Instant,
}

pub struct SimulatedLink {
    layout: SimLayout,
    params: SimParams,
    clock: Arc<dyn Clock + Send + Sync>,
    regs: HashMap<(u8, u16), u16>,
    plant: Plant,
    reads: u32,
}

impl core::fmt::Debug for SimulatedLink {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SimulatedLink")
            .field("soc", &self.plant.soc)
            .field("sim_time_s", &self.plant.sim_time_s)
            .field("mode", &self.regs.get(&(self.layout.mode_unit, self.layout.mode)))
            .finish_non_exhaustive()
    }
}

impl SimulatedLink {
    pub fn new(layout: SimLayout, params: SimParams, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        let now = clock.now();
        let mut regs = HashMap::new();
        regs.insert((layout.read_unit, layout.enable), 1);
        regs.insert((layout.mode_unit, layout.mode), MODE_OFF);
        regs.insert((layout.output_unit, layout.output), 1);
        let mut link = Self {
            plant: Plant {
                soc: params.initial_soc.clamp(0.0, 100.0),
                sim_time_s: params.start_phase.rem_euclid(1.0) * params.day_s,
                last: now,
            },
            layout,
            params,
            clock,
            regs,
            reads: 0,
        };
        link.publish();
        link
    }

    pub fn soc(&self) -> f64 {
        self.plant.soc
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.regs
            .insert((self.layout.read_unit, self.layout.enable), u16::from(enabled));
    }

    /// PV power at a time of day; a half-sine between 06:00 and 18:00.
    pub fn pv_at(&self, sim_time_s: f64) -> f64 {
        let phase = (sim_time_s / self.params.day_s).rem_euclid(1.0);
        let daylight = (phase - 0.25) * 2.0;
        if (0.0..=1.0).contains(&daylight) {
            self.params.peak_pv_w * (daylight * PI).sin()
        } else {
            0.0
        }
    }

    fn advance(&mut self) {
        let now = self.clock.now();
        let dt = now.saturating_duration_since(self.plant.last).as_secs_f64() * self.params.speedup;
        self.plant.last = now;
        if dt <= 0.0 {
            return;
        }
        self.plant.sim_time_s += dt;

        let pv = self.pv_at(self.plant.sim_time_s);
        let load = self.params.base_load_w;
        let mode = self
            .regs
            .get(&(self.layout.mode_unit, self.layout.mode))
            .copied()
            .unwrap_or(MODE_OFF);
        let net_w = match mode {
            MODE_ON => pv - load,
            MODE_CHARGER_ONLY => (pv - load).max(0.0),
            _ => 0.0,
        };
        let delta_pct = net_w * dt / 3600.0 / self.params.capacity_wh * 100.0;
        self.plant.soc = (self.plant.soc + delta_pct).clamp(0.0, 100.0);
        self.publish();
    }

    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    fn publish(&mut self) {
        let to_reg = |v: f64| v.round().clamp(0.0, f64::from(u16::MAX)) as u16;
        let l = &self.layout;
        let soc_raw = to_reg(self.plant.soc * l.soc_divisor);
        let phase_load = to_reg(self.params.base_load_w / 3.0);
        let pv_each = to_reg(self.pv_at(self.plant.sim_time_s) / l.pv.len().max(1) as f64);

        self.regs.insert((l.read_unit, l.soc), soc_raw);
        for i in 0..3 {
            self.regs
                .insert((l.read_unit, l.load_base.wrapping_add(i)), phase_load);
        }
        for reg in &l.pv {
            self.regs.insert((l.read_unit, *reg), pv_each);
        }
    }
}

impl RegisterLink for SimulatedLink {
    fn read_registers(&mut self, unit: u8, address: u16, count: u16) -> Result<Vec<u16>, BoxError> {
        self.reads = self.reads.wrapping_add(1);
        if self.params.fail_every > 0 && self.reads % self.params.fail_every == 0 {
            tracing::debug!(unit, address, "simulated read timeout");
            return Err(Box::new(HwError::Timeout));
        }
        if unit == self.layout.read_unit && address == self.layout.enable {
            self.advance();
        }
        Ok((0..count)
            .map(|i| {
                self.regs
                    .get(&(unit, address.wrapping_add(i)))
                    .copied()
                    .unwrap_or(0)
            })
            .collect())
    }

    fn write_register(&mut self, unit: u8, address: u16, value: u16) -> Result<(), BoxError> {
        let known = (unit == self.layout.mode_unit && address == self.layout.mode)
            || (unit == self.layout.output_unit && address == self.layout.output);
        if !known {
            return Err(Box::new(HwError::Simulated("write to unmapped register")));
        }
        tracing::debug!(unit, address, value, "simulated write");
        self.regs.insert((unit, address), value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ess_traits::ManualClock;

    fn layout() -> SimLayout {
        SimLayout {
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

    #[test]
    fn pv_is_dark_at_midnight_and_peaks_at_noon() {
        let link = SimulatedLink::new(
            layout(),
            SimParams::default(),
            Arc::new(ManualClock::new()),
        );
        assert_eq!(link.pv_at(0.0), 0.0);
        assert!((link.pv_at(43_200.0) - 3000.0).abs() < 1e-6);
    }

    #[test]
    fn off_leaves_soc_alone_and_on_drains_at_night() {
        let clock = ManualClock::new();
        let params = SimParams {
            start_phase: 0.0,
            ..SimParams::default()
        };
        let mut link = SimulatedLink::new(layout(), params, Arc::new(clock.clone()));
        clock.advance_secs(10.0);
        link.read_registers(100, 806, 1).unwrap();
        assert_eq!(link.soc(), 45.0);

        link.write_register(227, 33, MODE_ON).unwrap();
        clock.advance_secs(60.0);
        link.read_registers(100, 806, 1).unwrap();
        assert!(link.soc() < 45.0);
    }

    #[test]
    fn unmapped_write_is_rejected() {
        let mut link = SimulatedLink::new(
            layout(),
            SimParams::default(),
            Arc::new(ManualClock::new()),
        );
        assert!(link.write_register(100, 1, 1).is_err());
    }
}
