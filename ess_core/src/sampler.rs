//! One read pass over the register link, producing a `Reading`.
//!
//! The enable flag is read first; a disabled installation skips the
//! measurement reads entirely. Any failed or short read aborts the pass.

use std::time::Instant;

use ess_traits::RegisterLink;

use crate::config::RegisterMap;
use crate::error::LinkError;
use crate::hw_error::map_link_error;

/// Number of load registers (one per phase) starting at the load base.
pub const LOAD_SPAN: u16 = 3;

/// Snapshot of the installation for one poll cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    /// State of charge in percent (after the configured divisor).
    pub soc: f64,
    pub load_w: f64,
    pub pv_w: f64,
    /// Enable register == 1. When false the measurement fields are zero.
    pub enabled: bool,
    pub timestamp: Instant,
}

#[derive(Debug, Clone)]
pub struct Sampler {
    map: RegisterMap,
}

impl Sampler {
    pub fn new(map: RegisterMap) -> Self {
        Self { map }
    }

    pub fn sample<L: RegisterLink + ?Sized>(
        &self,
        link: &mut L,
        now: Instant,
    ) -> Result<Reading, LinkError> {
        let unit = self.map.read_unit;
        let enable = read_one(link, unit, self.map.enable)?;
        if enable != 1 {
            tracing::debug!(enable, "enable register not set");
            return Ok(Reading {
                soc: 0.0,
                load_w: 0.0,
                pv_w: 0.0,
                enabled: false,
                timestamp: now,
            });
        }

        let soc_raw = read_one(link, unit, self.map.soc)?;
        let soc = f64::from(soc_raw) / self.map.soc_divisor;

        let load_w: f64 = read_exact(link, unit, self.map.load_base, LOAD_SPAN)?
            .into_iter()
            .map(f64::from)
            .sum();

        let mut pv_w = 0.0;
        for reg in &self.map.pv {
            pv_w += f64::from(read_one(link, unit, *reg)?);
        }

        Ok(Reading {
            soc,
            load_w,
            pv_w,
            enabled: true,
            timestamp: now,
        })
    }

    /// Current raw value of the inverter mode register.
    pub fn read_mode<L: RegisterLink + ?Sized>(&self, link: &mut L) -> Result<u16, LinkError> {
        read_one(link, self.map.mode_unit, self.map.mode)
    }

    /// Current raw value of the output-mode register.
    pub fn read_output_mode<L: RegisterLink + ?Sized>(
        &self,
        link: &mut L,
    ) -> Result<u16, LinkError> {
        read_one(link, self.map.output_unit, self.map.output)
    }
}

fn read_exact<L: RegisterLink + ?Sized>(
    link: &mut L,
    unit: u8,
    address: u16,
    count: u16,
) -> Result<Vec<u16>, LinkError> {
    let mut regs = link
        .read_registers(unit, address, count)
        .map_err(|e| map_link_error(&*e))?;
    if regs.len() < usize::from(count) {
        return Err(LinkError::ShortRead {
            address,
            wanted: count,
            got: regs.len(),
        });
    }
    regs.truncate(usize::from(count));
    Ok(regs)
}

fn read_one<L: RegisterLink + ?Sized>(
    link: &mut L,
    unit: u8,
    address: u16,
) -> Result<u16, LinkError> {
    let regs = read_exact(link, unit, address, 1)?;
    regs.first().copied().ok_or(LinkError::ShortRead {
        address,
        wanted: 1,
        got: 0,
    })
}
