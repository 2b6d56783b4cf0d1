//! In-memory register link for tests, benches and the CLI's dry tooling.

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ess_traits::{BoxError, RegisterLink};

use crate::config::RegisterMap;

/// One write seen by the fake link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteRecord {
    pub unit: u8,
    pub address: u16,
    pub value: u16,
}

#[derive(Debug, Default)]
struct Bank {
    regs: HashMap<(u8, u16), u16>,
    writes: Vec<WriteRecord>,
    reads: usize,
    fail_reads: bool,
    reads_before_failure: Option<usize>,
    fail_writes: bool,
}

/// Register map backed by a `HashMap`. Unset registers read as 0.
///
/// Clones share the same bank, so a test can keep a handle after moving the
/// link into a `ControlLoop`.
#[derive(Debug, Clone, Default)]
pub struct RegisterBank {
    inner: Arc<Mutex<Bank>>,
}

impl RegisterBank {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Bank> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set(&self, unit: u8, address: u16, value: u16) {
        self.lock().regs.insert((unit, address), value);
    }

    /// Put a plant state on the measurement registers of `map`.
    ///
    /// `soc` is in percent and scaled by the map's divisor; load lands on the
    /// first phase and PV on the first PV register.
    pub fn set_measurements(&self, map: &RegisterMap, soc: f64, load_w: u16, pv_w: u16) {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let raw_soc = (soc * map.soc_divisor).round().clamp(0.0, f64::from(u16::MAX)) as u16;
        let mut bank = self.lock();
        bank.regs.insert((map.read_unit, map.soc), raw_soc);
        bank.regs.insert((map.read_unit, map.load_base), load_w);
        bank.regs.insert((map.read_unit, map.load_base + 1), 0);
        bank.regs.insert((map.read_unit, map.load_base + 2), 0);
        for (i, reg) in map.pv.iter().enumerate() {
            bank.regs.insert((map.read_unit, *reg), if i == 0 { pv_w } else { 0 });
        }
    }

    pub fn set_enabled(&self, map: &RegisterMap, enabled: bool) {
        self.set(map.read_unit, map.enable, u16::from(enabled));
    }

    pub fn writes(&self) -> Vec<WriteRecord> {
        self.lock().writes.clone()
    }

    /// Writes to one register, in order.
    pub fn writes_to(&self, unit: u8, address: u16) -> Vec<u16> {
        self.lock()
            .writes
            .iter()
            .filter(|w| w.unit == unit && w.address == address)
            .map(|w| w.value)
            .collect()
    }

    pub fn read_count(&self) -> usize {
        self.lock().reads
    }

    pub fn fail_reads(&self, fail: bool) {
        let mut bank = self.lock();
        bank.fail_reads = fail;
        bank.reads_before_failure = None;
    }

    /// Let `n` more reads succeed, then fail every read.
    pub fn fail_reads_after(&self, n: usize) {
        self.lock().reads_before_failure = Some(n);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }
}

impl RegisterLink for RegisterBank {
    fn read_registers(
        &mut self,
        unit: u8,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, BoxError> {
        let mut bank = self.lock();
        if let Some(left) = bank.reads_before_failure {
            if left == 0 {
                bank.fail_reads = true;
            } else {
                bank.reads_before_failure = Some(left - 1);
            }
        }
        if bank.fail_reads {
            return Err(Box::new(io::Error::new(
                io::ErrorKind::TimedOut,
                "simulated read timeout",
            )));
        }
        bank.reads += 1;
        Ok((0..count)
            .map(|i| {
                let reg = address.wrapping_add(i);
                bank.regs.get(&(unit, reg)).copied().unwrap_or(0)
            })
            .collect())
    }

    fn write_register(&mut self, unit: u8, address: u16, value: u16) -> Result<(), BoxError> {
        let mut bank = self.lock();
        if bank.fail_writes {
            return Err(Box::new(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "simulated write failure",
            )));
        }
        bank.regs.insert((unit, address), value);
        bank.writes.push(WriteRecord {
            unit,
            address,
            value,
        });
        Ok(())
    }
}
