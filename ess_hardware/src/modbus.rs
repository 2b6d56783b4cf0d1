//! Blocking Modbus/TCP link.
//!
//! The connection is opened lazily on first use and dropped after any
//! failure, so the next call (next poll cycle) reconnects.

use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

use ess_traits::{BoxError, RegisterLink};
use tokio_modbus::client::sync;
use tokio_modbus::prelude::*;

use crate::error::{HwError, Result};

pub struct ModbusLink {
    host: String,
    port: u16,
    timeout: Duration,
    ctx: Option<sync::Context>,
}

impl core::fmt::Debug for ModbusLink {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ModbusLink")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("timeout", &self.timeout)
            .field("connected", &self.ctx.is_some())
            .finish()
    }
}

impl ModbusLink {
    pub fn new(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            timeout,
            ctx: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.ctx.is_some()
    }

    /// Drop the current connection; the next call reconnects.
    pub fn close(&mut self) {
        if self.ctx.take().is_some() {
            tracing::debug!(host = %self.host, port = self.port, "modbus connection closed");
        }
    }

    fn resolve(&self) -> Result<SocketAddr> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|_| HwError::Resolve(format!("{}:{}", self.host, self.port)))?
            .next()
            .ok_or_else(|| HwError::Resolve(format!("{}:{}", self.host, self.port)))
    }

    fn context(&mut self, unit: u8) -> Result<&mut sync::Context> {
        if self.ctx.is_none() {
            let addr = self.resolve()?;
            tracing::info!(%addr, timeout = ?self.timeout, "connecting to modbus device");
            let ctx = sync::tcp::connect_slave_with_timeout(addr, Slave(unit), Some(self.timeout))
                .map_err(|source| HwError::Connect {
                    addr: addr.to_string(),
                    source,
                })?;
            self.ctx = Some(ctx);
        }
        let ctx = self
            .ctx
            .as_mut()
            .ok_or_else(|| HwError::Resolve(self.host.clone()))?;
        ctx.set_slave(Slave(unit));
        Ok(ctx)
    }

    fn read(&mut self, unit: u8, address: u16, count: u16) -> Result<Vec<u16>> {
        let ctx = self.context(unit)?;
        let res = ctx
            .read_holding_registers(address, count)
            .map_err(HwError::from_io);
        if res.is_err() {
            self.close();
        }
        res
    }

    fn write(&mut self, unit: u8, address: u16, value: u16) -> Result<()> {
        let ctx = self.context(unit)?;
        let res = ctx
            .write_single_register(address, value)
            .map_err(HwError::from_io);
        if res.is_err() {
            self.close();
        }
        res
    }
}

impl RegisterLink for ModbusLink {
    fn read_registers(
        &mut self,
        unit: u8,
        address: u16,
        count: u16,
    ) -> std::result::Result<Vec<u16>, BoxError> {
        let regs = self.read(unit, address, count)?;
        tracing::trace!(unit, address, count, ?regs, "modbus read");
        Ok(regs)
    }

    fn write_register(
        &mut self,
        unit: u8,
        address: u16,
        value: u16,
    ) -> std::result::Result<(), BoxError> {
        self.write(unit, address, value)?;
        tracing::debug!(unit, address, value, "modbus write");
        Ok(())
    }
}
