//! Register links: a Modbus/TCP client for real GX devices and a simulated
//! plant for dry runs and demos.

pub mod error;
#[cfg(feature = "modbus")]
pub mod modbus;
pub mod sim;

#[cfg(feature = "modbus")]
pub use modbus::ModbusLink;
pub use sim::{SimLayout, SimParams, SimulatedLink};
