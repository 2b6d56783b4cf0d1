pub mod clock;

pub use clock::{Clock, MonotonicClock};

#[cfg(any(test, feature = "testing"))]
pub use clock::manual::ManualClock;

/// Error type crossing the link boundary; the core maps it to a typed `LinkError`.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Blocking access to integer holding registers on a field-bus device.
///
/// Each call is bounded by the timeout the implementation was built with and
/// may fail for any transport, timeout, or device reason.
pub trait RegisterLink {
    fn read_registers(&mut self, unit: u8, address: u16, count: u16)
    -> Result<Vec<u16>, BoxError>;

    fn write_register(&mut self, unit: u8, address: u16, value: u16) -> Result<(), BoxError>;
}

impl<L: RegisterLink + ?Sized> RegisterLink for Box<L> {
    fn read_registers(
        &mut self,
        unit: u8,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, BoxError> {
        (**self).read_registers(unit, address, count)
    }

    fn write_register(&mut self, unit: u8, address: u16, value: u16) -> Result<(), BoxError> {
        (**self).write_register(unit, address, value)
    }
}
