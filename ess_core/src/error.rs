use thiserror::Error;

/// Failure of a single register read or write. Always recoverable: the loop
/// retries on the next poll cycle.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error("link timeout")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("device exception: {0}")]
    Exception(String),
    #[error("short read at register {address}: wanted {wanted}, got {got}")]
    ShortRead {
        address: u16,
        wanted: u16,
        got: usize,
    },
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing register link")]
    MissingLink,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
