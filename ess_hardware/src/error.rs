use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("cannot resolve {0}")]
    Resolve(String),
    #[error("connect to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("modbus timeout")]
    Timeout,
    #[error("modbus exception: {0}")]
    Exception(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("simulated fault: {0}")]
    Simulated(&'static str),
}

impl HwError {
    /// Classify an I/O error coming back from the Modbus client.
    pub fn from_io(e: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match e.kind() {
            ErrorKind::TimedOut | ErrorKind::WouldBlock => Self::Timeout,
            _ if e.to_string().to_lowercase().contains("exception") => {
                Self::Exception(e.to_string())
            }
            _ => Self::Io(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, HwError>;
