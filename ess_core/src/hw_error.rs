//! Maps `Box<dyn Error>` from the link trait boundary to typed `LinkError`.
//!
//! `ess_traits::RegisterLink` returns boxed errors so any transport can plug in;
//! this module converts those to our typed enum, with an optional
//! feature-gated path for `ess_hardware::HwError` downcasting.

use crate::error::LinkError;

/// Map a trait-boundary error to a typed `LinkError`.
///
/// Attempts to downcast known hardware error types first, then falls back
/// to string-based heuristics.
pub fn map_link_error(e: &(dyn std::error::Error + 'static)) -> LinkError {
    #[cfg(feature = "hardware-errors")]
    {
        use ess_hardware::error::HwError;
        if let Some(hw) = e.downcast_ref::<HwError>() {
            return match hw {
                HwError::Timeout => LinkError::Timeout,
                HwError::Exception(msg) => LinkError::Exception(msg.clone()),
                other => LinkError::Transport(other.to_string()),
            };
        }
    }

    if let Some(io) = e.downcast_ref::<std::io::Error>()
        && matches!(
            io.kind(),
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
        )
    {
        return LinkError::Timeout;
    }

    // Fallback: string-based detection
    let s = e.to_string();
    let lower = s.to_lowercase();
    if lower.contains("timeout") || lower.contains("timed out") {
        LinkError::Timeout
    } else {
        LinkError::Transport(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_timeout_maps_to_timeout() {
        let e = std::io::Error::new(std::io::ErrorKind::TimedOut, "read");
        assert_eq!(map_link_error(&e), LinkError::Timeout);
    }

    #[test]
    fn other_io_errors_are_transport() {
        let e = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        assert_eq!(map_link_error(&e), LinkError::Transport("refused".into()));
    }

    #[cfg(feature = "hardware-errors")]
    #[test]
    fn hw_exception_is_preserved() {
        let e = ess_hardware::error::HwError::Exception("illegal data address".into());
        assert_eq!(
            map_link_error(&e),
            LinkError::Exception("illegal data address".into())
        );
    }
}
