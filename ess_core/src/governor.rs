//! Rate-limited, deduplicating register writer.
//!
//! Both producers (the mode state machine and the output controller) hand the
//! governor their desired value every cycle. The governor only touches the
//! hardware when the value changed and the channel's minimum gap elapsed.

use std::fmt;
use std::time::{Duration, Instant};

use ess_traits::RegisterLink;

use crate::config::{GovernorCfg, RegisterMap};
use crate::error::LinkError;
use crate::hw_error::map_link_error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Mode,
    OutputMode,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Mode => "mode",
            Self::OutputMode => "output_mode",
        })
    }
}

/// Bookkeeping for one channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteGate {
    /// Last value issued (or observed at startup).
    pub last_value: Option<u16>,
    /// When the last write was issued; `None` if never.
    pub last_write_at: Option<Instant>,
}

impl WriteGate {
    fn wait_remaining(&self, gap: Duration, now: Instant) -> Duration {
        match self.last_write_at {
            Some(at) => gap.saturating_sub(now.saturating_duration_since(at)),
            None => Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Value equals the last issued one.
    Unchanged,
    /// Gap not yet elapsed; request dropped.
    Throttled { wait: Duration },
    Written,
    /// Would have written; bookkeeping updated, hardware untouched.
    DryRun,
    /// The write failed; bookkeeping untouched so the next cycle retries.
    Failed(LinkError),
}

#[derive(Debug, Clone, Copy)]
struct Target {
    unit: u8,
    address: u16,
    gap: Duration,
}

#[derive(Debug, Clone)]
pub struct WriteGovernor {
    mode: (Target, WriteGate),
    output: (Target, WriteGate),
    dry_run: bool,
}

impl WriteGovernor {
    pub fn new(map: &RegisterMap, cfg: &GovernorCfg) -> Self {
        Self {
            mode: (
                Target {
                    unit: map.mode_unit,
                    address: map.mode,
                    gap: cfg.mode_gap,
                },
                WriteGate::default(),
            ),
            output: (
                Target {
                    unit: map.output_unit,
                    address: map.output,
                    gap: cfg.output_gap,
                },
                WriteGate::default(),
            ),
            dry_run: cfg.dry_run,
        }
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn gate(&self, channel: Channel) -> &WriteGate {
        match channel {
            Channel::Mode => &self.mode.1,
            Channel::OutputMode => &self.output.1,
        }
    }

    /// Record a value read from the device as already issued, without
    /// consuming the channel's gap.
    pub fn seed(&mut self, channel: Channel, value: u16) {
        let (_, gate) = self.slot(channel);
        gate.last_value = Some(value);
    }

    pub fn maybe_write<L: RegisterLink + ?Sized>(
        &mut self,
        link: &mut L,
        channel: Channel,
        value: u16,
        now: Instant,
    ) -> WriteOutcome {
        let dry_run = self.dry_run;
        let (target, gate) = self.slot(channel);

        if gate.last_value == Some(value) {
            return WriteOutcome::Unchanged;
        }
        let wait = gate.wait_remaining(target.gap, now);
        if !wait.is_zero() {
            tracing::debug!(%channel, value, wait = ?wait, "write throttled");
            return WriteOutcome::Throttled { wait };
        }

        if dry_run {
            tracing::warn!(
                %channel,
                unit = target.unit,
                register = target.address,
                value,
                "dry-run: write suppressed"
            );
            gate.last_value = Some(value);
            gate.last_write_at = Some(now);
            return WriteOutcome::DryRun;
        }

        match link.write_register(target.unit, target.address, value) {
            Ok(()) => {
                tracing::warn!(
                    %channel,
                    unit = target.unit,
                    register = target.address,
                    value,
                    "register written"
                );
                gate.last_value = Some(value);
                gate.last_write_at = Some(now);
                WriteOutcome::Written
            }
            Err(e) => {
                let err = map_link_error(&*e);
                tracing::warn!(%channel, value, error = %err, "register write failed");
                WriteOutcome::Failed(err)
            }
        }
    }

    fn slot(&mut self, channel: Channel) -> (&Target, &mut WriteGate) {
        let (target, gate) = match channel {
            Channel::Mode => &mut self.mode,
            Channel::OutputMode => &mut self.output,
        };
        (&*target, gate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::RegisterBank;

    fn governor(dry_run: bool) -> WriteGovernor {
        WriteGovernor::new(
            &RegisterMap::default(),
            &GovernorCfg {
                dry_run,
                ..GovernorCfg::default()
            },
        )
    }

    #[test]
    fn first_write_goes_through_then_dedups() {
        let mut g = governor(false);
        let mut link = RegisterBank::new();
        let t0 = Instant::now();
        assert_eq!(g.maybe_write(&mut link, Channel::Mode, 1, t0), WriteOutcome::Written);
        assert_eq!(
            g.maybe_write(&mut link, Channel::Mode, 1, t0 + Duration::from_secs(60)),
            WriteOutcome::Unchanged
        );
        assert_eq!(link.writes().len(), 1);
    }

    #[test]
    fn gap_throttles_changes() {
        let mut g = governor(false);
        let mut link = RegisterBank::new();
        let t0 = Instant::now();
        g.maybe_write(&mut link, Channel::Mode, 1, t0);
        let out = g.maybe_write(&mut link, Channel::Mode, 3, t0 + Duration::from_secs(2));
        assert_eq!(
            out,
            WriteOutcome::Throttled {
                wait: Duration::from_secs(3)
            }
        );
        assert_eq!(
            g.maybe_write(&mut link, Channel::Mode, 3, t0 + Duration::from_secs(5)),
            WriteOutcome::Written
        );
    }

    #[test]
    fn channels_are_independent() {
        let mut g = governor(false);
        let mut link = RegisterBank::new();
        let t0 = Instant::now();
        g.maybe_write(&mut link, Channel::Mode, 1, t0);
        assert_eq!(
            g.maybe_write(&mut link, Channel::OutputMode, 2, t0),
            WriteOutcome::Written
        );
    }

    #[test]
    fn dry_run_never_touches_link() {
        let mut g = governor(true);
        let mut link = RegisterBank::new();
        let t0 = Instant::now();
        assert_eq!(g.maybe_write(&mut link, Channel::Mode, 4, t0), WriteOutcome::DryRun);
        assert_eq!(g.gate(Channel::Mode).last_value, Some(4));
        assert!(link.writes().is_empty());
    }

    #[test]
    fn failed_write_leaves_bookkeeping() {
        let mut g = governor(false);
        let mut link = RegisterBank::new();
        link.fail_writes(true);
        let t0 = Instant::now();
        assert!(matches!(
            g.maybe_write(&mut link, Channel::Mode, 1, t0),
            WriteOutcome::Failed(_)
        ));
        assert_eq!(g.gate(Channel::Mode), &WriteGate::default());
        link.fail_writes(false);
        assert_eq!(g.maybe_write(&mut link, Channel::Mode, 1, t0), WriteOutcome::Written);
    }

    #[test]
    fn seeded_value_suppresses_write_without_gap() {
        let mut g = governor(false);
        let mut link = RegisterBank::new();
        g.seed(Channel::OutputMode, 1);
        let t0 = Instant::now();
        assert_eq!(
            g.maybe_write(&mut link, Channel::OutputMode, 1, t0),
            WriteOutcome::Unchanged
        );
        assert_eq!(
            g.maybe_write(&mut link, Channel::OutputMode, 2, t0),
            WriteOutcome::Written
        );
    }
}
