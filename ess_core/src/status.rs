//! Per-cycle status returned by `ControlLoop::step`.

use crate::error::LinkError;
use crate::governor::WriteOutcome;
use crate::mode::Mode;
use crate::sampler::Reading;

/// What kind of cycle it was.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleStatus {
    /// Reading processed, decisions made, writes attempted.
    Applied,
    /// Enable flag not set; nothing decided, nothing written.
    Disabled,
    /// The read pass failed; state untouched.
    ReadFailed(LinkError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub status: CycleStatus,
    pub reading: Option<Reading>,
    /// Verdicts after this cycle (unchanged on skipped cycles).
    pub night: bool,
    pub surplus_confirmed: bool,
    /// Machine mode after this cycle.
    pub mode: Mode,
    pub output_target: Option<u16>,
    pub mode_write: Option<WriteOutcome>,
    pub output_write: Option<WriteOutcome>,
}
