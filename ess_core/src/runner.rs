//! Fixed-cadence driver around `ControlLoop::step`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use ess_traits::Clock;

use crate::control::ControlLoop;
use crate::governor::WriteOutcome;
use crate::status::{CycleReport, CycleStatus};
use crate::util::SLEEP_SLICE;

/// Counters over a whole run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub cycles: u64,
    pub applied: u64,
    pub disabled: u64,
    pub read_failures: u64,
    pub writes: u64,
    pub dry_run_writes: u64,
    pub write_failures: u64,
    /// True when the run ended because the shutdown flag was set.
    pub interrupted: bool,
}

impl RunSummary {
    fn record(&mut self, report: &CycleReport) {
        self.cycles += 1;
        match report.status {
            CycleStatus::Applied => self.applied += 1,
            CycleStatus::Disabled => self.disabled += 1,
            CycleStatus::ReadFailed(_) => self.read_failures += 1,
        }
        for outcome in [&report.mode_write, &report.output_write]
            .into_iter()
            .flatten()
        {
            match outcome {
                WriteOutcome::Written => self.writes += 1,
                WriteOutcome::DryRun => self.dry_run_writes += 1,
                WriteOutcome::Failed(_) => self.write_failures += 1,
                WriteOutcome::Unchanged | WriteOutcome::Throttled { .. } => {}
            }
        }
    }
}

/// Time left to sleep after a cycle took `elapsed`. No catch-up after overruns.
#[inline]
fn remaining_pause(interval: Duration, elapsed: Duration) -> Duration {
    interval.saturating_sub(elapsed)
}

#[inline]
fn cycles_exhausted(done: u64, max_cycles: Option<u64>) -> bool {
    max_cycles.is_some_and(|max| done >= max)
}

/// Sleep in slices so a shutdown request is seen within `SLEEP_SLICE`.
/// Returns false if interrupted.
fn interruptible_sleep(clock: &dyn Clock, total: Duration, shutdown: &AtomicBool) -> bool {
    let mut left = total;
    while !left.is_zero() {
        if shutdown.load(Ordering::Relaxed) {
            return false;
        }
        let slice = left.min(SLEEP_SLICE);
        clock.sleep(slice);
        left = left.saturating_sub(slice);
    }
    true
}

/// Run cycles until `shutdown` is set or `max_cycles` have run.
///
/// A cycle in flight always completes; the flag is only checked between
/// cycles and during the inter-cycle sleep.
pub fn run(lp: &mut ControlLoop, shutdown: &AtomicBool, max_cycles: Option<u64>) -> RunSummary {
    let clock = lp.clock().clone();
    let interval = lp.poll_interval();
    let mut summary = RunSummary::default();

    tracing::info!(poll_interval = ?interval, max_cycles = ?max_cycles, "control loop start");
    loop {
        if shutdown.load(Ordering::Relaxed) {
            summary.interrupted = true;
            break;
        }
        if cycles_exhausted(summary.cycles, max_cycles) {
            break;
        }

        let started = clock.now();
        let report = lp.step();
        summary.record(&report);

        if cycles_exhausted(summary.cycles, max_cycles) {
            break;
        }
        let elapsed = clock.now().saturating_duration_since(started);
        if !interruptible_sleep(&*clock, remaining_pause(interval, elapsed), shutdown) {
            summary.interrupted = true;
            break;
        }
    }
    tracing::info!(
        cycles = summary.cycles,
        applied = summary.applied,
        disabled = summary.disabled,
        read_failures = summary.read_failures,
        writes = summary.writes,
        interrupted = summary.interrupted,
        "control loop stopped"
    );
    summary
}
