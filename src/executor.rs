//! Background countdown task.
//!
//! Every started [`Timer`] owns exactly one task spawned from here. The task
//! wakes once per resolution, charges the elapsed monotonic time against the
//! timer and exits as soon as the timer finishes or its run token is
//! cancelled. Waiting is a `select!` between the heartbeat and the token, so
//! a stop request is observed without waiting out the heartbeat.

use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::timer::{panic_message, Timer};

/// Outcome of one heartbeat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    /// Keep polling (running, paused or not enough time elapsed)
    Continue,
    /// This heartbeat brought the countdown to zero
    Finished,
    /// The timer no longer belongs to this run
    Detached,
}

pub(crate) fn spawn(
    runtime: &Handle,
    timer: Timer,
    run_id: u64,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    runtime.spawn(supervise(timer, run_id, cancel))
}

/// Marks the run stopped when the task goes away while still active,
/// including when the hosting runtime drops the task without polling it again
struct HaltOnDrop {
    timer: Timer,
    run_id: u64,
}

impl Drop for HaltOnDrop {
    fn drop(&mut self) {
        self.timer.halt_run(self.run_id);
    }
}

async fn supervise(timer: Timer, run_id: u64, cancel: CancellationToken) {
    log::debug!("Timer '{}' background task #{} started", timer.label(), run_id);
    let guard = HaltOnDrop { timer, run_id };

    let outcome = AssertUnwindSafe(run(&guard.timer, run_id, &cancel))
        .catch_unwind()
        .await;
    if let Err(panic) = outcome {
        log::error!(
            "Timer '{}' background task #{} failed: {}",
            guard.timer.label(),
            run_id,
            panic_message(panic.as_ref())
        );
    }

    log::debug!("Timer '{}' background task #{} exited", guard.timer.label(), run_id);
}

async fn run(timer: &Timer, run_id: u64, cancel: &CancellationToken) {
    let mut heartbeat = interval(timer.resolution());
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            // Stop, reset, manual finish or catalog shutdown
            _ = cancel.cancelled() => {
                timer.halt_run(run_id);
                break;
            }

            _ = heartbeat.tick() => {
                match timer.poll_countdown(run_id) {
                    Step::Continue => {}
                    Step::Finished | Step::Detached => break,
                }
            }
        }
    }
}
