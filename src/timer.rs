use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tokio_util::sync::CancellationToken;

use crate::config::TimerConfig;
use crate::error::{Result, TimerError};
use crate::executor::{self, Step};

/// Handler invoked on lifecycle transitions
pub type Callback = Arc<dyn Fn(&Timer) + Send + Sync>;

/// Lifecycle state of a [`Timer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerStatus {
    Idle,
    Running,
    Paused,
    Finished,
    Stopped,
}

impl TimerStatus {
    /// Running or paused: a background task may still be counting down
    pub fn is_active(self) -> bool {
        matches!(self, TimerStatus::Running | TimerStatus::Paused)
    }

    /// Finished or stopped: only `reset` makes the timer usable again
    pub fn is_terminal(self) -> bool {
        matches!(self, TimerStatus::Finished | TimerStatus::Stopped)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TimerStatus::Idle => "idle",
            TimerStatus::Running => "running",
            TimerStatus::Paused => "paused",
            TimerStatus::Finished => "finished",
            TimerStatus::Stopped => "stopped",
        }
    }
}

impl fmt::Display for TimerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Consistent view of a timer taken under a single lock
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimerSnapshot {
    pub status: TimerStatus,
    pub duration: Duration,
    pub remaining: Duration,
    pub progress: f64,
}

/// A countdown timer.
///
/// `Timer` is a cheap handle: clones share the same countdown. Starting a
/// timer spawns one Tokio task that owns the countdown until the timer
/// finishes, is stopped or is reset.
///
/// Operations that do not apply to the current status are ignored rather
/// than reported, e.g. pausing an idle timer does nothing.
#[derive(Clone)]
pub struct Timer {
    inner: Arc<Inner>,
}

struct Inner {
    /// Optional label used in log lines and exposed to callbacks
    name: Option<String>,

    duration: Duration,

    config: TimerConfig,

    /// Parent of every run's cancellation token
    shutdown: CancellationToken,

    state: Mutex<State>,

    callbacks: Mutex<Callbacks>,
}

#[derive(Default)]
struct Callbacks {
    on_start: Vec<Callback>,
    on_end: Vec<Callback>,
}

#[derive(Clone, Copy)]
enum Hook {
    Start,
    End,
}

struct State {
    status: TimerStatus,
    remaining: Duration,

    /// Last instant the countdown was charged up to
    anchor: Instant,

    run: Option<Run>,
    next_run_id: u64,
}

/// One background execution of the countdown
struct Run {
    id: u64,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl Run {
    fn is_alive(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl State {
    fn is_current_run(&self, run_id: u64) -> bool {
        self.run.as_ref().is_some_and(|run| run.id == run_id)
    }

    /// Charge `elapsed` against the remaining time. Returns true when this
    /// call finished the timer.
    fn countdown(&mut self, elapsed: Duration) -> bool {
        self.remaining = self.remaining.saturating_sub(elapsed);
        if !self.remaining.is_zero() {
            return false;
        }

        self.status = TimerStatus::Finished;
        if let Some(run) = &self.run {
            run.cancel.cancel();
        }
        true
    }
}

impl Timer {
    /// Create an idle timer with the default configuration
    pub fn new(duration: Duration) -> Result<Self> {
        Self::with_config(duration, TimerConfig::default())
    }

    pub fn with_config(duration: Duration, config: TimerConfig) -> Result<Self> {
        Self::build(None, duration, config, CancellationToken::new())
    }

    pub(crate) fn build(
        name: Option<String>,
        duration: Duration,
        config: TimerConfig,
        shutdown: CancellationToken,
    ) -> Result<Self> {
        if duration.is_zero() {
            return Err(TimerError::InvalidDuration);
        }
        config.validate()?;

        let anchor = config.clock.now();
        let state = State {
            status: TimerStatus::Idle,
            remaining: duration,
            anchor,
            run: None,
            next_run_id: 0,
        };

        Ok(Timer {
            inner: Arc::new(Inner {
                name,
                duration,
                config,
                shutdown,
                state: Mutex::new(state),
                callbacks: Mutex::new(Callbacks::default()),
            }),
        })
    }

    /// Name under which the timer was registered, if any
    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    pub fn duration(&self) -> Duration {
        self.inner.duration
    }

    pub fn resolution(&self) -> Duration {
        self.inner.config.resolution
    }

    pub fn status(&self) -> TimerStatus {
        self.lock_state().status
    }

    pub fn remaining(&self) -> Duration {
        self.lock_state().remaining
    }

    /// Fraction of the duration already consumed, in `[0.0, 1.0]`
    pub fn progress(&self) -> f64 {
        let remaining = self.lock_state().remaining;
        self.progress_for(remaining)
    }

    pub fn snapshot(&self) -> TimerSnapshot {
        let (status, remaining) = {
            let state = self.lock_state();
            (state.status, state.remaining)
        };
        TimerSnapshot {
            status,
            duration: self.inner.duration,
            remaining,
            progress: self.progress_for(remaining),
        }
    }

    /// Whether a background task is still alive for this timer
    pub fn is_active(&self) -> bool {
        self.lock_state().run.as_ref().is_some_and(Run::is_alive)
    }

    /// Register a handler fired each time the timer starts
    pub fn on_start<F>(&self, callback: F) -> &Self
    where
        F: Fn(&Timer) + Send + Sync + 'static,
    {
        self.lock_callbacks().on_start.push(Arc::new(callback));
        self
    }

    /// Register a handler fired when the countdown reaches zero
    pub fn on_end<F>(&self, callback: F) -> &Self
    where
        F: Fn(&Timer) + Send + Sync + 'static,
    {
        self.lock_callbacks().on_end.push(Arc::new(callback));
        self
    }

    /// Start counting down from idle.
    ///
    /// Calling `start` on a running or paused timer does nothing. Finished
    /// and stopped timers must be reset first. Fails when no Tokio runtime
    /// is available to host the background task, or once the owning catalog
    /// has been shut down.
    pub fn start(&self) -> Result<()> {
        {
            let mut state = self.lock_state();
            match state.status {
                TimerStatus::Idle => {}
                TimerStatus::Running | TimerStatus::Paused => return Ok(()),
                status => {
                    log::debug!(
                        "Ignoring start of {} timer '{}', reset it first",
                        status,
                        self.label()
                    );
                    return Ok(());
                }
            }

            if self.inner.shutdown.is_cancelled() {
                return Err(TimerError::ShutDown);
            }
            let runtime = Handle::try_current().map_err(|_| TimerError::NoRuntime)?;

            let id = state.next_run_id;
            state.next_run_id += 1;
            state.status = TimerStatus::Running;
            state.anchor = self.inner.config.clock.now();

            let cancel = self.inner.shutdown.child_token();
            let handle = executor::spawn(&runtime, self.clone(), id, cancel.clone());
            state.run = Some(Run { id, cancel, handle });

            log::debug!("Timer '{}' started ({:?})", self.label(), state.remaining);
        }

        self.notify(Hook::Start);
        Ok(())
    }

    pub fn pause(&self) {
        let mut state = self.lock_state();
        if state.status == TimerStatus::Running {
            state.status = TimerStatus::Paused;
            log::debug!("Timer '{}' paused ({:?} left)", self.label(), state.remaining);
        }
    }

    pub fn resume(&self) {
        let mut state = self.lock_state();
        if state.status == TimerStatus::Paused {
            state.status = TimerStatus::Running;
            // Paused time must not be charged on the next poll
            state.anchor = self.inner.config.clock.now();
            log::debug!("Timer '{}' resumed ({:?} left)", self.label(), state.remaining);
        }
    }

    /// Manually charge `elapsed` against a running timer.
    ///
    /// Reaching zero finishes the timer, fires `on_end` and ends the
    /// background task. Does nothing unless the timer is running.
    pub fn tick(&self, elapsed: Duration) {
        let finished = {
            let mut state = self.lock_state();
            if state.status != TimerStatus::Running {
                return;
            }
            state.countdown(elapsed)
        };

        if finished {
            log::info!("Timer '{}' finished", self.label());
            self.notify(Hook::End);
        }
    }

    /// Add `extra` to the remaining time, in any status
    pub fn add_time(&self, extra: Duration) {
        if extra.is_zero() {
            log::warn!("Ignoring zero extra time for timer '{}'", self.label());
            return;
        }

        let mut state = self.lock_state();
        state.remaining = state.remaining.saturating_add(extra);
        log::debug!(
            "Added {:?} to timer '{}', {:?} left",
            extra,
            self.label(),
            state.remaining
        );
    }

    /// Stop the background task and mark the timer stopped.
    ///
    /// Waits at most the configured stop timeout for the task to exit and
    /// aborts it past that. A running or paused timer whose task is already
    /// gone is marked stopped; otherwise does nothing when no task is alive.
    pub async fn stop(&self) {
        let run = {
            let mut state = self.lock_state();
            if !state.run.as_ref().is_some_and(Run::is_alive) {
                if state.status.is_active() {
                    log::warn!(
                        "Timer '{}' was {} without a background task, marking it stopped",
                        self.label(),
                        state.status
                    );
                    state.status = TimerStatus::Stopped;
                } else {
                    log::debug!("Timer '{}' has no background task to stop", self.label());
                }
                return;
            }
            if state.status.is_active() {
                state.status = TimerStatus::Stopped;
            }
            state.run.take()
        };
        let Some(Run { cancel, mut handle, .. }) = run else {
            return;
        };

        cancel.cancel();
        match timeout(self.inner.config.stop_timeout, &mut handle).await {
            Ok(Ok(())) => {
                log::debug!("Timer '{}' stopped", self.label());
            }
            Ok(Err(e)) => {
                log::error!("Timer '{}' background task ended abnormally: {}", self.label(), e);
            }
            Err(_) => {
                log::warn!(
                    "Timer '{}' background task did not exit within {:?}, aborting it",
                    self.label(),
                    self.inner.config.stop_timeout
                );
                handle.abort();
            }
        }
    }

    /// Stop if needed, then restore the full duration and go back to idle
    pub async fn reset(&self) {
        if self.is_active() {
            self.stop().await;
        }

        let mut state = self.lock_state();
        state.run = None;
        state.remaining = self.inner.duration;
        state.status = TimerStatus::Idle;
        log::debug!("Timer '{}' reset to {:?}", self.label(), self.inner.duration);
    }

    /// Executor poll: charge the time elapsed since the anchor once at least
    /// one resolution has passed.
    pub(crate) fn poll_countdown(&self, run_id: u64) -> Step {
        let finished = {
            let mut state = self.lock_state();
            if !state.is_current_run(run_id) {
                return Step::Detached;
            }
            if state.status != TimerStatus::Running {
                return Step::Continue;
            }

            let now = self.inner.config.clock.now();
            let elapsed = now.saturating_duration_since(state.anchor);
            if elapsed < self.inner.config.resolution {
                return Step::Continue;
            }
            state.anchor = now;
            state.countdown(elapsed)
        };

        if finished {
            log::info!("Timer '{}' finished", self.label());
            self.notify(Hook::End);
            Step::Finished
        } else {
            Step::Continue
        }
    }

    /// Force a still active run into the stopped state. Used when the
    /// background task ends without the timer having finished.
    pub(crate) fn halt_run(&self, run_id: u64) {
        let mut state = self.lock_state();
        if state.is_current_run(run_id) && state.status.is_active() {
            log::info!("Timer '{}' halted while {}", self.label(), state.status);
            state.status = TimerStatus::Stopped;
        }
    }

    pub(crate) fn label(&self) -> &str {
        self.inner.name.as_deref().unwrap_or("anonymous")
    }

    fn progress_for(&self, remaining: Duration) -> f64 {
        let done = self.inner.duration.saturating_sub(remaining);
        (done.as_secs_f64() / self.inner.duration.as_secs_f64()).clamp(0.0, 1.0)
    }

    fn notify(&self, hook: Hook) {
        let callbacks: Vec<Callback> = {
            let callbacks = self.lock_callbacks();
            match hook {
                Hook::Start => callbacks.on_start.clone(),
                Hook::End => callbacks.on_end.clone(),
            }
        };

        for callback in callbacks {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| callback(self))) {
                log::error!(
                    "Callback for timer '{}' panicked: {}",
                    self.label(),
                    panic_message(panic.as_ref())
                );
            }
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_callbacks(&self) -> MutexGuard<'_, Callbacks> {
        self.inner.callbacks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snapshot = self.snapshot();
        f.debug_struct("Timer")
            .field("name", &self.inner.name)
            .field("status", &snapshot.status)
            .field("duration", &snapshot.duration)
            .field("remaining", &snapshot.remaining)
            .finish()
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}
