use thiserror::Error;

/// Errors surfaced to callers of the timer engine.
///
/// Misuse of a timer for its current state (pausing an idle timer, stopping
/// one that never ran) is not an error; those calls are ignored and logged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimerError {
    /// A timer was constructed with a zero duration
    #[error("timer duration must be greater than zero")]
    InvalidDuration,

    /// The executor polling resolution was zero
    #[error("polling resolution must be greater than zero")]
    InvalidResolution,

    /// A timer with this name is already registered
    #[error("timer '{0}' already exists")]
    AlreadyExists(String),

    /// No timer is registered under this name
    #[error("timer '{0}' does not exist")]
    NotFound(String),

    /// The timer is running or paused and still owns a background task
    #[error("timer '{0}' is still active")]
    StillActive(String),

    /// `start` was called outside of a Tokio runtime
    #[error("no Tokio runtime available to drive the timer")]
    NoRuntime,

    /// The owning catalog was shut down, no new runs are accepted
    #[error("timer engine has been shut down")]
    ShutDown,

    /// A human readable duration could not be parsed
    #[error("invalid duration '{0}': use Xh, Ym, Zs or combinations (e.g. 1h30m, 45s, 2h15m30s)")]
    InvalidFormat(String),
}

pub type Result<T> = std::result::Result<T, TimerError>;
