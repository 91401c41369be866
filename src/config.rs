use std::sync::Arc;
use std::time::Duration;

use crate::clock::{Clock, TokioClock};
use crate::error::{Result, TimerError};

/// Default executor polling interval
pub const DEFAULT_RESOLUTION: Duration = Duration::from_millis(100);

/// Default upper bound for `stop()` to wait on the background task
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(2);

/// Tunables shared by every timer created with this configuration
#[derive(Debug, Clone)]
pub struct TimerConfig {
    /// How often the background task wakes up to update the countdown.
    /// Lower values give finer timing at the cost of more wakeups.
    pub resolution: Duration,

    /// How long `stop()` waits for the background task before aborting it
    pub stop_timeout: Duration,

    /// Time source for elapsed-time measurement
    pub clock: Arc<dyn Clock>,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            resolution: DEFAULT_RESOLUTION,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            clock: Arc::new(TokioClock),
        }
    }
}

impl TimerConfig {
    pub fn with_resolution(mut self, resolution: Duration) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn with_stop_timeout(mut self, stop_timeout: Duration) -> Self {
        self.stop_timeout = stop_timeout;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.resolution.is_zero() {
            return Err(TimerError::InvalidResolution);
        }
        Ok(())
    }
}
