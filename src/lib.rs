//! # Countdown Engine
//!
//! A countdown timer engine built on top of Tokio.
//!
//! Each [`Timer`] tracks a fixed duration and the time remaining, moves
//! through a small set of states (idle, running, paused, finished, stopped)
//! and runs its countdown on a dedicated background task. A [`Catalog`]
//! manages many named timers and is what front ends usually talk to.
//!
//! ## Features
//!
//! - **Drift resistant**: remaining time is charged from a monotonic clock,
//!   never from counting heartbeats
//! - **Race-free pause/resume**: paused time is never charged to the countdown
//! - **Callbacks**: ordered `on_start`/`on_end` handlers, isolated from each other
//! - **Named Timers**: create, control and remove timers by name
//! - **Graceful Shutdown**: every timer run is tied to a cancellation token
//! - **Configurable resolution**: trade wakeups for timing precision
//!
//! ## Quick Start
//!
//! ```rust
//! use countdown_engine::{Catalog, TimerConfig, TimerEvent, TimerStatus};
//! use tokio_util::sync::CancellationToken;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (catalog, mut events) = Catalog::with_events(
//!         "my_catalog".to_string(),
//!         TimerConfig::default().with_resolution(Duration::from_millis(10)),
//!         100,                        // event buffer size
//!         CancellationToken::new(),
//!     );
//!
//!     let tea = catalog.create("tea", Duration::from_millis(50))?;
//!     tea.on_end(|timer| println!("'{}' is ready", timer.name().unwrap_or("timer")));
//!     catalog.start("tea")?;
//!
//!     while let Some(event) = events.recv_event().await {
//!         if let TimerEvent::TimerFinished { name } = event {
//!             println!("Timer '{}' finished!", name);
//!             break;
//!         }
//!     }
//!     assert_eq!(tea.status(), TimerStatus::Finished);
//!
//!     catalog.shutdown().await;
//!     Ok(())
//! }
//! ```

mod catalog;
mod clock;
mod config;
mod error;
mod executor;
mod parse;
mod timer;

pub use catalog::{Catalog, CatalogEvents, TimerEvent};
pub use clock::{Clock, ManualClock, TokioClock};
pub use config::{TimerConfig, DEFAULT_RESOLUTION, DEFAULT_STOP_TIMEOUT};
pub use error::{Result, TimerError};
pub use parse::parse_duration;
pub use timer::{Callback, Timer, TimerSnapshot, TimerStatus};

// Re-export commonly used types for convenience
pub use std::time::Duration;
pub use tokio_util::sync::CancellationToken;
