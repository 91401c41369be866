use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::TimerConfig;
use crate::error::{Result, TimerError};
use crate::timer::{Timer, TimerStatus};

/// Registry of named timers
pub struct Catalog {
    /// Instance name for logging
    name: String,

    /// Timer storage: timer_name -> timer
    timers: RwLock<HashMap<String, Timer>>,

    /// Configuration handed to every created timer
    config: TimerConfig,

    /// Channel for publishing lifecycle events, if requested
    event_tx: Option<mpsc::Sender<TimerEvent>>,

    /// Cancellation token for graceful shutdown, parent of every timer run
    cancel_token: CancellationToken,
}

/// Receiving side of the catalog's lifecycle events
pub struct CatalogEvents {
    event_rx: mpsc::Receiver<TimerEvent>,
}

/// Timer lifecycle event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerEvent {
    TimerStarted { name: String },
    TimerFinished { name: String },
}

impl Catalog {
    /// Create an empty catalog
    ///
    /// # Arguments
    /// * `name` - Catalog instance name, used in log lines
    /// * `config` - Configuration for every timer created here
    /// * `cancel_token` - Cancelling it stops every running timer
    pub fn new(name: String, config: TimerConfig, cancel_token: CancellationToken) -> Self {
        Catalog {
            name,
            timers: RwLock::new(HashMap::new()),
            config,
            event_tx: None,
            cancel_token,
        }
    }

    /// Create an empty catalog that also publishes start/finish events on a
    /// bounded channel
    ///
    /// Returns (Catalog, CatalogEvents)
    pub fn with_events(
        name: String,
        config: TimerConfig,
        event_buffer_size: usize,
        cancel_token: CancellationToken,
    ) -> (Self, CatalogEvents) {
        let (event_tx, event_rx) = mpsc::channel(event_buffer_size);

        let mut catalog = Catalog::new(name, config, cancel_token);
        catalog.event_tx = Some(event_tx);

        (catalog, CatalogEvents { event_rx })
    }

    /// Create and register a new idle timer, refused once the catalog is shut down
    pub fn create(&self, name: &str, duration: Duration) -> Result<Timer> {
        if self.cancel_token.is_cancelled() {
            return Err(TimerError::ShutDown);
        }

        let mut timers = self.write_timers();
        if timers.contains_key(name) {
            return Err(TimerError::AlreadyExists(name.to_string()));
        }

        let timer = Timer::build(
            Some(name.to_string()),
            duration,
            self.config.clone(),
            self.cancel_token.clone(),
        )?;

        if let Some(event_tx) = &self.event_tx {
            let tx = event_tx.clone();
            timer.on_start(move |timer| {
                publish(&tx, TimerEvent::TimerStarted { name: timer.label().to_string() });
            });
            let tx = event_tx.clone();
            timer.on_end(move |timer| {
                publish(&tx, TimerEvent::TimerFinished { name: timer.label().to_string() });
            });
        }

        timers.insert(name.to_string(), timer.clone());
        log::debug!(
            "Timer '{}' created in catalog '{}' with {:?}",
            name,
            self.name,
            duration
        );
        Ok(timer)
    }

    pub fn get(&self, name: &str) -> Option<Timer> {
        self.read_timers().get(name).cloned()
    }

    /// All registered timers, keyed by name
    pub fn list(&self) -> HashMap<String, Timer> {
        self.read_timers().clone()
    }

    pub fn start(&self, name: &str) -> Result<()> {
        self.lookup(name)?.start()
    }

    /// Pause a running timer or resume a paused one
    pub fn pause_or_resume(&self, name: &str) -> Result<()> {
        let timer = self.lookup(name)?;
        match timer.status() {
            TimerStatus::Running => timer.pause(),
            TimerStatus::Paused => timer.resume(),
            status => {
                log::debug!(
                    "Timer '{}' in catalog '{}' is {}, nothing to pause or resume",
                    name,
                    self.name,
                    status
                );
            }
        }
        Ok(())
    }

    pub fn add_time(&self, name: &str, extra: Duration) -> Result<()> {
        self.lookup(name)?.add_time(extra);
        Ok(())
    }

    pub async fn stop(&self, name: &str) -> Result<()> {
        self.lookup(name)?.stop().await;
        Ok(())
    }

    pub async fn reset(&self, name: &str) -> Result<()> {
        self.lookup(name)?.reset().await;
        Ok(())
    }

    /// Unregister a timer that is idle, finished or stopped
    pub fn remove(&self, name: &str) -> Result<Timer> {
        let mut timers = self.write_timers();
        let status = timers
            .get(name)
            .map(Timer::status)
            .ok_or_else(|| TimerError::NotFound(name.to_string()))?;
        if status.is_active() {
            return Err(TimerError::StillActive(name.to_string()));
        }

        let timer = timers
            .remove(name)
            .ok_or_else(|| TimerError::NotFound(name.to_string()))?;
        log::debug!("Timer '{}' removed from catalog '{}'", name, self.name);
        Ok(timer)
    }

    /// Stop every active timer and cancel the catalog's token. Later
    /// `create` and `start` calls fail with [`TimerError::ShutDown`].
    pub async fn shutdown(&self) {
        log::info!("Catalog '{}' shutting down", self.name);

        let active: Vec<Timer> = self
            .read_timers()
            .values()
            .filter(|timer| timer.is_active())
            .cloned()
            .collect();
        for timer in active {
            timer.stop().await;
        }

        self.cancel_token.cancel();
        log::info!("Catalog '{}' stopped", self.name);
    }

    fn lookup(&self, name: &str) -> Result<Timer> {
        self.get(name)
            .ok_or_else(|| TimerError::NotFound(name.to_string()))
    }

    fn read_timers(&self) -> RwLockReadGuard<'_, HashMap<String, Timer>> {
        self.timers.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_timers(&self) -> RwLockWriteGuard<'_, HashMap<String, Timer>> {
        self.timers.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Use try_send to avoid blocking the timer if the event channel is full
fn publish(event_tx: &mpsc::Sender<TimerEvent>, event: TimerEvent) {
    if let Err(e) = event_tx.try_send(event) {
        match e {
            mpsc::error::TrySendError::Full(event) => {
                log::warn!("Event channel full, dropping {:?}", event);
            }
            mpsc::error::TrySendError::Closed(event) => {
                log::warn!("Event channel closed, cannot send {:?}", event);
            }
        }
    }
}

impl CatalogEvents {
    /// Receive the next timer event (blocking)
    pub async fn recv_event(&mut self) -> Option<TimerEvent> {
        self.event_rx.recv().await
    }

    /// Try to receive a timer event (non-blocking)
    pub fn try_recv_event(&mut self) -> std::result::Result<TimerEvent, mpsc::error::TryRecvError> {
        self.event_rx.try_recv()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::time::sleep;
    use tokio_test::{assert_err, assert_ok};

    fn catalog() -> Catalog {
        Catalog::new(
            "test".to_string(),
            TimerConfig::default(),
            CancellationToken::new(),
        )
    }

    #[test]
    fn test_create_and_get() {
        let catalog = catalog();

        let created = catalog.create("work", Duration::from_secs(25 * 60)).unwrap();
        assert_eq!(created.duration(), Duration::from_secs(25 * 60));
        assert_eq!(created.name(), Some("work"));

        let fetched = catalog.get("work").unwrap();
        assert_eq!(fetched.duration(), created.duration());
        assert!(catalog.get("missing").is_none());
    }

    #[test]
    fn test_create_duplicate_name_conflicts() {
        let catalog = catalog();

        assert_ok!(catalog.create("t", Duration::from_secs(10)));
        let result = catalog.create("t", Duration::from_secs(20));

        assert_eq!(result.unwrap_err(), TimerError::AlreadyExists("t".to_string()));
        assert_eq!(catalog.get("t").unwrap().duration(), Duration::from_secs(10));
    }

    #[test]
    fn test_create_zero_duration_registers_nothing() {
        let catalog = catalog();

        let result = catalog.create("zero", Duration::ZERO);

        assert_eq!(result.unwrap_err(), TimerError::InvalidDuration);
        assert!(catalog.get("zero").is_none());
    }

    #[test]
    fn test_list() {
        let catalog = catalog();
        assert!(catalog.list().is_empty());

        catalog.create("work", Duration::from_secs(1500)).unwrap();
        catalog.create("break", Duration::from_secs(300)).unwrap();

        let timers = catalog.list();
        assert_eq!(timers.len(), 2);
        assert!(timers.contains_key("work"));
        assert!(timers.contains_key("break"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_name_is_not_found() {
        let catalog = catalog();
        let not_found = TimerError::NotFound("ghost".to_string());

        assert_eq!(catalog.start("ghost"), Err(not_found.clone()));
        assert_eq!(catalog.pause_or_resume("ghost"), Err(not_found.clone()));
        assert_eq!(
            catalog.add_time("ghost", Duration::from_secs(1)),
            Err(not_found.clone())
        );
        assert_eq!(catalog.stop("ghost").await, Err(not_found.clone()));
        assert_eq!(catalog.reset("ghost").await, Err(not_found.clone()));
        assert_eq!(catalog.remove("ghost").unwrap_err(), not_found);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_or_resume_toggles() {
        let catalog = catalog();
        let timer = catalog.create("test", Duration::from_secs(2)).unwrap();

        // Nothing to toggle while idle
        assert_ok!(catalog.pause_or_resume("test"));
        assert_eq!(timer.status(), TimerStatus::Idle);

        catalog.start("test").unwrap();
        catalog.pause_or_resume("test").unwrap();
        assert_eq!(timer.status(), TimerStatus::Paused);

        catalog.pause_or_resume("test").unwrap();
        assert_eq!(timer.status(), TimerStatus::Running);

        catalog.stop("test").await.unwrap();
        assert_eq!(timer.status(), TimerStatus::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_and_add_time() {
        let catalog = catalog();
        let timer = catalog.create("test", Duration::from_secs(2)).unwrap();

        catalog.add_time("test", Duration::from_secs(5)).unwrap();
        assert_eq!(timer.remaining(), Duration::from_secs(7));

        catalog.start("test").unwrap();
        sleep(Duration::from_millis(200)).await;
        catalog.reset("test").await.unwrap();

        assert_eq!(timer.status(), TimerStatus::Idle);
        assert_eq!(timer.remaining(), Duration::from_secs(2));
        assert!(!timer.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_rules() {
        let catalog = catalog();
        catalog.create("idle", Duration::from_secs(10)).unwrap();
        catalog.create("busy", Duration::from_secs(10)).unwrap();

        assert_ok!(catalog.remove("idle"));
        assert!(catalog.get("idle").is_none());

        catalog.start("busy").unwrap();
        let result = catalog.remove("busy");
        assert_eq!(result.unwrap_err(), TimerError::StillActive("busy".to_string()));

        catalog.pause_or_resume("busy").unwrap();
        assert_err!(catalog.remove("busy"));

        catalog.stop("busy").await.unwrap();
        assert_ok!(catalog.remove("busy"));
        assert!(catalog.list().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_finished_timer() {
        let catalog = catalog();
        catalog.create("short", Duration::from_millis(300)).unwrap();

        catalog.start("short").unwrap();
        sleep(Duration::from_secs(1)).await;

        let removed = catalog.remove("short").unwrap();
        assert_eq!(removed.status(), TimerStatus::Finished);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timers_run_independently() {
        let catalog = catalog();
        let first = catalog.create("first", Duration::from_secs(3)).unwrap();
        let second = catalog.create("second", Duration::from_secs(5)).unwrap();

        catalog.start("first").unwrap();
        catalog.start("second").unwrap();
        sleep(Duration::from_secs(1)).await;
        catalog.pause_or_resume("second").unwrap();

        sleep(Duration::from_secs(3)).await;
        assert_eq!(first.status(), TimerStatus::Finished);
        assert_eq!(second.status(), TimerStatus::Paused);
        assert!(second.remaining() > Duration::from_secs(3));

        catalog.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_are_published() {
        let (catalog, mut events) = Catalog::with_events(
            "events".to_string(),
            TimerConfig::default(),
            10,
            CancellationToken::new(),
        );
        catalog.create("tea", Duration::from_millis(500)).unwrap();

        catalog.start("tea").unwrap();
        assert_eq!(
            events.recv_event().await,
            Some(TimerEvent::TimerStarted { name: "tea".to_string() })
        );
        assert_eq!(
            events.recv_event().await,
            Some(TimerEvent::TimerFinished { name: "tea".to_string() })
        );
        assert!(events.try_recv_event().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_event_channel_does_not_block_timers() {
        let (catalog, mut events) = Catalog::with_events(
            "backpressure".to_string(),
            TimerConfig::default(),
            1,
            CancellationToken::new(),
        );
        let timer = catalog.create("t", Duration::from_millis(200)).unwrap();
        let ended = Arc::new(AtomicUsize::new(0));
        let count = ended.clone();
        timer.on_end(move |_| {
            count.fetch_add(1, Ordering::SeqCst);
        });

        catalog.start("t").unwrap();
        sleep(Duration::from_secs(1)).await;

        // Finished event was dropped, later handlers still ran
        assert_eq!(timer.status(), TimerStatus::Finished);
        assert_eq!(ended.load(Ordering::SeqCst), 1);
        assert_eq!(
            events.try_recv_event().unwrap(),
            TimerEvent::TimerStarted { name: "t".to_string() }
        );
        assert!(events.try_recv_event().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_active_timers() {
        let cancel_token = CancellationToken::new();
        let catalog = Catalog::new("test".to_string(), TimerConfig::default(), cancel_token.clone());
        let running = catalog.create("running", Duration::from_secs(10)).unwrap();
        let paused = catalog.create("paused", Duration::from_secs(10)).unwrap();
        let idle = catalog.create("idle", Duration::from_secs(10)).unwrap();

        catalog.start("running").unwrap();
        catalog.start("paused").unwrap();
        catalog.pause_or_resume("paused").unwrap();

        catalog.shutdown().await;

        assert!(cancel_token.is_cancelled());
        assert_eq!(running.status(), TimerStatus::Stopped);
        assert_eq!(paused.status(), TimerStatus::Stopped);
        assert_eq!(idle.status(), TimerStatus::Idle);
        assert!(!running.is_active());
        assert!(!paused.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_token_stops_running_timers() {
        let cancel_token = CancellationToken::new();
        let catalog = Catalog::new("test".to_string(), TimerConfig::default(), cancel_token.clone());
        let timer = catalog.create("t", Duration::from_secs(10)).unwrap();

        catalog.start("t").unwrap();
        sleep(Duration::from_millis(500)).await;

        cancel_token.cancel();
        sleep(Duration::from_millis(100)).await;

        assert_eq!(timer.status(), TimerStatus::Stopped);
        assert_ok!(catalog.remove("t"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_refuses_new_runs() {
        let (catalog, mut events) = Catalog::with_events(
            "closing".to_string(),
            TimerConfig::default(),
            10,
            CancellationToken::new(),
        );
        let existing = catalog.create("existing", Duration::from_secs(10)).unwrap();
        catalog.start("existing").unwrap();
        assert_eq!(
            events.try_recv_event().unwrap(),
            TimerEvent::TimerStarted { name: "existing".to_string() }
        );

        catalog.shutdown().await;
        assert_eq!(
            catalog.create("late", Duration::from_secs(10)).unwrap_err(),
            TimerError::ShutDown
        );
        assert!(catalog.get("late").is_none());

        catalog.reset("existing").await.unwrap();
        assert_eq!(catalog.start("existing"), Err(TimerError::ShutDown));
        assert_eq!(existing.status(), TimerStatus::Idle);
        assert_eq!(existing.remaining(), Duration::from_secs(10));

        // No start notification for the refused run
        sleep(Duration::from_millis(200)).await;
        assert!(events.try_recv_event().is_err());
    }

    #[test]
    fn test_dropped_runtime_leaves_timer_stopped() {
        let catalog = catalog();
        let timer = catalog.create("t", Duration::from_secs(10)).unwrap();

        let first = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        first.block_on(async {
            catalog.start("t").unwrap();
            sleep(Duration::from_millis(50)).await;
        });
        drop(first);

        assert_eq!(timer.status(), TimerStatus::Stopped);
        assert!(!timer.is_active());

        let second = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        second.block_on(async {
            catalog.stop("t").await.unwrap();
        });
        assert_eq!(timer.status(), TimerStatus::Stopped);
        assert_ok!(catalog.remove("t"));
    }
}
