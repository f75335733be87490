//! Data Manager - Authoritative corpus cache
//!
//! Owns the single live [`CacheSnapshot`] and keeps it consistent while
//! reloads are triggered by file changes and cache expiry:
//!
//! 1. Loads are mutually exclusive and run through the `data-loader` breaker
//! 2. A load with any invalid record never replaces the current snapshot
//! 3. Triggers arriving during a load coalesce into one follow-up reload
//! 4. Readers get an `Arc` to a complete snapshot and never block

use crate::domain::entities::CacheSnapshot;
use crate::domain::ports::CorpusLoader;
use crate::error::ServiceError;
use crate::infrastructure::events::{DataEvent, EventBus};
use crate::infrastructure::file_watcher::{DataWatcher, WatchError};
use crate::infrastructure::instrument::with_error_handling;
use crate::infrastructure::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry};
use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Data manager settings.
#[derive(Debug, Clone)]
pub struct DataManagerConfig {
    /// Root of the corpus on disk
    pub data_dir: PathBuf,
    /// Age after which the snapshot is considered stale
    pub cache_timeout: Duration,
    /// Reload when files under `data_dir` change
    pub enable_file_watching: bool,
    /// How often to check for an expired cache (None disables the timer)
    pub refresh_interval: Option<Duration>,
    /// Breaker guarding every load
    pub breaker: CircuitBreakerConfig,
}

impl Default for DataManagerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            cache_timeout: Duration::from_secs(300),
            enable_file_watching: false,
            refresh_interval: None,
            breaker: CircuitBreakerConfig::new(crate::config::DATA_LOADER_BREAKER),
        }
    }
}

impl DataManagerConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), ServiceError> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(ServiceError::configuration("data_dir is required"));
        }
        if self.cache_timeout.is_zero() {
            return Err(ServiceError::configuration("cache_timeout must be greater than zero"));
        }
        if self.refresh_interval.is_some_and(|i| i.is_zero()) {
            return Err(ServiceError::configuration(
                "refresh_interval must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// Result of one load attempt that reached the data source.
#[derive(Debug, Clone)]
pub struct LoadResult {
    pub success: bool,
    /// The new snapshot, on success
    pub data: Option<Arc<CacheSnapshot>>,
    /// Collected record errors, on failure
    pub errors: Vec<String>,
}

/// State shared with background tasks.
struct Shared {
    config: DataManagerConfig,
    loader: Arc<dyn CorpusLoader>,
    breaker: Arc<CircuitBreaker>,
    snapshot: ArcSwapOption<CacheSnapshot>,
    events: EventBus,
    load_lock: tokio::sync::Mutex<()>,
    reload_pending: AtomicBool,
    reload_running: AtomicBool,
    shutdown: AtomicBool,
    successful_loads: AtomicU64,
    /// Runtime current at construction, if any
    runtime: Option<Handle>,
}

impl Shared {
    async fn load_data(&self) -> Result<LoadResult, ServiceError> {
        let _guard = self.load_lock.lock().await;
        self.load_locked().await
    }

    /// Caller must hold `load_lock`.
    async fn load_locked(&self) -> Result<LoadResult, ServiceError> {
        let started = Instant::now();
        let loader = self.loader.clone();
        let source = self.config.data_dir.clone();

        let outcome = with_error_handling(
            "load_data",
            self.breaker
                .execute("load_data", move || async move { loader.load(&source).await }),
        )
        .await;

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::error!(
                    data_dir = ?self.config.data_dir,
                    kind = %err.kind(),
                    "corpus load failed: {}",
                    err
                );
                self.events
                    .emit(&DataEvent::DataLoadFailed(vec![err.to_string()]));
                return Err(err);
            }
        };

        if !outcome.is_valid() {
            let errors: Vec<String> = outcome.errors.iter().map(|e| e.to_string()).collect();
            tracing::warn!(
                errors = errors.len(),
                kept_previous = self.snapshot.load().is_some(),
                "corpus has invalid records, snapshot not replaced"
            );
            self.events.emit(&DataEvent::DataLoadFailed(errors.clone()));
            return Ok(LoadResult {
                success: false,
                data: None,
                errors,
            });
        }

        let snapshot = Arc::new(CacheSnapshot::new(
            outcome.tokens,
            outcome.components,
            outcome.guidelines,
        ));
        self.snapshot.store(Some(snapshot.clone()));
        let loads = self.successful_loads.fetch_add(1, Ordering::SeqCst) + 1;

        tracing::info!(
            loads,
            tokens = snapshot.design_tokens.len(),
            components = snapshot.components.len(),
            guidelines = snapshot.guidelines.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "corpus loaded"
        );
        self.events.emit(&DataEvent::DataLoaded(snapshot.clone()));

        Ok(LoadResult {
            success: true,
            data: Some(snapshot),
            errors: Vec::new(),
        })
    }

    fn is_cache_valid(&self) -> bool {
        self.snapshot
            .load_full()
            .is_some_and(|s| s.last_updated.elapsed() <= self.config.cache_timeout)
    }

    /// Spawn on the construction-time runtime, else on the caller's.
    fn spawn<F>(&self, fut: F) -> Option<JoinHandle<F::Output>>
    where
        F: std::future::Future + Send + 'static,
        F::Output: Send + 'static,
    {
        match self.runtime.clone().or_else(|| Handle::try_current().ok()) {
            Some(handle) => Some(handle.spawn(fut)),
            None => {
                tracing::warn!("no tokio runtime available, background task not started");
                None
            }
        }
    }

    /// Request a reload without waiting for it.
    fn trigger_reload(self: &Arc<Self>) {
        if self.shutdown.load(Ordering::SeqCst) {
            return;
        }
        self.reload_pending.store(true, Ordering::SeqCst);
        if self.reload_running.swap(true, Ordering::SeqCst) {
            tracing::debug!("reload already scheduled, coalescing");
            return;
        }

        let shared = self.clone();
        let spawned = self.spawn(async move {
            shared.drain_reloads().await;
        });
        if spawned.is_none() {
            // Leave the trigger pending for the next caller that has a runtime.
            self.reload_running.store(false, Ordering::SeqCst);
        }
    }

    /// Run reloads until no trigger is pending.
    async fn drain_reloads(&self) {
        loop {
            {
                // Consume the pending flag only once we own the lock, so every
                // trigger seen during an in-flight load maps to one reload.
                let _guard = self.load_lock.lock().await;
                if self.reload_pending.swap(false, Ordering::SeqCst)
                    && !self.shutdown.load(Ordering::SeqCst)
                {
                    if let Err(err) = self.load_locked().await {
                        tracing::debug!("scheduled reload failed: {}", err.message());
                    }
                    continue;
                }
            }

            self.reload_running.store(false, Ordering::SeqCst);
            // A trigger may have landed between the last check and the store above.
            if !self.reload_pending.load(Ordering::SeqCst)
                || self.reload_running.swap(true, Ordering::SeqCst)
            {
                break;
            }
        }
    }
}

/// Owner of the authoritative corpus snapshot.
pub struct DataManager {
    shared: Arc<Shared>,
    watcher: Mutex<Option<DataWatcher>>,
    watch_task: Mutex<Option<JoinHandle<()>>>,
    refresh_task: Mutex<Option<JoinHandle<()>>>,
    destroyed: AtomicBool,
}

impl DataManager {
    /// Create a manager; nothing is loaded until [`initialize`](Self::initialize).
    ///
    /// When called inside a Tokio runtime, background work is spawned on that
    /// runtime even if later triggers come from outside it.
    pub fn new(
        config: DataManagerConfig,
        loader: Arc<dyn CorpusLoader>,
        registry: &CircuitBreakerRegistry,
    ) -> Result<Self, ServiceError> {
        config.validate()?;
        let breaker = registry.get_circuit_breaker(config.breaker.clone())?;

        Ok(Self {
            shared: Arc::new(Shared {
                config,
                loader,
                breaker,
                snapshot: ArcSwapOption::empty(),
                events: EventBus::new(),
                load_lock: tokio::sync::Mutex::new(()),
                reload_pending: AtomicBool::new(false),
                reload_running: AtomicBool::new(false),
                shutdown: AtomicBool::new(false),
                successful_loads: AtomicU64::new(0),
                runtime: Handle::try_current().ok(),
            }),
            watcher: Mutex::new(None),
            watch_task: Mutex::new(None),
            refresh_task: Mutex::new(None),
            destroyed: AtomicBool::new(false),
        })
    }

    /// Perform the first load, then start watching and the refresh timer.
    ///
    /// An unreachable data source is returned as an error and leaves no
    /// snapshot. Invalid records produce `success == false` but watching still
    /// starts, so a fix on disk is picked up.
    pub async fn initialize(&self) -> Result<LoadResult, ServiceError> {
        tracing::info!(data_dir = ?self.shared.config.data_dir, "initializing data manager");
        let result = self.shared.load_data().await?;

        if self.shared.config.enable_file_watching {
            if let Err(err) = self.start_file_watching() {
                tracing::warn!("file watching disabled: {}", err);
            }
        }
        if let Some(interval) = self.shared.config.refresh_interval {
            self.start_refresh_timer(interval);
        }

        Ok(result)
    }

    /// Load the corpus now, waiting for any in-flight load first.
    pub async fn load_data(&self) -> Result<LoadResult, ServiceError> {
        self.shared.load_data().await
    }

    /// Current snapshot, if any load has ever succeeded.
    pub fn get_cached_data(&self) -> Option<Arc<CacheSnapshot>> {
        self.shared.snapshot.load_full()
    }

    /// True while a snapshot exists and is younger than `cache_timeout`.
    pub fn is_cache_valid(&self) -> bool {
        self.shared.is_cache_valid()
    }

    /// Schedule a reload; coalesces with one already in flight.
    ///
    /// Callable from any thread. Without a runtime (neither captured in
    /// [`new`](Self::new) nor current) the trigger stays pending.
    pub fn trigger_reload(&self) {
        self.shared.trigger_reload();
    }

    pub fn reload_in_progress(&self) -> bool {
        self.shared.reload_running.load(Ordering::SeqCst) || self.shared.load_lock.try_lock().is_err()
    }

    /// Number of loads that replaced the snapshot.
    pub fn successful_loads(&self) -> u64 {
        self.shared.successful_loads.load(Ordering::SeqCst)
    }

    pub fn events(&self) -> &EventBus {
        &self.shared.events
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.shared.breaker
    }

    pub fn config(&self) -> &DataManagerConfig {
        &self.shared.config
    }

    /// Reload whenever anything under the data directory changes.
    pub fn start_file_watching(&self) -> Result<(), ServiceError> {
        if self.destroyed.load(Ordering::SeqCst) {
            return Err(ServiceError::internal("data manager has been destroyed"));
        }

        let mut slot = self.watcher.lock();
        if slot.is_some() {
            return Ok(());
        }

        let (watcher, mut changes) =
            DataWatcher::start(&self.shared.config.data_dir).map_err(|e| match e {
                WatchError::MissingPath(_) => {
                    ServiceError::configuration("cannot watch missing data directory").with_cause(e)
                }
                WatchError::Notify { .. } => {
                    ServiceError::internal("failed to start file watcher").with_cause(e)
                }
            })?;

        let shared = self.shared.clone();
        let task = self.shared.spawn(async move {
            while let Some(change) = changes.recv().await {
                tracing::debug!(path = ?change.path, kind = ?change.kind, "data source changed");
                shared.events.emit(&DataEvent::FileChanged);
                shared.trigger_reload();
            }
        });
        let Some(task) = task else {
            return Err(ServiceError::internal("file watching requires a tokio runtime"));
        };

        *slot = Some(watcher);
        *self.watch_task.lock() = Some(task);
        Ok(())
    }

    /// Periodically reload once the cache has expired.
    ///
    /// Returns false, keeping any running timer, if no new timer was started.
    pub fn start_refresh_timer(&self, interval: Duration) -> bool {
        if self.destroyed.load(Ordering::SeqCst) {
            return false;
        }

        let mut slot = self.refresh_task.lock();
        if slot.is_some() {
            tracing::debug!("refresh timer already running");
            return false;
        }

        let shared = self.shared.clone();
        *slot = self.shared.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // First tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if !shared.is_cache_valid() {
                    tracing::debug!("cache expired, scheduling reload");
                    shared.trigger_reload();
                }
            }
        });
        slot.is_some()
    }

    /// Stop watching and cancel timers. Safe to call more than once; also runs on drop.
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shared.shutdown.store(true, Ordering::SeqCst);

        let watcher = self.watcher.lock().take();
        drop(watcher);

        let tasks = [self.watch_task.lock().take(), self.refresh_task.lock().take()];
        let mut stopped = 0;
        for task in tasks.into_iter().flatten() {
            task.abort();
            stopped += 1;
        }

        tracing::info!(stopped_tasks = stopped, "data manager destroyed");
    }
}

impl Drop for DataManager {
    fn drop(&mut self) {
        self.destroy();
    }
}
