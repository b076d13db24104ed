pub mod dispatch;
pub mod due;
pub mod sweep;

pub use dispatch::{DispatchReport, Dispatcher, FailedContact};

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::delivery::MessageTransport;
use crate::models::{Job, NewReminderJob, NewScheduledMessage, SchedulerConfig};
use crate::storage::jobs::JsonJobStore;
use crate::storage::JobStore;
use crate::templates::{JsonTemplateStore, TemplateSource};

// ---------------------------------------------------------------------------
// Clock trait + implementations
// ---------------------------------------------------------------------------

/// Trait for abstracting time, enabling deterministic testing.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Real clock backed by system time.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Fake clock for deterministic testing — time only advances when told to.
/// Uses std::sync::RwLock (not tokio) so it can be called from both sync
/// and async contexts without panicking.
pub struct FakeClock {
    time: Arc<std::sync::RwLock<DateTime<Utc>>>,
}

impl FakeClock {
    /// Create a FakeClock pinned to the given instant.
    pub fn new(time: DateTime<Utc>) -> Self {
        Self {
            time: Arc::new(std::sync::RwLock::new(time)),
        }
    }

    /// Set the clock to a specific instant.
    pub fn set(&self, time: DateTime<Utc>) {
        *self.time.write().unwrap() = time;
    }

    /// Advance the clock by a chrono::Duration.
    pub fn advance(&self, duration: chrono::Duration) {
        let mut t = self.time.write().unwrap();
        *t += duration;
    }
}

impl Clock for FakeClock {
    fn now(&self) -> DateTime<Utc> {
        *self.time.read().unwrap()
    }
}

// ---------------------------------------------------------------------------
// MessageScheduler
// ---------------------------------------------------------------------------

struct RunHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// The scheduling engine. Owns the job store, the delivery transport, and
/// the template source behind trait objects; `start()` spawns a background
/// loop that evaluates due work every `tick_secs` and runs the retention
/// sweep once per calendar day.
pub struct MessageScheduler {
    store: Arc<dyn JobStore>,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
    dispatcher: Dispatcher,
    running: Mutex<Option<RunHandle>>,
    /// Serializes due-work and sweep passes. A pass is snapshot -> deliver ->
    /// mark, so two overlapping passes would both see an event unsent and
    /// deliver it twice; `run_tick` and the background loop share this lock.
    pass_lock: Arc<Mutex<()>>,
}

impl MessageScheduler {
    pub fn new(
        store: Arc<dyn JobStore>,
        transport: Arc<dyn MessageTransport>,
        templates: Arc<dyn TemplateSource>,
        clock: Arc<dyn Clock>,
        config: SchedulerConfig,
    ) -> Self {
        let dispatcher = Dispatcher::new(
            Arc::clone(&store),
            transport,
            templates,
            Arc::clone(&clock),
        );
        Self {
            store,
            clock,
            config,
            dispatcher,
            running: Mutex::new(None),
            pass_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Convenience constructor wiring the file-backed stores under the
    /// configured data dir and the system clock.
    pub async fn from_config(
        config: SchedulerConfig,
        transport: Arc<dyn MessageTransport>,
    ) -> Result<Self> {
        let data_dir = config.resolve_data_dir()?;
        let store = JsonJobStore::new(data_dir.clone())
            .await
            .context("Failed to open job store")?;
        let templates = JsonTemplateStore::new(data_dir)
            .await
            .context("Failed to open template store")?;
        Ok(Self::new(
            Arc::new(store),
            transport,
            Arc::new(templates),
            Arc::new(SystemClock),
            config,
        ))
    }

    /// Creates a reminder-series job and returns its id.
    pub async fn add_reminder_job(&self, new: NewReminderJob) -> Result<String> {
        let job = new.into_job(
            &self.config.reminder_days_before,
            self.config.reminder_time,
            self.clock.now(),
        )?;
        let job_id = job.job_id.clone();
        let entries = match &job.kind {
            crate::models::JobKind::PlacementReminder(series) => series.reminder_dates.len(),
            crate::models::JobKind::ScheduledMessage(_) => unreachable!(),
        };
        self.store.add_job(job).await?;
        tracing::info!(job_id = %job_id, entries, "Added reminder job");
        Ok(job_id)
    }

    /// Creates a scheduled bulk message and returns its id. A `send_at`
    /// already in the past is accepted; the job becomes due on the next tick.
    pub async fn add_scheduled_message(&self, new: NewScheduledMessage) -> Result<String> {
        let job = new.into_job(self.clock.now())?;
        let job_id = job.job_id.clone();
        self.store.add_job(job).await?;
        tracing::info!(job_id = %job_id, "Added scheduled message");
        Ok(job_id)
    }

    /// Marks a job cancelled. Returns false when no such job exists.
    pub async fn cancel_job(&self, job_id: &str) -> Result<bool> {
        let cancelled = self.store.cancel_job(job_id, self.clock.now()).await?;
        if cancelled {
            tracing::info!(job_id = %job_id, "Cancelled job");
        }
        Ok(cancelled)
    }

    pub async fn job_status(&self, job_id: &str) -> Result<Option<Job>> {
        self.store.get_job(job_id).await
    }

    pub async fn all_jobs(&self) -> Result<Vec<Job>> {
        self.store.list_jobs().await
    }

    /// Runs one due-work pass: evaluate both job kinds against the current
    /// clock and dispatch everything due. Per-event failures are logged and
    /// isolated; they never abort the pass.
    pub async fn run_tick(&self) -> Result<()> {
        let _pass = self.pass_lock.lock().await;
        tick_pass(self.store.as_ref(), &self.dispatcher, self.clock.as_ref()).await
    }

    /// Runs one retention pass immediately. Returns the number of jobs
    /// removed.
    pub async fn sweep_now(&self) -> Result<usize> {
        let _pass = self.pass_lock.lock().await;
        sweep::sweep(
            self.store.as_ref(),
            self.clock.now(),
            chrono::Duration::days(i64::from(self.config.retention_days)),
        )
        .await
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    /// Starts the background loop. Idempotent: a second call while running
    /// logs a warning and leaves the existing loop untouched.
    pub async fn start(&self) {
        let mut running = self.running.lock().await;
        if running.is_some() {
            tracing::warn!("Scheduler already running, ignoring start");
            return;
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let store = Arc::clone(&self.store);
        let clock = Arc::clone(&self.clock);
        let dispatcher = self.dispatcher.clone();
        let config = self.config.clone();
        let pass_lock = Arc::clone(&self.pass_lock);

        let task = tokio::spawn(async move {
            run_loop(store, dispatcher, clock, config, pass_lock, shutdown_rx).await;
        });

        *running = Some(RunHandle { shutdown_tx, task });
        tracing::info!(tick_secs = self.config.tick_secs, "Scheduler started");
    }

    /// Stops the background loop, waiting up to `stop_grace_secs` for an
    /// in-flight tick to finish. No-op when not running.
    pub async fn stop(&self) {
        let handle = self.running.lock().await.take();
        let Some(mut handle) = handle else {
            return;
        };

        let _ = handle.shutdown_tx.send(true);
        let grace = Duration::from_secs(self.config.stop_grace_secs);
        match tokio::time::timeout(grace, &mut handle.task).await {
            Ok(_) => tracing::info!("Scheduler stopped"),
            Err(_) => {
                handle.task.abort();
                tracing::warn!(
                    grace_secs = self.config.stop_grace_secs,
                    "Scheduler did not stop within grace period, aborting"
                );
            }
        }
    }
}

/// One evaluator + dispatch pass over a job-list snapshot.
async fn tick_pass(store: &dyn JobStore, dispatcher: &Dispatcher, clock: &dyn Clock) -> Result<()> {
    let jobs = store.list_jobs().await?;
    let now = clock.now();

    for (job, entry_idx) in due::due_reminders(&jobs, now) {
        if let Err(e) = dispatcher.dispatch_reminder(job, entry_idx).await {
            tracing::error!(
                job_id = %job.job_id,
                entry_idx,
                error = %e,
                "Reminder dispatch failed"
            );
        }
    }

    for job in due::due_scheduled_messages(&jobs, now) {
        if let Err(e) = dispatcher.dispatch_scheduled(job).await {
            tracing::error!(job_id = %job.job_id, error = %e, "Message dispatch failed");
        }
    }

    Ok(())
}

/// The background loop: ticks at the configured cadence and runs the
/// retention sweep at the first tick of a new calendar day at-or-after
/// `sweep_time`. The last-sweep guard initializes to the start date, so the
/// sweep fires at the day boundary rather than at startup.
async fn run_loop(
    store: Arc<dyn JobStore>,
    dispatcher: Dispatcher,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
    pass_lock: Arc<Mutex<()>>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(Duration::from_secs(config.tick_secs.max(1)));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let retention = chrono::Duration::days(i64::from(config.retention_days));
    let mut last_sweep_day = clock.now().date_naive();

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let _pass = pass_lock.lock().await;
                if let Err(e) = tick_pass(store.as_ref(), &dispatcher, clock.as_ref()).await {
                    tracing::error!(error = %e, "Tick failed");
                }

                let now = clock.now();
                let today = now.date_naive();
                if today > last_sweep_day && now.time() >= config.sweep_time {
                    match sweep::sweep(store.as_ref(), now, retention).await {
                        Ok(_) => last_sweep_day = today,
                        Err(e) => tracing::error!(error = %e, "Retention sweep failed"),
                    }
                }
            }
            _ = shutdown_rx.changed() => {
                tracing::debug!("Scheduler loop shutting down");
                break;
            }
        }
    }
}
