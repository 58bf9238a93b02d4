// src/scheduler/mod.rs
// Background scheduler that runs incremental sync on a fixed interval and
// exposes a status snapshot. `run_daemon` blocks until SIGINT/SIGTERM.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::model::SyncResult as SyncRunStats;
use crate::sync::{SyncEngine, SyncError, SyncResult};

#[derive(Debug, Clone, Default)]
pub struct SchedulerStatus {
    pub running: bool,
    pub interval_minutes: u64,
    pub last_sync: Option<DateTime<Utc>>,
    pub sync_count: u64,
    pub error_count: u64,
    pub last_result: Option<SyncRunStats>,
}

#[derive(Default)]
struct SchedulerState {
    last_sync: Option<DateTime<Utc>>,
    last_result: Option<SyncRunStats>,
    sync_count: u64,
    error_count: u64,
}

pub struct Scheduler {
    engine: Arc<SyncEngine>,
    interval_minutes: u64,
    running: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
    state: Mutex<SchedulerState>,
}

impl Scheduler {
    pub fn new(engine: Arc<SyncEngine>, interval_minutes: u64) -> Arc<Self> {
        Arc::new(Self {
            engine,
            interval_minutes,
            running: AtomicBool::new(false),
            task: Mutex::new(None),
            state: Mutex::new(SchedulerState::default()),
        })
    }

    pub async fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("scheduler is already running");
            return;
        }

        let scheduler = Arc::clone(self);
        let handle = tokio::spawn(async move { scheduler.run_loop().await });
        *self.task.lock().await = Some(handle);
        info!(interval_minutes = self.interval_minutes, "sync scheduler started");
    }

    async fn run_loop(self: Arc<Self>) {
        while self.running.load(Ordering::SeqCst) {
            info!("starting scheduled incremental sync");
            match self.engine.incremental_sync(None).await {
                Ok(result) => {
                    let mut state = self.state.lock().await;
                    state.last_sync = Some(Utc::now());
                    state.sync_count += 1;
                    if result.errors.is_empty() {
                        info!(issues_embedded = result.issues_embedded, duration = result.duration_seconds, "sync completed");
                    } else {
                        state.error_count += result.errors.len() as u64;
                        warn!(errors = result.errors.len(), issues_embedded = result.issues_embedded, "sync completed with errors");
                    }
                    state.last_result = Some(result);
                }
                Err(err) => {
                    error!(error = %err, "sync error");
                    self.state.lock().await.error_count += 1;
                }
            }

            if !self.running.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_secs(self.interval_minutes * 60)).await;
        }
    }

    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(handle) = self.task.lock().await.take() {
            handle.abort();
            let _ = handle.await;
        }
        info!("sync scheduler stopped");
    }

    pub async fn run_once(&self) -> SyncResult<SyncRunStats> {
        let result = self.engine.incremental_sync(None).await?;
        let mut state = self.state.lock().await;
        state.last_sync = Some(Utc::now());
        state.sync_count += 1;
        if !result.errors.is_empty() {
            state.error_count += result.errors.len() as u64;
        }
        state.last_result = Some(result.clone());
        Ok(result)
    }

    pub async fn status(&self) -> SchedulerStatus {
        let state = self.state.lock().await;
        SchedulerStatus {
            running: self.running.load(Ordering::SeqCst),
            interval_minutes: self.interval_minutes,
            last_sync: state.last_sync,
            sync_count: state.sync_count,
            error_count: state.error_count,
            last_result: state.last_result.clone(),
        }
    }
}

/// Runs the scheduler until interrupted by Ctrl+C or SIGTERM.
pub async fn run_daemon(scheduler: Arc<Scheduler>) -> SyncResult<()> {
    scheduler.start().await;
    info!("sync daemon running, press Ctrl+C to stop");

    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .map_err(|e| SyncError::internal(format!("failed to install SIGTERM handler: {e}")))?;
        tokio::select! {
            _ = ctrl_c => info!("received SIGINT"),
            _ = sigterm.recv() => info!("received SIGTERM"),
        }
    }
    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
        info!("received shutdown signal");
    }

    scheduler.stop().await;
    info!("sync daemon stopped");
    Ok(())
}
