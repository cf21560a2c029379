use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::alerts::{DeadlineAlert, DeadlineAlerts};
use crate::notifier::{Email, Notifier, resolve_recipient};
use crate::reminder::{ReminderKind, due_reminders};
use crate::task::{Task, TaskService, TaskServiceError};

/// A unit of periodic background work.
#[async_trait]
pub trait ScheduledJob: Send + Sync {
    fn name(&self) -> &str;
    fn interval(&self) -> Duration;
    async fn run(&self) -> anyhow::Result<()>;
}

/// Runs registered jobs on their intervals until stopped.
///
/// Each job gets its own tokio task. Runs of the same job never overlap: a
/// run that overruns its interval delays the next one.
pub struct Scheduler {
    jobs: Vec<Arc<dyn ScheduledJob>>,
    handles: Vec<JoinHandle<()>>,
    stop: Option<watch::Sender<bool>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            jobs: Vec::new(),
            handles: Vec::new(),
            stop: None,
        }
    }

    pub fn register_job(&mut self, job: Arc<dyn ScheduledJob>) {
        self.jobs.push(job);
    }

    pub fn is_running(&self) -> bool {
        self.stop.is_some()
    }

    /// Spawns one loop per registered job. Starting a running scheduler is a
    /// no-op. Fails without spawning anything if a job has a zero interval.
    pub fn start(&mut self) -> anyhow::Result<()> {
        if self.stop.is_some() {
            return Ok(());
        }
        if let Some(job) = self.jobs.iter().find(|job| job.interval().is_zero()) {
            anyhow::bail!("Scheduled job '{}' has a zero interval", job.name());
        }
        let (tx, rx) = watch::channel(false);
        self.stop = Some(tx);

        for job in &self.jobs {
            let job = Arc::clone(job);
            let mut rx = rx.clone();
            let handle = tokio::spawn(async move {
                let mut tick = tokio::time::interval(job.interval());
                tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
                tracing::info!("Scheduled job '{}' started", job.name());
                loop {
                    tokio::select! {
                        biased;
                        changed = rx.changed() => {
                            if changed.is_err() || *rx.borrow() {
                                break;
                            }
                        }
                        _ = tick.tick() => {
                            if let Err(err) = job.run().await {
                                tracing::error!("Scheduled job '{}' failed: {:#}", job.name(), err);
                            }
                        }
                    }
                }
                tracing::info!("Scheduled job '{}' stopped", job.name());
            });
            self.handles.push(handle);
        }
        Ok(())
    }

    /// Signals every job to stop and waits for in-flight runs to finish.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.stop.take() {
            let _ = tx.send(true);
        }
        let handles = std::mem::take(&mut self.handles);
        for handle in handles {
            if let Err(err) = handle.await {
                tracing::error!("Scheduled job task panicked: {}", err);
            }
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of one reminder tick.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    /// Candidate tasks evaluated.
    pub examined: usize,
    /// Reminders delivered and recorded.
    pub sent: usize,
    /// Reminders whose send or flag update failed; retried next tick.
    pub failed: usize,
    /// Reminders due but without any recipient.
    pub skipped: usize,
}

/// Outcome of a single due reminder.
enum Delivery {
    Sent,
    NoRecipient,
}

/// Scans stored tasks and emails the reminders that have come due.
pub struct ReminderJob {
    db: Arc<sea_orm::DatabaseConnection>,
    notifier: Arc<dyn Notifier>,
    fallback_recipient: Option<String>,
    alerts: DeadlineAlerts,
    interval: Duration,
}

impl ReminderJob {
    pub fn new(
        db: Arc<sea_orm::DatabaseConnection>,
        notifier: Arc<dyn Notifier>,
        fallback_recipient: Option<String>,
        alerts: DeadlineAlerts,
        interval: Duration,
    ) -> Self {
        Self {
            db,
            notifier,
            fallback_recipient,
            alerts,
            interval,
        }
    }

    /// Runs one tick as of `now`.
    ///
    /// Fails only when the candidate tasks cannot be loaded. Failures while
    /// handling a single task are logged, counted and leave its flags
    /// untouched so the next tick retries.
    #[tracing::instrument(skip(self))]
    pub async fn run_at(&self, now: DateTime<Utc>) -> Result<TickReport, TaskServiceError> {
        let task_service = TaskService::new(&self.db);
        let tasks = task_service.get_reminder_candidates(now).await?;

        let mut report = TickReport {
            examined: tasks.len(),
            ..Default::default()
        };
        for task in &tasks {
            for kind in due_reminders(now, task) {
                match self.deliver(&task_service, task, kind).await {
                    Ok(Delivery::Sent) => report.sent += 1,
                    Ok(Delivery::NoRecipient) => report.skipped += 1,
                    Err(err) => {
                        report.failed += 1;
                        tracing::error!(
                            "Failed to send {:?} reminder for task {}: {:#}",
                            kind,
                            task.id(),
                            err
                        );
                    }
                }
            }
        }

        if report.sent > 0 || report.failed > 0 {
            tracing::info!(
                "Reminder tick: {} examined, {} sent, {} failed, {} skipped",
                report.examined,
                report.sent,
                report.failed,
                report.skipped
            );
        }
        Ok(report)
    }

    async fn deliver(
        &self,
        task_service: &TaskService<'_>,
        task: &Task,
        kind: ReminderKind,
    ) -> anyhow::Result<Delivery> {
        let Some(recipient) = resolve_recipient(task, self.fallback_recipient.as_deref()) else {
            tracing::warn!("No recipient for task {}, skipping", task.id());
            return Ok(Delivery::NoRecipient);
        };

        let email = Email::reminder(task, kind, recipient);
        self.notifier.send(&email).await?;

        if !task_service.mark_reminder_sent(task.id(), kind).await? {
            tracing::warn!(
                "{:?} reminder for task {} was already recorded as sent",
                kind,
                task.id()
            );
        }
        self.alerts.publish(DeadlineAlert::new(task, kind));
        Ok(Delivery::Sent)
    }
}

#[async_trait]
impl ScheduledJob for ReminderJob {
    fn name(&self) -> &str {
        "check_deadlines"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn run(&self) -> anyhow::Result<()> {
        self.run_at(Utc::now()).await?;
        Ok(())
    }
}
