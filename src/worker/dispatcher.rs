//! Dispatcher - the consumer loop
//!
//! Two independent sources wake the loop:
//! - insert notifications, for low latency
//! - a fixed-interval reconciliation timer, the correctness backstop for
//!   every notification that was never delivered
//!
//! Both end up in the same execute step, which only ever runs a task while
//! holding its claim. Concurrent dispatchers (in this process or others) are
//! kept apart by the store's claim primitive alone.

use crate::db::models::TaskId;
use crate::error::{DispatchError, Result};
use crate::notify::{Notification, NotificationSource, Signal};
use crate::store::{TaskClaim, TaskStore};
use crate::worker::{DispatcherConfig, TaskHandler};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Result of handling one task id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecuteOutcome {
    /// Handler ran and the task is marked executed.
    Executed,
    /// Task was missing, already executed, or claimed by someone else.
    Skipped,
    /// Attempt abandoned; the task is still pending.
    Failed,
    /// Notification payload was not a task id.
    Discarded,
}

/// Counters for one reconciliation pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub executed: usize,
    pub failed: usize,
}

pub struct Dispatcher {
    store: Arc<dyn TaskStore>,
    handler: Arc<dyn TaskHandler>,
    config: DispatcherConfig,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn TaskStore>,
        handler: Arc<dyn TaskHandler>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            store,
            handler,
            config,
        }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Main loop
    ///
    /// `source` must already be subscribed; the startup pass then covers
    /// everything inserted before the subscription existed. Returns when
    /// `shutdown` turns `true` (or its sender is dropped) or the source
    /// closes. A task that is executing when shutdown arrives runs to
    /// completion first.
    pub async fn run<S: NotificationSource>(
        &self,
        mut source: S,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(
            channel = %self.config.channel,
            reconciliation_interval = ?self.config.reconciliation_interval,
            task_timeout = ?self.config.task_timeout,
            "Starting dispatcher"
        );

        if let Err(e) = self.config.validate() {
            error!(error = %e, "Refusing to start dispatcher");
            return;
        }

        info!("Draining backlog before accepting notifications");
        self.reconcile().await;

        let period = self.config.reconciliation_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow() {
                info!("Shutdown signal received, stopping dispatcher...");
                break;
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        info!("Shutdown handle dropped, stopping dispatcher...");
                        break;
                    }
                }
                signal = source.next_signal() => match signal {
                    Ok(Some(Signal::Notified(notification))) => {
                        self.handle_notification(&notification).await;
                    }
                    Ok(Some(Signal::Gap)) => {
                        info!("Notifications may have been missed, reconciling");
                        self.reconcile().await;
                    }
                    Ok(None) => {
                        warn!("Notification source closed, stopping dispatcher...");
                        break;
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to receive notification");
                    }
                },
                _ = ticker.tick() => {
                    self.reconcile().await;
                }
            }
        }

        drop(source);
        info!("Dispatcher stopped");
    }

    /// Run a single reconciliation pass (for `--once`)
    pub async fn run_once(&self) -> PassSummary {
        info!("Running dispatcher in single-pass mode...");
        self.reconcile().await
    }

    /// Drain every currently claimable pending task.
    ///
    /// Tasks that fail are excluded for the rest of the pass, so the pass
    /// ends even if a handler keeps failing. A claim error ends the pass
    /// early; the next tick tries again.
    pub async fn reconcile(&self) -> PassSummary {
        info!("Reconciliation pass started");
        let mut summary = PassSummary::default();
        let mut failed: Vec<TaskId> = Vec::new();

        loop {
            let claim = match self.store.claim_pending_excluding(&failed).await {
                Ok(Some(claim)) => claim,
                Ok(None) => break,
                Err(e) => {
                    error!(error = %e, "Failed to claim pending task");
                    break;
                }
            };

            let task_id = claim.task().id;
            info!(task_id = %task_id, "Claimed pending task");
            match self.execute_claim(claim).await {
                Ok(()) => summary.executed += 1,
                Err(_) => failed.push(task_id),
            }
        }
        summary.failed = failed.len();

        match self.store.count_pending().await {
            Ok(pending) => info!(
                executed = summary.executed,
                failed = summary.failed,
                pending,
                "Reconciliation pass finished"
            ),
            Err(e) => info!(
                executed = summary.executed,
                failed = summary.failed,
                error = %e,
                "Reconciliation pass finished"
            ),
        }

        summary
    }

    /// Decode a notification and execute the task it names
    pub async fn handle_notification(&self, notification: &Notification) -> ExecuteOutcome {
        info!(
            channel = %notification.channel,
            payload = %notification.payload,
            "Received notification"
        );

        match notification.task_id() {
            Ok(task_id) => self.execute_by_id(task_id).await,
            Err(e) => {
                warn!(error = %e, "Discarding malformed notification");
                ExecuteOutcome::Discarded
            }
        }
    }

    /// Claim a specific task and execute it.
    ///
    /// A task that is gone, already executed, or held by another claimant is
    /// a no-op: a concurrent pass or dispatcher got there first.
    pub async fn execute_by_id(&self, task_id: TaskId) -> ExecuteOutcome {
        match self.store.claim_by_id(task_id).await {
            Ok(Some(claim)) => match self.execute_claim(claim).await {
                Ok(()) => ExecuteOutcome::Executed,
                Err(_) => ExecuteOutcome::Failed,
            },
            Ok(None) => {
                debug!(task_id = %task_id, "Task not claimable, skipping");
                ExecuteOutcome::Skipped
            }
            Err(e) => {
                error!(task_id = %task_id, error = %e, "Failed to claim task");
                ExecuteOutcome::Failed
            }
        }
    }

    /// Run the handler under the claim, then complete it.
    ///
    /// If the handler fails the claim is released and the task stays pending.
    /// If completing fails the claim is dropped, with the same effect.
    async fn execute_claim(&self, claim: Box<dyn TaskClaim>) -> Result<()> {
        let task = claim.task().clone();
        let timeout = self.config.task_timeout;

        let result = match tokio::time::timeout(timeout, self.handler.handle(&task)).await {
            Ok(result) => result,
            Err(_) => Err(DispatchError::TaskTimeout(timeout)),
        };
        if let Err(e) = result {
            error!(task_id = %task.id, error = %e, "Task failed, leaving it pending");
            if let Err(release_err) = claim.release().await {
                warn!(task_id = %task.id, error = %release_err, "Failed to release claim");
            }
            return Err(e);
        }

        if let Err(e) = claim.complete().await {
            error!(task_id = %task.id, error = %e, "Failed to mark task executed");
            return Err(e);
        }

        info!(task_id = %task.id, task_name = %task.name, "Task executed");
        Ok(())
    }
}
