//! Publisher - inserts tasks at a fixed cadence

use crate::db::models::{NewTask, TaskId};
use crate::error::Result;
use crate::store::TaskStore;
use crate::worker::PublisherConfig;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

/// Producer side of the queue.
///
/// It does not talk to dispatchers; the store's insert trigger publishes
/// each new id.
pub struct Publisher {
    store: Arc<dyn TaskStore>,
    config: PublisherConfig,
}

impl Publisher {
    pub fn new(store: Arc<dyn TaskStore>, config: PublisherConfig) -> Self {
        Self { store, config }
    }

    /// Insert one task built from the configured name and payload
    pub async fn publish_once(&self) -> Result<TaskId> {
        let task = NewTask::new(&self.config.task_name, &self.config.payload);
        let task_id = self.store.insert(&task).await?;
        info!(task_id = %task_id, task_name = %task.name, "Published task");
        Ok(task_id)
    }

    /// Insert one task per interval until `shutdown` turns `true`.
    ///
    /// Insert failures are logged and the loop keeps going. Returns the
    /// number of tasks published.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> usize {
        info!(
            interval = ?self.config.interval,
            "Running in publisher mode"
        );

        if let Err(e) = self.config.validate() {
            error!(error = %e, "Refusing to start publisher");
            return 0;
        }

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut published = 0;

        loop {
            if *shutdown.borrow() {
                info!("Shutdown signal received, stopping publisher...");
                break;
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    match self.publish_once().await {
                        Ok(_) => published += 1,
                        Err(e) => error!(error = %e, "Failed to insert task"),
                    }
                }
            }
        }

        info!(published, "Publisher stopped");
        published
    }
}
