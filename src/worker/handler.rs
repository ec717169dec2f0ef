use async_trait::async_trait;
use tracing::info;

use crate::db::models::Task;
use crate::error::Result;

/// The business action run for each claimed task.
///
/// An `Err` abandons the attempt: the claim is rolled back and the task is
/// picked up again by a later reconciliation pass.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, task: &Task) -> Result<()>;
}

/// Handler that only logs the task it was given
#[derive(Debug, Default, Clone, Copy)]
pub struct LogHandler;

#[async_trait]
impl TaskHandler for LogHandler {
    async fn handle(&self, task: &Task) -> Result<()> {
        info!(
            task_id = %task.id,
            task_name = %task.name,
            task_payload = task.payload.as_deref().unwrap_or_default(),
            "Executing task"
        );
        Ok(())
    }
}
