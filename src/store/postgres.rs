//! PostgreSQL task store

use crate::db::models::{NewTask, Task, TaskId};
use crate::db::{tasks, DbPool};
use crate::error::{DispatchError, Result};
use crate::store::{TaskClaim, TaskStore};
use async_trait::async_trait;
use sqlx::{Postgres, Transaction};
use tracing::debug;

/// `TaskStore` backed by the `tasks` table
#[derive(Clone)]
pub struct PgTaskStore {
    pool: DbPool,
}

impl PgTaskStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Wrap a locked row in a claim, or roll the transaction back if nothing matched
    async fn into_claim(
        tx: Transaction<'static, Postgres>,
        task: Option<Task>,
    ) -> Result<Option<Box<dyn TaskClaim>>> {
        match task {
            Some(task) => Ok(Some(Box::new(PgClaim { tx, task }))),
            None => {
                tx.rollback().await?;
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl TaskStore for PgTaskStore {
    async fn insert(&self, task: &NewTask) -> Result<TaskId> {
        tasks::insert_task(&self.pool, task).await
    }

    async fn claim_pending_excluding(
        &self,
        exclude: &[TaskId],
    ) -> Result<Option<Box<dyn TaskClaim>>> {
        let mut tx = self.pool.begin().await?;
        let task = tasks::claim_next_pending(&mut *tx, exclude).await?;
        Self::into_claim(tx, task).await
    }

    async fn claim_by_id(&self, task_id: TaskId) -> Result<Option<Box<dyn TaskClaim>>> {
        let mut tx = self.pool.begin().await?;
        let task = tasks::claim_task_by_id(&mut *tx, task_id).await?;
        Self::into_claim(tx, task).await
    }

    async fn fetch(&self, task_id: TaskId) -> Result<Task> {
        tasks::get_task_by_id(&self.pool, task_id)
            .await?
            .ok_or(DispatchError::TaskNotFound(task_id))
    }

    async fn mark_executed(&self, task_id: TaskId) -> Result<()> {
        if tasks::mark_executed(&self.pool, task_id).await? {
            return Ok(());
        }
        // Nothing updated: either already executed or no such row
        self.fetch(task_id).await?;
        debug!(task_id = %task_id, "Task was already marked executed");
        Ok(())
    }

    async fn count_pending(&self) -> Result<i64> {
        tasks::count_pending_tasks(&self.pool).await
    }
}

/// Claim whose row lock lives in an open transaction.
///
/// Dropping it without `complete` rolls the transaction back.
struct PgClaim {
    tx: Transaction<'static, Postgres>,
    task: Task,
}

#[async_trait]
impl TaskClaim for PgClaim {
    fn task(&self) -> &Task {
        &self.task
    }

    async fn complete(self: Box<Self>) -> Result<()> {
        let PgClaim { mut tx, task } = *self;
        tasks::mark_executed(&mut *tx, task.id).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn release(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
