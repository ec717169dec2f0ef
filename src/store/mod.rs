//! Task store abstraction
//!
//! A `TaskStore` is the durable source of truth. Claims hand out a
//! `TaskClaim` that owns the exclusive row lock: completing it marks the task
//! executed and releases the lock, dropping it releases the lock and leaves
//! the task pending.
//!
//! Two implementations:
//! - `PgTaskStore`: PostgreSQL, `FOR UPDATE SKIP LOCKED` inside a transaction
//! - `MemoryTaskStore`: in-process store for tests and local runs

pub mod memory;
pub mod postgres;

pub use memory::MemoryTaskStore;
pub use postgres::PgTaskStore;

use crate::db::models::{NewTask, Task, TaskId};
use crate::error::Result;
use async_trait::async_trait;

/// An exclusively locked pending task.
///
/// No other claimant can obtain the same task while this value is alive.
#[async_trait]
pub trait TaskClaim: Send {
    fn task(&self) -> &Task;

    /// Mark the task executed and release the lock.
    async fn complete(self: Box<Self>) -> Result<()>;

    /// Release the lock without touching the task, which stays pending.
    ///
    /// Dropping the claim has the same effect, but without waiting for it.
    async fn release(self: Box<Self>) -> Result<()>;
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Append a pending task. The store publishes its id once it is visible.
    async fn insert(&self, task: &NewTask) -> Result<TaskId>;

    /// Claim any one unlocked pending task.
    async fn claim_one_pending(&self) -> Result<Option<Box<dyn TaskClaim>>> {
        self.claim_pending_excluding(&[]).await
    }

    /// Claim any one unlocked pending task whose id is not in `exclude`.
    async fn claim_pending_excluding(
        &self,
        exclude: &[TaskId],
    ) -> Result<Option<Box<dyn TaskClaim>>>;

    /// Claim a specific task. `None` if it is missing, already executed, or
    /// locked by another claimant.
    async fn claim_by_id(&self, task_id: TaskId) -> Result<Option<Box<dyn TaskClaim>>>;

    /// Read a task by id.
    async fn fetch(&self, task_id: TaskId) -> Result<Task>;

    /// Set `executed_at` if it is not set yet. Repeated calls are no-ops;
    /// an unknown id is `TaskNotFound`.
    async fn mark_executed(&self, task_id: TaskId) -> Result<()>;

    async fn count_pending(&self) -> Result<i64>;
}
