//! Tasks database operations
//!
//! Claim queries only hold their row lock for the lifetime of the enclosing
//! transaction. Run them on a `Transaction`, never directly on the pool; see
//! `store::postgres::PgTaskStore` for the transaction-scoped claim handle.

use crate::db::models::{NewTask, Task, TaskId};
use crate::error::Result;
use sqlx::PgExecutor;

/// Insert a pending task and return its id
///
/// The `tasks_after_insert_trigger` publishes the id on commit.
pub async fn insert_task<'e>(executor: impl PgExecutor<'e>, task: &NewTask) -> Result<TaskId> {
    let id = sqlx::query_scalar::<_, TaskId>(
        r#"
        INSERT INTO tasks (name, payload)
        VALUES ($1, $2)
        RETURNING id
        "#,
    )
    .bind(&task.name)
    .bind(&task.payload)
    .fetch_one(executor)
    .await?;

    Ok(id)
}

/// Lock the lowest pending task not in `exclude`, skipping rows locked elsewhere
pub async fn claim_next_pending<'e>(
    executor: impl PgExecutor<'e>,
    exclude: &[TaskId],
) -> Result<Option<Task>> {
    let exclude: Vec<i32> = exclude.iter().map(|id| id.get()).collect();

    let task = sqlx::query_as::<_, Task>(
        r#"
        SELECT id, name, payload, created_at, executed_at
        FROM tasks
        WHERE executed_at IS NULL
          AND NOT (id = ANY($1))
        ORDER BY id ASC
        LIMIT 1
        FOR UPDATE SKIP LOCKED
        "#,
    )
    .bind(exclude)
    .fetch_optional(executor)
    .await?;

    Ok(task)
}

/// Lock one specific task if it is still pending and not locked elsewhere
pub async fn claim_task_by_id<'e>(
    executor: impl PgExecutor<'e>,
    task_id: TaskId,
) -> Result<Option<Task>> {
    let task = sqlx::query_as::<_, Task>(
        r#"
        SELECT id, name, payload, created_at, executed_at
        FROM tasks
        WHERE id = $1
          AND executed_at IS NULL
        FOR UPDATE SKIP LOCKED
        "#,
    )
    .bind(task_id)
    .fetch_optional(executor)
    .await?;

    Ok(task)
}

/// Get a task by ID
pub async fn get_task_by_id<'e>(
    executor: impl PgExecutor<'e>,
    task_id: TaskId,
) -> Result<Option<Task>> {
    let task = sqlx::query_as::<_, Task>(
        "SELECT id, name, payload, created_at, executed_at FROM tasks WHERE id = $1",
    )
    .bind(task_id)
    .fetch_optional(executor)
    .await?;

    Ok(task)
}

/// Set `executed_at` unless it is already set
///
/// Returns whether this call changed the row.
pub async fn mark_executed<'e>(executor: impl PgExecutor<'e>, task_id: TaskId) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE tasks
        SET executed_at = now()
        WHERE id = $1
          AND executed_at IS NULL
        "#,
    )
    .bind(task_id)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Count pending tasks for monitoring
pub async fn count_pending_tasks<'e>(executor: impl PgExecutor<'e>) -> Result<i64> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM tasks WHERE executed_at IS NULL",
    )
    .fetch_one(executor)
    .await?;

    Ok(count)
}
