//! Idempotent schema bootstrap
//!
//! Every statement here can be re-run against an already initialised
//! database: tables and indexes use `IF NOT EXISTS`, the trigger function is
//! `CREATE OR REPLACE`, and the trigger itself swallows `duplicate_object`.

use crate::db::DbPool;
use crate::error::Result;
use tracing::info;

/// Channel the insert trigger publishes task ids on
pub const TASKS_CHANNEL: &str = "tasks_inserted";

const CREATE_TASKS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS tasks (
    id          SERIAL PRIMARY KEY,
    name        TEXT NOT NULL,
    payload     TEXT,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
    executed_at TIMESTAMPTZ
)
"#;

const CREATE_PENDING_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS tasks_pending_idx
    ON tasks (id)
    WHERE executed_at IS NULL
"#;

// pg_notify is delivered on commit, so listeners never see an id before the
// row is visible to them, and a rolled back insert publishes nothing.
const CREATE_TRIGGER_FUNCTION: &str = r#"
CREATE OR REPLACE FUNCTION tasks_after_insert_trigger()
RETURNS TRIGGER AS $$
BEGIN
    PERFORM pg_notify('tasks_inserted', NEW.id::text);
    RETURN NULL;
END;
$$ LANGUAGE plpgsql
"#;

const CREATE_TRIGGER: &str = r#"
DO $$
BEGIN
    CREATE TRIGGER tasks_after_insert_trigger
        AFTER INSERT ON tasks
        FOR EACH ROW EXECUTE PROCEDURE tasks_after_insert_trigger();
EXCEPTION
    WHEN duplicate_object THEN
        NULL;
END;
$$
"#;

/// Create the tasks table, pending index and notify trigger if needed
pub async fn bootstrap(pool: &DbPool) -> Result<()> {
    info!("Creating tasks table if needed");
    sqlx::raw_sql(CREATE_TASKS_TABLE).execute(pool).await?;

    info!("Creating pending tasks index if needed");
    sqlx::raw_sql(CREATE_PENDING_INDEX).execute(pool).await?;

    info!("Creating insert trigger if needed");
    sqlx::raw_sql(CREATE_TRIGGER_FUNCTION).execute(pool).await?;
    sqlx::raw_sql(CREATE_TRIGGER).execute(pool).await?;

    info!(channel = TASKS_CHANNEL, "Schema bootstrap complete");
    Ok(())
}
