//! Database models matching the `tasks` table

use crate::error::DispatchError;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

/// Surrogate key of a task row (`SERIAL`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, sqlx::Type)]
#[sqlx(transparent)]
pub struct TaskId(pub i32);

impl TaskId {
    pub fn new(id: i32) -> Self {
        Self(id)
    }

    pub fn get(self) -> i32 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Parses the text form published by the insert trigger (`NEW.id::text`).
impl FromStr for TaskId {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<i32>()
            .map(TaskId)
            .map_err(|source| DispatchError::InvalidNotification {
                payload: s.to_string(),
                source,
            })
    }
}

/// Task - Matches tasks table
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Task {
    pub id: TaskId,
    pub name: String,
    pub payload: Option<String>,
    pub created_at: DateTime<Utc>,
    pub executed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// A task is pending until `executed_at` is set
    pub fn is_pending(&self) -> bool {
        self.executed_at.is_none()
    }
}

/// Input for creating a new task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    pub name: String,
    pub payload: Option<String>,
}

impl NewTask {
    pub fn new(name: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            payload: Some(payload.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_id_parses_trigger_payload() {
        let id: TaskId = "42".parse().unwrap();
        assert_eq!(id, TaskId::new(42));
        assert_eq!(id.to_string(), "42");
    }

    #[test]
    fn test_task_id_rejects_garbage() {
        let err = "not-a-number".parse::<TaskId>().unwrap_err();
        match err {
            DispatchError::InvalidNotification { payload, .. } => {
                assert_eq!(payload, "not-a-number")
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!("".parse::<TaskId>().is_err());
        assert!("99999999999".parse::<TaskId>().is_err());
    }

    #[test]
    fn test_pending_is_derived_from_executed_at() {
        let mut task = Task {
            id: TaskId::new(1),
            name: "task".to_string(),
            payload: Some("payload".to_string()),
            created_at: Utc::now(),
            executed_at: None,
        };
        assert!(task.is_pending());
        task.executed_at = Some(Utc::now());
        assert!(!task.is_pending());
    }
}
