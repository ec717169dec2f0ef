//! Error types for pg-dispatch

use crate::db::models::TaskId;
use std::num::ParseIntError;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid notification payload {payload:?}")]
    InvalidNotification {
        payload: String,
        #[source]
        source: ParseIntError,
    },

    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("Handler error: {0}")]
    Handler(String),

    #[error("Task timed out after {0:?}")]
    TaskTimeout(Duration),
}

pub type Result<T> = std::result::Result<T, DispatchError>;
