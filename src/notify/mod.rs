//! Notification channel
//!
//! Insert notifications are a latency optimisation only. A subscriber may
//! miss any of them; the dispatcher's reconciliation pass is what guarantees
//! delivery.

pub mod memory;
pub mod postgres;

pub use memory::MemoryNotificationSource;
pub use postgres::PgNotificationSource;

use crate::db::models::TaskId;
use crate::error::Result;
use async_trait::async_trait;

/// A decoded LISTEN message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub channel: String,
    pub payload: String,
}

impl Notification {
    pub fn new(channel: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            payload: payload.into(),
        }
    }

    /// Decode the task id carried in the payload
    pub fn task_id(&self) -> Result<TaskId> {
        self.payload.parse()
    }
}

/// What a subscription produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    Notified(Notification),

    /// Events may have been missed (reconnect, lag). Reconcile.
    Gap,
}

/// A live subscription to the tasks channel.
///
/// `next_signal` must be cancel-safe: the dispatcher polls it inside
/// `tokio::select!` alongside the reconciliation timer.
#[async_trait]
pub trait NotificationSource: Send {
    /// Wait for the next signal. `Ok(None)` means the source is closed for good.
    async fn next_signal(&mut self) -> Result<Option<Signal>>;
}
