//! In-memory notification source fed by `MemoryTaskStore`

use crate::error::Result;
use crate::notify::{Notification, NotificationSource, Signal};
use async_trait::async_trait;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::warn;

pub struct MemoryNotificationSource {
    rx: broadcast::Receiver<Notification>,
}

impl MemoryNotificationSource {
    pub fn new(rx: broadcast::Receiver<Notification>) -> Self {
        Self { rx }
    }
}

#[async_trait]
impl NotificationSource for MemoryNotificationSource {
    async fn next_signal(&mut self) -> Result<Option<Signal>> {
        match self.rx.recv().await {
            Ok(notification) => Ok(Some(Signal::Notified(notification))),
            Err(RecvError::Lagged(missed)) => {
                warn!(missed, "Notification subscriber lagged, events were dropped");
                Ok(Some(Signal::Gap))
            }
            Err(RecvError::Closed) => Ok(None),
        }
    }
}
