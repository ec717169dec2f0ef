//! LISTEN-based notification source

use crate::db::DbPool;
use crate::error::Result;
use crate::notify::{Notification, NotificationSource, Signal};
use async_trait::async_trait;
use sqlx::postgres::PgListener;
use std::time::Duration;
use tracing::{info, warn};

const MIN_RECONNECT_DELAY: Duration = Duration::from_secs(1);
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(60);

/// The parts of a listener connection the source relies on
#[async_trait]
trait ListenerConnection: Send {
    /// Next notification. `None` means the connection dropped and was
    /// re-established with every LISTEN in place.
    async fn recv(&mut self) -> Result<Option<Notification>>;

    /// Connect if needed and re-issue LISTEN, then prove the link works
    async fn ensure_connected(&mut self) -> Result<()>;
}

#[async_trait]
impl ListenerConnection for PgListener {
    async fn recv(&mut self) -> Result<Option<Notification>> {
        let notification = self.try_recv().await?;
        Ok(notification.map(|n| Notification::new(n.channel(), n.payload())))
    }

    async fn ensure_connected(&mut self) -> Result<()> {
        // Any statement on the listener goes through its reconnect path
        sqlx::query("SELECT 1").execute(&mut *self).await?;
        Ok(())
    }
}

/// Subscription on a dedicated listener connection.
///
/// Every lost connection is surfaced as `Signal::Gap`, since notifications
/// fired while disconnected are gone. The gap is reported only once LISTEN
/// is active again, so the pass it triggers covers the whole outage.
pub struct PgNotificationSource {
    inner: Reconnecting<PgListener>,
}

impl PgNotificationSource {
    /// Open a listener connection and LISTEN on `channel`
    pub async fn connect(pool: &DbPool, channel: &str) -> Result<Self> {
        let mut listener = PgListener::connect_with(pool).await?;
        listener.listen(channel).await?;
        info!(channel, "Listening for notifications");

        Ok(Self {
            inner: Reconnecting::new(listener, channel),
        })
    }
}

#[async_trait]
impl NotificationSource for PgNotificationSource {
    async fn next_signal(&mut self) -> Result<Option<Signal>> {
        self.inner.next_signal().await
    }
}

struct Reconnecting<C> {
    conn: C,
    channel: String,
    /// Set once the connection failed; cleared when it is back
    broken: bool,
    reconnect_delay: Duration,
}

impl<C: ListenerConnection> Reconnecting<C> {
    fn new(conn: C, channel: &str) -> Self {
        Self {
            conn,
            channel: channel.to_string(),
            broken: false,
            reconnect_delay: MIN_RECONNECT_DELAY,
        }
    }

    async fn next_signal(&mut self) -> Result<Option<Signal>> {
        // Resumes after cancellation: the broken flag and backoff survive
        if self.broken {
            self.reconnect().await;
            return Ok(Some(Signal::Gap));
        }

        match self.conn.recv().await {
            Ok(Some(notification)) => Ok(Some(Signal::Notified(notification))),
            Ok(None) => {
                warn!(channel = %self.channel, "Listener connection lost and re-established");
                Ok(Some(Signal::Gap))
            }
            Err(e) => {
                warn!(channel = %self.channel, error = %e, "Listener connection failed");
                self.broken = true;
                self.reconnect().await;
                Ok(Some(Signal::Gap))
            }
        }
    }

    async fn reconnect(&mut self) {
        loop {
            let delay = self.reconnect_delay;
            tokio::time::sleep(delay).await;

            match self.conn.ensure_connected().await {
                Ok(()) => {
                    info!(channel = %self.channel, "Listener reconnected");
                    self.broken = false;
                    self.reconnect_delay = MIN_RECONNECT_DELAY;
                    return;
                }
                Err(e) => {
                    self.reconnect_delay = (delay * 2).min(MAX_RECONNECT_DELAY);
                    warn!(
                        channel = %self.channel,
                        error = %e,
                        retry_in = ?self.reconnect_delay,
                        "Listener reconnect failed"
                    );
                }
            }
        }
    }
}
