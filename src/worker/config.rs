//! Worker configuration

use crate::db::schema::TASKS_CHANNEL;
use crate::error::{DispatchError, Result};
use std::time::Duration;

/// Dispatcher configuration
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Interval between reconciliation passes; the worst-case latency for a
    /// task whose notification was missed
    pub reconciliation_interval: Duration,

    /// Upper bound on a single handler invocation
    pub task_timeout: Duration,

    /// Notification channel to LISTEN on
    pub channel: String,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            reconciliation_interval: Duration::from_secs(10),
            task_timeout: Duration::from_secs(300), // 5 minutes
            channel: TASKS_CHANNEL.to_string(),
        }
    }
}

impl DispatcherConfig {
    /// Create a new config builder
    pub fn builder() -> DispatcherConfigBuilder {
        DispatcherConfigBuilder::default()
    }

    /// Reject settings the dispatcher cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.reconciliation_interval.is_zero() {
            return Err(DispatchError::Config(
                "reconciliation interval must be greater than zero".to_string(),
            ));
        }
        if self.task_timeout.is_zero() {
            return Err(DispatchError::Config(
                "task timeout must be greater than zero".to_string(),
            ));
        }
        if self.channel.is_empty() {
            return Err(DispatchError::Config(
                "notification channel must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for DispatcherConfig
#[derive(Default)]
pub struct DispatcherConfigBuilder {
    config: DispatcherConfig,
}

impl DispatcherConfigBuilder {
    /// Set reconciliation interval
    pub fn reconciliation_interval(mut self, duration: Duration) -> Self {
        self.config.reconciliation_interval = duration;
        self
    }

    /// Set reconciliation interval in seconds
    pub fn reconciliation_interval_secs(mut self, secs: u64) -> Self {
        self.config.reconciliation_interval = Duration::from_secs(secs);
        self
    }

    /// Set task timeout
    pub fn task_timeout(mut self, duration: Duration) -> Self {
        self.config.task_timeout = duration;
        self
    }

    /// Set notification channel
    pub fn channel(mut self, channel: &str) -> Self {
        self.config.channel = channel.to_string();
        self
    }

    /// Build and validate the config
    pub fn build(self) -> Result<DispatcherConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Publisher configuration
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Delay between two inserted tasks
    pub interval: Duration,
    pub task_name: String,
    pub payload: String,
}

impl PublisherConfig {
    pub fn validate(&self) -> Result<()> {
        if self.interval.is_zero() {
            return Err(DispatchError::Config(
                "publish interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            task_name: "task".to_string(),
            payload: "payload".to_string(),
        }
    }
}
