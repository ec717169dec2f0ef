//! pg-dispatch - a durable PostgreSQL-backed task dispatcher
//!
//! Producers insert rows into `tasks`; an insert trigger publishes each new
//! id with `pg_notify`. Dispatchers LISTEN for those ids for low latency and
//! run a periodic reconciliation pass over the table, so a task whose
//! notification was lost is still executed within one reconciliation
//! interval.
//!
//! Any number of dispatcher processes can share one table. Tasks are claimed
//! with `SELECT ... FOR UPDATE SKIP LOCKED` inside a transaction that stays
//! open until the task is marked executed, so two dispatchers never run the
//! same task at the same time.
//!
//! # Example
//! ```ignore
//! use pg_dispatch::{bootstrap, create_pool, DatabaseConfig, Dispatcher, DispatcherConfig};
//! use pg_dispatch::{LogHandler, PgNotificationSource, PgTaskStore};
//! use std::sync::Arc;
//!
//! let pool = create_pool(&DatabaseConfig::default()).await?;
//! bootstrap(&pool).await?;
//!
//! let config = DispatcherConfig::default();
//! let source = PgNotificationSource::connect(&pool, &config.channel).await?;
//! let dispatcher = Dispatcher::new(Arc::new(PgTaskStore::new(pool)), Arc::new(LogHandler), config);
//! dispatcher.run(source, shutdown_rx).await;
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod notify;
pub mod store;
pub mod worker;

pub use config::DatabaseConfig;
pub use db::{bootstrap, create_pool, NewTask, Task, TaskId, TASKS_CHANNEL};
pub use error::{DispatchError, Result};
pub use notify::{
    MemoryNotificationSource, Notification, NotificationSource, PgNotificationSource, Signal,
};
pub use store::{MemoryTaskStore, PgTaskStore, TaskClaim, TaskStore};
pub use worker::{
    Dispatcher, DispatcherConfig, ExecuteOutcome, LogHandler, PassSummary, Publisher,
    PublisherConfig, TaskHandler,
};
