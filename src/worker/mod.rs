//! Worker module for dispatching and producing tasks
//!
//! This module provides:
//! - Dispatcher: LISTEN-driven consumer loop with periodic reconciliation
//! - Publisher: inserts tasks at a fixed cadence
//! - TaskHandler: the business action run for each claimed task
//! - DispatcherConfig / PublisherConfig: configuration for both loops

pub mod config;
pub mod dispatcher;
pub mod handler;
pub mod publisher;
pub mod signal;

pub use config::{DispatcherConfig, PublisherConfig};
pub use dispatcher::{Dispatcher, ExecuteOutcome, PassSummary};
pub use handler::{LogHandler, TaskHandler};
pub use publisher::Publisher;
pub use signal::setup_signal_handler;
