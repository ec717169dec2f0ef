//! Database module for pg-dispatch
//!
//! Provides the PostgreSQL schema bootstrap and the SQL operations on the
//! `tasks` table.

pub mod connection;
pub mod models;
pub mod schema;
pub mod tasks;

pub use connection::{create_pool, create_pool_from_env, DbPool};
pub use models::*;
pub use schema::{bootstrap, TASKS_CHANNEL};
