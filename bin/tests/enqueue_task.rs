//! Insert a single task on demand, for exercising a running consumer
//!
//! Usage: cargo run --bin enqueue_task -- [name] [payload]

use pg_dispatch::db::{bootstrap, create_pool_from_env};
use pg_dispatch::store::{PgTaskStore, TaskStore};
use pg_dispatch::worker::{Publisher, PublisherConfig};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env
    dotenvy::dotenv().ok();

    let mut args = std::env::args().skip(1);
    let defaults = PublisherConfig::default();
    let config = PublisherConfig {
        task_name: args.next().unwrap_or(defaults.task_name),
        payload: args.next().unwrap_or(defaults.payload),
        ..PublisherConfig::default()
    };

    println!("Connecting to database...");
    let pool = create_pool_from_env().await?;
    bootstrap(&pool).await?;
    println!("✓ Connected to database");

    let store = Arc::new(PgTaskStore::new(pool));
    let publisher = Publisher::new(store.clone(), config);
    let task_id = publisher.publish_once().await?;

    let task = store.fetch(task_id).await?;
    println!("✓ Task created:");
    println!("  ID: {}", task.id);
    println!("  Name: {}", task.name);
    println!("  Payload: {}", task.payload.as_deref().unwrap_or(""));

    let pending = store.count_pending().await?;
    println!("\nTotal pending tasks: {}", pending);

    println!("\nNext steps:");
    println!("  Run a consumer: cargo run --release -- --mode consumer");

    Ok(())
}
