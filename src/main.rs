//! pg-dispatch CLI
//!
//! One binary, two modes:
//! - `consumer`: bootstrap the schema, then run the dispatcher forever
//! - `publisher`: bootstrap the schema, then insert one task per interval

use anyhow::{anyhow, Result};
use clap::{Parser, ValueEnum};
use pg_dispatch::db::{bootstrap, create_pool};
use pg_dispatch::notify::PgNotificationSource;
use pg_dispatch::store::PgTaskStore;
use pg_dispatch::worker::{
    setup_signal_handler, Dispatcher, DispatcherConfig, LogHandler, Publisher, PublisherConfig,
};
use pg_dispatch::DatabaseConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Dispatch tasks: LISTEN for inserts and reconcile periodically
    Consumer,
    /// Insert one task per interval
    Publisher,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Parser)]
#[command(name = "pg-dispatch")]
#[command(about = "Durable PostgreSQL task dispatcher (LISTEN/NOTIFY + reconciliation)")]
#[command(version)]
struct Cli {
    /// Mode to run in
    #[arg(short, long, value_enum, default_value_t = Mode::Consumer)]
    mode: Mode,

    /// Database host
    #[arg(long, env = "PGHOST", default_value = "127.0.0.1")]
    host: String,

    /// Database port
    #[arg(long, env = "PGPORT", default_value = "9932")]
    port: u16,

    /// Database user
    #[arg(long, env = "PGUSER", default_value = "postgres")]
    user: String,

    /// Database password
    #[arg(long, env = "PGPASSWORD", default_value = "postgres", hide_env_values = true)]
    password: String,

    /// Database name
    #[arg(long, env = "PGDATABASE", default_value = "postgres")]
    database: String,

    /// Transport security mode (disable, prefer, require, verify-ca, verify-full)
    #[arg(long, env = "PGSSLMODE", default_value = "disable")]
    sslmode: String,

    /// Full connection URL; overrides the individual connection flags
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    database_url: Option<String>,

    /// Seconds between reconciliation passes (consumer)
    #[arg(long, default_value = "10", value_parser = clap::value_parser!(u64).range(1..))]
    reconcile_interval: u64,

    /// Task timeout in seconds (consumer)
    #[arg(long, default_value = "300", value_parser = clap::value_parser!(u64).range(1..))]
    task_timeout: u64,

    /// Run a single reconciliation pass and exit (consumer)
    #[arg(long)]
    once: bool,

    /// Milliseconds between published tasks (publisher)
    #[arg(long, default_value = "1000", value_parser = clap::value_parser!(u64).range(1..))]
    publish_interval_ms: u64,

    /// Name of published tasks (publisher)
    #[arg(long, default_value = "task")]
    task_name: String,

    /// Payload of published tasks (publisher)
    #[arg(long, default_value = "payload")]
    payload: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn database_config(&self) -> DatabaseConfig {
        DatabaseConfig {
            host: self.host.clone(),
            port: self.port,
            user: self.user.clone(),
            password: self.password.clone(),
            database: self.database.clone(),
            ssl_mode: self.sslmode.clone(),
            url: self.database_url.clone(),
        }
    }

    fn dispatcher_config(&self) -> pg_dispatch::Result<DispatcherConfig> {
        DispatcherConfig::builder()
            .reconciliation_interval_secs(self.reconcile_interval)
            .task_timeout(Duration::from_secs(self.task_timeout))
            .build()
    }

    fn publisher_config(&self) -> pg_dispatch::Result<PublisherConfig> {
        let config = PublisherConfig {
            interval: Duration::from_millis(self.publish_interval_ms),
            task_name: self.task_name.clone(),
            payload: self.payload.clone(),
        };
        config.validate()?;
        Ok(config)
    }
}

fn init_logging(verbose: bool, format: LogFormat) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    }
    .map_err(|e| anyhow!(e))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present, before flags read their env fallbacks
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_format)?;

    // Validate everything before touching the database
    let dispatcher_config = cli.dispatcher_config()?;
    let publisher_config = cli.publisher_config()?;

    let db_config = cli.database_config();
    info!(target_db = %db_config.display_target(), "Opening database connection");
    let pool = create_pool(&db_config).await?;
    info!("Database connection established");

    bootstrap(&pool).await?;

    let store = Arc::new(PgTaskStore::new(pool.clone()));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    match cli.mode {
        Mode::Consumer => {
            info!("Running in consumer mode");

            let dispatcher = Dispatcher::new(store, Arc::new(LogHandler), dispatcher_config);

            if cli.once {
                let summary = dispatcher.run_once().await;
                info!(
                    executed = summary.executed,
                    failed = summary.failed,
                    "Single pass complete"
                );
                return Ok(());
            }

            // Subscribe before the startup pass so no insert falls in between
            let source = PgNotificationSource::connect(&pool, &dispatcher.config().channel).await?;

            setup_signal_handler(shutdown_tx);
            dispatcher.run(source, shutdown_rx).await;
        }
        Mode::Publisher => {
            let publisher = Publisher::new(store, publisher_config);

            setup_signal_handler(shutdown_tx);
            publisher.run(shutdown_rx).await;
        }
    }

    pool.close().await;
    Ok(())
}
