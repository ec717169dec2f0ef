//! Shutdown signal handling

use tokio::sync::watch;
use tracing::{error, info};

/// Flip `shutdown` to `true` on Ctrl+C (and SIGTERM on unix)
pub fn setup_signal_handler(shutdown: watch::Sender<bool>) {
    tokio::spawn(async move {
        match wait_for_termination().await {
            Ok(()) => {
                info!("Termination signal received, initiating shutdown...");
                // ignore send error: the loops may already be gone
                let _ = shutdown.send(true);
            }
            Err(e) => {
                error!("Failed to listen for termination signal: {}", e);
            }
        }
    });
}

#[cfg(unix)]
async fn wait_for_termination() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = terminate.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn wait_for_termination() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
