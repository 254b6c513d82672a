//! Signal handling for graceful shutdown.

use tracing::{error, info};

/// Wait until the process is asked to stop (Ctrl+C, or SIGTERM on Unix).
///
/// Handler installation failures are logged and that signal is then ignored,
/// so a service never exits just because one handler could not be set up.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!(signal = "SIGINT", "Shutdown signal received");
        },
        _ = terminate => {
            info!(signal = "SIGTERM", "Shutdown signal received");
        },
    }
}
