//! Termination signals.

use std::future::Future;
use std::io;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Spawn a task that flips `shutdown` to `true` on SIGINT or SIGTERM.
pub fn spawn_handler(shutdown: watch::Sender<bool>) -> io::Result<JoinHandle<()>> {
    let terminate = terminate_signal()?;

    Ok(tokio::spawn(async move {
        let interrupt = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "cannot listen for SIGINT");
                std::future::pending::<()>().await;
            }
        };

        tokio::select! {
            _ = interrupt => info!("received SIGINT"),
            _ = terminate => info!("received SIGTERM"),
        }
        let _ = shutdown.send(true);
    }))
}

#[cfg(unix)]
fn terminate_signal() -> io::Result<impl Future<Output = ()>> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())?;
    Ok(async move {
        sigterm.recv().await;
    })
}

#[cfg(not(unix))]
fn terminate_signal() -> io::Result<impl Future<Output = ()>> {
    Ok(std::future::pending())
}
