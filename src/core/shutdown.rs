//! # OS termination signals.
//!
//! [`wait_for_shutdown_signal`] resolves on the first of:
//! - Unix: `SIGINT`, `SIGTERM` (systemd, Kubernetes), `SIGQUIT`
//! - elsewhere: Ctrl-C

use crate::error::RuntimeError;

/// Waits for a termination signal.
///
/// Each call installs its own listeners; failing to install them is reported
/// as [`RuntimeError::Signal`].
#[cfg(unix)]
pub(crate) async fn wait_for_shutdown_signal() -> Result<(), RuntimeError> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt()).map_err(RuntimeError::Signal)?;
    let mut sigterm = signal(SignalKind::terminate()).map_err(RuntimeError::Signal)?;
    let mut sigquit = signal(SignalKind::quit()).map_err(RuntimeError::Signal)?;

    let name = tokio::select! {
        _ = sigint.recv()  => "SIGINT",
        _ = sigterm.recv() => "SIGTERM",
        _ = sigquit.recv() => "SIGQUIT",
    };
    tracing::info!(signal = name, "termination signal received");
    Ok(())
}

/// Waits for a termination signal.
#[cfg(not(unix))]
pub(crate) async fn wait_for_shutdown_signal() -> Result<(), RuntimeError> {
    tokio::signal::ctrl_c().await.map_err(RuntimeError::Signal)?;
    tracing::info!(signal = "ctrl-c", "termination signal received");
    Ok(())
}
