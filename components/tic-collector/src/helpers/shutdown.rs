// External crates
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Process wide shutdown handle, built on top of a `CancellationToken`.
///
/// - The sampling loop and the metrics server each hold a child token.
/// - `listen_for_signals` turns Ctrl+C (and SIGTERM on unix) into `trigger`.
/// - Triggering more than once is harmless; cancellation is idempotent.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    token: CancellationToken,
}

impl Shutdown {
    #[instrument(name = "tic_shutdown_channel", target = "helpers::shutdown", level = "trace")]
    pub fn new() -> Self {
        tracing::trace!("Creating process shutdown token");
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Token for a single component. Cancelling the child does not stop the
    /// rest of the collector.
    pub fn token(&self) -> CancellationToken {
        self.token.child_token()
    }

    /// Notify every component holding a token
    #[instrument(name = "tic_shutdown_trigger", target = "helpers::shutdown", level = "trace", skip_all)]
    pub fn trigger(&self) {
        tracing::trace!("Shutdown triggered, cancelling component tokens");
        self.token.cancel();
    }

    /// Spawn the OS signal listener. The first interrupt triggers shutdown.
    pub fn listen_for_signals(&self) {
        let shutdown = self.clone();
        tokio::spawn(async move {
            wait_for_signal().await;
            shutdown.trigger();
        });
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal as unix_signal};

    let mut sigterm = match unix_signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to install SIGTERM handler, only Ctrl+C will stop the collector");
            if let Err(e) = signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
            }
            return;
        }
    };

    tokio::select! {
        res = signal::ctrl_c() => {
            match res {
                Ok(()) => tracing::info!("Ctrl+C signal detected, shutting down"),
                Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl+C signal"),
            }
        }
        _ = sigterm.recv() => {
            tracing::info!("SIGTERM received, shutting down");
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match signal::ctrl_c().await {
        Ok(()) => tracing::info!("Ctrl+C signal detected, shutting down"),
        Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl+C signal"),
    }
}
