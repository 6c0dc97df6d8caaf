//! Signal handling for graceful shutdown

use anyhow::{Context, Result};
use tracing::debug;

/// Handles shutdown signals (SIGTERM, SIGINT, or Ctrl-C off Unix)
pub struct ShutdownSignal;

impl ShutdownSignal {
    /// Create a new shutdown signal handler
    pub fn new() -> Self {
        Self
    }

    /// Wait for a shutdown signal
    #[cfg(unix)]
    pub async fn wait(&self) -> Result<()> {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm =
            signal(SignalKind::terminate()).context("failed to register SIGTERM handler")?;
        let mut sigint =
            signal(SignalKind::interrupt()).context("failed to register SIGINT handler")?;

        tokio::select! {
            _ = sigterm.recv() => {
                debug!("received SIGTERM");
            }
            _ = sigint.recv() => {
                debug!("received SIGINT");
            }
        }
        Ok(())
    }

    /// Wait for a shutdown signal
    #[cfg(not(unix))]
    pub async fn wait(&self) -> Result<()> {
        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for Ctrl-C")?;
        debug!("received Ctrl-C");
        Ok(())
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}
