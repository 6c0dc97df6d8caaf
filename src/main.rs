//! input-overlay-hookd: background daemon serving global key state
//!
//! Runs the platform input hook and answers overlay clients over a Unix
//! socket:
//! - pressed-key queries against the shared registry
//! - per-frame polls of layout keys and pointer motion
//! - hook lifecycle notifications for subscribed clients

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use input_overlay_hook::config::Config;
use input_overlay_hook::lifecycle::ShutdownSignal;
use input_overlay_hook::{native_backend, HookBackend, HookController, LifecycleEvent};

type Events = broadcast::Receiver<LifecycleEvent>;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "input-overlay-hookd starting"
    );

    let config = Config::load()?;
    config.ensure_dirs()?;
    info!(?config.socket_path, ?config.convention, "configuration loaded");

    let shutdown = ShutdownSignal::new();

    let (controller, server_rx, log_rx) = start_hook(native_backend(), &config);

    run(&config, Arc::clone(&controller), server_rx, log_rx, shutdown).await?;

    info!("shutting down...");
    controller.stop();
    info!("input-overlay-hookd stopped");

    Ok(())
}

/// Build the controller and make the first start attempt
///
/// The IPC server and local log receivers are subscribed before `start()`
/// so the outcome of the first attempt reaches both.
fn start_hook(
    backend: Arc<dyn HookBackend>,
    config: &Config,
) -> (Arc<HookController>, Events, Events) {
    let (event_tx, server_rx) = broadcast::channel::<LifecycleEvent>(64);
    let log_rx = event_tx.subscribe();

    let controller = Arc::new(
        HookController::new(backend)
            .with_convention(config.convention)
            .with_start_timeout(config.start_timeout)
            .with_events(event_tx),
    );

    // A failed start leaves the daemon up so clients can still see the status
    if let Err(e) = controller.start() {
        error!(code = %format_args!("{:#X}", e.code()), %e, "failed to start input hook");
        warn!("continuing without input hook");
    }

    (controller, server_rx, log_rx)
}

async fn log_lifecycle(mut log_rx: Events) {
    loop {
        match log_rx.recv().await {
            Ok(event) => info!(%event, "lifecycle event"),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(skipped = n, "lifecycle event receiver lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[cfg(unix)]
async fn run(
    config: &Config,
    controller: Arc<HookController>,
    server_rx: Events,
    log_rx: Events,
    shutdown: ShutdownSignal,
) -> Result<()> {
    use input_overlay_hook::ipc::Server;

    let server = Server::with_events(&config.socket_path, controller, config.motion, server_rx)?;

    info!("daemon initialized, entering main loop");

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!(?e, "IPC server error");
            }
        }

        _ = log_lifecycle(log_rx) => {
            info!("lifecycle event handler exited");
        }

        result = shutdown.wait() => {
            match result {
                Ok(()) => info!("shutdown signal received"),
                Err(e) => error!(?e, "signal handler error"),
            }
        }
    }

    server.shutdown().await;
    Ok(())
}

#[cfg(not(unix))]
async fn run(
    _config: &Config,
    _controller: Arc<HookController>,
    _server_rx: Events,
    log_rx: Events,
    shutdown: ShutdownSignal,
) -> Result<()> {
    info!("no IPC transport on this platform, running until Ctrl-C");

    tokio::select! {
        _ = log_lifecycle(log_rx) => {
            info!("lifecycle event handler exited");
        }

        result = shutdown.wait() => {
            result?;
            info!("shutdown signal received");
        }
    }
    Ok(())
}
