//! Unix domain socket server for IPC
//!
//! Answers key-state and pointer queries from overlay clients and pushes
//! hook lifecycle notifications to subscribed clients.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::controller::HookController;
use crate::events::LifecycleEvent;
use crate::snapshot::MotionSettings;

use super::protocol::{DaemonStatus, Notification, Request, Response, MAX_FRAME_LEN};

/// IPC Server handling client connections
pub struct Server {
    socket_path: PathBuf,
    listener: Option<UnixListener>,
    context: Arc<ServerContext>,
    shutdown_tx: broadcast::Sender<()>,
    /// Lifecycle events forwarded to subscribed clients
    event_rx: Option<broadcast::Receiver<LifecycleEvent>>,
}

/// What request handlers read from
struct ServerContext {
    controller: Arc<HookController>,
    motion: MotionSettings,
    start_time: Instant,
}

/// A frame read off the socket
type Incoming = std::result::Result<Request, String>;

impl Server {
    /// Create a new IPC server
    pub fn new(
        socket_path: &Path,
        controller: Arc<HookController>,
        motion: MotionSettings,
    ) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create socket directory")?;
        }

        // Remove stale socket if it exists
        if socket_path.exists() {
            std::fs::remove_file(socket_path).context("failed to remove stale socket")?;
        }

        let listener = UnixListener::bind(socket_path).context("failed to bind Unix socket")?;

        // Set socket permissions to owner-only (0600)
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))
                .context("failed to restrict socket permissions")?;
        }

        let (shutdown_tx, _) = broadcast::channel(1);

        info!(?socket_path, "IPC server listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener: Some(listener),
            context: Arc::new(ServerContext {
                controller,
                motion,
                start_time: Instant::now(),
            }),
            shutdown_tx,
            event_rx: None,
        })
    }

    /// Create a new IPC server with lifecycle event subscription
    pub fn with_events(
        socket_path: &Path,
        controller: Arc<HookController>,
        motion: MotionSettings,
        event_rx: broadcast::Receiver<LifecycleEvent>,
    ) -> Result<Self> {
        let mut server = Self::new(socket_path, controller, motion)?;
        server.event_rx = Some(event_rx);
        Ok(server)
    }

    /// Run the server, accepting connections
    pub async fn run(&self) -> Result<()> {
        let listener = self.listener.as_ref().context("server not initialized")?;

        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("client connected");
                    let context = Arc::clone(&self.context);
                    let events = self.event_rx.as_ref().map(|rx| rx.resubscribe());
                    let mut shutdown_rx = self.shutdown_tx.subscribe();

                    tokio::spawn(async move {
                        tokio::select! {
                            result = Self::handle_client(stream, context, events) => {
                                if let Err(e) = result {
                                    warn!(?e, "client handler error");
                                }
                            }
                            _ = shutdown_rx.recv() => {
                                debug!("client handler shutting down");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(?e, "accept error");
                }
            }
        }
    }

    /// Handle a single client connection
    ///
    /// Frames are read on a separate task so a subscribed client can receive
    /// notifications while no request is in flight.
    async fn handle_client(
        stream: UnixStream,
        context: Arc<ServerContext>,
        mut events: Option<broadcast::Receiver<LifecycleEvent>>,
    ) -> Result<()> {
        let (mut reader, mut writer) = stream.into_split();
        let (request_tx, mut request_rx) = mpsc::channel::<Incoming>(16);

        let reader_task = tokio::spawn(async move {
            loop {
                match read_frame(&mut reader).await {
                    Ok(Some(incoming)) => {
                        if request_tx.send(incoming).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        debug!("client disconnected");
                        break;
                    }
                    Err(e) => {
                        warn!(?e, "dropping client");
                        break;
                    }
                }
            }
        });

        let mut is_subscribed = false;
        let result = loop {
            tokio::select! {
                incoming = request_rx.recv() => {
                    let response = match incoming {
                        None => break Ok(()),
                        Some(Ok(request)) => {
                            debug!(?request, "received request");
                            let (response, subscribe) = Self::process_request(request, &context);
                            if subscribe && !is_subscribed {
                                is_subscribed = true;
                                debug!("client subscribed to notifications");
                            }
                            response
                        }
                        Some(Err(message)) => Response::Error {
                            code: "invalid_request".to_string(),
                            message,
                        },
                    };
                    if let Err(e) = send_message(&mut writer, &response).await {
                        break Err(e);
                    }
                }
                event = next_event(&mut events), if is_subscribed => {
                    match event {
                        Some(event) => {
                            let notification = Notification::Lifecycle { event };
                            if let Err(e) = send_message(&mut writer, &notification).await {
                                break Err(e);
                            }
                        }
                        None => events = None,
                    }
                }
            }
        };

        reader_task.abort();
        result
    }

    /// Process a request and return a response
    /// Returns (Response, should_subscribe)
    fn process_request(request: Request, context: &ServerContext) -> (Response, bool) {
        let controller = &context.controller;
        match request {
            Request::Ping => (Response::Pong, false),

            Request::GetStatus => {
                let status = DaemonStatus {
                    backend: controller.backend_name().to_string(),
                    state: controller.state().to_string(),
                    hook_alive: controller.is_hook_thread_alive(),
                    pressed_count: controller.snapshot().pressed().len(),
                    uptime_secs: context.start_time.elapsed().as_secs(),
                    ..DaemonStatus::default()
                };
                (Response::Status(status), false)
            }

            Request::IsPressed { code } => {
                let pressed = controller.is_pressed(code);
                (Response::Pressed { code, pressed }, false)
            }

            Request::Poll { codes } => {
                let snapshot = controller.snapshot();
                let response = Response::Poll {
                    pressed: snapshot.resolve(&codes),
                    mouse: snapshot.mouse(),
                    motion: snapshot.motion(&context.motion),
                };
                (response, false)
            }

            Request::Subscribe => (Response::Subscribed, true),
        }
    }

    /// Gracefully shutdown the server
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        // Remove socket file
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(?e, "failed to remove socket file");
            }
        }

        info!("IPC server shutdown complete");
    }
}

/// Read one length-prefixed frame
///
/// `Ok(None)` on a clean disconnect. A body that is not a valid request comes
/// back as `Some(Err(..))` so the client gets an error response.
async fn read_frame<R>(reader: &mut R) -> Result<Option<Incoming>>
where
    R: AsyncRead + Unpin,
{
    // Read message length (4-byte little-endian)
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        bail!("message too large ({} bytes)", len);
    }

    let mut msg_buf = vec![0u8; len];
    reader
        .read_exact(&mut msg_buf)
        .await
        .context("truncated message body")?;

    Ok(Some(
        serde_json::from_slice(&msg_buf).map_err(|e| format!("failed to parse request: {}", e)),
    ))
}

/// Send a length-prefixed JSON message
async fn send_message<W, T>(writer: &mut W, msg: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: serde::Serialize,
{
    let msg_bytes = serde_json::to_vec(msg)?;
    let msg_len = (msg_bytes.len() as u32).to_le_bytes();

    writer.write_all(&msg_len).await?;
    writer.write_all(&msg_bytes).await?;

    Ok(())
}

/// Next lifecycle event, skipping over lag; `None` once the sender is gone
async fn next_event(events: &mut Option<broadcast::Receiver<LifecycleEvent>>) -> Option<LifecycleEvent> {
    let Some(rx) = events.as_mut() else {
        return std::future::pending().await;
    };
    loop {
        match rx.recv().await {
            Ok(event) => return Some(event),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(skipped = n, "lifecycle event receiver lagged");
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hook::scripted::ScriptedBackend;
    use crate::hook::{HookEvent, Point};
    use crate::keys::{vc, ButtonConvention, VirtualKeyCode};

    fn frame(json: &str) -> Vec<u8> {
        let mut bytes = (json.len() as u32).to_le_bytes().to_vec();
        bytes.extend_from_slice(json.as_bytes());
        bytes
    }

    fn context() -> (ServerContext, Arc<ScriptedBackend>) {
        let backend = Arc::new(ScriptedBackend::default());
        let controller = HookController::new(backend.clone())
            .with_convention(ButtonConvention::Primary);
        let context = ServerContext {
            controller: Arc::new(controller),
            motion: MotionSettings::default(),
            start_time: Instant::now(),
        };
        (context, backend)
    }

    #[test]
    fn test_read_frame() {
        let mut reader = tokio_test::io::Builder::new()
            .read(&frame(r#"{"type":"ping"}"#))
            .build();
        let incoming = tokio_test::block_on(read_frame(&mut reader)).unwrap();
        assert_eq!(incoming, Some(Ok(Request::Ping)));

        let eof = tokio_test::block_on(read_frame(&mut reader)).unwrap();
        assert_eq!(eof, None);
    }

    #[test]
    fn test_read_frame_reports_bad_json() {
        let mut reader = tokio_test::io::Builder::new()
            .read(&frame(r#"{"type":"launch"}"#))
            .build();
        let incoming = tokio_test::block_on(read_frame(&mut reader)).unwrap();
        assert!(matches!(incoming, Some(Err(_))));
    }

    #[test]
    fn test_read_frame_rejects_oversized() {
        let len = (MAX_FRAME_LEN as u32 + 1).to_le_bytes();
        let mut reader = tokio_test::io::Builder::new().read(&len).build();
        assert!(tokio_test::block_on(read_frame(&mut reader)).is_err());
    }

    #[test]
    fn test_send_message_framing() {
        let mut writer = tokio_test::io::Builder::new()
            .write(&7u32.to_le_bytes())
            .write(br#"{"a":1}"#)
            .build();
        let msg = serde_json::json!({"a": 1});
        tokio_test::block_on(send_message(&mut writer, &msg)).unwrap();
    }

    #[test]
    fn test_status_reflects_controller() {
        let (context, _backend) = context();
        let (response, subscribe) = Server::process_request(Request::GetStatus, &context);
        assert!(!subscribe);
        match response {
            Response::Status(status) => {
                assert_eq!(status.backend, "scripted");
                assert_eq!(status.state, "Stopped");
                assert!(!status.hook_alive);
            }
            other => panic!("unexpected response {:?}", other),
        }
    }

    #[test]
    fn test_poll_reads_one_snapshot() {
        let (context, backend) = context();
        context.controller.start().unwrap();
        assert!(backend.inject(HookEvent::KeyPressed { code: vc::A }));
        assert!(backend.inject(HookEvent::MousePressed { button: 1 }));
        assert!(backend.inject(HookEvent::MouseMoved { position: Point::new(10, 10) }));

        let request = Request::Poll {
            codes: vec![vc::A, vc::S, VirtualKeyCode::mouse_button(1)],
        };
        let (response, _) = Server::process_request(request, &context);
        match response {
            Response::Poll { pressed, mouse, motion } => {
                assert_eq!(pressed, vec![true, false, true]);
                assert_eq!(mouse.smoothed, Point::new(2, 2));
                assert_eq!(motion.dx, 10);
            }
            other => panic!("unexpected response {:?}", other),
        }

        let (response, _) =
            Server::process_request(Request::IsPressed { code: vc::A }, &context);
        assert_eq!(response, Response::Pressed { code: vc::A, pressed: true });
        context.controller.stop();
    }

    #[test]
    fn test_subscribe_flags_client() {
        let (context, _backend) = context();
        let (response, subscribe) = Server::process_request(Request::Subscribe, &context);
        assert_eq!(response, Response::Subscribed);
        assert!(subscribe);
    }

    #[test]
    fn test_next_event_skips_lag_and_ends_on_close() {
        let (tx, rx) = broadcast::channel(1);
        let mut events = Some(rx);
        tx.send(LifecycleEvent::HookStopped { duration_ms: 1 }).unwrap();
        tx.send(LifecycleEvent::HookStopped { duration_ms: 2 }).unwrap();
        drop(tx);

        let event = tokio_test::block_on(next_event(&mut events));
        assert_eq!(event, Some(LifecycleEvent::HookStopped { duration_ms: 2 }));
        assert_eq!(tokio_test::block_on(next_event(&mut events)), None);
    }
}
