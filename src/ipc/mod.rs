//! IPC (Inter-Process Communication) via Unix sockets
//!
//! Message-based communication between the orchestrator and each surface's
//! hosted content process, using length-prefixed JSON over Unix domain
//! sockets. A connection opens with a `Hello` handshake binding it to one
//! surface; reader threads forward inbound frames into the orchestrator's
//! event channel and the control thread pushes responses and events back over
//! the same stream.

use anyhow::{anyhow, Context, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::io::{Read, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::sync::Mutex;
use std::thread;
use tracing::{error, info, warn};

pub mod messages;

use crate::constants::ipc::{MAX_MESSAGE_SIZE, SOCKET_FILE};
use crate::orchestrator::OrchestratorEvent;
use crate::surface::ContentLink;
use crate::types::SurfaceId;
use messages::{ClientFrame, ServerFrame, ShellNotification, ShellRequest};

/// Get default socket path (XDG_RUNTIME_DIR with fallback to cache)
pub fn default_socket_path() -> Result<PathBuf> {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        return Ok(PathBuf::from(runtime_dir).join(SOCKET_FILE));
    }

    let cache = dirs::cache_dir()
        .context("Failed to determine cache directory (no XDG_RUNTIME_DIR or HOME)")?;
    Ok(cache.join(SOCKET_FILE))
}

/// Listener owning the shell socket file
pub struct ShellServer {
    listener: UnixListener,
    socket_path: PathBuf,
}

impl ShellServer {
    /// Create server and bind to default socket path
    pub fn bind() -> Result<Self> {
        Self::bind_to(default_socket_path()?)
    }

    /// Create server and bind to specific socket path
    pub fn bind_to(socket_path: PathBuf) -> Result<Self> {
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent)
                .context(format!("Failed to create socket directory: {}", parent.display()))?;
        }

        // Remove stale socket if exists
        if socket_path.exists() {
            std::fs::remove_file(&socket_path)
                .context(format!("Failed to remove stale socket: {}", socket_path.display()))?;
        }

        let listener = UnixListener::bind(&socket_path)
            .context(format!("Failed to bind socket at {}", socket_path.display()))?;

        // Set permissions to 0700 (owner only)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&socket_path, std::fs::Permissions::from_mode(0o700))
                .context("Failed to set socket permissions")?;
        }

        Ok(Self {
            listener,
            socket_path,
        })
    }

    /// Accept incoming connection (blocking)
    pub fn accept(&self) -> Result<UnixStream> {
        let (stream, _addr) = self
            .listener
            .accept()
            .context("Failed to accept IPC connection")?;
        Ok(stream)
    }

    pub fn path(&self) -> &Path {
        &self.socket_path
    }
}

impl Drop for ShellServer {
    fn drop(&mut self) {
        // Clean up socket file
        let _ = std::fs::remove_file(&self.socket_path);
    }
}

/// Write half of a content connection, pushed to by the control thread
pub struct StreamLink {
    stream: Mutex<UnixStream>,
}

impl StreamLink {
    pub fn new(stream: UnixStream) -> Self {
        Self {
            stream: Mutex::new(stream),
        }
    }
}

impl ContentLink for StreamLink {
    fn send(&self, frame: &ServerFrame) -> Result<()> {
        let mut stream = self
            .stream
            .lock()
            .map_err(|_| anyhow!("content stream lock poisoned"))?;
        write_message(&mut stream, frame)
    }
}

/// Accept connections forever, spawning one reader thread per content process
pub fn spawn_acceptor(
    server: ShellServer,
    events: Sender<OrchestratorEvent>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        info!(path = %server.path().display(), "Shell socket listening");
        loop {
            match server.accept() {
                Ok(stream) => {
                    let events = events.clone();
                    thread::spawn(move || {
                        if let Err(e) = serve_connection(stream, events) {
                            warn!(error = %e, "Content connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "Shell socket accept failed, stopping");
                    break;
                }
            }
        }
    })
}

fn serve_connection(mut stream: UnixStream, events: Sender<OrchestratorEvent>) -> Result<()> {
    // The handshake binds this stream to one surface's hosted content
    let surface = match read_message::<ClientFrame>(&mut stream)? {
        ClientFrame::Hello { surface } => surface,
        other => anyhow::bail!("expected hello frame, got {other:?}"),
    };
    let write_half = stream.try_clone().context("Failed to clone content stream")?;
    events
        .send(OrchestratorEvent::Attach {
            surface,
            link: Box::new(StreamLink::new(write_half)),
        })
        .map_err(|_| anyhow!("orchestrator channel closed"))?;
    info!(surface = %surface, "Hosted content connected");

    loop {
        let frame: ClientFrame = match read_message(&mut stream) {
            Ok(frame) => frame,
            Err(_) => {
                // EOF or a broken frame: detach and stop reading
                let _ = events.send(OrchestratorEvent::Disconnected { surface });
                info!(surface = %surface, "Hosted content disconnected");
                return Ok(());
            }
        };
        let event = match frame {
            ClientFrame::Hello { .. } => {
                warn!(surface = %surface, "Duplicate hello ignored");
                continue;
            }
            ClientFrame::Notify { notification } => OrchestratorEvent::Notify {
                surface,
                notification,
            },
            ClientFrame::Request { id, request } => OrchestratorEvent::Request {
                surface,
                id,
                request,
            },
        };
        if events.send(event).is_err() {
            return Ok(());
        }
    }
}

/// Client connection used by hosted content processes
pub struct ShellClient {
    stream: UnixStream,
}

impl ShellClient {
    /// Connect to the orchestrator's shell socket
    pub fn connect_to(path: &Path) -> Result<Self> {
        let stream = UnixStream::connect(path)
            .context(format!("Failed to connect to shell at {}", path.display()))?;
        Ok(Self { stream })
    }

    /// Bind this connection to a surface (must be the first frame sent)
    pub fn hello(&mut self, surface: SurfaceId) -> Result<()> {
        write_message(&mut self.stream, &ClientFrame::Hello { surface })
    }

    /// Fire-and-forget notification
    pub fn notify(&mut self, notification: ShellNotification) -> Result<()> {
        write_message(&mut self.stream, &ClientFrame::Notify { notification })
    }

    /// Send a request; the matching response arrives as a
    /// [`ServerFrame::Response`] with the same id
    pub fn send_request(&mut self, id: u64, request: ShellRequest) -> Result<()> {
        write_message(&mut self.stream, &ClientFrame::Request { id, request })
    }

    /// Receive the next frame from the orchestrator (blocking)
    pub fn recv_frame(&mut self) -> Result<ServerFrame> {
        read_message(&mut self.stream)
    }
}

/// Write length-prefixed message to stream
fn write_message<T: Serialize>(stream: &mut UnixStream, msg: &T) -> Result<()> {
    let json = serde_json::to_vec(msg).context("Failed to serialize message to JSON")?;

    // Write length prefix (u32 little-endian)
    let len = json.len() as u32;
    stream
        .write_all(&len.to_le_bytes())
        .context("Failed to write message length")?;

    stream
        .write_all(&json)
        .context("Failed to write message payload")?;

    stream.flush().context("Failed to flush stream")?;

    Ok(())
}

/// Read length-prefixed message from stream
fn read_message<T: DeserializeOwned>(stream: &mut UnixStream) -> Result<T> {
    let mut len_buf = [0u8; 4];
    stream
        .read_exact(&mut len_buf)
        .context("Failed to read message length")?;
    let len = u32::from_le_bytes(len_buf) as usize;

    // Sanity check (prevent DoS via huge allocation)
    if len > MAX_MESSAGE_SIZE {
        return Err(anyhow!("Message too large: {} bytes (max: {})", len, MAX_MESSAGE_SIZE));
    }

    let mut json_buf = vec![0u8; len];
    stream
        .read_exact(&mut json_buf)
        .context("Failed to read message payload")?;

    serde_json::from_slice(&json_buf).context("Failed to deserialize message from JSON")
}
