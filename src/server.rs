//! Connection listener and per-connection event loop.
//!
//! Accepts transport connections on a `tcp://` or `unix://` URI and runs
//! one independent session per connection. Sessions share only the
//! resolved backend adapter and the immutable configuration.

use crate::backend::SttBackend;
use crate::error::SessionError;
use crate::protocol::{read_event, write_event, Event};
use crate::session::Session;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::net::{TcpListener, UnixListener};
use tracing::{debug, info, warn};

/// Where to listen, parsed from the configured URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenAddr {
    Tcp(String),
    Unix(PathBuf),
}

/// Parse a listen URI of the form `tcp://host:port` or `unix://path`.
pub fn parse_uri(uri: &str) -> Result<ListenAddr, SessionError> {
    if let Some(addr) = uri.strip_prefix("tcp://") {
        if addr.is_empty() {
            return Err(SessionError::Protocol {
                message: format!("invalid listen URI '{}': missing address", uri),
            });
        }
        Ok(ListenAddr::Tcp(addr.to_string()))
    } else if let Some(path) = uri.strip_prefix("unix://") {
        if path.is_empty() {
            return Err(SessionError::Protocol {
                message: format!("invalid listen URI '{}': missing path", uri),
            });
        }
        Ok(ListenAddr::Unix(PathBuf::from(path)))
    } else {
        Err(SessionError::Protocol {
            message: format!(
                "invalid listen URI '{}': expected tcp://host:port or unix://path",
                uri
            ),
        })
    }
}

/// The transcription server: one listener, one session per connection.
pub struct Server {
    backend: Arc<dyn SttBackend>,
    default_language: Option<String>,
    max_buffer_bytes: usize,
    next_session: AtomicU64,
}

impl Server {
    pub fn new(
        backend: Arc<dyn SttBackend>,
        default_language: Option<String>,
        max_buffer_bytes: usize,
    ) -> Self {
        Self {
            backend,
            default_language,
            max_buffer_bytes,
            next_session: AtomicU64::new(1),
        }
    }

    fn new_session(&self) -> Session {
        let id = self.next_session.fetch_add(1, Ordering::Relaxed);
        Session::new(
            id,
            Arc::clone(&self.backend),
            self.default_language.clone(),
            self.max_buffer_bytes,
        )
    }

    /// Bind the listener and serve connections until the task is cancelled.
    pub async fn run(self: Arc<Self>, addr: ListenAddr) -> std::io::Result<()> {
        match addr {
            ListenAddr::Tcp(addr) => {
                let listener = TcpListener::bind(&addr).await?;
                info!(%addr, "listening (tcp)");
                loop {
                    let (stream, peer) = listener.accept().await?;
                    debug!(%peer, "connection accepted");
                    let server = Arc::clone(&self);
                    tokio::spawn(async move {
                        let session = server.new_session();
                        handle_connection(stream, session).await;
                    });
                }
            }
            ListenAddr::Unix(path) => {
                // Clean up a stale socket from a previous run
                if path.exists() {
                    std::fs::remove_file(&path)?;
                }
                let listener = UnixListener::bind(&path)?;
                info!(path = %path.display(), "listening (unix)");
                loop {
                    let (stream, _) = listener.accept().await?;
                    debug!("connection accepted");
                    let server = Arc::clone(&self);
                    tokio::spawn(async move {
                        let session = server.new_session();
                        handle_connection(stream, session).await;
                    });
                }
            }
        }
    }
}

/// Run one connection to completion: read an event, let the session handle
/// it, write the replies.
///
/// Because the session is awaited before the next read, events that arrive
/// during a flush queue in the transport. On disconnect mid-flight the
/// blocking backend call finishes in the background and its result is
/// discarded; no error event is emitted for it.
pub async fn handle_connection<S>(stream: S, mut session: Session)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let id = session.id();
    let (reader, mut writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(reader);

    loop {
        let event = match read_event(&mut reader).await {
            Ok(Some(event)) => event,
            Ok(None) => {
                debug!(session = id, "client disconnected");
                break;
            }
            Err(error) => {
                warn!(session = id, %error, "closing session");
                send_session_error(&mut writer, id, &error).await;
                break;
            }
        };

        match session.handle_event(event).await {
            Ok(replies) => {
                let mut write_failed = false;
                for reply in &replies {
                    if let Err(error) = write_event(&mut writer, reply).await {
                        // Client went away; discard silently
                        debug!(session = id, %error, "client gone before reply");
                        write_failed = true;
                        break;
                    }
                }
                if write_failed || session.is_failed() {
                    break;
                }
            }
            Err(error) => {
                warn!(session = id, %error, "session error, closing connection");
                send_session_error(&mut writer, id, &error).await;
                break;
            }
        }
    }
}

/// Best-effort error event before closing; the peer may already be gone.
async fn send_session_error<W>(writer: &mut W, id: u64, error: &SessionError)
where
    W: AsyncWrite + Unpin,
{
    let event = Event::Error {
        kind: error.kind().to_string(),
        message: error.to_string(),
    };
    if let Err(write_error) = write_event(writer, &event).await {
        debug!(session = id, %write_error, "could not deliver error event");
    }
}
