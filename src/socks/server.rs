//! Listener and server lifecycle
//!
//! Owns the TCP listener, spawns one session task per accepted connection
//! and coordinates graceful shutdown: signal the accept loop, close the
//! listener exactly once, then wait for every session to join.

use super::auth::AuthRegistry;
use super::session::Session;
use crate::config::Config;
use crate::error::ProxyError;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, Notify};
use tracing::{debug, info, warn};

use super::consts::SOCKS5_VERSION;

/// Backoff floor for transient accept errors
const ACCEPT_BACKOFF_MIN: Duration = Duration::from_millis(5);
/// Backoff ceiling for transient accept errors
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// State shared by the server and every session
pub struct ServerShared {
    /// Enabled authenticators keyed by method code, read-only after
    /// construction
    pub registry: AuthRegistry,
    /// Outbound dial timeout, `None` means no timeout
    pub dial_timeout: Option<Duration>,
}

/// The SOCKS5 server
pub struct Server {
    shared: Arc<ServerShared>,
    listen_addr: String,
    listener: Mutex<Option<TcpListener>>,
    local_addr: Mutex<Option<SocketAddr>>,
    shutdown_tx: broadcast::Sender<()>,
    in_shutdown: AtomicBool,
    active_sessions: AtomicUsize,
    idle: Notify,
}

impl Server {
    /// Build a server from validated configuration
    pub fn new(config: &Config) -> Self {
        let registry = AuthRegistry::from_config(config);
        let (shutdown_tx, _) = broadcast::channel(1);

        Server {
            shared: Arc::new(ServerShared {
                registry,
                dial_timeout: config.dial_timeout(),
            }),
            listen_addr: config.listen_addr(),
            listener: Mutex::new(None),
            local_addr: Mutex::new(None),
            shutdown_tx,
            in_shutdown: AtomicBool::new(false),
            active_sessions: AtomicUsize::new(0),
            idle: Notify::new(),
        }
    }

    /// Bind the listener without starting the accept loop.
    ///
    /// Split out from [`Server::serve`] so callers can learn the bound
    /// address before serving, which matters when the configured port is 0.
    pub async fn bind(&self) -> Result<(), ProxyError> {
        let listener = TcpListener::bind(&self.listen_addr).await?;
        let addr = listener.local_addr()?;

        if let Ok(mut guard) = self.local_addr.lock() {
            *guard = Some(addr);
        }
        if let Ok(mut guard) = self.listener.lock() {
            *guard = Some(listener);
        }

        info!("listening on {}", addr);
        Ok(())
    }

    /// The address the listener is bound to, once [`Server::bind`] has run
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.lock().ok().and_then(|guard| *guard)
    }

    /// Bind and run the accept loop until shutdown or a fatal error
    pub async fn listen_and_serve(self: Arc<Self>) -> Result<(), ProxyError> {
        self.bind().await?;
        self.serve().await
    }

    /// Run the accept loop on a previously bound listener.
    ///
    /// Transient accept errors back off exponentially from 5 ms up to 1 s;
    /// permanent errors return. On shutdown the listener is dropped here,
    /// which closes it, and the loop returns [`ProxyError::ServerClosed`].
    pub async fn serve(self: Arc<Self>) -> Result<(), ProxyError> {
        if self.shutting_down() {
            return Err(ProxyError::ServerClosed);
        }

        let listener = match self.listener.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        let Some(listener) = listener else {
            return Err(ProxyError::Io(io::Error::new(
                io::ErrorKind::NotConnected,
                "server is not bound",
            )));
        };

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut delay = Duration::ZERO;

        loop {
            let (conn, peer) = tokio::select! {
                _ = shutdown_rx.recv() => return Err(ProxyError::ServerClosed),
                res = listener.accept() => match res {
                    Ok(pair) => pair,
                    Err(_) if self.shutting_down() => return Err(ProxyError::ServerClosed),
                    Err(ref e) if is_transient_accept_error(e) => {
                        delay = next_backoff(delay);
                        warn!("transient accept error, retrying in {:?}: {}", delay, e);
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    Err(e) => return Err(e.into()),
                },
            };
            delay = Duration::ZERO;

            self.active_sessions.fetch_add(1, Ordering::SeqCst);
            let this = Arc::clone(&self);
            let shutdown = self.shutdown_tx.subscribe();
            tokio::spawn(async move {
                if let Err(e) = serve_session(&this, conn, peer, shutdown).await {
                    match e {
                        ProxyError::Cancelled | ProxyError::ServerClosed => {
                            debug!("session from {} cancelled", peer)
                        }
                        ProxyError::Io(_) => debug!("session from {} ended: {}", peer, e),
                        e => warn!("session from {} ended: {}", peer, e),
                    }
                }
                if this.active_sessions.fetch_sub(1, Ordering::SeqCst) == 1 {
                    this.idle.notify_waiters();
                }
            });
        }
    }

    /// Gracefully shut the server down.
    ///
    /// Sets the shutdown flag, signals the accept loop (which closes the
    /// listener), then waits for the session counter to reach zero, bounded
    /// by `deadline`. Idempotent: a second call signals nothing new and
    /// just waits again.
    pub async fn shutdown(&self, deadline: Duration) -> Result<(), ProxyError> {
        if !self.in_shutdown.swap(true, Ordering::SeqCst) {
            let _ = self.shutdown_tx.send(());
        }

        // Close a listener that was bound but never served
        if let Ok(mut guard) = self.listener.lock() {
            guard.take();
        }

        let all_joined = async {
            loop {
                let notified = self.idle.notified();
                if self.active_sessions.load(Ordering::SeqCst) == 0 {
                    break;
                }
                notified.await;
            }
        };

        tokio::time::timeout(deadline, all_joined)
            .await
            .map_err(|_| {
                ProxyError::Timeout("sessions did not finish before the shutdown deadline".into())
            })?;

        Ok(())
    }

    /// Whether shutdown has been requested
    pub fn shutting_down(&self) -> bool {
        self.in_shutdown.load(Ordering::SeqCst)
    }

    /// Number of sessions currently in flight
    pub fn active_sessions(&self) -> usize {
        self.active_sessions.load(Ordering::SeqCst)
    }
}

/// Vet and run one accepted connection.
///
/// Peeks the first byte and rejects non-SOCKS5 traffic before a session is
/// even constructed.
async fn serve_session(
    server: &Arc<Server>,
    conn: TcpStream,
    peer: SocketAddr,
    shutdown: broadcast::Receiver<()>,
) -> Result<(), ProxyError> {
    if server.shutting_down() {
        return Err(ProxyError::Cancelled);
    }

    let mut first = [0u8; 1];
    let n = conn.peek(&mut first).await?;
    if n == 0 {
        return Ok(());
    }
    if first[0] != SOCKS5_VERSION {
        return Err(ProxyError::ProtoNotSupported);
    }

    Session::new(conn, peer, Arc::clone(&server.shared), shutdown)
        .run()
        .await
}

fn is_transient_accept_error(e: &io::Error) -> bool {
    if matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
    ) {
        return true;
    }
    // ENFILE / EMFILE: fd exhaustion is worth backing off for
    matches!(e.raw_os_error(), Some(23) | Some(24))
}

fn next_backoff(current: Duration) -> Duration {
    if current.is_zero() {
        ACCEPT_BACKOFF_MIN
    } else {
        (current * 2).min(ACCEPT_BACKOFF_MAX)
    }
}
