//! UDP ASSOCIATE relay engine
//!
//! Binds a relay socket and shuttles datagrams between the client and its
//! targets. Client datagrams have their header stripped and cached; target
//! datagrams get the original header prepended on the way back. The
//! association lives exactly as long as the TCP control connection.

use super::packet::parse_udp_frame;
use crate::error::ProxyError;
use crate::socks::consts::MAX_UDP_PACKET;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::RwLock;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// A single client's UDP association
pub struct UdpSession {
    socket: UdpSocket,
    /// IP every client datagram must come from
    expected_ip: IpAddr,
    /// Full client endpoint, learned from the first matching datagram when
    /// the client declared an unknown source
    client_addr: Option<SocketAddr>,
    /// Raw header bytes keyed by target IP string
    header_cache: RwLock<HashMap<String, Vec<u8>>>,
}

impl UdpSession {
    /// Bind the relay socket for a client.
    ///
    /// `declared` is the client UDP endpoint from the request; an
    /// unspecified address means "accept anything from the control
    /// connection's peer IP". Returns the session and the relay socket's
    /// local address for the reply.
    pub async fn bind(
        declared: SocketAddr,
        control_peer_ip: IpAddr,
    ) -> Result<(Self, SocketAddr), ProxyError> {
        let socket =
            UdpSocket::bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0)).await?;
        let local_addr = socket.local_addr()?;

        let expected_ip = if declared.ip().is_unspecified() {
            control_peer_ip
        } else {
            declared.ip()
        };
        let client_addr = if declared.ip().is_unspecified() || declared.port() == 0 {
            None
        } else {
            Some(declared)
        };

        Ok((
            UdpSession {
                socket,
                expected_ip,
                client_addr,
                header_cache: RwLock::new(HashMap::new()),
            },
            local_addr,
        ))
    }

    /// Drive the association until the control connection dies or the
    /// session is cancelled.
    ///
    /// The TCP watcher runs as a sibling task and is joined before this
    /// returns; the relay socket closes when the session is dropped.
    pub async fn run(
        mut self,
        control: TcpStream,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ProxyError> {
        let (done_tx, mut done_rx) = broadcast::channel::<()>(1);
        let watcher = tokio::spawn(watch_control(control, done_tx, shutdown.resubscribe()));

        let result = self.pump(&mut done_rx, &mut shutdown).await;

        watcher.abort();
        let _ = watcher.await;
        result
    }

    /// Datagram pump: demultiplex client and target traffic on the relay
    /// socket.
    async fn pump(
        &mut self,
        done: &mut broadcast::Receiver<()>,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> Result<(), ProxyError> {
        let mut buf = vec![0u8; MAX_UDP_PACKET];

        loop {
            let (len, from) = tokio::select! {
                _ = shutdown.recv() => return Err(ProxyError::Cancelled),
                _ = done.recv() => {
                    debug!("control connection closed, ending UDP association");
                    return Ok(());
                }
                res = self.socket.recv_from(&mut buf) => res?,
            };

            if self.is_from_client(&from) {
                if self.client_addr.is_none() {
                    debug!("learned client UDP endpoint {}", from);
                    self.client_addr = Some(from);
                }
                self.forward_to_target(&buf[..len]).await;
            } else {
                self.forward_to_client(&buf[..len], from).await;
            }
        }
    }

    fn is_from_client(&self, from: &SocketAddr) -> bool {
        if from.ip() != self.expected_ip {
            return false;
        }
        // Once the client endpoint is pinned, match the full address so
        // loopback targets are not mistaken for the client.
        match self.client_addr {
            Some(client) => client == *from,
            None => true,
        }
    }

    /// Client datagram: strip the header, forward the payload, remember the
    /// header for the return path.
    async fn forward_to_target(&self, data: &[u8]) {
        let frame = match parse_udp_frame(data) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("dropping malformed UDP datagram: {}", e);
                return;
            }
        };

        if frame.is_fragmented() {
            // Fragmented datagrams are not supported and dropped silently
            return;
        }

        let target = match frame.dest.resolve().await {
            Ok(addr) => addr,
            Err(e) => {
                warn!("dropping UDP datagram, resolve failed: {}", e);
                return;
            }
        };

        let payload = &data[frame.header_len..];
        if let Err(e) = self.socket.send_to(payload, target).await {
            warn!("UDP send to {} failed: {}", target, e);
            return;
        }

        if let Ok(mut cache) = self.header_cache.write() {
            cache.insert(target.ip().to_string(), data[..frame.header_len].to_vec());
        }
    }

    /// Target datagram: prepend the cached header and hand it back to the
    /// client; unknown senders are dropped.
    async fn forward_to_client(&self, data: &[u8], from: SocketAddr) {
        let Some(client) = self.client_addr else {
            debug!("dropping datagram from {}, client endpoint unknown", from);
            return;
        };

        let header = match self.header_cache.read() {
            Ok(cache) => cache.get(&from.ip().to_string()).cloned(),
            Err(_) => None,
        };

        let Some(header) = header else {
            debug!("dropping datagram from unknown sender {}", from);
            return;
        };

        let mut reply = Vec::with_capacity(header.len() + data.len());
        reply.extend_from_slice(&header);
        reply.extend_from_slice(data);

        if let Err(e) = self.socket.send_to(&reply, client).await {
            warn!("UDP send to client {} failed: {}", client, e);
        }
    }
}

/// Keep-alive watcher for the TCP control connection.
///
/// Successful reads are no-ops, clients typically send nothing here. EOF
/// or an error signals the end of the association.
async fn watch_control(
    mut control: TcpStream,
    done: broadcast::Sender<()>,
    mut shutdown: broadcast::Receiver<()>,
) {
    if let Err(e) = enable_keepalive(&control) {
        warn!("failed to enable TCP keepalive on control connection: {}", e);
    }

    let mut buf = [0u8; 1024];
    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            res = control.read(&mut buf) => match res {
                Ok(0) => break,
                Ok(_) => continue,
                Err(e) => {
                    debug!("control connection error: {}", e);
                    break;
                }
            },
        }
    }

    let _ = done.send(());
}

fn enable_keepalive(stream: &TcpStream) -> std::io::Result<()> {
    let sock = socket2::SockRef::from(stream);
    let keepalive = socket2::TcpKeepalive::new()
        .with_time(Duration::from_secs(60))
        .with_interval(Duration::from_secs(20));
    sock.set_tcp_keepalive(&keepalive)
}
