//! Per-connection session engine
//!
//! Owns one client connection from accept until teardown and drives it
//! through method negotiation, authentication, request parsing and command
//! dispatch. This is the only place where internal errors are converted
//! into SOCKS reply codes.

use super::auth::negotiate;
use super::command::{parse_request, send_reply};
use super::server::ServerShared;
use super::tcp_relay::relay;
use super::types::{AddrSpec, Request, SocksCommand};
use super::udp::UdpSession;
use crate::error::{ProxyError, ReplyCode};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tracing::{debug, info};

/// A single client's protocol session
pub struct Session {
    stream: TcpStream,
    peer: SocketAddr,
    shared: Arc<ServerShared>,
    shutdown: broadcast::Receiver<()>,
}

impl Session {
    /// Create a session for an accepted connection
    pub fn new(
        stream: TcpStream,
        peer: SocketAddr,
        shared: Arc<ServerShared>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Session {
            stream,
            peer,
            shared,
            shutdown,
        }
    }

    /// Drive the session to completion.
    ///
    /// Runs negotiation, authentication and request parsing, then hands the
    /// connection to the selected command handler. The client connection is
    /// closed on return; every child task has terminated by then.
    pub async fn run(self) -> Result<(), ProxyError> {
        let Session {
            mut stream,
            peer,
            shared,
            mut shutdown,
        } = self;

        let request = tokio::select! {
            res = handshake(&mut stream, &shared) => res?,
            _ = shutdown.recv() => return Err(ProxyError::Cancelled),
        };

        info!(
            "SOCKS5 {} request to {} from {}",
            request.command, request.dest, peer
        );

        match request.command {
            SocksCommand::Connect => {
                handle_connect(stream, request.dest, &shared, &mut shutdown).await
            }
            SocksCommand::Bind => handle_bind(stream, request.dest, &shared, &mut shutdown).await,
            SocksCommand::UdpAssociate => {
                handle_udp_associate(stream, request.dest, peer, shutdown).await
            }
        }
    }
}

/// Negotiate a method, authenticate and read the request frame.
///
/// Request frames with an unknown command or address type get their reply
/// written here, so the handlers only ever see dispatchable requests.
async fn handshake(stream: &mut TcpStream, shared: &ServerShared) -> Result<Request, ProxyError> {
    let method = negotiate(stream, &shared.registry).await?;
    debug!("authentication completed with method {:#04x}", method);

    match parse_request(stream).await {
        Ok(request) => Ok(request),
        Err(err @ ProxyError::CommandNotSupported(_)) => {
            send_reply(stream, ReplyCode::InvalidCommand, None).await?;
            Err(err)
        }
        Err(err @ ProxyError::AddressTypeNotSupported(_)) => {
            send_reply(stream, ReplyCode::InvalidAddressType, None).await?;
            Err(err)
        }
        Err(err) => Err(err),
    }
}

/// CONNECT: dial the target and relay bidirectionally.
///
/// The success reply carries `0.0.0.0:0`, which RFC 1928 permits and most
/// clients expect to ignore.
async fn handle_connect(
    mut stream: TcpStream,
    dest: AddrSpec,
    shared: &ServerShared,
    shutdown: &mut broadcast::Receiver<()>,
) -> Result<(), ProxyError> {
    let target = match resolve_and_dial(&dest, shared.dial_timeout).await {
        Ok(target) => target,
        Err((code, err)) => {
            send_reply(&mut stream, code, None).await?;
            return Err(err);
        }
    };

    send_reply(&mut stream, ReplyCode::Success, None).await?;
    debug!("tunnel established to {}", dest);

    relay(stream, target, shutdown).await
}

/// BIND: dial the target, accept one reverse connection and relay it.
async fn handle_bind(
    mut stream: TcpStream,
    dest: AddrSpec,
    shared: &ServerShared,
    shutdown: &mut broadcast::Receiver<()>,
) -> Result<(), ProxyError> {
    let target = match resolve_and_dial(&dest, shared.dial_timeout).await {
        Ok(target) => target,
        Err((code, err)) => {
            send_reply(&mut stream, code, None).await?;
            return Err(err);
        }
    };

    let (listener, bind_addr) = match bind_reverse_listener().await {
        Ok(pair) => pair,
        Err(e) => {
            send_reply(&mut stream, ReplyCode::GeneralFailure, None).await?;
            return Err(e.into());
        }
    };

    // First reply: where the peer should connect
    send_reply(&mut stream, ReplyCode::Success, Some(bind_addr)).await?;

    let (inbound, inbound_peer) = tokio::select! {
        res = listener.accept() => match res {
            Ok(pair) => pair,
            Err(e) => {
                send_reply(&mut stream, ReplyCode::GeneralFailure, None).await?;
                return Err(e.into());
            }
        },
        _ = shutdown.recv() => return Err(ProxyError::Cancelled),
    };
    drop(listener);

    // Second reply: who connected
    send_reply(&mut stream, ReplyCode::Success, Some(inbound_peer)).await?;
    debug!("BIND accepted reverse connection from {}", inbound_peer);

    relay(inbound, target, shutdown).await
}

/// UDP ASSOCIATE: bind a relay socket and couple its lifetime to this
/// control connection.
async fn handle_udp_associate(
    mut stream: TcpStream,
    dest: AddrSpec,
    peer: SocketAddr,
    shutdown: broadcast::Receiver<()>,
) -> Result<(), ProxyError> {
    let declared = match dest.resolve().await {
        Ok(addr) => addr,
        Err(err) => {
            send_reply(&mut stream, ReplyCode::HostUnreachable, None).await?;
            return Err(err);
        }
    };

    let (session, relay_addr) = match UdpSession::bind(declared, peer.ip()).await {
        Ok(pair) => pair,
        Err(err) => {
            send_reply(&mut stream, ReplyCode::GeneralFailure, None).await?;
            return Err(err);
        }
    };

    send_reply(&mut stream, ReplyCode::Success, Some(relay_addr)).await?;
    debug!("UDP association for {} relaying via {}", peer, relay_addr);

    session.run(stream, shutdown).await
}

async fn bind_reverse_listener() -> io::Result<(TcpListener, SocketAddr)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    Ok((listener, addr))
}

/// Resolve a destination and dial it over TCP.
///
/// The dial timeout bounds the name lookup and the connect together; zero
/// means no timeout. Failures come back with the reply code the client
/// should see: resolve failures and most dial errors map to
/// host-unreachable, refused and network-unreachable keep their own codes.
async fn resolve_and_dial(
    dest: &AddrSpec,
    dial_timeout: Option<Duration>,
) -> Result<TcpStream, (ReplyCode, ProxyError)> {
    let attempt = async {
        let addr = dest
            .resolve()
            .await
            .map_err(|e| (ReplyCode::HostUnreachable, e))?;
        TcpStream::connect(addr)
            .await
            .map_err(|e| (ReplyCode::from_dial_error(&e), ProxyError::Io(e)))
    };

    match dial_timeout {
        Some(limit) => match tokio::time::timeout(limit, attempt).await {
            Ok(res) => res,
            Err(_) => {
                let e = io::Error::new(io::ErrorKind::TimedOut, "dial timed out");
                Err((ReplyCode::HostUnreachable, ProxyError::Io(e)))
            }
        },
        None => attempt.await,
    }
}
