//! SOCKS5 protocol implementation
//!
//! The protocol core: wire codec, authentication, the per-connection
//! session state machine, the TCP and UDP relay engines and the listener
//! lifecycle. RFC 1928 for the protocol, RFC 1929 for username/password
//! authentication.

pub mod auth;
mod command;
mod consts;
mod server;
mod session;
mod tcp_relay;
mod types;
mod udp;

pub use command::{parse_request, send_reply};
pub use consts::*;
pub use server::{Server, ServerShared};
pub use session::Session;
pub use tcp_relay::relay;
pub use types::{AddrSpec, Request, SocksCommand};
pub use udp::{encode_udp_frame, parse_udp_frame, UdpFrame, UdpSession};

use tokio::io::{AsyncRead, AsyncWrite};

/// Object-safe byte stream, used where authenticators are held as trait
/// objects
pub trait Stream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Stream for T {}
