//! Error types for socksd
//!
//! This module defines the error taxonomy used throughout the server and
//! the SOCKS5 reply codes derived from it.

use std::io;
use thiserror::Error;

/// Main error type for proxy operations
#[derive(Error, Debug)]
pub enum ProxyError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Malformed client frame or wrong protocol version
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The first byte of the connection was not the SOCKS5 version marker
    #[error("Only SOCKS5 is supported")]
    ProtoNotSupported,

    /// None of the methods advertised by the client is enabled
    #[error("No acceptable authentication method")]
    NoAcceptableMethod,

    /// Authentication sub-negotiation rejected the client
    #[error("Authentication failed")]
    AuthFailed,

    /// The request carried an unknown command byte
    #[error("Command not supported: {0:#04x}")]
    CommandNotSupported(u8),

    /// The request carried an unknown address type byte
    #[error("Address type not supported: {0:#04x}")]
    AddressTypeNotSupported(u8),

    /// Name lookup failed
    #[error("Resolve failed: {0}")]
    ResolveFailed(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The server is shutting down
    #[error("Server closed")]
    ServerClosed,

    /// The session was cancelled mid-operation
    #[error("Cancelled")]
    Cancelled,

    /// A deadline elapsed
    #[error("Timeout: {0}")]
    Timeout(String),
}

/// Reply codes for the SOCKS5 protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReplyCode {
    /// Command succeeded
    Success = 0x00,
    /// General SOCKS server failure
    GeneralFailure = 0x01,
    /// Connection not allowed by ruleset
    NotAllowed = 0x02,
    /// Network unreachable
    NetworkUnreachable = 0x03,
    /// Host unreachable
    HostUnreachable = 0x04,
    /// Connection refused
    ConnectionRefused = 0x05,
    /// TTL expired
    TtlExpired = 0x06,
    /// Command not supported
    InvalidCommand = 0x07,
    /// Address type not supported
    InvalidAddressType = 0x08,
}

impl ReplyCode {
    /// Map an outbound dial error to the reply code the client should see.
    ///
    /// Refused and unreachable conditions keep their dedicated codes;
    /// everything else, including dial timeouts, collapses to
    /// [`ReplyCode::HostUnreachable`].
    pub fn from_dial_error(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionRefused => ReplyCode::ConnectionRefused,
            io::ErrorKind::NetworkUnreachable => ReplyCode::NetworkUnreachable,
            _ => ReplyCode::HostUnreachable,
        }
    }
}

impl From<ReplyCode> for u8 {
    fn from(code: ReplyCode) -> Self {
        code as u8
    }
}

impl TryFrom<u8> for ReplyCode {
    type Error = ProxyError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(ReplyCode::Success),
            0x01 => Ok(ReplyCode::GeneralFailure),
            0x02 => Ok(ReplyCode::NotAllowed),
            0x03 => Ok(ReplyCode::NetworkUnreachable),
            0x04 => Ok(ReplyCode::HostUnreachable),
            0x05 => Ok(ReplyCode::ConnectionRefused),
            0x06 => Ok(ReplyCode::TtlExpired),
            0x07 => Ok(ReplyCode::InvalidCommand),
            0x08 => Ok(ReplyCode::InvalidAddressType),
            other => Err(ProxyError::Protocol(format!(
                "unknown reply code: {other:#04x}"
            ))),
        }
    }
}
