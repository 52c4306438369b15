//! SOCKS5 type definitions
//!
//! Core types shared by the codec, the session engine and the relays.

use super::consts::*;
use crate::error::ProxyError;
use crate::resolver::resolver;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

/// SOCKS5 command types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocksCommand {
    /// Establish a TCP connection to the target
    Connect,
    /// Wait for an inbound TCP connection on behalf of the client
    Bind,
    /// Establish a UDP relay
    UdpAssociate,
}

impl SocksCommand {
    /// Parse a command byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            CMD_CONNECT => Some(SocksCommand::Connect),
            CMD_BIND => Some(SocksCommand::Bind),
            CMD_UDP_ASSOCIATE => Some(SocksCommand::UdpAssociate),
            _ => None,
        }
    }

    /// Convert to the wire byte
    pub fn to_byte(self) -> u8 {
        match self {
            SocksCommand::Connect => CMD_CONNECT,
            SocksCommand::Bind => CMD_BIND,
            SocksCommand::UdpAssociate => CMD_UDP_ASSOCIATE,
        }
    }
}

impl fmt::Display for SocksCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SocksCommand::Connect => write!(f, "CONNECT"),
            SocksCommand::Bind => write!(f, "BIND"),
            SocksCommand::UdpAssociate => write!(f, "UDP ASSOCIATE"),
        }
    }
}

/// Destination address carried in requests and UDP headers
///
/// Either a literal IP address or a domain name, each with a port.
/// Immutable after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddrSpec {
    /// IP address with port
    Ip(SocketAddr),
    /// Fully qualified domain name with port
    Fqdn(String, u16),
}

impl AddrSpec {
    /// Create an address from an IPv4 address and port
    pub fn ipv4(ip: Ipv4Addr, port: u16) -> Self {
        AddrSpec::Ip(SocketAddr::new(IpAddr::V4(ip), port))
    }

    /// Create an address from an IPv6 address and port
    pub fn ipv6(ip: Ipv6Addr, port: u16) -> Self {
        AddrSpec::Ip(SocketAddr::new(IpAddr::V6(ip), port))
    }

    /// Create an address from a domain name and port
    pub fn fqdn(domain: String, port: u16) -> Self {
        AddrSpec::Fqdn(domain, port)
    }

    /// Get the port number
    pub fn port(&self) -> u16 {
        match self {
            AddrSpec::Ip(addr) => addr.port(),
            AddrSpec::Fqdn(_, port) => *port,
        }
    }

    /// Get the address type byte for the wire encoding
    pub fn atyp(&self) -> u8 {
        match self {
            AddrSpec::Ip(SocketAddr::V4(_)) => ATYP_IPV4,
            AddrSpec::Ip(SocketAddr::V6(_)) => ATYP_IPV6,
            AddrSpec::Fqdn(_, _) => ATYP_DOMAIN,
        }
    }

    /// Resolve to a concrete socket address.
    ///
    /// IP addresses are returned as-is. Domain names go through the
    /// process-wide resolver and the first returned address wins.
    pub async fn resolve(&self) -> Result<SocketAddr, ProxyError> {
        match self {
            AddrSpec::Ip(addr) => Ok(*addr),
            AddrSpec::Fqdn(domain, port) => {
                let ips = resolver()
                    .lookup(domain)
                    .await
                    .map_err(|e| ProxyError::ResolveFailed(format!("{domain}: {e}")))?;
                let ip = ips.into_iter().next().ok_or_else(|| {
                    ProxyError::ResolveFailed(format!("{domain}: no addresses found"))
                })?;
                Ok(SocketAddr::new(ip, *port))
            }
        }
    }

    /// Serialize as `ATYP | ADDR | PORT` wire bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        match self {
            AddrSpec::Ip(SocketAddr::V4(addr)) => {
                bytes.push(ATYP_IPV4);
                bytes.extend_from_slice(&addr.ip().octets());
                bytes.extend_from_slice(&addr.port().to_be_bytes());
            }
            AddrSpec::Ip(SocketAddr::V6(addr)) => {
                bytes.push(ATYP_IPV6);
                bytes.extend_from_slice(&addr.ip().octets());
                bytes.extend_from_slice(&addr.port().to_be_bytes());
            }
            AddrSpec::Fqdn(domain, port) => {
                bytes.push(ATYP_DOMAIN);
                bytes.push(domain.len() as u8);
                bytes.extend_from_slice(domain.as_bytes());
                bytes.extend_from_slice(&port.to_be_bytes());
            }
        }
        bytes
    }
}

impl fmt::Display for AddrSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddrSpec::Ip(addr) => write!(f, "{}", addr),
            AddrSpec::Fqdn(domain, port) => write!(f, "{}:{}", domain, port),
        }
    }
}

impl From<SocketAddr> for AddrSpec {
    fn from(addr: SocketAddr) -> Self {
        AddrSpec::Ip(addr)
    }
}

/// A parsed SOCKS5 request
#[derive(Debug, Clone)]
pub struct Request {
    /// The requested command
    pub command: SocksCommand,
    /// The destination address
    pub dest: AddrSpec,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socks_command_from_byte() {
        assert_eq!(SocksCommand::from_byte(1), Some(SocksCommand::Connect));
        assert_eq!(SocksCommand::from_byte(2), Some(SocksCommand::Bind));
        assert_eq!(SocksCommand::from_byte(3), Some(SocksCommand::UdpAssociate));
        assert_eq!(SocksCommand::from_byte(0), None);
        assert_eq!(SocksCommand::from_byte(4), None);
    }

    #[test]
    fn test_socks_command_round_trip() {
        for cmd in [
            SocksCommand::Connect,
            SocksCommand::Bind,
            SocksCommand::UdpAssociate,
        ] {
            assert_eq!(SocksCommand::from_byte(cmd.to_byte()), Some(cmd));
        }
    }

    #[test]
    fn test_addr_spec_ipv4() {
        let addr = AddrSpec::ipv4(Ipv4Addr::new(192, 168, 1, 1), 8080);
        assert_eq!(addr.port(), 8080);
        assert_eq!(addr.atyp(), ATYP_IPV4);
        assert_eq!(format!("{}", addr), "192.168.1.1:8080");
    }

    #[test]
    fn test_addr_spec_ipv6() {
        let addr = AddrSpec::ipv6(Ipv6Addr::LOCALHOST, 443);
        assert_eq!(addr.port(), 443);
        assert_eq!(addr.atyp(), ATYP_IPV6);
    }

    #[test]
    fn test_addr_spec_fqdn() {
        let addr = AddrSpec::fqdn("example.com".to_string(), 80);
        assert_eq!(addr.port(), 80);
        assert_eq!(addr.atyp(), ATYP_DOMAIN);
        assert_eq!(format!("{}", addr), "example.com:80");
    }

    #[test]
    fn test_addr_spec_to_bytes_ipv4() {
        let addr = AddrSpec::ipv4(Ipv4Addr::new(10, 0, 0, 1), 1080);
        let bytes = addr.to_bytes();
        assert_eq!(bytes[0], ATYP_IPV4);
        assert_eq!(&bytes[1..5], &[10, 0, 0, 1]);
        assert_eq!(&bytes[5..7], &1080u16.to_be_bytes());
    }

    #[test]
    fn test_addr_spec_to_bytes_fqdn() {
        let addr = AddrSpec::fqdn("test".to_string(), 80);
        let bytes = addr.to_bytes();
        assert_eq!(bytes[0], ATYP_DOMAIN);
        assert_eq!(bytes[1], 4);
        assert_eq!(&bytes[2..6], b"test");
        assert_eq!(&bytes[6..8], &80u16.to_be_bytes());
    }

    #[tokio::test]
    async fn test_addr_spec_resolve_ip_is_identity() {
        let addr = AddrSpec::ipv4(Ipv4Addr::new(127, 0, 0, 1), 9000);
        let resolved = addr.resolve().await.unwrap();
        assert_eq!(resolved, "127.0.0.1:9000".parse().unwrap());
    }

    #[test]
    fn test_addr_spec_from_socket_addr() {
        let sa: SocketAddr = "10.0.0.1:1234".parse().unwrap();
        assert_eq!(AddrSpec::from(sa), AddrSpec::Ip(sa));
    }
}
