//! SOCKS5 protocol constants

/// SOCKS5 protocol version
pub const SOCKS5_VERSION: u8 = 0x05;

/// RFC 1929 username/password sub-negotiation version
pub const AUTH_SUBNEG_VERSION: u8 = 0x01;

// Authentication methods
/// No authentication required
pub const AUTH_METHOD_NONE: u8 = 0x00;
/// GSSAPI authentication (recognized, not implemented)
pub const AUTH_METHOD_GSSAPI: u8 = 0x01;
/// Username/password authentication
pub const AUTH_METHOD_PASSWORD: u8 = 0x02;
/// No acceptable methods
pub const AUTH_METHOD_NOT_ACCEPTABLE: u8 = 0xFF;

/// RFC 1929 success status
pub const AUTH_STATUS_SUCCESS: u8 = 0x00;
/// RFC 1929 failure status
pub const AUTH_STATUS_FAILURE: u8 = 0x01;

// Commands
/// TCP CONNECT command
pub const CMD_CONNECT: u8 = 0x01;
/// TCP BIND command
pub const CMD_BIND: u8 = 0x02;
/// UDP ASSOCIATE command
pub const CMD_UDP_ASSOCIATE: u8 = 0x03;

// Address types
/// IPv4 address
pub const ATYP_IPV4: u8 = 0x01;
/// Fully qualified domain name
pub const ATYP_DOMAIN: u8 = 0x03;
/// IPv6 address
pub const ATYP_IPV6: u8 = 0x04;

/// Reserved byte value, always zero on the wire
pub const RESERVED: u8 = 0x00;

/// Maximum domain name length in a request
pub const MAX_DOMAIN_LEN: usize = 255;

/// Maximum size of a relayed UDP datagram
pub const MAX_UDP_PACKET: usize = 65535;
