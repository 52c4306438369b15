//! UDP datagram encapsulation
//!
//! Every datagram on the relay socket carries a SOCKS5 header in front of
//! the payload:
//!
//! ```text
//! +----+------+------+----------+----------+----------+
//! |RSV | FRAG | ATYP | DST.ADDR | DST.PORT |   DATA   |
//! +----+------+------+----------+----------+----------+
//! | 2  |  1   |  1   | Variable |    2     | Variable |
//! +----+------+------+----------+----------+----------+
//! ```

use crate::error::ProxyError;
use crate::socks::consts::*;
use crate::socks::types::AddrSpec;
use bytes::{Buf, BufMut, BytesMut};
use std::net::{Ipv4Addr, Ipv6Addr};

/// A decoded UDP header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UdpFrame {
    /// Fragment number, zero for standalone datagrams
    pub frag: u8,
    /// Destination (client to target) or source (target to client)
    pub dest: AddrSpec,
    /// Length of the header prefix; the payload starts here
    pub header_len: usize,
}

impl UdpFrame {
    /// Whether this datagram is part of a fragmented sequence
    pub fn is_fragmented(&self) -> bool {
        self.frag != 0
    }
}

/// Parse the header of a relayed UDP datagram.
///
/// The payload is `&data[frame.header_len..]`; callers needing the raw
/// header prefix take `&data[..frame.header_len]`.
pub fn parse_udp_frame(data: &[u8]) -> Result<UdpFrame, ProxyError> {
    if data.len() < 4 {
        return Err(ProxyError::Protocol(format!(
            "UDP datagram too short: {} bytes",
            data.len()
        )));
    }

    let mut buf = data;

    let rsv = buf.get_u16();
    if rsv != 0 {
        return Err(ProxyError::Protocol(format!(
            "non-zero RSV in UDP header: {rsv}"
        )));
    }

    let frag = buf.get_u8();
    let atyp = buf.get_u8();

    let dest = match atyp {
        ATYP_IPV4 => {
            if buf.len() < 6 {
                return Err(ProxyError::Protocol("truncated IPv4 address".to_string()));
            }
            let ip = Ipv4Addr::new(buf[0], buf[1], buf[2], buf[3]);
            buf.advance(4);
            let port = buf.get_u16();
            AddrSpec::ipv4(ip, port)
        }

        ATYP_DOMAIN => {
            if buf.is_empty() {
                return Err(ProxyError::Protocol("missing domain length".to_string()));
            }
            let len = buf.get_u8() as usize;
            if len == 0 || buf.len() < len + 2 {
                return Err(ProxyError::Protocol("truncated domain name".to_string()));
            }
            let domain = String::from_utf8(buf[..len].to_vec())
                .map_err(|_| ProxyError::Protocol("invalid UTF-8 in domain name".to_string()))?;
            buf.advance(len);
            let port = buf.get_u16();
            AddrSpec::fqdn(domain, port)
        }

        ATYP_IPV6 => {
            if buf.len() < 18 {
                return Err(ProxyError::Protocol("truncated IPv6 address".to_string()));
            }
            let mut octets = [0u8; 16];
            octets.copy_from_slice(&buf[..16]);
            buf.advance(16);
            let port = buf.get_u16();
            AddrSpec::ipv6(Ipv6Addr::from(octets), port)
        }

        other => return Err(ProxyError::AddressTypeNotSupported(other)),
    };

    Ok(UdpFrame {
        frag,
        dest,
        header_len: data.len() - buf.len(),
    })
}

/// Encode a UDP datagram with its header prefix
pub fn encode_udp_frame(dest: &AddrSpec, payload: &[u8]) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(4 + payload.len());
    buf.put_u16(0);
    buf.put_u8(0);
    buf.extend_from_slice(&dest.to_bytes());
    buf.extend_from_slice(payload);
    buf.to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_udp_frame_ipv4() {
        let dest = AddrSpec::ipv4(Ipv4Addr::new(10, 0, 0, 1), 53);
        let encoded = encode_udp_frame(&dest, b"query");

        assert_eq!(&encoded[0..2], &[0, 0]);
        assert_eq!(encoded[2], 0);
        assert_eq!(encoded[3], ATYP_IPV4);
        assert_eq!(&encoded[4..8], &[10, 0, 0, 1]);
        assert_eq!(&encoded[8..10], &53u16.to_be_bytes());
        assert_eq!(&encoded[10..], b"query");
    }

    #[test]
    fn test_parse_udp_frame_round_trip_ipv4() {
        let dest = AddrSpec::ipv4(Ipv4Addr::new(192, 168, 1, 100), 9999);
        let encoded = encode_udp_frame(&dest, b"payload");

        let frame = parse_udp_frame(&encoded).unwrap();
        assert_eq!(frame.frag, 0);
        assert_eq!(frame.dest, dest);
        assert_eq!(frame.header_len, 10);
        assert_eq!(&encoded[frame.header_len..], b"payload");
    }

    #[test]
    fn test_parse_udp_frame_round_trip_fqdn() {
        let dest = AddrSpec::fqdn("example.org".to_string(), 8080);
        let encoded = encode_udp_frame(&dest, b"content");

        let frame = parse_udp_frame(&encoded).unwrap();
        assert_eq!(frame.dest, dest);
        assert_eq!(frame.header_len, 4 + 1 + 11 + 2);
        assert_eq!(&encoded[frame.header_len..], b"content");
    }

    #[test]
    fn test_parse_udp_frame_round_trip_ipv6() {
        let dest = AddrSpec::ipv6(Ipv6Addr::LOCALHOST, 443);
        let encoded = encode_udp_frame(&dest, b"x");

        let frame = parse_udp_frame(&encoded).unwrap();
        assert_eq!(frame.dest, dest);
        assert_eq!(frame.header_len, 4 + 16 + 2);
    }

    #[test]
    fn test_parse_udp_frame_fragment_flag() {
        let dest = AddrSpec::ipv4(Ipv4Addr::LOCALHOST, 80);
        let mut encoded = encode_udp_frame(&dest, b"data");
        encoded[2] = 1;

        let frame = parse_udp_frame(&encoded).unwrap();
        assert!(frame.is_fragmented());
    }

    #[test]
    fn test_parse_udp_frame_too_short() {
        assert!(parse_udp_frame(&[0, 0, 0]).is_err());
    }

    #[test]
    fn test_parse_udp_frame_nonzero_rsv() {
        let dest = AddrSpec::ipv4(Ipv4Addr::LOCALHOST, 80);
        let mut encoded = encode_udp_frame(&dest, b"data");
        encoded[0] = 1;

        assert!(parse_udp_frame(&encoded).is_err());
    }

    #[test]
    fn test_parse_udp_frame_unknown_atyp() {
        let err = parse_udp_frame(&[0, 0, 0, 0x02, 1, 2, 3, 4, 0, 80]).unwrap_err();
        assert!(matches!(err, ProxyError::AddressTypeNotSupported(0x02)));
    }

    #[test]
    fn test_parse_udp_frame_truncated_ipv4() {
        assert!(parse_udp_frame(&[0, 0, 0, ATYP_IPV4, 127, 0]).is_err());
    }
}
