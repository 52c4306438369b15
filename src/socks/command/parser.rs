//! SOCKS5 request parser
//!
//! Decodes the command request the client sends after authentication.

use crate::error::ProxyError;
use crate::socks::consts::*;
use crate::socks::types::{AddrSpec, Request, SocksCommand};
use std::net::{Ipv4Addr, Ipv6Addr};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Parse a SOCKS5 request from the stream.
///
/// # Request Format
///
/// ```text
/// +----+-----+-------+------+----------+----------+
/// |VER | CMD |  RSV  | ATYP | DST.ADDR | DST.PORT |
/// +----+-----+-------+------+----------+----------+
/// | 1  |  1  | X'00' |  1   | Variable |    2     |
/// +----+-----+-------+------+----------+----------+
/// ```
///
/// An unknown command or address type byte is reported with its own error
/// variant so the caller can map it to the matching reply code.
pub async fn parse_request<S>(stream: &mut S) -> Result<Request, ProxyError>
where
    S: AsyncRead + Unpin,
{
    // VER CMD RSV ATYP
    let mut header = [0u8; 4];
    stream.read_exact(&mut header).await?;

    let version = header[0];
    let cmd_byte = header[1];
    let _reserved = header[2];
    let atyp = header[3];

    if version != SOCKS5_VERSION {
        return Err(ProxyError::Protocol(format!(
            "unsupported SOCKS version in request: {version}"
        )));
    }

    let command =
        SocksCommand::from_byte(cmd_byte).ok_or(ProxyError::CommandNotSupported(cmd_byte))?;

    let dest = parse_addr(stream, atyp).await?;

    Ok(Request { command, dest })
}

/// Parse the `ATYP`-tagged address portion of a request
async fn parse_addr<S>(stream: &mut S, atyp: u8) -> Result<AddrSpec, ProxyError>
where
    S: AsyncRead + Unpin,
{
    match atyp {
        ATYP_IPV4 => {
            let mut addr = [0u8; 4];
            stream.read_exact(&mut addr).await?;
            let port = read_port(stream).await?;
            Ok(AddrSpec::ipv4(Ipv4Addr::from(addr), port))
        }

        ATYP_DOMAIN => {
            let mut len_buf = [0u8; 1];
            stream.read_exact(&mut len_buf).await?;
            let domain_len = len_buf[0] as usize;

            if domain_len == 0 {
                return Err(ProxyError::Protocol("empty domain name".to_string()));
            }

            let mut domain_buf = vec![0u8; domain_len];
            stream.read_exact(&mut domain_buf).await?;
            let domain = String::from_utf8(domain_buf)
                .map_err(|_| ProxyError::Protocol("invalid UTF-8 in domain name".to_string()))?;

            let port = read_port(stream).await?;
            Ok(AddrSpec::fqdn(domain, port))
        }

        ATYP_IPV6 => {
            let mut addr = [0u8; 16];
            stream.read_exact(&mut addr).await?;
            let port = read_port(stream).await?;
            Ok(AddrSpec::ipv6(Ipv6Addr::from(addr), port))
        }

        other => Err(ProxyError::AddressTypeNotSupported(other)),
    }
}

async fn read_port<S>(stream: &mut S) -> Result<u16, ProxyError>
where
    S: AsyncRead + Unpin,
{
    let mut port_buf = [0u8; 2];
    stream.read_exact(&mut port_buf).await?;
    Ok(u16::from_be_bytes(port_buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn request_bytes(cmd: u8, atyp: u8, addr: &[u8], port: u16) -> Vec<u8> {
        let mut req = vec![SOCKS5_VERSION, cmd, RESERVED, atyp];
        req.extend_from_slice(addr);
        req.extend_from_slice(&port.to_be_bytes());
        req
    }

    #[tokio::test]
    async fn test_parse_request_ipv4() {
        let req = request_bytes(CMD_CONNECT, ATYP_IPV4, &[192, 168, 1, 1], 8080);
        let mut cursor = Cursor::new(req);

        let parsed = parse_request(&mut cursor).await.unwrap();
        assert_eq!(parsed.command, SocksCommand::Connect);
        assert_eq!(
            parsed.dest,
            AddrSpec::ipv4(Ipv4Addr::new(192, 168, 1, 1), 8080)
        );
    }

    #[tokio::test]
    async fn test_parse_request_ipv6() {
        let octets = Ipv6Addr::LOCALHOST.octets();
        let req = request_bytes(CMD_CONNECT, ATYP_IPV6, &octets, 443);
        let mut cursor = Cursor::new(req);

        let parsed = parse_request(&mut cursor).await.unwrap();
        assert_eq!(parsed.dest, AddrSpec::ipv6(Ipv6Addr::LOCALHOST, 443));
    }

    #[tokio::test]
    async fn test_parse_request_fqdn_localhost() {
        let mut addr = vec![9u8];
        addr.extend_from_slice(b"localhost");
        let req = request_bytes(CMD_CONNECT, ATYP_DOMAIN, &addr, 0x0438);
        let mut cursor = Cursor::new(req);

        let parsed = parse_request(&mut cursor).await.unwrap();
        assert_eq!(parsed.dest, AddrSpec::fqdn("localhost".to_string(), 1080));
    }

    #[tokio::test]
    async fn test_parse_request_bind() {
        let req = request_bytes(CMD_BIND, ATYP_IPV4, &[127, 0, 0, 1], 80);
        let mut cursor = Cursor::new(req);

        let parsed = parse_request(&mut cursor).await.unwrap();
        assert_eq!(parsed.command, SocksCommand::Bind);
    }

    #[tokio::test]
    async fn test_parse_request_wrong_version() {
        let mut req = request_bytes(CMD_CONNECT, ATYP_IPV4, &[127, 0, 0, 1], 80);
        req[0] = 4;
        let mut cursor = Cursor::new(req);

        let err = parse_request(&mut cursor).await.unwrap_err();
        assert!(matches!(err, ProxyError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_parse_request_unknown_command() {
        let req = request_bytes(0x09, ATYP_IPV4, &[127, 0, 0, 1], 80);
        let mut cursor = Cursor::new(req);

        let err = parse_request(&mut cursor).await.unwrap_err();
        assert!(matches!(err, ProxyError::CommandNotSupported(0x09)));
    }

    #[tokio::test]
    async fn test_parse_request_reserved_atyp() {
        // 0x02 is reserved and must be rejected as an address type error
        let req = request_bytes(CMD_CONNECT, 0x02, &[127, 0, 0, 1], 80);
        let mut cursor = Cursor::new(req);

        let err = parse_request(&mut cursor).await.unwrap_err();
        assert!(matches!(err, ProxyError::AddressTypeNotSupported(0x02)));
    }

    #[tokio::test]
    async fn test_parse_request_empty_domain() {
        let req = request_bytes(CMD_CONNECT, ATYP_DOMAIN, &[0u8], 80);
        let mut cursor = Cursor::new(req);

        let err = parse_request(&mut cursor).await.unwrap_err();
        assert!(matches!(err, ProxyError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_parse_request_short_read() {
        let mut cursor = Cursor::new(vec![SOCKS5_VERSION, CMD_CONNECT, RESERVED]);
        let err = parse_request(&mut cursor).await.unwrap_err();
        assert!(matches!(err, ProxyError::Io(_)));
    }
}
