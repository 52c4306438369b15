//! SOCKS5 reply builder
//!
//! Every command path writes exactly one reply through this module before
//! streaming data or closing.

use crate::error::{ProxyError, ReplyCode};
use crate::socks::consts::*;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Build and send a SOCKS5 reply.
///
/// # Reply Format
///
/// ```text
/// +----+-----+-------+------+----------+----------+
/// |VER | REP |  RSV  | ATYP | BND.ADDR | BND.PORT |
/// +----+-----+-------+------+----------+----------+
/// | 1  |  1  | X'00' |  1   | Variable |    2     |
/// +----+-----+-------+------+----------+----------+
/// ```
///
/// When no socket has been bound yet (every error path) `bind_addr` is
/// `None` and the reply carries `0.0.0.0:0` with the IPv4 address type.
pub async fn send_reply<S>(
    stream: &mut S,
    code: ReplyCode,
    bind_addr: Option<SocketAddr>,
) -> Result<(), ProxyError>
where
    S: AsyncWrite + Unpin,
{
    let bind_addr =
        bind_addr.unwrap_or_else(|| SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0));

    let mut reply = vec![SOCKS5_VERSION, code.into(), RESERVED];

    match bind_addr {
        SocketAddr::V4(addr) => {
            reply.push(ATYP_IPV4);
            reply.extend_from_slice(&addr.ip().octets());
            reply.extend_from_slice(&addr.port().to_be_bytes());
        }
        SocketAddr::V6(addr) => {
            reply.push(ATYP_IPV6);
            reply.extend_from_slice(&addr.ip().octets());
            reply.extend_from_slice(&addr.port().to_be_bytes());
        }
    }

    stream.write_all(&reply).await?;
    stream.flush().await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_reply_success_with_addr() {
        let mut buffer = Vec::new();
        let addr: SocketAddr = "127.0.0.1:1080".parse().unwrap();

        send_reply(&mut buffer, ReplyCode::Success, Some(addr))
            .await
            .unwrap();

        assert_eq!(buffer, [5, 0, 0, 1, 127, 0, 0, 1, 0x04, 0x38]);
    }

    #[tokio::test]
    async fn test_send_reply_error_defaults_to_zero_addr() {
        let mut buffer = Vec::new();

        send_reply(&mut buffer, ReplyCode::ConnectionRefused, None)
            .await
            .unwrap();

        assert_eq!(buffer, [5, 5, 0, 1, 0, 0, 0, 0, 0, 0]);
    }

    #[tokio::test]
    async fn test_send_reply_ipv6() {
        let mut buffer = Vec::new();
        let addr: SocketAddr = "[::1]:443".parse().unwrap();

        send_reply(&mut buffer, ReplyCode::Success, Some(addr))
            .await
            .unwrap();

        assert_eq!(buffer.len(), 3 + 1 + 16 + 2);
        assert_eq!(buffer[3], ATYP_IPV6);
        assert_eq!(&buffer[20..22], &443u16.to_be_bytes());
    }

    #[tokio::test]
    async fn test_send_reply_all_codes() {
        for byte in 0x00u8..=0x08 {
            let code = ReplyCode::try_from(byte).unwrap();
            let mut buffer = Vec::new();
            send_reply(&mut buffer, code, None).await.unwrap();
            assert_eq!(buffer[1], byte);
        }
    }
}
