//! Username/password authentication (RFC 1929)

use super::Authenticator;
use crate::error::ProxyError;
use crate::socks::consts::*;
use crate::socks::Stream;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Authenticator running the RFC 1929 username/password sub-negotiation
///
/// # Protocol
///
/// Client sends:
/// ```text
/// +----+------+----------+------+----------+
/// |VER | ULEN |  UNAME   | PLEN |  PASSWD  |
/// +----+------+----------+------+----------+
/// | 1  |  1   | 1 to 255 |  1   | 1 to 255 |
/// +----+------+----------+------+----------+
/// ```
///
/// Server responds with `VER | STATUS` where a zero status means success.
pub struct UserPassAuthenticator {
    accounts: HashMap<String, String>,
}

impl UserPassAuthenticator {
    /// Create an authenticator over a username to password table
    pub fn new(accounts: HashMap<String, String>) -> Self {
        UserPassAuthenticator { accounts }
    }

    fn verify(&self, username: &str, password: &str) -> bool {
        match self.accounts.get(username) {
            Some(expected) => constant_time_eq(expected.as_bytes(), password.as_bytes()),
            None => false,
        }
    }
}

#[async_trait]
impl Authenticator for UserPassAuthenticator {
    fn method(&self) -> u8 {
        AUTH_METHOD_PASSWORD
    }

    async fn authenticate(&self, stream: &mut dyn Stream) -> Result<bool, ProxyError> {
        // VER ULEN
        let mut header = [0u8; 2];
        stream.read_exact(&mut header).await?;

        let version = header[0];
        let username_len = header[1] as usize;

        if version != AUTH_SUBNEG_VERSION {
            send_status(stream, AUTH_STATUS_FAILURE).await?;
            return Err(ProxyError::Protocol(format!(
                "invalid auth sub-negotiation version: {version}"
            )));
        }
        if username_len == 0 {
            send_status(stream, AUTH_STATUS_FAILURE).await?;
            return Ok(false);
        }

        let mut username = vec![0u8; username_len];
        stream.read_exact(&mut username).await?;

        let mut len_buf = [0u8; 1];
        stream.read_exact(&mut len_buf).await?;
        let password_len = len_buf[0] as usize;

        if password_len == 0 {
            send_status(stream, AUTH_STATUS_FAILURE).await?;
            return Ok(false);
        }

        let mut password = vec![0u8; password_len];
        stream.read_exact(&mut password).await?;

        let username = String::from_utf8_lossy(&username);
        let password = String::from_utf8_lossy(&password);

        let ok = self.verify(&username, &password);
        let status = if ok {
            AUTH_STATUS_SUCCESS
        } else {
            AUTH_STATUS_FAILURE
        };
        send_status(stream, status).await?;

        if ok {
            tracing::debug!("authenticated user {:?}", username);
        } else {
            tracing::debug!("rejected credentials for user {:?}", username);
        }

        Ok(ok)
    }
}

async fn send_status(stream: &mut dyn Stream, status: u8) -> Result<(), ProxyError> {
    stream.write_all(&[AUTH_SUBNEG_VERSION, status]).await?;
    stream.flush().await?;
    Ok(())
}

/// Compare two byte strings without short-circuiting on the first mismatch
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut acc: u8 = 0;
    for (&x, &y) in a.iter().zip(b.iter()) {
        acc |= x ^ y;
    }
    acc == 0
}
