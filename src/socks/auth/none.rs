//! No-authentication handler

use super::Authenticator;
use crate::error::ProxyError;
use crate::socks::consts::AUTH_METHOD_NONE;
use crate::socks::Stream;
use async_trait::async_trait;

/// Authenticator for the "no authentication required" method.
///
/// Accepts every client without touching the stream.
pub struct NoAuthAuthenticator;

#[async_trait]
impl Authenticator for NoAuthAuthenticator {
    fn method(&self) -> u8 {
        AUTH_METHOD_NONE
    }

    async fn authenticate(&self, _stream: &mut dyn Stream) -> Result<bool, ProxyError> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn test_no_auth_accepts_without_io() {
        let mut stream = Cursor::new(Vec::new());
        let ok = NoAuthAuthenticator
            .authenticate(&mut stream)
            .await
            .unwrap();
        assert!(ok);
        assert!(stream.get_ref().is_empty());
    }

    #[test]
    fn test_no_auth_method_code() {
        assert_eq!(NoAuthAuthenticator.method(), AUTH_METHOD_NONE);
    }
}
