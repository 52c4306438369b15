//! SOCKS5 authentication
//!
//! Method negotiation plus the authenticator registry. The registry maps a
//! method code to the object that runs its sub-negotiation and is built
//! once at server construction.

mod none;
mod password;

pub use none::NoAuthAuthenticator;
pub use password::UserPassAuthenticator;

use super::consts::*;
use super::Stream;
use crate::config::Config;
use crate::error::ProxyError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

/// Capability interface for a single authentication method
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// The method code this authenticator serves
    fn method(&self) -> u8;

    /// Run the method's sub-negotiation on the client stream.
    ///
    /// Returns `Ok(true)` when the client may proceed to the request phase
    /// and `Ok(false)` when the exchange completed but rejected the client.
    /// I/O failures surface as errors.
    async fn authenticate(&self, stream: &mut dyn Stream) -> Result<bool, ProxyError>;
}

/// Registry of enabled authenticators keyed by method code
pub struct AuthRegistry {
    methods: HashMap<u8, Arc<dyn Authenticator>>,
}

impl AuthRegistry {
    /// Build the registry from the configured method list.
    ///
    /// Method names are handled in first-occurrence order; duplicates and
    /// unknown names have already been filtered by the configuration.
    /// `gss_api` is a recognized name without a shipped implementation and
    /// is skipped with a warning.
    pub fn from_config(config: &Config) -> Self {
        let mut methods: HashMap<u8, Arc<dyn Authenticator>> = HashMap::new();

        for name in config.enabled_auth_methods() {
            match name {
                "no_required" => {
                    methods
                        .entry(AUTH_METHOD_NONE)
                        .or_insert_with(|| Arc::new(NoAuthAuthenticator));
                }
                "username_password" => {
                    methods.entry(AUTH_METHOD_PASSWORD).or_insert_with(|| {
                        Arc::new(UserPassAuthenticator::new(
                            config
                                .credentials
                                .iter()
                                .map(|a| (a.username.clone(), a.password.clone()))
                                .collect(),
                        ))
                    });
                }
                "gss_api" => {
                    warn!("gss_api authentication is not implemented, skipping");
                }
                other => {
                    debug!("unknown auth method {:?}, skipping", other);
                }
            }
        }

        if methods.is_empty() {
            warn!("no usable authentication methods enabled, all clients will be rejected");
        }

        AuthRegistry { methods }
    }

    /// Look up the authenticator for a method code
    pub fn get(&self, method: u8) -> Option<&Arc<dyn Authenticator>> {
        self.methods.get(&method)
    }

    /// Whether a method code is enabled
    pub fn contains(&self, method: u8) -> bool {
        self.methods.contains_key(&method)
    }

    /// Number of enabled methods
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    /// Whether no methods are enabled
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

/// Run method negotiation and the selected sub-negotiation.
///
/// Reads the client greeting, picks the first method in the client's list
/// that is enabled in the registry, acknowledges it and invokes the
/// authenticator. When no advertised method is acceptable the reply byte
/// is `0xFF` and the session ends.
///
/// Exactly one method-select reply is written before any authentication
/// bytes flow.
pub async fn negotiate<S>(stream: &mut S, registry: &AuthRegistry) -> Result<u8, ProxyError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    // VER NMETHODS, then exactly NMETHODS method bytes
    let mut header = [0u8; 2];
    stream.read_exact(&mut header).await?;

    let version = header[0];
    let num_methods = header[1];

    if version != SOCKS5_VERSION {
        return Err(ProxyError::Protocol(format!(
            "unsupported SOCKS version in greeting: {version}"
        )));
    }
    if num_methods == 0 {
        return Err(ProxyError::Protocol(
            "no authentication methods offered".to_string(),
        ));
    }

    let mut methods = vec![0u8; num_methods as usize];
    stream.read_exact(&mut methods).await?;

    // First client-offered method the registry knows wins
    let selected = methods.iter().copied().find(|m| registry.contains(*m));

    let Some(method) = selected else {
        stream
            .write_all(&[SOCKS5_VERSION, AUTH_METHOD_NOT_ACCEPTABLE])
            .await?;
        stream.flush().await?;
        return Err(ProxyError::NoAcceptableMethod);
    };

    stream.write_all(&[SOCKS5_VERSION, method]).await?;
    stream.flush().await?;

    let authenticator = registry
        .get(method)
        .ok_or_else(|| ProxyError::Protocol("selected method vanished".to_string()))?;

    if !authenticator.authenticate(stream).await? {
        return Err(ProxyError::AuthFailed);
    }

    Ok(method)
}
