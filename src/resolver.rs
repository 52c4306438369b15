//! Pluggable name resolution
//!
//! FQDN targets in requests and UDP headers go through the process-wide
//! resolver. Tests can swap in a fake before any session starts.

use async_trait::async_trait;
use lazy_static::lazy_static;
use std::io;
use std::net::IpAddr;
use std::sync::{Arc, RwLock};

/// Name lookup capability used for FQDN address types
#[async_trait]
pub trait NameResolver: Send + Sync {
    /// Resolve a host name to its addresses, preserving lookup order
    async fn lookup(&self, host: &str) -> io::Result<Vec<IpAddr>>;
}

/// Resolver backed by the operating system via `tokio::net::lookup_host`
pub struct SystemResolver;

#[async_trait]
impl NameResolver for SystemResolver {
    async fn lookup(&self, host: &str) -> io::Result<Vec<IpAddr>> {
        let addrs = tokio::net::lookup_host((host, 0u16)).await?;
        Ok(addrs.map(|addr| addr.ip()).collect())
    }
}

lazy_static! {
    static ref RESOLVER: RwLock<Arc<dyn NameResolver>> = RwLock::new(Arc::new(SystemResolver));
}

/// Get the process-wide resolver
pub fn resolver() -> Arc<dyn NameResolver> {
    match RESOLVER.read() {
        Ok(guard) => Arc::clone(&guard),
        Err(poisoned) => Arc::clone(&poisoned.into_inner()),
    }
}

/// Replace the process-wide resolver.
///
/// Only valid before any session starts; swapping mid-flight leaves
/// in-flight lookups on the previous resolver.
pub fn set_resolver(new: Arc<dyn NameResolver>) {
    match RESOLVER.write() {
        Ok(mut guard) => *guard = new,
        Err(poisoned) => *poisoned.into_inner() = new,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    struct FixedResolver(IpAddr);

    #[async_trait]
    impl NameResolver for FixedResolver {
        async fn lookup(&self, _host: &str) -> io::Result<Vec<IpAddr>> {
            Ok(vec![self.0])
        }
    }

    #[tokio::test]
    async fn test_system_resolver_localhost() {
        let ips = SystemResolver.lookup("localhost").await.unwrap();
        assert!(!ips.is_empty());
        assert!(ips.iter().all(|ip| ip.is_loopback()));
    }

    #[tokio::test]
    async fn test_fixed_resolver_lookup() {
        let fixed = FixedResolver(IpAddr::V4(Ipv4Addr::new(10, 1, 2, 3)));
        let ips = fixed.lookup("anything.example").await.unwrap();
        assert_eq!(ips, vec![IpAddr::V4(Ipv4Addr::new(10, 1, 2, 3))]);
    }
}
