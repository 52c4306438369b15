//! # socksd - a SOCKS5 proxy server
//!
//! An RFC 1928 compliant SOCKS5 server with username/password
//! authentication (RFC 1929) and all three command paths: CONNECT, BIND
//! and UDP ASSOCIATE.
//!
//! ## Features
//!
//! - **Method negotiation** with a pluggable authenticator registry
//! - **CONNECT** with configurable dial timeout and failure-to-reply-code
//!   mapping
//! - **BIND** with the RFC's two-reply accept sequence
//! - **UDP ASSOCIATE** with a demultiplexing datagram relay whose lifetime
//!   is tied to the TCP control connection
//! - **Graceful shutdown** that drains in-flight sessions under a deadline
//!
//! ## Usage
//!
//! ```rust,ignore
//! use socksd::config::load_config;
//! use socksd::socks::Server;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config("config.toml")?;
//!     let server = Arc::new(Server::new(&config));
//!     server.clone().listen_and_serve().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod error;
pub mod resolver;
pub mod socks;

// Re-export commonly used items
pub use config::{load_config, Config};
pub use error::{ProxyError, ReplyCode};
pub use socks::Server;

/// Version of the socksd crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the application
pub const NAME: &str = env!("CARGO_PKG_NAME");
