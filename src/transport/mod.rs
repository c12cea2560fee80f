//! Network transports.
//!
//! - **Stream (`stream.rs`)**: TCP, one worker task per connection.
//! - **Datagram (`datagram.rs`)**: UDP, a single event loop with sequencing
//!   and heartbeats.
//!
//! Both run until an administrator `q` or the shutdown signal, then drain the
//! registry.

pub mod datagram;
pub mod stream;

pub use datagram::DatagramServer;
pub use stream::StreamServer;

use anyhow::{Context, Result};
use std::net::SocketAddr;

/// Which transport to serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum TransportKind {
    Tcp,
    Udp,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportKind::Tcp => write!(f, "tcp"),
            TransportKind::Udp => write!(f, "udp"),
        }
    }
}

/// Resolves `host:port` to the first matching socket address.
pub async fn resolve_addr(addr: &str) -> Result<SocketAddr> {
    tokio::net::lookup_host(addr)
        .await
        .with_context(|| format!("Failed to resolve listen address {}", addr))?
        .next()
        .with_context(|| format!("No address found for {}", addr))
}
