//! Shared fixtures for unit and transport tests.

use crate::credentials::CredentialStore;
use crate::dispatcher::Dispatcher;
use crate::handlers::Services;
use crate::registry::Registry;
use crate::session::{Session, SessionId, WorkingDirectory};
use std::net::SocketAddr;
use std::sync::Arc;
use tempfile::{NamedTempFile, TempDir};
use tokio::time::Instant;

pub const ACCOUNTS: &str = "alice secret 1\nroot toor 2\nbob builder 1\n";

/// A temporary root tree plus credential store wired into [`Services`].
pub struct Fixture {
    pub root: TempDir,
    pub accounts: NamedTempFile,
    pub services: Services,
}

impl Fixture {
    pub async fn new() -> Self {
        Self::with_registry(Registry::default()).await
    }

    pub async fn with_registry(registry: Registry) -> Self {
        let root = TempDir::new().unwrap();
        std::fs::create_dir_all(root.path().join("docs/archive")).unwrap();
        std::fs::create_dir(root.path().join("music")).unwrap();
        std::fs::write(root.path().join("notes.txt"), "hello").unwrap();
        std::fs::write(root.path().join(".hidden"), "secret").unwrap();

        let accounts = NamedTempFile::new().unwrap();
        std::fs::write(accounts.path(), ACCOUNTS).unwrap();

        let services = Services::new(
            Arc::new(registry),
            CredentialStore::new(accounts.path()),
            WorkingDirectory::open_root(root.path()).await.unwrap(),
        );
        Self {
            root,
            accounts,
            services,
        }
    }

    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(self.services.clone())
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.services.registry
    }

    /// Registers a fresh unauthenticated session.
    pub fn connect(&self) -> SessionId {
        self.registry()
            .allocate(|id| Session::datagram(id, peer(), Instant::now()))
            .unwrap()
    }
}

pub fn peer() -> SocketAddr {
    "127.0.0.1:40000".parse().unwrap()
}
