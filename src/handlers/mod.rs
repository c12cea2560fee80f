//! Command handlers.
//!
//! Each handler receives the caller's session id and the request argument and
//! returns a [`Response`]. Session state is read and written through the
//! registry; filesystem and credential-store I/O happens outside the registry
//! lock.
//!
//! - **AUTH (`auth.rs`)**
//! - **CD, LS (`navigate.rs`)**
//! - **WHO, KILL, LOGOUT (`sessions.rs`)**

pub mod auth;
pub mod navigate;
pub mod sessions;

use crate::credentials::CredentialStore;
use crate::registry::Registry;
use crate::session::{SessionId, WorkingDirectory};
use std::sync::Arc;

pub const AUTH_GRANTED: &str = "Successful authentication";
pub const AUTH_FAILED: &str = "Unable to log in";
pub const AUTH_REPEATED: &str = "You've been authorised";
pub const KILL_SELF: &str = "You cannot kill your own session";

/// Everything a handler may touch besides the request itself.
#[derive(Debug, Clone)]
pub struct Services {
    pub registry: Arc<Registry>,
    pub credentials: CredentialStore,
    /// Directory a session starts in after AUTH.
    pub root: WorkingDirectory,
}

impl Services {
    pub fn new(registry: Arc<Registry>, credentials: CredentialStore, root: WorkingDirectory) -> Self {
        Self {
            registry,
            credentials,
            root,
        }
    }

    /// Username bound to `id`, if that session is authenticated.
    pub fn username_of(&self, id: SessionId) -> Option<String> {
        self.registry
            .with_session(id, |session| session.username().map(str::to_string))
            .flatten()
    }

    /// Current directory of `id`, if that session is authenticated.
    pub fn cwd_of(&self, id: SessionId) -> Option<WorkingDirectory> {
        self.registry
            .with_session(id, |session| {
                session.identity.as_ref().map(|identity| identity.cwd.clone())
            })
            .flatten()
    }
}

#[cfg(test)]
#[path = "../tests/handlers_tests.rs"]
mod tests;
