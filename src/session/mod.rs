//! Per-client session state.
//!
//! A session is created when a connection is accepted (stream transport) or when
//! the first datagram arrives from a new address (datagram transport). It lives in
//! a [`crate::registry::Registry`] slot until logout, kill, hangup or expiry.
//!
//! - **Session (`mod.rs`)**: identity, privilege and transport link.
//! - **Working directory (`workdir.rs`)**: the rooted directory handle used by CD and LS.
//! - **Worker (`worker.rs`)**: cancellation and join handle for stream workers.

pub mod workdir;
pub mod worker;

pub use workdir::WorkingDirectory;
pub use worker::{CancelSignal, WorkerHandle};

use chrono::{DateTime, Utc};
use std::net::SocketAddr;
use tokio::time::Instant;

/// Registry-assigned session identifier, unique among occupied slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Access level granted by AUTH.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Privilege {
    #[default]
    None = 0,
    Regular = 1,
    Super = 2,
}

impl Privilege {
    /// Maps a credential-store digit onto a privilege; unknown digits grant nothing.
    pub fn from_digit(digit: char) -> Privilege {
        match digit {
            '1' => Privilege::Regular,
            '2' => Privilege::Super,
            _ => Privilege::None,
        }
    }

    pub fn as_digit(&self) -> u8 {
        *self as u8
    }
}

impl std::fmt::Display for Privilege {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Privilege::None => write!(f, "none"),
            Privilege::Regular => write!(f, "regular"),
            Privilege::Super => write!(f, "super"),
        }
    }
}

/// State bound to a session by a successful AUTH.
#[derive(Debug, Clone)]
pub struct Identity {
    pub username: String,
    pub privilege: Privilege,
    pub cwd: WorkingDirectory,
}

/// Transport-specific part of a session.
#[derive(Debug)]
pub enum Link {
    /// Stream connection served by its own worker task.
    Stream(WorkerHandle),
    /// Datagram peer tracked by the event loop.
    Datagram { last_seq: u32, deadline: Instant },
}

#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    pub peer: SocketAddr,
    pub connected_at: DateTime<Utc>,
    /// Present iff the session has authenticated.
    pub identity: Option<Identity>,
    pub link: Link,
}

impl Session {
    pub fn stream(id: SessionId, peer: SocketAddr, worker: WorkerHandle) -> Self {
        Self::with_link(id, peer, Link::Stream(worker))
    }

    pub fn datagram(id: SessionId, peer: SocketAddr, deadline: Instant) -> Self {
        Self::with_link(
            id,
            peer,
            Link::Datagram {
                last_seq: 0,
                deadline,
            },
        )
    }

    fn with_link(id: SessionId, peer: SocketAddr, link: Link) -> Self {
        Self {
            id,
            peer,
            connected_at: Utc::now(),
            identity: None,
            link,
        }
    }

    pub fn privilege(&self) -> Privilege {
        self.identity
            .as_ref()
            .map_or(Privilege::None, |identity| identity.privilege)
    }

    pub fn username(&self) -> Option<&str> {
        self.identity
            .as_ref()
            .map(|identity| identity.username.as_str())
    }

    pub fn is_authenticated(&self) -> bool {
        self.privilege() > Privilege::None
    }

    /// Whether a worker task must be joined before this session's slot is reused.
    pub fn has_worker(&self) -> bool {
        matches!(self.link, Link::Stream(_))
    }

    /// Accepts `seq` if it is newer than the last accepted one.
    ///
    /// Stream sessions have no sequencing and always accept.
    pub fn accept_seq(&mut self, seq: u32) -> bool {
        match &mut self.link {
            Link::Stream(_) => true,
            Link::Datagram { last_seq, .. } if seq > *last_seq => {
                *last_seq = seq;
                true
            }
            Link::Datagram { .. } => false,
        }
    }

    /// Pushes the liveness deadline of a datagram session out to `deadline`.
    pub fn refresh(&mut self, new_deadline: Instant) {
        if let Link::Datagram { deadline, .. } = &mut self.link {
            *deadline = new_deadline;
        }
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        match &self.link {
            Link::Stream(_) => false,
            Link::Datagram { deadline, .. } => now >= *deadline,
        }
    }

    /// Tears the session down, cancelling and joining its worker if it has one.
    pub async fn close(self) {
        if let Link::Stream(worker) = self.link {
            worker.cancel_and_join().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn peer() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    #[test]
    fn test_privilege_from_digit() {
        assert_eq!(Privilege::from_digit('1'), Privilege::Regular);
        assert_eq!(Privilege::from_digit('2'), Privilege::Super);
        assert_eq!(Privilege::from_digit('0'), Privilege::None);
        assert_eq!(Privilege::from_digit('7'), Privilege::None);
        assert_eq!(Privilege::Super.as_digit(), 2);
    }

    #[test]
    fn test_privilege_ordering() {
        assert!(Privilege::Super > Privilege::Regular);
        assert!(Privilege::Regular > Privilege::None);
    }

    #[tokio::test]
    async fn test_new_session_is_unauthenticated() {
        let session = Session::datagram(SessionId(1), peer(), Instant::now());
        assert_eq!(session.privilege(), Privilege::None);
        assert_eq!(session.username(), None);
        assert!(!session.is_authenticated());
        assert!(!session.has_worker());
    }

    #[tokio::test]
    async fn test_accept_seq_strictly_increasing() {
        let mut session = Session::datagram(SessionId(1), peer(), Instant::now());
        assert!(session.accept_seq(2));
        assert!(!session.accept_seq(1));
        assert!(!session.accept_seq(2));
        assert!(session.accept_seq(3));
    }

    #[tokio::test]
    async fn test_expiry_follows_deadline() {
        let start = Instant::now();
        let mut session = Session::datagram(SessionId(1), peer(), start + Duration::from_secs(8));
        assert!(!session.is_expired(start));
        assert!(session.is_expired(start + Duration::from_secs(8)));

        session.refresh(start + Duration::from_secs(20));
        assert!(!session.is_expired(start + Duration::from_secs(10)));
    }
}
