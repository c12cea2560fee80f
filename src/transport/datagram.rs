//! UDP transport.
//!
//! A single task owns the socket and serves every peer from one `select!`
//! loop. Each datagram is a whole request prefixed by a sequence number; a
//! request whose number does not exceed the last accepted one for that peer is
//! dropped. Zero-length datagrams are heartbeats: the server sends one to every
//! session on each tick and treats one from a client as proof of life.

use crate::admin::{self, AdminCommand};
use crate::dispatcher::Dispatcher;
use crate::error::ProtocolError;
use crate::protocol::{decode_datagram, encode_datagram_reply, minimal_datagram_reply, Response};
use crate::registry::Registry;
use crate::session::{Session, SessionId};
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{Instant, MissedTickBehavior};

pub struct DatagramServer {
    socket: UdpSocket,
    dispatcher: Dispatcher,
    buffer_size: usize,
    heartbeat: Duration,
    timeout: Duration,
    /// Source address to session. May hold ids of sessions killed elsewhere;
    /// those are checked against the registry before use.
    peers: HashMap<SocketAddr, SessionId>,
}

impl DatagramServer {
    pub async fn bind(
        addr: SocketAddr,
        dispatcher: Dispatcher,
        buffer_size: usize,
        heartbeat: Duration,
        timeout: Duration,
    ) -> Result<Self> {
        let socket = UdpSocket::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;

        Ok(Self {
            socket,
            dispatcher,
            buffer_size,
            heartbeat,
            timeout,
            peers: HashMap::new(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket
            .local_addr()
            .context("Failed to read socket address")
    }

    /// Serves datagrams until `q` from the console or a shutdown signal.
    pub async fn run(
        mut self,
        mut admin_rx: mpsc::Receiver<AdminCommand>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<()> {
        let registry = self.registry().clone();
        // One spare byte exposes datagrams the kernel would otherwise truncate silently.
        let mut buf = vec![0u8; self.buffer_size + 1];
        let mut ticker = tokio::time::interval(self.heartbeat);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        let mut admin_open = true;

        tracing::info!(
            addr = %self.local_addr()?,
            heartbeat_ms = self.heartbeat.as_millis() as u64,
            timeout_ms = self.timeout.as_millis() as u64,
            "datagram transport listening"
        );

        loop {
            tokio::select! {
                received = self.socket.recv_from(&mut buf) => match received {
                    Ok((len, peer)) => self.on_datagram(&buf[..len], peer).await,
                    Err(e) => tracing::warn!("receive failed: {}", e),
                },
                _ = ticker.tick() => self.on_tick().await,
                cmd = admin_rx.recv(), if admin_open => match cmd {
                    Some(cmd) => {
                        if !admin::execute(cmd, &registry).await {
                            break;
                        }
                    }
                    None => admin_open = false,
                },
                _ = shutdown_rx.recv() => {
                    tracing::info!("shutdown signal received");
                    break;
                }
            }
        }

        let drained = registry.drain().await;
        tracing::info!(sessions = drained, "datagram transport stopped");
        Ok(())
    }

    fn registry(&self) -> &Arc<Registry> {
        &self.dispatcher.services().registry
    }

    fn deadline(&self) -> Instant {
        Instant::now() + self.timeout
    }

    /// The live session for `peer`, if any. Forgets ids whose session is gone.
    fn known_session(&mut self, peer: SocketAddr) -> Option<SessionId> {
        let id = *self.peers.get(&peer)?;
        if self.registry().with_session(id, |_| ()).is_some() {
            Some(id)
        } else {
            self.peers.remove(&peer);
            None
        }
    }

    async fn on_datagram(&mut self, payload: &[u8], peer: SocketAddr) {
        if payload.len() > self.buffer_size {
            let err = ProtocolError::LineTooLong(self.buffer_size);
            tracing::warn!(%peer, "datagram rejected: {}", err);
            self.send(minimal_datagram_reply(err.status()).as_bytes(), peer)
                .await;
            return;
        }

        let known = self.known_session(peer);
        let deadline = self.deadline();

        if payload.is_empty() {
            match known {
                Some(id) => {
                    self.registry()
                        .with_session(id, |session| session.refresh(deadline));
                    tracing::trace!(session = %id, "heartbeat received");
                }
                None => tracing::trace!(%peer, "heartbeat from unknown peer ignored"),
            }
            return;
        }

        let id = match known {
            Some(id) => id,
            None => match self
                .registry()
                .allocate(|id| Session::datagram(id, peer, deadline))
            {
                Ok(id) => {
                    tracing::info!(session = %id, %peer, "new datagram peer");
                    self.peers.insert(peer, id);
                    id
                }
                Err(e) => {
                    tracing::warn!(%peer, "datagram dropped: {}", e);
                    return;
                }
            },
        };

        let datagram = match decode_datagram(payload) {
            Ok(datagram) => datagram,
            Err(e) => {
                self.registry()
                    .with_session(id, |session| session.refresh(deadline));
                tracing::info!(session = %id, "bad datagram: {}", e);
                self.send(minimal_datagram_reply(e.status()).as_bytes(), peer)
                    .await;
                return;
            }
        };

        let seq = datagram.seq;
        let accepted = self
            .registry()
            .with_session(id, |session| {
                session.refresh(deadline);
                session.accept_seq(seq)
            })
            .unwrap_or(false);
        if !accepted {
            tracing::debug!(session = %id, seq, "stale datagram ignored");
            return;
        }

        let request = match datagram.request {
            Ok(request) => request,
            Err(e) => {
                tracing::info!(session = %id, seq, "bad request: {}", e);
                let reply = encode_datagram_reply(seq, &Response::empty(e.status()), self.buffer_size);
                self.send(&reply, peer).await;
                return;
            }
        };

        let outcome = self.dispatcher.dispatch(id, &request).await;
        let reply = encode_datagram_reply(seq, &outcome.response, self.buffer_size);
        self.send(&reply, peer).await;

        if outcome.logout {
            self.registry()
                .delete_first_if(|session| session.id == id)
                .await;
            self.peers.remove(&peer);
            tracing::info!(session = %id, "session logged out");
        }
    }

    /// Sends heartbeats and sweeps expired sessions.
    async fn on_tick(&mut self) {
        let mut targets = Vec::new();
        self.registry()
            .find_all(|_| true, |session| targets.push(session.peer));
        for peer in targets {
            self.send(&[], peer).await;
        }

        let now = Instant::now();
        let expired = self
            .registry()
            .delete_all_if(|session| session.is_expired(now))
            .await;
        if expired > 0 {
            tracing::info!(sessions = expired, "expired datagram sessions removed");
            let registry = self.registry().clone();
            self.peers
                .retain(|_, id| registry.with_session(*id, |_| ()).is_some());
        }
    }

    async fn send(&self, bytes: &[u8], peer: SocketAddr) {
        if let Err(e) = self.socket.send_to(bytes, peer).await {
            tracing::debug!(%peer, "send failed: {}", e);
        }
    }
}

#[cfg(test)]
#[path = "../tests/datagram_tests.rs"]
mod tests;
