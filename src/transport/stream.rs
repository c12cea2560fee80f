//! TCP transport.
//!
//! Every accepted connection gets a registry slot and its own worker task. The
//! worker reads one line at a time, dispatches it and writes the framed reply,
//! until hangup, LOGOUT, an over-long line or cancellation by a kill.

use crate::admin::{self, AdminCommand};
use crate::dispatcher::Dispatcher;
use crate::error::ProtocolError;
use crate::protocol::{decode_request, envelope_head, minimal_reply, Body, ChunkedWriter, Response};
use crate::session::worker::cancel_pair;
use crate::session::{CancelSignal, Session, SessionId, WorkerHandle};
use anyhow::{Context, Result};
use std::net::SocketAddr;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::{broadcast, mpsc};

pub struct StreamServer {
    listener: TcpListener,
    dispatcher: Dispatcher,
    buffer_size: usize,
}

/// What the worker does after one request.
#[derive(Debug, PartialEq, Eq)]
enum Step {
    Continue,
    Close,
}

impl StreamServer {
    /// Binds with `SO_REUSEADDR` and starts listening.
    pub fn bind(
        addr: SocketAddr,
        backlog: u32,
        dispatcher: Dispatcher,
        buffer_size: usize,
    ) -> Result<Self> {
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
        .context("Failed to create TCP socket")?;
        socket
            .set_reuseaddr(true)
            .context("Failed to set SO_REUSEADDR")?;
        socket
            .bind(addr)
            .with_context(|| format!("Failed to bind {}", addr))?;
        let listener = socket
            .listen(backlog)
            .with_context(|| format!("Failed to listen on {}", addr))?;

        Ok(Self {
            listener,
            dispatcher,
            buffer_size,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .context("Failed to read listener address")
    }

    /// Accepts connections until `q` from the console or a shutdown signal.
    pub async fn run(
        self,
        mut admin_rx: mpsc::Receiver<AdminCommand>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<()> {
        let registry = self.dispatcher.services().registry.clone();
        let mut admin_open = true;
        tracing::info!(addr = %self.local_addr()?, "stream transport listening");

        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => self.admit(stream, peer),
                    Err(e) => tracing::warn!("accept failed: {}", e),
                },
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
        tracing::info!(sessions = drained, "stream transport stopped");
        Ok(())
    }

    /// Registers a connection and starts its worker, or drops it when full.
    fn admit(&self, stream: TcpStream, peer: SocketAddr) {
        let registry = &self.dispatcher.services().registry;
        let dispatcher = self.dispatcher.clone();
        let buffer_size = self.buffer_size;

        let admitted = registry.allocate(move |id| {
            let (cancel_tx, cancel) = cancel_pair();
            let task = tokio::spawn(serve_connection(id, stream, dispatcher, buffer_size, cancel));
            Session::stream(id, peer, WorkerHandle::new(cancel_tx, task))
        });

        match admitted {
            Ok(id) => tracing::info!(session = %id, %peer, "connection accepted"),
            Err(e) => tracing::warn!(%peer, "connection refused: {}", e),
        }
    }
}

/// Worker loop for one connection. Frees the registry slot on exit.
async fn serve_connection(
    id: SessionId,
    stream: TcpStream,
    dispatcher: Dispatcher,
    buffer_size: usize,
    mut cancel: CancelSignal,
) {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(session = %id, "worker cancelled");
                break;
            }
            step = serve_one(id, &mut reader, &mut writer, &dispatcher, buffer_size) => match step {
                Ok(Step::Continue) => {}
                Ok(Step::Close) => break,
                Err(e) => {
                    tracing::debug!(session = %id, "connection error: {}", e);
                    break;
                }
            },
        }
    }

    let _ = writer.shutdown().await;
    dispatcher.services().registry.release(id);
    tracing::info!(session = %id, "session closed");
}

/// Reads, dispatches and answers one request line.
async fn serve_one<R, W>(
    id: SessionId,
    reader: &mut R,
    writer: &mut W,
    dispatcher: &Dispatcher,
    buffer_size: usize,
) -> std::io::Result<Step>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut line = Vec::with_capacity(buffer_size);
    let read = (&mut *reader)
        .take(buffer_size as u64)
        .read_until(b'\n', &mut line)
        .await?;
    if read == 0 {
        tracing::debug!(session = %id, "peer hung up");
        return Ok(Step::Close);
    }

    if !line.ends_with(b"\n") && read >= buffer_size {
        let err = ProtocolError::LineTooLong(buffer_size);
        tracing::warn!(session = %id, "{}", err);
        writer.write_all(minimal_reply(err.status()).as_bytes()).await?;
        return Ok(Step::Close);
    }

    let request = match decode_request(&line) {
        Ok(request) => request,
        Err(e) => {
            tracing::info!(session = %id, "bad request: {}", e);
            writer.write_all(minimal_reply(e.status()).as_bytes()).await?;
            return Ok(Step::Continue);
        }
    };

    let outcome = dispatcher.dispatch(id, &request).await;
    write_response(writer, &outcome.response, buffer_size).await?;

    Ok(if outcome.logout {
        Step::Close
    } else {
        Step::Continue
    })
}

/// Writes a full envelope: status line, `LENGTH` header, body.
///
/// The length is computed from the finished body before anything is sent;
/// the bytes then go out in chunks of at most `buffer_size`.
pub async fn write_response<W>(
    writer: &mut W,
    response: &Response,
    buffer_size: usize,
) -> std::io::Result<usize>
where
    W: AsyncWrite + Unpin,
{
    let mut out = ChunkedWriter::new(writer, buffer_size);
    out.push_str(&envelope_head(response.status, response.body.stream_len()))
        .await?;
    match &response.body {
        Body::Empty => {}
        Body::Message(msg) if msg.is_empty() => {}
        Body::Message(msg) => {
            out.push_str(msg).await?;
            out.push_str("\r\n").await?;
        }
        Body::Lines(lines) => {
            for line in lines {
                out.push_str(line).await?;
            }
        }
    }
    out.finish().await
}

#[cfg(test)]
#[path = "../tests/stream_tests.rs"]
mod tests;
