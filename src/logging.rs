//! Fire-and-forget log sink.
//!
//! `tracing` events are formatted on the calling task and handed to a bounded
//! channel with `try_send`, so logging never waits on disk or terminal I/O.
//! A background thread writes the lines out. When the channel is full the line
//! is dropped and counted. Dropping the [`LogGuard`] flushes every queued line
//! before returning.

use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

/// Environment variable holding a filter directive, e.g. `termd=debug`.
pub const LOG_ENV: &str = "TERMD_LOG";

/// Lines that may be queued before new ones are dropped.
const QUEUE_DEPTH: usize = 4096;

enum Message {
    Line(Vec<u8>),
    Shutdown,
}

/// `MakeWriter` that feeds the sink channel.
#[derive(Clone)]
pub struct ChannelMakeWriter {
    tx: SyncSender<Message>,
    dropped: Arc<AtomicU64>,
}

/// Buffers one formatted event and enqueues it when dropped.
pub struct LineWriter {
    buf: Vec<u8>,
    tx: SyncSender<Message>,
    dropped: Arc<AtomicU64>,
}

impl Write for LineWriter {
    fn write(&mut self, bytes: &[u8]) -> std::io::Result<usize> {
        self.buf.extend_from_slice(bytes);
        Ok(bytes.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Drop for LineWriter {
    fn drop(&mut self) {
        if self.buf.is_empty() {
            return;
        }
        let line = std::mem::take(&mut self.buf);
        match self.tx.try_send(Message::Line(line)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

impl<'a> MakeWriter<'a> for ChannelMakeWriter {
    type Writer = LineWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LineWriter {
            buf: Vec::new(),
            tx: self.tx.clone(),
            dropped: self.dropped.clone(),
        }
    }
}

impl ChannelMakeWriter {
    /// Number of lines discarded because the queue was full.
    #[cfg(test)]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Flushes and stops the sink thread when dropped.
pub struct LogGuard {
    tx: SyncSender<Message>,
    dropped: Arc<AtomicU64>,
    thread: Option<JoinHandle<()>>,
}

impl Drop for LogGuard {
    fn drop(&mut self) {
        // Blocking send: the marker queues behind every pending line.
        let _ = self.tx.send(Message::Shutdown);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        let dropped = self.dropped.load(Ordering::Relaxed);
        if dropped > 0 {
            eprintln!("[termd] {} log lines dropped", dropped);
        }
    }
}

/// Creates the sink channel without starting the writer thread.
fn channel(depth: usize) -> (ChannelMakeWriter, Receiver<Message>) {
    let (tx, rx) = mpsc::sync_channel(depth);
    let writer = ChannelMakeWriter {
        tx,
        dropped: Arc::new(AtomicU64::new(0)),
    };
    (writer, rx)
}

/// Starts the writer thread draining `rx` into `dest`.
fn start(
    writer: &ChannelMakeWriter,
    rx: Receiver<Message>,
    mut dest: Box<dyn Write + Send>,
) -> Result<LogGuard> {
    let thread = std::thread::Builder::new()
        .name("termd-log".to_string())
        .spawn(move || {
            while let Ok(message) = rx.recv() {
                match message {
                    Message::Line(line) => {
                        let _ = dest.write_all(&line);
                    }
                    Message::Shutdown => break,
                }
            }
            let _ = dest.flush();
        })
        .context("Failed to spawn log writer thread")?;

    Ok(LogGuard {
        tx: writer.tx.clone(),
        dropped: writer.dropped.clone(),
        thread: Some(thread),
    })
}

/// Creates a sink writing to `dest` and returns its writer and guard.
pub fn sink(dest: Box<dyn Write + Send>) -> Result<(ChannelMakeWriter, LogGuard)> {
    let (writer, rx) = channel(QUEUE_DEPTH);
    let guard = start(&writer, rx, dest)?;
    Ok((writer, guard))
}

/// Filter directive for a `-v` count, falling back to the configured level.
pub fn level_for(verbosity: u8, configured: &str) -> String {
    match verbosity {
        0 => configured.to_string(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    }
}

/// Installs the global subscriber. `TERMD_LOG` wins over `level`.
pub fn init(level: &str, file: Option<&Path>) -> Result<LogGuard> {
    let dest: Box<dyn Write + Send> = match file {
        Some(path) => Box::new(
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file: {}", path.display()))?,
        ),
        None => Box::new(std::io::stderr()),
    };

    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_new(level))
        .with_context(|| format!("Invalid log filter: {}", level))?;

    let (writer, guard) = sink(dest)?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(file.is_none())
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to install log subscriber: {}", e))?;

    Ok(guard)
}
