//! Administrator console on standard input.
//!
//! Recognized lines: `q` (shut down), `status` (list sessions) and `k <id>`
//! (kill a session). Commands are forwarded to the running transport, which
//! executes them between network events.

use crate::registry::Registry;
use crate::session::SessionId;
use std::fmt::Write as _;
use std::io::{self, BufRead};
use std::thread::{self, JoinHandle};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminCommand {
    Quit,
    Status,
    Kill(SessionId),
}

impl AdminCommand {
    pub fn parse(line: &str) -> Option<AdminCommand> {
        let line = line.trim();
        match line {
            "q" => Some(AdminCommand::Quit),
            "status" => Some(AdminCommand::Status),
            _ => {
                let id = line.strip_prefix("k ")?.trim().parse().ok()?;
                Some(AdminCommand::Kill(SessionId(id)))
            }
        }
    }
}

/// Reads console lines from stdin and forwards parsed commands.
///
/// Runs on a plain thread: a blocked stdin read must not keep the runtime
/// from shutting down. End of input stops the reader but not the server.
pub fn spawn_console(tx: mpsc::Sender<AdminCommand>) -> io::Result<JoinHandle<()>> {
    spawn_console_from(io::BufReader::new(io::stdin()), tx)
}

pub fn spawn_console_from<R>(input: R, tx: mpsc::Sender<AdminCommand>) -> io::Result<JoinHandle<()>>
where
    R: BufRead + Send + 'static,
{
    thread::Builder::new()
        .name("termd-console".to_string())
        .spawn(move || {
            for line in input.lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        tracing::warn!("console read failed: {}", e);
                        return;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                match AdminCommand::parse(&line) {
                    Some(cmd) => {
                        if tx.blocking_send(cmd).is_err() {
                            return;
                        }
                    }
                    None => tracing::warn!(input = %line.trim(), "unknown console command"),
                }
            }
            tracing::debug!("console input closed");
        })
}

/// Renders the `status` listing.
pub fn status_report(registry: &Registry) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Online sessions: {}", registry.current_count());
    let _ = writeln!(out, "Served sessions for all time: {}", registry.total_issued());

    registry.find_all(
        |_| true,
        |session| {
            let _ = writeln!(out, "--");
            let _ = writeln!(out, "id: {}", session.id);
            let _ = writeln!(out, "address: {}", session.peer);
            let _ = writeln!(
                out,
                "connected: {}",
                session.connected_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
            match &session.identity {
                Some(identity) => {
                    let _ = writeln!(out, "username: {}", identity.username);
                    let _ = writeln!(out, "privilege: {}", identity.privilege);
                    let _ = writeln!(out, "cwd: {}", identity.cwd.display_path());
                }
                None => {
                    let _ = writeln!(out, "not authorised");
                }
            }
        },
    );
    out
}

/// Runs one console command; returns `false` when the server should stop.
pub async fn execute(cmd: AdminCommand, registry: &Registry) -> bool {
    match cmd {
        AdminCommand::Quit => {
            tracing::info!("shutdown requested from console");
            false
        }
        AdminCommand::Status => {
            print!("{}", status_report(registry));
            true
        }
        AdminCommand::Kill(id) => {
            match registry.delete_first_if(|session| session.id == id).await {
                Some(_) => {
                    tracing::info!(session = %id, "killed from console");
                    println!("Session {} killed", id);
                }
                None => println!("No session {}", id),
            }
            true
        }
    }
}
