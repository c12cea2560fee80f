mod admin;
mod config;
mod credentials;
mod dispatcher;
mod error;
mod handlers;
mod logging;
mod protocol;
mod registry;
mod session;
#[cfg(test)]
mod test_support;
mod transport;

use anyhow::{Context, Result};
use clap::Parser;
use config::ServerConfig;
use credentials::CredentialStore;
use dispatcher::Dispatcher;
use handlers::Services;
use registry::Registry;
use session::WorkingDirectory;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use transport::{DatagramServer, StreamServer, TransportKind};

const BUILD_SHA: &str = env!("TERMD_GIT_SHA");

#[derive(Parser)]
#[command(name = "termd")]
#[command(about = "Multi-user remote session server over TCP or UDP")]
#[command(version, long_version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("TERMD_GIT_SHA"), ")"))]
struct Cli {
    /// Transport to serve
    #[arg(value_enum)]
    transport: TransportKind,

    /// Listen address (overrides config)
    #[arg(long)]
    host: Option<String>,

    /// Listen port (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Listen backlog for the TCP transport
    #[arg(long)]
    backlog: Option<u32>,

    /// Directory sessions start in after AUTH
    #[arg(long)]
    root: Option<PathBuf>,

    /// Credential store file
    #[arg(long)]
    accounts: Option<PathBuf>,

    /// Config file (defaults to <config dir>/termd/config.yaml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn apply(&self, config: &mut ServerConfig) {
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(backlog) = self.backlog {
            config.backlog = backlog;
        }
        if let Some(root) = &self.root {
            config.root = root.clone();
        }
        if let Some(accounts) = &self.accounts {
            config.accounts = accounts.clone();
        }
        if let Some(file) = &self.log_file {
            config.log.file = Some(file.clone());
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = ServerConfig::discover(cli.config.as_deref())?;
    config.apply_env();
    cli.apply(&mut config);
    config.validate()?;

    let _log_guard = logging::init(
        &logging::level_for(cli.verbose, &config.log.level),
        config.log.file.as_deref(),
    )?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), sha = BUILD_SHA, "termd starting");

    serve(cli.transport, &config).await
}

async fn serve(kind: TransportKind, config: &ServerConfig) -> Result<()> {
    let root = WorkingDirectory::open_root(&config.root)
        .await
        .with_context(|| format!("Failed to open root directory {}", config.root.display()))?;
    let registry = Arc::new(Registry::new(
        config.registry.min_capacity,
        config.registry.max_capacity,
    ));
    let services = Services::new(registry, CredentialStore::new(&config.accounts), root);
    let dispatcher = Dispatcher::new(services);
    let addr = transport::resolve_addr(&config.bind_addr()).await?;

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(());
        }
    });

    let (admin_tx, admin_rx) = mpsc::channel(16);
    admin::spawn_console(admin_tx).context("Failed to start console reader")?;

    tracing::info!(
        transport = %kind,
        %addr,
        root = %config.root.display(),
        accounts = %config.accounts.display(),
        "configuration loaded"
    );

    match kind {
        TransportKind::Tcp => {
            StreamServer::bind(addr, config.backlog, dispatcher, config.buffer_size)?
                .run(admin_rx, shutdown_rx)
                .await
        }
        TransportKind::Udp => {
            DatagramServer::bind(
                addr,
                dispatcher,
                config.buffer_size,
                config.heartbeat(),
                config.session_timeout(),
            )
            .await?
            .run(admin_rx, shutdown_rx)
            .await
        }
    }
}
