//! deskshare client entry point.
//!
//! Wires together configuration, the event queue, the dispatch thread, the
//! screen and the connection task, then waits for Ctrl-C or for the
//! connection to give up.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  ├─ load ClientConfig, apply CLI overrides
//!  ├─ EventQueue<Event>           shared by both sides
//!  ├─ dispatch thread             DispatchLoop::spawn()
//!  │    ├─ Screen  target → InjectInputUseCase → BasicScreen
//!  │    ├─ Client  target → StatusHandler → LoggingObserver
//!  │    └─ System  target → auto-reconnect flag, Quit
//!  └─ tokio task                  ClientController::connect()
//!       └─ ClientConnection::run  connect → handshake → stream → reconnect
//! ```
//!
//! # Usage
//!
//! ```text
//! deskshare-client [OPTIONS]
//!
//! Options:
//!   --config <PATH>          Config file [default: platform config dir]
//!   --server-host <HOST>     Server hostname or IP
//!   --server-port <PORT>     Server port
//!   --name <NAME>            Screen name sent to the server
//!   --device <ID>            Input device to inject into
//!   --no-auto-reconnect      Give up after the first lost connection
//!   --save                   Write the effective settings back to the config
//! ```
//!
//! Every option can also be set through a `DESKSHARE_*` environment variable.
//! CLI args take precedence over the environment, which takes precedence over
//! the config file.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use deskshare_client::application::dispatch::{DispatchLoop, LoopGeneration};
use deskshare_client::application::events::{Event, EventTarget};
use deskshare_client::application::inject_input::{InjectInputUseCase, Screen};
use deskshare_client::application::reconnect::{AutoReconnect, ReconnectObserver};
use deskshare_client::infrastructure::network::transport::TcpSocketFactory;
use deskshare_client::infrastructure::network::ClientConnection;
use deskshare_client::infrastructure::screen::BasicScreen;
use deskshare_client::infrastructure::storage::config::{
    load_config, load_config_from, save_config, save_config_to, ClientConfig, ConfigError,
};
use deskshare_client::infrastructure::ui_bridge::{ClientController, LoggingObserver, StatusHandler};
use deskshare_core::EventQueue;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// deskshare client.
///
/// Connects to a deskshare server and injects the keyboard and mouse input it
/// forwards into this machine.
#[derive(Debug, Parser)]
#[command(
    name = "deskshare-client",
    about = "Receive keyboard and mouse input from a deskshare server",
    version
)]
struct Cli {
    /// Path of the TOML config file.
    #[arg(long, env = "DESKSHARE_CONFIG")]
    config: Option<PathBuf>,

    /// Hostname or IP address of the server.
    #[arg(long, env = "DESKSHARE_SERVER_HOST")]
    server_host: Option<String>,

    /// TCP port of the server.
    #[arg(long, env = "DESKSHARE_SERVER_PORT")]
    server_port: Option<u16>,

    /// Screen name sent to the server.  Must match the server's layout.
    #[arg(long, env = "DESKSHARE_NAME")]
    name: Option<String>,

    /// Input device identifier.
    #[arg(long, env = "DESKSHARE_DEVICE")]
    device: Option<String>,

    /// Do not reconnect after the connection is lost.
    #[arg(long, env = "DESKSHARE_NO_AUTO_RECONNECT")]
    no_auto_reconnect: bool,

    /// Write the effective settings back to the config file.
    #[arg(long)]
    save: bool,
}

impl Cli {
    /// Loads the config file named by `--config`, or the platform default.
    fn load(&self) -> anyhow::Result<ClientConfig> {
        let loaded = match &self.config {
            Some(path) => load_config_from(path),
            None => match load_config() {
                Err(ConfigError::NoPlatformConfigDir) => Ok(ClientConfig::default()),
                other => other,
            },
        };
        loaded.context("failed to load configuration")
    }

    fn apply(&self, config: &mut ClientConfig) {
        if let Some(host) = &self.server_host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.server_port {
            config.server.port = port;
        }
        if let Some(name) = &self.name {
            config.client.name = name.clone();
        }
        if let Some(device) = &self.device {
            config.input.device = device.clone();
        }
        if self.no_auto_reconnect {
            config.connection.auto_reconnect = false;
        }
    }

    fn persist(&self, config: &ClientConfig) -> anyhow::Result<()> {
        match &self.config {
            Some(path) => save_config_to(config, path),
            None => save_config(config),
        }
        .context("failed to save configuration")
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = cli.load()?;
    cli.apply(&mut config);

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.client.log_level)),
        )
        .init();

    info!(
        name = %config.client.name,
        server = %config.server_address(),
        "deskshare client starting"
    );

    if cli.save {
        cli.persist(&config)?;
        info!("configuration saved");
    }

    // ── Shared state ──────────────────────────────────────────────────────────
    let queue = Arc::new(EventQueue::<Event>::new());
    let reconnect = Arc::new(AutoReconnect::new(config.connection.auto_reconnect));
    let screen: Arc<dyn Screen> = Arc::new(BasicScreen::new(
        config.input.device.clone(),
        config.screen_shape(),
    ));
    let observer: Arc<dyn ReconnectObserver> = Arc::new(LoggingObserver);

    // ── Dispatch thread ───────────────────────────────────────────────────────
    let mut dispatch = DispatchLoop::new(
        Arc::clone(&queue),
        Arc::clone(&reconnect),
        Arc::clone(&observer),
        Arc::clone(&screen),
        LoopGeneration::new(),
    );
    dispatch.register(
        EventTarget::Screen,
        Box::new(InjectInputUseCase::new(Arc::clone(&screen))),
    );
    dispatch.register(EventTarget::Client, Box::new(StatusHandler::new(observer)));
    let dispatch_thread = dispatch
        .spawn()
        .context("failed to start dispatch thread")?;

    // ── Connection ────────────────────────────────────────────────────────────
    let connection = Arc::new(ClientConnection::new(
        config.connection_config(),
        Arc::new(TcpSocketFactory),
        Arc::clone(&queue),
        Arc::clone(&reconnect),
    ));
    let controller = ClientController::new(
        connection,
        Arc::clone(&queue),
        reconnect,
        tokio::runtime::Handle::current(),
    );
    let mut session = controller
        .connect()
        .context("connection task already running")?;

    // ── Wait for Ctrl-C or for the connection to give up ──────────────────────
    let session_done = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                warn!("failed to listen for Ctrl-C: {e}");
            }
            info!("shutdown signal received");
            false
        }
        result = &mut session => {
            if let Err(e) = result {
                error!("connection task failed: {e}");
            }
            true
        }
    };

    // ── Shutdown ──────────────────────────────────────────────────────────────
    if queue.post(Event::quit()).is_err() {
        warn!("event queue already closed");
    }
    if !session_done {
        controller.disconnect();
        if let Err(e) = session.await {
            error!("connection task failed: {e}");
        }
    }

    let exit = tokio::task::spawn_blocking(move || dispatch_thread.join())
        .await
        .context("failed to join dispatch thread")?
        .map_err(|_| anyhow!("dispatch thread panicked"))?;
    queue.shutdown();

    info!(?exit, "deskshare client stopped");
    Ok(())
}
