//! PDV relay gateway: entry point.
//!
//! This binary receives UDP telegrams from point-of-sale terminals, relays
//! them to a DVR, raises alarms when a sale stalls, and serves browser
//! clients over two WebSocket channels.
//!
//! # Usage
//!
//! ```text
//! pdv-gateway [OPTIONS]
//!
//! Options:
//!   --ws-port         <PORT>  Device-registration WebSocket port [default: 8765]
//!   --media-ws-port   <PORT>  Media-viewing WebSocket port [default: 8080]
//!   --bind            <IP>    Address both WebSocket listeners bind to [default: 0.0.0.0]
//!   --pdv-timeout     <SECS>  Sale inactivity timeout [default: 180]
//!   --config          <PATH>  Device file, .json or .toml [default: ./config.json]
//!   --quality-wait-ms <MS>    Wait for a viewer's quality choice [default: 1000]
//!   --log-level       <LEVEL> Log filter when RUST_LOG is unset [default: info]
//! ```
//!
//! # Environment variable overrides
//!
//! | Variable               | Default         | Description                     |
//! |------------------------|-----------------|---------------------------------|
//! | `PDV_WS_PORT`          | `8765`          | Device-registration port        |
//! | `PDV_MEDIA_WS_PORT`    | `8080`          | Media-viewing port              |
//! | `PDV_BIND`             | `0.0.0.0`       | WebSocket bind address          |
//! | `PDV_TIMEOUT`          | `180`           | Sale inactivity timeout (secs)  |
//! | `PDV_CONFIG`           | `./config.json` | Device file                     |
//! | `PDV_QUALITY_WAIT_MS`  | `1000`          | Quality follow-up wait (ms)     |
//! | `PDV_LOG_LEVEL`        | `info`          | Log filter                      |
//!
//! On Unix, `SIGHUP` reloads the device file and rebinds only the sockets
//! whose addresses changed.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use pdv_gateway::application::Gateway;
use pdv_gateway::domain::GatewayConfig;
use pdv_gateway::infrastructure::media::DisabledEngineFactory;
use pdv_gateway::infrastructure::network::{run_server, ApplyReport, ChannelKind, SocketMultiplexer};
use pdv_gateway::infrastructure::storage::load_device_registry_or_empty;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// PDV relay gateway.
#[derive(Debug, Parser)]
#[command(
    name = "pdv-gateway",
    about = "PDV telegram relay, sale inactivity monitor, and camera relay gateway",
    version
)]
struct Cli {
    /// TCP port of the device-registration WebSocket channel.
    #[arg(long, default_value_t = 8765, env = "PDV_WS_PORT")]
    ws_port: u16,

    /// TCP port of the media-viewing WebSocket channel.
    #[arg(long, default_value_t = 8080, env = "PDV_MEDIA_WS_PORT")]
    media_ws_port: u16,

    /// IP address both WebSocket listeners bind to.
    #[arg(long, default_value = "0.0.0.0", env = "PDV_BIND")]
    bind: String,

    /// Seconds an open sale may stay silent before subscribers are alarmed.
    #[arg(long, default_value_t = 180, env = "PDV_TIMEOUT")]
    pdv_timeout: u64,

    /// Device file listing every PDV (`.json` or `.toml`).
    #[arg(long, default_value = "./config.json", env = "PDV_CONFIG")]
    config: PathBuf,

    /// Milliseconds a viewer has to send its quality choice.
    #[arg(long, default_value_t = 1000, env = "PDV_QUALITY_WAIT_MS")]
    quality_wait_ms: u64,

    /// Log filter used when `RUST_LOG` is not set.
    #[arg(long, default_value = "info", env = "PDV_LOG_LEVEL")]
    log_level: String,
}

impl Cli {
    /// Converts the parsed CLI arguments into a [`GatewayConfig`].
    ///
    /// # Errors
    ///
    /// Returns an error if `--bind` is not a valid IP address.
    fn into_gateway_config(self) -> anyhow::Result<GatewayConfig> {
        let ip: IpAddr = self
            .bind
            .parse()
            .with_context(|| format!("invalid bind address: '{}'", self.bind))?;

        Ok(GatewayConfig {
            device_ws_addr: SocketAddr::new(ip, self.ws_port),
            media_ws_addr: SocketAddr::new(ip, self.media_ws_port),
            pdv_timeout: Duration::from_secs(self.pdv_timeout),
            device_file: self.config,
            quality_wait: Duration::from_millis(self.quality_wait_ms),
        })
    }
}

fn log_report(context: &str, report: &ApplyReport) {
    for failure in &report.failures {
        warn!("{failure}");
    }
    if report.nothing_bound() {
        error!("{context}: no PDV listen socket could be bound");
    } else {
        info!(
            "{context}: {} listen socket(s), {} forward socket(s)",
            report.listening, report.forwarding
        );
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over --log-level.
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = cli.into_gateway_config()?;
    info!(
        "PDV gateway starting: device ws={}, media ws={}, pdv timeout={}s, devices={}",
        config.device_ws_addr,
        config.media_ws_addr,
        config.pdv_timeout.as_secs(),
        config.device_file.display()
    );

    // ── Core wiring ───────────────────────────────────────────────────────────
    warn!("no video backend configured; media viewers will receive an error notice");
    let gateway = Gateway::new(&config, Arc::new(DisabledEngineFactory));
    let (inbound, pump) = gateway.spawn_device_pump();

    let registry = load_device_registry_or_empty(&config.device_file);
    info!("loaded {} device(s)", registry.len());
    let (mux, report) = SocketMultiplexer::start(&registry, inbound).await;
    log_report("startup", &report);
    let mux = Arc::new(Mutex::new(mux));

    // ── Graceful shutdown flag ────────────────────────────────────────────────
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C; initiating graceful shutdown");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => error!("failed to listen for Ctrl+C signal: {e}"),
        }
    });

    #[cfg(unix)]
    spawn_reload_on_hangup(config.device_file.clone(), Arc::clone(&mux))?;

    // ── WebSocket listeners ───────────────────────────────────────────────────
    tokio::try_join!(
        run_server(
            config.device_ws_addr,
            ChannelKind::Device,
            gateway.clone(),
            Arc::clone(&running),
        ),
        run_server(
            config.media_ws_addr,
            ChannelKind::Viewer,
            gateway.clone(),
            Arc::clone(&running),
        ),
    )?;

    mux.lock().await.shutdown();
    pump.abort();
    info!("PDV gateway stopped");
    Ok(())
}

/// Reloads the device file on `SIGHUP`.
#[cfg(unix)]
fn spawn_reload_on_hangup(
    device_file: PathBuf,
    mux: Arc<Mutex<SocketMultiplexer>>,
) -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup()).context("failed to install SIGHUP handler")?;
    tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            info!("SIGHUP received; reloading {}", device_file.display());
            let registry = load_device_registry_or_empty(&device_file);
            let report = mux.lock().await.reconfigure(&registry).await;
            log_report("reload", &report);
        }
    });
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
