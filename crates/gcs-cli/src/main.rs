use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use tracing::{info, warn};

use gcs_link::{transport, LinkConfig, LinkEvent, LinkManager};
use gcs_proto::mission::Waypoint;

#[derive(Debug, Parser)]
#[command(name = "gcs", version, about = "BlueGCS - UAV ground control vehicle link")]
struct Cli {
    /// TOML config file; built-in defaults apply when omitted.
    #[arg(long)]
    config: Option<String>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Validate the configuration without opening the link.
    Doctor,
    /// Connect and stream link events until interrupted.
    Run,
    /// Connect, download the vehicle's mission, print it, and exit.
    Mission,
}

#[derive(Debug, serde::Deserialize)]
struct Config {
    link: LinkConfig,
}

fn load_config(path: Option<&str>) -> Result<LinkConfig> {
    match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("read config {path}"))?;
            let cfg: Config =
                toml::from_str(&raw).with_context(|| format!("parse config {path}"))?;
            Ok(cfg.link)
        }
        None => Ok(LinkConfig::default()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let link = load_config(cli.config.as_deref())?;

    match cli.cmd {
        Command::Doctor => doctor(&link),
        Command::Run => run(link).await,
        Command::Mission => mission(link).await,
    }
}

fn doctor(cfg: &LinkConfig) -> Result<()> {
    transport::parse_endpoint(&cfg.endpoint)
        .with_context(|| format!("link.endpoint `{}`", cfg.endpoint))?;
    anyhow::ensure!(
        cfg.heartbeat_timeout() >= Duration::from_millis(500),
        "link.heartbeat_timeout_ms too low"
    );
    anyhow::ensure!(
        !cfg.recv_timeout().is_zero(),
        "link.recv_timeout_ms must be > 0"
    );
    anyhow::ensure!(
        cfg.mission_timeout() >= cfg.recv_timeout(),
        "link.mission_timeout_ms must cover at least one receive slice"
    );
    println!("config ok: endpoint {}", cfg.endpoint);
    Ok(())
}

async fn run(cfg: LinkConfig) -> Result<()> {
    let mut manager = LinkManager::start(cfg)?;
    let events = manager.subscribe();
    let printer = tokio::task::spawn_blocking(move || print_events(events));

    tokio::signal::ctrl_c().await.context("wait for ctrl-c")?;
    info!("shutting down");
    manager.stop();
    drop(manager);
    let _ = printer.await;
    Ok(())
}

fn print_events(events: Receiver<LinkEvent>) {
    while let Ok(ev) = events.recv() {
        match ev {
            LinkEvent::Status { connected, message } => {
                info!(connected, %message, "link status");
            }
            LinkEvent::Telemetry(snapshot) => {
                let line = snapshot
                    .iter()
                    .map(|(key, value)| format!("{key}={value:.4}"))
                    .collect::<Vec<_>>()
                    .join(" ");
                info!("telemetry {line}");
            }
            LinkEvent::Mission(waypoints) => {
                info!("mission downloaded ({} waypoints)", waypoints.len());
                print_mission(&waypoints);
            }
            LinkEvent::TransferAborted { reason } => {
                warn!("mission download aborted: {reason}");
            }
        }
    }
}

async fn mission(cfg: LinkConfig) -> Result<()> {
    let waypoints = tokio::task::spawn_blocking(move || download_mission(cfg))
        .await
        .context("mission task")??;
    println!("mission: {} waypoints", waypoints.len());
    print_mission(&waypoints);
    Ok(())
}

fn download_mission(cfg: LinkConfig) -> Result<Vec<Waypoint>> {
    let mut manager = LinkManager::start(cfg)?;
    let events = manager.subscribe();

    let deadline = Instant::now() + Duration::from_secs(60);
    let mut connected = false;
    let mut last_status = String::from("starting");

    let result = loop {
        if Instant::now() >= deadline {
            break Err(anyhow::anyhow!("timed out waiting for the mission"));
        }
        match events.recv_timeout(Duration::from_millis(200)) {
            Ok(LinkEvent::Status {
                connected: true, ..
            }) => {
                if !connected {
                    connected = true;
                    manager.begin_transfer();
                }
            }
            Ok(LinkEvent::Status { message, .. }) => {
                if connected {
                    break Err(anyhow::anyhow!("link lost: {message}"));
                }
                last_status = message;
            }
            Ok(LinkEvent::Mission(waypoints)) => break Ok(waypoints),
            Ok(LinkEvent::TransferAborted { reason }) => {
                break Err(anyhow::anyhow!("mission download aborted: {reason}"));
            }
            Ok(LinkEvent::Telemetry(_)) => continue,
            Err(RecvTimeoutError::Timeout) => {
                // Worker gone with the queue drained means the link died
                // before the transfer could even start.
                if !manager.is_running() && !connected {
                    break Err(anyhow::anyhow!("link failed: {last_status}"));
                }
            }
            Err(e) => break Err(anyhow::anyhow!("event channel closed: {e}")),
        }
    };

    manager.stop();
    result
}

fn print_mission(waypoints: &[Waypoint]) {
    for (i, wp) in waypoints.iter().enumerate() {
        println!(
            "{i:3}  lat {:.7}  lon {:.7}  alt {:.1}",
            wp.lat, wp.lon, wp.alt
        );
    }
}
