//! Reflector
//!
//! Provisions and supervises an edge proxy (static camo site, TLS, reverse
//! proxy) and a protocol-proxy core from one declarative manifest.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌────────────────────────────────────────────────────────┐
//!                 │                       REFLECTOR                        │
//!   manifest ─────┼─▶ manifest ──▶ orchestrator ──▶ model (core + edge)    │
//!                 │                   │    │                    │          │
//!                 │                   │    ▼                    ▼          │
//!                 │                   │  camo cache         supervisor     │
//!                 │                   │  (registry/local)   (spawn, push,  │
//!                 │                   ▼                      retry, stop)  │
//!                 │                  net probes                 │          │
//!                 │                                             ▼          │
//!                 │  provision ──▶ binaries ──────────▶ core ◀── edge      │
//!                 │                                                        │
//!                 │  Cross-cutting: config, observability, lifecycle,      │
//!                 │                 resilience, version                    │
//!                 └────────────────────────────────────────────────────────┘
//! ```

use std::error::Error;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use reflector::camo::{ArtifactBackend, CamoCache};
use reflector::config::{load_settings, Settings};
use reflector::lifecycle::{wait_for_termination, Shutdown};
use reflector::manifest::{load_manifest, Manifest};
use reflector::model::{CoreConfig, EdgeConfig};
use reflector::net::SystemNetwork;
use reflector::observability::{logging, metrics};
use reflector::orchestrator::{ApplyReport, Deployment, Orchestrator};
use reflector::provision::BinaryProvisioner;
use reflector::resilience::RetryPolicy;
use reflector::supervisor::detect::detect_existing_server;
use reflector::supervisor::ManagedProcess;

#[derive(Debug, Parser)]
#[command(name = "reflector", about = "Camouflaged proxy deployment supervisor")]
struct Cli {
    /// Log at debug level regardless of settings.
    #[arg(short, long, global = true)]
    debug: bool,

    /// Runtime settings file (TOML). Missing means defaults.
    #[arg(short, long, global = true, default_value = "./reflector.toml")]
    settings: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Provision binaries, apply the manifest and supervise until signalled.
    Run {
        #[arg(short, long, default_value = "./config.yaml")]
        config: PathBuf,
    },
    /// Apply the manifest and print the generated configs and links.
    Render {
        #[arg(short, long, default_value = "./config.yaml")]
        config: PathBuf,
    },
    /// Report a web server already running on this host.
    Detect,
    /// Print the version.
    Version,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    if let Command::Version = cli.command {
        println!("Reflector {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let settings = load_settings(&cli.settings)?;
    logging::init_logging(&settings.observability, cli.debug);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "reflector starting");

    match cli.command {
        Command::Run { config } => run(&settings, &config).await,
        Command::Render { config } => render(&settings, &config).await,
        Command::Detect => {
            match detect_existing_server() {
                Some(server) => println!("{} (pid {}): {}", server.name, server.pid, server.cmdline),
                None => println!("no web server detected"),
            }
            Ok(())
        }
        Command::Version => Ok(()),
    }
}

fn orchestrator(settings: &Settings) -> Orchestrator<SystemNetwork, ArtifactBackend> {
    let backend = ArtifactBackend::new(reqwest::Client::new(), settings.camo.default_registry.clone());
    let camos = CamoCache::new(&settings.camo.directory, backend);
    Orchestrator::new(SystemNetwork, camos, settings.camo.always_pull)
}

async fn apply(
    settings: &Settings,
    manifest: &Manifest,
) -> Result<(CoreConfig, EdgeConfig, ApplyReport), Box<dyn Error>> {
    let mut core = CoreConfig::new(&settings.core.log_level, &settings.core.domain_strategy);
    let mut edge = EdgeConfig::new(settings.edge.http_port);
    let report = orchestrator(settings).apply(manifest, &mut core, &mut edge).await?;
    Ok((core, edge, report))
}

async fn render(settings: &Settings, manifest_path: &Path) -> Result<(), Box<dyn Error>> {
    let manifest = load_manifest(manifest_path)?;
    let (core, edge, report) = apply(settings, &manifest).await?;

    println!("{}", String::from_utf8_lossy(&core.to_json_pretty()?));
    if edge.has_servers() {
        println!("{}", String::from_utf8_lossy(&edge.to_json()?));
    }
    for link in &report.links {
        println!("{}", link.link);
    }
    Ok(())
}

async fn run(settings: &Settings, manifest_path: &Path) -> Result<(), Box<dyn Error>> {
    if let Some(server) = detect_existing_server() {
        tracing::warn!(
            server = server.name,
            pid = server.pid,
            "a web server is already running and may hold the ports"
        );
    }

    let manifest = load_manifest(manifest_path)?;
    let exporter = &manifest.spec.metrics;
    if exporter.port != 0 {
        let addr: SocketAddr = format!("{}:{}", exporter.listen_address(), exporter.port).parse()?;
        metrics::init_metrics(addr)?;
    }

    let (core_config, edge_config, report) = apply(settings, &manifest).await?;
    for link in &report.links {
        tracing::info!(inbound = %link.inbound, user = %link.user, link = %link.link, "client link");
    }

    let policy = RetryPolicy::from(&settings.reload);

    let core_binary = BinaryProvisioner::for_core(
        &settings.core,
        tracing::info_span!("provision", service = "core"),
    )?;
    core_binary.ensure().await?;
    let core = ManagedProcess::core(
        core_binary.binary_path(),
        core_config,
        Path::new(&settings.core.config_path),
        policy,
    );

    let edge = if edge_config.has_servers() {
        let edge_binary = BinaryProvisioner::for_edge(
            &settings.edge,
            tracing::info_span!("provision", service = "edge"),
        )?;
        edge_binary.ensure().await?;
        Some(ManagedProcess::edge(
            edge_binary.binary_path(),
            edge_config,
            &settings.edge.admin_url,
            policy,
        ))
    } else {
        tracing::info!("no edge servers configured, edge proxy not started");
        None
    };

    let shutdown = Shutdown::new();
    let stopped = shutdown.triggered();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_termination().await {
            tracing::error!(error = %e, "failed to install signal handlers, shutting down");
        }
        trigger.trigger();
    });

    let mut deployment = Deployment::new(core, edge);
    deployment.run_until(stopped).await?;

    tracing::info!("shutdown complete");
    Ok(())
}
