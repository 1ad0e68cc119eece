//! fluxd — the flux daemon.
//!
//! Deploys user-supplied source trees as containerized web apps on a
//! single host, routes inbound HTTP by virtual host, and performs
//! blue/green upgrades with zero-downtime cutover.
//!
//! # Usage
//!
//! ```text
//! fluxd --root-dir /var/fluxd --proxy-port 7465
//! ```
//!
//! The admin API listens on `:5647`; deployed apps are served through
//! the proxy listener on `FLUXD_PROXY_PORT` (default 7465), dispatched
//! by `Host` header.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;

use flux_core::{DaemonConfig, DaemonInfo};
use flux_deploy::{AppRegistry, Deployer};
use flux_proxy::{proxy_service, HostRouter};
use flux_runtime::{ContainerRuntime, DockerCli};
use flux_state::Catalog;

use fluxd::api::{api_router, ApiState};

#[derive(Parser)]
#[command(name = "fluxd", about = "flux daemon")]
struct Cli {
    /// Root data directory (catalog, config, staged sources).
    #[arg(long, env = "FLUXD_ROOT_DIR", default_value = "/var/fluxd")]
    root_dir: PathBuf,

    /// Port the admin API listens on.
    #[arg(long, default_value = "5647")]
    api_port: u16,

    /// Port the host-routing proxy listens on.
    #[arg(long, env = "FLUXD_PROXY_PORT", default_value = "7465")]
    proxy_port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,fluxd=debug,flux=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    info!("flux daemon starting");
    std::fs::create_dir_all(&cli.root_dir)?;
    std::fs::create_dir_all(cli.root_dir.join("apps"))?;

    let config = DaemonConfig::load_or_init(&cli.root_dir)?;

    let runtime: Arc<dyn ContainerRuntime> = Arc::new(DockerCli::new());

    info!(builder = %config.builder, "pulling builder image, this may take a while");
    runtime
        .pull_image(&format!("{}:latest", config.builder))
        .await?;
    info!(builder = %config.builder, "builder image pulled");

    let catalog = Catalog::open(&cli.root_dir.join("fluxd.db"))?;
    info!(path = ?cli.root_dir.join("fluxd.db"), "catalog opened");

    let router = HostRouter::new();
    let registry = AppRegistry::new();
    registry.init(&catalog, runtime.as_ref(), &router).await?;

    let shutdown = CancellationToken::new();
    let deployer = Deployer::new(
        catalog,
        runtime,
        router.clone(),
        registry,
        config.clone(),
        cli.root_dir.clone(),
        shutdown.clone(),
    );

    // ── Proxy listener ─────────────────────────────────────────────

    let proxy_addr = SocketAddr::from(([0, 0, 0, 0], cli.proxy_port));
    let proxy_listener = tokio::net::TcpListener::bind(proxy_addr).await?;
    info!(%proxy_addr, "proxy server starting");

    let proxy_shutdown = shutdown.clone();
    let proxy_handle = tokio::spawn(async move {
        axum::serve(proxy_listener, proxy_service(router))
            .with_graceful_shutdown(async move {
                proxy_shutdown.cancelled().await;
            })
            .await
    });

    // ── Admin API ──────────────────────────────────────────────────

    let api = api_router(ApiState {
        deployer,
        info: DaemonInfo {
            compression: config.compression,
        },
    });
    let api_addr = SocketAddr::from(([0, 0, 0, 0], cli.api_port));
    let api_listener = tokio::net::TcpListener::bind(api_addr).await?;
    info!(%api_addr, "admin API starting");

    let signal_shutdown = shutdown.clone();
    axum::serve(api_listener, api)
        .with_graceful_shutdown(async move {
            tokio::signal::ctrl_c()
                .await
                .expect("failed to install CTRL+C handler");
            info!("shutdown signal received");
            signal_shutdown.cancel();
        })
        .await?;

    let _ = proxy_handle.await;
    info!("flux daemon stopped");
    Ok(())
}
