use std::net::SocketAddr;

use anyhow::Result;
use clap::Parser;
use sharedir::{
    config::{AppConfig, Cli},
    server::{AppState, router},
};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_filter())),
        )
        .init();

    let config = AppConfig::from_cli(&cli)?;
    if config.recursive {
        info!("sharing directory {} recursively", config.root.display());
    } else {
        info!("sharing directory {}", config.root.display());
    }
    if let Some(assets) = &config.assets_dir {
        info!("auxiliary files from {}", assets.display());
    }

    let state = AppState::new(config);
    let app = router(state.clone());
    let listener = TcpListener::bind(&state.config.http_bind_addr).await?;
    info!("listening on {}", listener.local_addr()?);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
