mod bridge;
mod config;
mod dispatcher;
mod enhancer;
mod error;
mod page;
mod prompts;
mod protocol;
mod server;
mod service;
mod settings;

use anyhow::{Context, Result};
use config::DaemonConfig;
use dispatcher::RateLimits;
use enhancer::EnhancementClient;
use server::EnhancementServer;
use service::EnhancementService;
use settings::SettingsStore;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let config = DaemonConfig::load()?;
    let limits = RateLimits::from(&config.limits);
    let store = SettingsStore::new(&config.settings.path);
    info!(
        socket = %config.server.socket_path.display(),
        settings = %store.path().display(),
        max_per_window = limits.max_per_window,
        window_ms = limits.window.as_millis() as u64,
        spacing_ms = limits.spacing().as_millis() as u64,
        page_agent = %config.page.agent_path,
        "loaded thinkstraight config"
    );

    let http = reqwest::Client::builder()
        .build()
        .context("failed to build HTTP client")?;
    let service = EnhancementService::new(store, EnhancementClient::new(http), limits);
    let server = EnhancementServer::new(config.server.clone(), config.page.clone(), service);
    server.run().await
}
