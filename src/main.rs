//! Digital signage player: plays a server-pushed campaign full screen and
//! guards every way out behind an exit confirmation.

mod app;
mod assets;
mod cache;
mod campaign;
mod config;
mod connectivity;
mod exit_guard;
mod feed;
mod navigation;
mod renderer;
mod scheduler;
mod video;
mod youtube;

use anyhow::{Context, Result};
use app::App;
use config::Settings;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config_path = std::env::var("SIGNAGE_CONFIG").unwrap_or_else(|_| "signage.toml".into());
    let mut settings = Settings::load(&config_path)?;

    // The launcher passes its launch URI as the first argument.
    if let Some(uri) = std::env::args().nth(1) {
        settings.player.launch_uri = Some(uri);
    }
    if settings.launch_token().is_none() {
        tracing::warn!("Launched without an access token");
    }

    video::init()?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build runtime")?;

    runtime.block_on(async {
        let app = App::new(settings).await?;
        app.run().await
    })
}
