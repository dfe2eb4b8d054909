//! hassbridge entry point.
//!
//! Usage: `hassbridge [CONFIG_PATH]`

mod app;
mod config;

use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting hassbridge");

    let path = config::config_path(std::env::args().nth(1));
    let config = config::Config::load(&path)?;
    tracing::info!(path = %path.display(), ?config, "configuration loaded");

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(app::run(path, config))?;

    tracing::info!("bridge shut down cleanly");
    Ok(())
}
