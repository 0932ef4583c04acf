use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use assetshift_common::{error::Result, serve, state::Config};
use tokio::signal;

const APP_NAME: &str = "assetshift";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let config = Arc::new(load_config(std::env::args_os().nth(1).map(PathBuf::from))?);

    tracing::info!(
        upstream = %config.upstream,
        home_url = %config.home_url,
        cdn = config.cdn.url.as_deref().unwrap_or("<unset>"),
        "Proxying the site backend"
    );

    serve(config, shutdown_signal()).await?;

    Ok(())
}

/// Reads the config from `path` when one is given on the command line, or from the
/// per-user config directory otherwise. A missing file is created with the defaults.
fn load_config(path: Option<PathBuf>) -> Result<Config> {
    let path = match path {
        Some(path) => path,
        None => confy::get_configuration_file_path(APP_NAME, None)
            .context("no config directory for this user")?,
    };

    tracing::info!("Loading config from {}", path.display());

    let config = confy::load_path(&path)
        .with_context(|| format!("failed to load config from {}", path.display()))?;

    Ok(config)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!("Cannot listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!("Cannot listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let signal = tokio::select! {
        _ = ctrl_c => "Ctrl+C",
        _ = terminate => "SIGTERM",
    };

    tracing::info!("Received {}, shutting down", signal);
}
