use std::error::Error;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use tokio::signal;
use tokio::sync::oneshot;
use tracing::info;
use tracing_subscriber::EnvFilter;

use respcalc::build_api;
use respcalc::config::load_config;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("respcalc=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config_path = std::env::var("RESPCALC_CONFIG").unwrap_or_else(|_| "config.yaml".to_string());
    let config = load_config(Path::new(&config_path))?.apply_env(|key| std::env::var(key).ok())?;

    info!(
        backend = %config.storage.backend,
        path = %config.storage.path,
        "starting respcalc"
    );

    // Store is created and initialized once here and injected into the routes
    let api = build_api(&config).await?;
    let routes = api.routes();

    let host: IpAddr = config.server.host.parse()?;
    let addr = SocketAddr::new(host, config.server.port);

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let (bound, server) = warp::serve(routes).try_bind_with_graceful_shutdown(addr, async move {
        shutdown_rx.await.ok();
        info!("shutting down server");
    })?;
    info!(%bound, "listening");

    let server_handle = tokio::spawn(server);

    signal::ctrl_c().await?;
    info!("Ctrl+C received, starting graceful shutdown");
    shutdown_tx.send(()).ok();

    server_handle.await?;
    info!("server shutdown complete");
    Ok(())
}
