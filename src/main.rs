use anyhow::{Context, Result};
use axum::Router;
use blob_browser::{config, routes, services::blob_service::BlobService, store};
use std::io::ErrorKind;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config ---
    let cfg = config::AppConfig::from_env_and_args()?;

    tracing::info!("Starting blob-browser with config: {:?}", cfg);

    // --- Connect to the container ---
    // One client for the life of the process; every request shares it.
    let settings = cfg.store_settings()?;
    let store = store::connect(settings).context("failed to create blob storage client")?;

    // --- Initialize core service ---
    let service = BlobService::new(store, cfg.service_options());
    if let Err(err) = service.probe().await {
        // Keep serving: /readyz reports the store until it comes back.
        tracing::warn!("Blob storage is not reachable yet: {}", err);
    }

    // --- Build router ---
    let app: Router = routes::routes::routes(cfg.upload_limit_bytes).with_state(service);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
