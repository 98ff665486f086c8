use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use nvsurl::{
    config::{AppConfig, StoreBackend},
    store::{DocumentBackend, GistBackend, LinkStore, MemoryBackend},
    AppState,
};

// ── Entry point ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialise structured logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "nvsurl=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env()?;
    tracing::info!("Starting NVSURL on {}:{}", config.host, config.port);
    tracing::info!("Domain: {}", config.app_domain);
    tracing::info!(
        "Rate limit: {} requests/hour",
        config.max_requests_per_hour
    );

    // Attach to (or create) the document holding the link table
    let (backend, document_id): (Arc<dyn DocumentBackend>, Option<String>) = match &config.store {
        StoreBackend::Gist {
            token,
            gist_id,
            gist_name,
            api_url,
        } => (
            Arc::new(GistBackend::new(token, api_url.as_str(), gist_name.as_str())?)
                as Arc<dyn DocumentBackend>,
            gist_id.clone(),
        ),
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory store; links are lost on restart");
            (Arc::new(MemoryBackend::new()) as Arc<dyn DocumentBackend>, None)
        }
    };

    let store = LinkStore::initialize(backend, document_id)
        .await
        .context("could not attach to or create the link document")?;

    let bind_addr = format!("{}:{}", config.host, config.port);
    let state = Arc::new(AppState::new(config, Arc::new(store)));
    let app = nvsurl::app(state);

    // ── Serve ──────────────────────────────────────────────────────────────
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Listening on http://{}", listener.local_addr()?);
    log_endpoints();

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

fn log_endpoints() {
    for (method, path, what) in [
        ("GET", "/", "Homepage"),
        ("POST", "/shorten", "Create short URL"),
        ("GET", "/r/:slug", "Redirect to URL"),
        ("GET", "/stats", "Global statistics"),
        ("GET", "/stats/:slug", "Link statistics"),
        ("GET", "/health", "Health check"),
        ("GET", "/delete.html?slug=", "Delete page"),
        ("POST", "/delete.html?slug=", "Delete action"),
        ("GET", "/linkdata?adminKey=", "All data (admin)"),
        ("GET", "/clear-cache?adminKey=", "Clear cache (admin)"),
    ] {
        tracing::info!("  {:<6} {:<24} {}", method, path, what);
    }
}
