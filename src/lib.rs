use std::{sync::Arc, time::Duration, time::Instant};

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

pub mod cache;
pub mod config;
pub mod error;
pub mod handlers;
pub mod ip;
pub mod models;
pub mod rate_limit;
pub mod response;
pub mod slug;
pub mod store;

use cache::TtlCache;
use models::Link;
use rate_limit::FixedWindowLimiter;
use store::LinkStore;

/// TTL of the cache the handlers keep in front of the store.
pub const HANDLER_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

// ── Shared application state ───────────────────────────────────────────────

pub struct AppState {
    pub config: config::AppConfig,
    pub store: Arc<LinkStore>,
    /// Links recently served or created by the handlers. The store keeps its
    /// own shorter-lived cache; evict through `forget_link`/`clear_caches`
    /// so both layers stay in step.
    pub cache: TtlCache<Link>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: config::AppConfig, store: Arc<LinkStore>) -> Self {
        Self {
            config,
            store,
            cache: TtlCache::new(HANDLER_CACHE_TTL),
            started_at: Instant::now(),
        }
    }

    /// Drop a slug from both cache layers.
    pub fn forget_link(&self, slug: &str) {
        self.cache.delete(slug);
        self.store.clear_slug_cache(slug);
    }

    pub fn clear_caches(&self) {
        self.cache.clear();
        self.store.clear_cache();
    }

    /// Uptime as `"<hours>h <minutes>m"`.
    pub fn uptime(&self) -> String {
        let secs = self.started_at.elapsed().as_secs();
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    }
}

// ── Router ─────────────────────────────────────────────────────────────────

pub fn app(state: Arc<AppState>) -> Router {
    let trusted = state.config.trusted_proxies.clone();
    let api_limiter = Arc::new(
        FixedWindowLimiter::api(state.config.max_requests_per_hour).trusting(trusted.clone()),
    );
    let create_limiter = Arc::new(FixedWindowLimiter::create_link().trusting(trusted));

    let shorten = Router::new()
        .route("/shorten", post(handlers::links::shorten))
        .route_layer(middleware::from_fn_with_state(
            create_limiter,
            rate_limit::enforce,
        ));

    // Everything here counts against the hourly limiter.
    let api = Router::new()
        .route("/stats", get(handlers::status::global_stats))
        .route("/stats/:slug", get(handlers::links::link_stats))
        .route("/health", get(handlers::status::health))
        .route(
            "/delete.html",
            get(handlers::pages::delete_page).post(handlers::pages::delete_action),
        )
        .merge(shorten)
        .route_layer(middleware::from_fn_with_state(
            api_limiter,
            rate_limit::enforce,
        ));

    Router::new()
        .route("/", get(handlers::pages::home))
        .route("/linkdata", get(handlers::admin::link_data))
        .route("/clear-cache", get(handlers::admin::clear_cache))
        .route("/r/:slug", get(handlers::links::redirect))
        .merge(api)
        .fallback(handlers::pages::not_found)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
