use crate::{
    cache::CacheStats,
    models::StoreStats,
    response::ApiResponse,
    store::StoreCacheStats,
    AppState,
};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::sync::Arc;
use sysinfo::{Pid, ProcessesToUpdate, System};

// ── Response shapes ────────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GlobalStats {
    #[serde(flatten)]
    store: StoreStats,
    server: ServerInfo,
    rate_limit: RateLimitInfo,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ServerInfo {
    uptime: String,
    memory: MemoryUsage,
    cache: CacheLayers,
    version: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CacheLayers {
    memory_cache: CacheStats,
    gist_cache: StoreCacheStats,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RateLimitInfo {
    max_per_hour: u32,
}

/// Resident and virtual size of this process, in MB with two decimals.
#[derive(Serialize, Default)]
struct MemoryUsage {
    used: f64,
    total: f64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Health {
    status: &'static str,
    uptime: String,
    gist: GistHealth,
    cache: CacheStats,
    memory: HeapUsage,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GistHealth {
    connected: bool,
    total_links: usize,
    total_clicks: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HeapUsage {
    heap_used: f64,
}

// ── Handlers ───────────────────────────────────────────────────────────────

/// GET /stats
///
/// Store totals degrade to zeros when the gist cannot be read.
pub async fn global_stats(State(state): State<Arc<AppState>>) -> Response {
    let store = state.store.stats().await.unwrap_or_else(|e| {
        tracing::warn!("Global stats: store unavailable, reporting zeros: {}", e);
        StoreStats::default()
    });

    let data = GlobalStats {
        store,
        server: ServerInfo {
            uptime: state.uptime(),
            memory: process_memory(),
            cache: CacheLayers {
                memory_cache: state.cache.stats(),
                gist_cache: state.store.cache_stats(),
            },
            version: env!("CARGO_PKG_VERSION"),
        },
        rate_limit: RateLimitInfo {
            max_per_hour: state.config.max_requests_per_hour,
        },
    };

    ApiResponse::success(data, "Global statistics").into_response()
}

/// GET /health
///
/// 503 when the gist cannot be read.
pub async fn health(State(state): State<Arc<AppState>>) -> Response {
    match state.store.stats().await {
        Ok(stats) => {
            let data = Health {
                status: "healthy",
                uptime: state.uptime(),
                gist: GistHealth {
                    connected: true,
                    total_links: stats.total_links,
                    total_clicks: stats.total_clicks,
                },
                cache: state.cache.stats(),
                memory: HeapUsage {
                    heap_used: process_memory().used,
                },
            };
            ApiResponse::success(data, "Server is healthy").into_response()
        }
        Err(e) => {
            tracing::error!("Health check failed: {}", e);
            ApiResponse::error("Service unhealthy - Gist connection failed")
                .code("SERVICE_UNHEALTHY")
                .with_status(StatusCode::SERVICE_UNAVAILABLE)
        }
    }
}

// ── Helpers ────────────────────────────────────────────────────────────────

fn process_memory() -> MemoryUsage {
    let pid = Pid::from_u32(std::process::id());
    let mut sys = System::new();
    sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);

    sys.process(pid)
        .map(|process| MemoryUsage {
            used: to_mb(process.memory()),
            total: to_mb(process.virtual_memory()),
        })
        .unwrap_or_default()
}

fn to_mb(bytes: u64) -> f64 {
    (bytes as f64 / 1024.0 / 1024.0 * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn megabytes_are_rounded_to_two_places() {
        assert_eq!(to_mb(0), 0.0);
        assert_eq!(to_mb(1024 * 1024), 1.0);
        assert_eq!(to_mb(1_500_000), 1.43);
    }
}
