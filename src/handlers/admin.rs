use crate::{
    error::AppError,
    models::{Link, LinkTable, StoreStats},
    response::ApiResponse,
    AppState,
};
use axum::{
    extract::{Query, State},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, sync::Arc};

#[derive(Deserialize)]
pub struct AdminQuery {
    #[serde(rename = "adminKey")]
    admin_key: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Cleared {
    cleared_at: DateTime<Utc>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LinkDump {
    links: BTreeMap<String, Link>,
    stats: StoreStats,
    metadata: DumpMetadata,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DumpMetadata {
    total_links: usize,
    export_time: DateTime<Utc>,
}

/// GET /clear-cache?adminKey=
pub async fn clear_cache(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AdminQuery>,
) -> Result<Response, AppError> {
    authorize(&state, &query)?;

    state.clear_caches();
    tracing::info!("All caches cleared by admin request");

    Ok(ApiResponse::success(
        Cleared {
            cleared_at: Utc::now(),
        },
        "All caches cleared successfully",
    )
    .into_response())
}

/// GET /linkdata?adminKey=
///
/// Dumps the whole table. An unreadable store yields an empty dump.
pub async fn link_data(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AdminQuery>,
) -> Result<Response, AppError> {
    authorize(&state, &query)?;

    let table = state.store.read_all().await.unwrap_or_else(|e| {
        tracing::warn!("Link data: store unavailable, returning empty table: {}", e);
        LinkTable::empty()
    });

    let stats = table.stats();
    let dump = LinkDump {
        metadata: DumpMetadata {
            total_links: table.links.len(),
            export_time: Utc::now(),
        },
        links: table.links,
        stats,
    };

    Ok(ApiResponse::success(dump, "All link data retrieved").into_response())
}

fn authorize(state: &AppState, query: &AdminQuery) -> Result<(), AppError> {
    if state.config.is_admin_key(query.admin_key.as_deref()) {
        Ok(())
    } else {
        tracing::warn!("Rejected admin request with missing or wrong key");
        Err(AppError::Unauthorized)
    }
}
