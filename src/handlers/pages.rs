use crate::{
    config::AppConfig,
    error::AppError,
    models::{Link, StoreStats},
    response::ApiResponse,
    slug::non_empty,
    store::DeleteOutcome,
    AppState,
};
use askama::Template;
use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const SITE_TITLE: &str = "NVSURL - URL Shortener";
const DELETE_TITLE: &str = "Delete URL - NVSURL";

// ── Template structs ───────────────────────────────────────────────────────

#[derive(Template)]
#[template(path = "index.html")]
struct IndexTemplate {
    title: &'static str,
    domain: String,
    stats: StoreStats,
    error: Option<&'static str>,
    notice: Option<&'static str>,
}

#[derive(Template, Default)]
#[template(path = "delete.html")]
struct DeleteTemplate {
    title: &'static str,
    domain: String,
    slug: Option<String>,
    link: Option<Link>,
    error: Option<&'static str>,
    deleted: Option<DeletedLink>,
}

impl DeleteTemplate {
    fn new(config: &AppConfig) -> Self {
        Self {
            title: DELETE_TITLE,
            domain: config.app_domain.clone(),
            ..Default::default()
        }
    }
}

#[derive(Template)]
#[template(path = "404.html")]
struct NotFoundTemplate {
    title: &'static str,
    url: String,
}

// ── Query / payload types ──────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct HomeQuery {
    error: Option<String>,
}

#[derive(Deserialize)]
pub struct DeleteQuery {
    slug: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct DeletedLink {
    deleted_slug: String,
    original_url: String,
}

// ── Handlers ───────────────────────────────────────────────────────────────

/// GET /
pub async fn home(State(state): State<Arc<AppState>>, Query(query): Query<HomeQuery>) -> Response {
    let (stats, error) = match state.store.stats().await {
        Ok(stats) => (stats, None),
        Err(e) => {
            tracing::error!("Home: failed to load statistics: {}", e);
            (StoreStats::default(), Some("Failed to load statistics"))
        }
    };

    let notice = match query.error.as_deref() {
        Some("link-not-found") => Some("That short link does not exist or has been deleted."),
        Some("server-error") => Some("Something went wrong while following that link."),
        _ => None,
    };

    IndexTemplate {
        title: SITE_TITLE,
        domain: state.config.app_domain.clone(),
        stats,
        error,
        notice,
    }
    .into_response()
}

/// GET /delete.html?slug=
///
/// Without a slug, shows the lookup form; with one, the confirmation page.
pub async fn delete_page(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DeleteQuery>,
) -> Response {
    let mut page = DeleteTemplate::new(&state.config);
    let Some(slug) = non_empty(query.slug.as_deref()).map(str::to_owned) else {
        return page.into_response();
    };

    page.link = state.store.get_link(&slug).await;
    page.slug = Some(slug);
    page.into_response()
}

/// POST /delete.html?slug=
///
/// Answers JSON when the request was sent as `application/json`, the
/// rendered page otherwise.
pub async fn delete_action(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DeleteQuery>,
    headers: HeaderMap,
) -> Response {
    let wants_json = is_json(&headers);
    let mut page = DeleteTemplate::new(&state.config);

    let Some(slug) = non_empty(query.slug.as_deref()).map(str::to_owned) else {
        if wants_json {
            return AppError::Validation(vec!["slug is required".to_owned()]).into_response();
        }
        return page.into_response();
    };

    let outcome = state.store.delete_link(&slug).await;
    // Evict both layers whatever happened; a stale copy must not outlive the record.
    state.forget_link(&slug);

    match outcome {
        Ok(DeleteOutcome::Deleted { deleted_slug, link }) => {
            let deleted = DeletedLink {
                deleted_slug,
                original_url: link.original_url,
            };
            if wants_json {
                return ApiResponse::success(deleted, "Link deleted successfully").into_response();
            }
            page.deleted = Some(deleted);
        }
        Ok(DeleteOutcome::NotFound) => {
            if wants_json {
                return AppError::NotFound.into_response();
            }
            page.error = Some("Link not found");
            page.slug = Some(slug);
        }
        Err(e) => {
            if wants_json {
                return AppError::store("Failed to process deletion", e).into_response();
            }
            tracing::error!("Delete of '{}' failed: {}", slug, e);
            page.error = Some("Failed to process deletion");
            page.slug = Some(slug);
        }
    }

    page.into_response()
}

/// Fallback for unknown routes.
pub async fn not_found(uri: Uri) -> Response {
    tracing::debug!("404: {}", uri);
    (
        StatusCode::NOT_FOUND,
        NotFoundTemplate {
            title: "404 Not Found",
            url: uri.to_string(),
        },
    )
        .into_response()
}

// ── Private helpers ────────────────────────────────────────────────────────

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"))
}
