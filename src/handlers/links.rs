use crate::{
    error::AppError,
    ip::{client_ip, user_agent},
    models::{LinkMetadata, NewLink, ShortenRequest},
    response::ApiResponse,
    slug, AppState,
};
use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::{net::SocketAddr, sync::Arc};

use super::redirect_with;

/// GET /r/:slug
///
/// 1. Handler cache hit: bump the click count in a background task and
///    redirect straight away.
/// 2. Miss: ask the store; unknown slugs go back to the homepage with an
///    error flag.
/// 3. Otherwise count the click before redirecting and cache the result. A
///    slug deleted in the meantime is treated as unknown.
pub async fn redirect(State(state): State<Arc<AppState>>, Path(slug): Path<String>) -> Response {
    // ── 1. Fast path ───────────────────────────────────────────────────────
    if let Some(cached) = state.cache.get(&slug) {
        let state_bg = state.clone();
        let slug_bg = slug.clone();
        tokio::spawn(async move {
            let counted = state_bg
                .store
                .increment_click_and(&slug_bg, |updated| {
                    if updated.is_none() {
                        state_bg.cache.delete(&slug_bg);
                    }
                })
                .await;
            match counted {
                Ok(Some(_)) => {}
                Ok(None) => tracing::warn!(
                    "Click logging: link '{}' disappeared between redirect and log",
                    slug_bg
                ),
                Err(e) => tracing::error!("Click logging failed for '{}': {}", slug_bg, e),
            }
        });

        // Only touches a live entry, so a concurrent delete is not undone.
        state.cache.update(&slug, |link| link.clicks += 1);
        return redirect_with(StatusCode::MOVED_PERMANENTLY, &cached.original_url);
    }

    // ── 2. Resolve through the store ───────────────────────────────────────
    let Some(link) = state.store.get_link(&slug).await else {
        tracing::debug!("Unknown slug '{}'", slug);
        return redirect_with(StatusCode::FOUND, "/?error=link-not-found");
    };

    // ── 3. Count, cache, redirect ──────────────────────────────────────────
    // The handler cache is refreshed under the store's write lock, so a
    // delete that follows cannot be overwritten by this request.
    let counted = state
        .store
        .increment_click_and(&slug, |updated| match updated {
            Some(updated) => state.cache.set(&slug, updated.clone()),
            None => state.cache.delete(&slug),
        })
        .await;

    match counted {
        Ok(Some(_)) => redirect_with(StatusCode::MOVED_PERMANENTLY, &link.original_url),
        Ok(None) => {
            tracing::debug!("Link '{}' was deleted while redirecting", slug);
            redirect_with(StatusCode::FOUND, "/?error=link-not-found")
        }
        Err(e) => {
            tracing::error!("Redirect for '{}' failed to count click: {}", slug, e);
            redirect_with(StatusCode::FOUND, "/?error=server-error")
        }
    }
}

/// POST /shorten
pub async fn shorten(
    State(state): State<Arc<AppState>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    payload: Result<Json<ShortenRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(req) = payload.map_err(|rejection| AppError::Validation(vec![rejection.body_text()]))?;
    slug::validate_shorten_request(&req).map_err(AppError::Validation)?;

    let original_url = req.original_url.clone().unwrap_or_default();

    // Determine the slug to use
    let slug = match slug::non_empty(req.custom_slug.as_deref()) {
        Some(custom) => {
            if state.store.get_link(custom).await.is_some() {
                return Err(AppError::Conflict);
            }
            custom.to_owned()
        }
        None => {
            let store = &state.store;
            slug::allocate(slug::generate, move |candidate| async move {
                store.get_link(&candidate).await.is_some()
            })
            .await
            .ok_or(AppError::SlugExhausted)?
        }
    };

    let new_link = NewLink {
        short_url: state.config.short_url(&slug),
        slug,
        original_url,
        title: slug::non_empty(req.title.as_deref()).map(str::to_owned),
        description: slug::non_empty(req.description.as_deref()).map(str::to_owned),
        metadata: LinkMetadata {
            ip: client_ip(&headers, peer.as_ref(), &state.config.trusted_proxies),
            user_agent: user_agent(&headers),
            created_via: "API".to_owned(),
            ..Default::default()
        },
    };

    let link = state
        .store
        .create_link_and(new_link, |link| state.cache.set(&link.slug, link.clone()))
        .await
        .map_err(|e| AppError::store("Failed to shorten URL", e))?;

    Ok(ApiResponse::success(link, "URL shortened successfully").with_status(StatusCode::CREATED))
}

/// GET /stats/:slug
pub async fn link_stats(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> Result<Response, AppError> {
    let link = state.store.get_link(&slug).await.ok_or(AppError::NotFound)?;
    Ok(ApiResponse::success(link, "Link statistics").into_response())
}
