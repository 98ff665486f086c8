use rand::Rng;
use std::future::Future;
use url::Url;

use crate::models::ShortenRequest;

const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Shortest and longest generated slug.
pub const GENERATED_MIN_LEN: usize = 5;
pub const GENERATED_MAX_LEN: usize = 8;

/// How many generated slugs the shorten handler tries before giving up.
pub const MAX_SLUG_ATTEMPTS: usize = 10;

const CUSTOM_MIN_LEN: usize = 2;
const CUSTOM_MAX_LEN: usize = 30;

/// Generate a random alphanumeric slug of 5 to 8 characters.
///
/// Uniqueness is not checked here; the caller looks the slug up in the
/// store and retries on collision.
pub fn generate() -> String {
    let mut rng = rand::thread_rng();
    let len = rng.gen_range(GENERATED_MIN_LEN..=GENERATED_MAX_LEN);
    (0..len)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

/// Draw slugs from `generate` until `is_taken` reports a free one.
///
/// Gives up with `None` after `MAX_SLUG_ATTEMPTS` collisions.
pub async fn allocate<G, T, Fut>(mut generate: G, mut is_taken: T) -> Option<String>
where
    G: FnMut() -> String,
    T: FnMut(String) -> Fut,
    Fut: Future<Output = bool>,
{
    for attempt in 1..=MAX_SLUG_ATTEMPTS {
        let candidate = generate();
        if !is_taken(candidate.clone()).await {
            return Some(candidate);
        }
        tracing::debug!("Slug '{}' already taken (attempt {})", candidate, attempt);
    }
    None
}

/// Letters, digits, `_` and `-`, between 2 and 30 characters long.
pub fn is_valid_slug(candidate: &str) -> bool {
    (CUSTOM_MIN_LEN..=CUSTOM_MAX_LEN).contains(&candidate.len())
        && candidate
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

/// Absolute `http` or `https` URL.
pub fn is_valid_url(candidate: &str) -> bool {
    match Url::parse(candidate) {
        Ok(url) => matches!(url.scheme(), "http" | "https"),
        Err(_) => false,
    }
}

/// Check a shorten request and collect one message per offending field.
pub fn validate_shorten_request(req: &ShortenRequest) -> Result<(), Vec<String>> {
    let mut errors = Vec::new();

    match non_empty(req.original_url.as_deref()) {
        None => errors.push("originalUrl is required".to_owned()),
        Some(url) if !is_valid_url(url) => {
            errors.push("originalUrl must be a valid URL".to_owned())
        }
        Some(_) => {}
    }

    if let Some(slug) = non_empty(req.custom_slug.as_deref()) {
        if !is_valid_slug(slug) {
            errors.push(
                "customSlug must be 2-30 characters and contain only letters, numbers, hyphens, and underscores"
                    .to_owned(),
            );
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Treat empty strings the same as a missing field.
pub fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.is_empty())
}
