use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::Response,
};
use dashmap::DashMap;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::time::Instant;

use crate::{ip::client_ip, response::ApiResponse};

/// Above this many tracked clients, stale windows are pruned before counting.
const PRUNE_THRESHOLD: usize = 10_000;

/// Per-client request counter over fixed, non-sliding windows.
///
/// A client's window starts with its first request and is reset wholesale
/// once `window` has elapsed.
pub struct FixedWindowLimiter {
    max: u32,
    window: Duration,
    message: String,
    standard_headers: bool,
    trusted_proxies: Vec<String>,
    counters: DashMap<String, Window>,
}

struct Window {
    started: Instant,
    count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_after: Duration,
}

impl FixedWindowLimiter {
    pub fn new(max: u32, window: Duration, message: impl Into<String>) -> Self {
        Self {
            max,
            window,
            message: message.into(),
            standard_headers: false,
            trusted_proxies: Vec::new(),
            counters: DashMap::new(),
        }
    }

    /// Hourly limiter shared by the API and status routes.
    pub fn api(max_per_hour: u32) -> Self {
        Self::new(
            max_per_hour,
            Duration::from_secs(60 * 60),
            format!("Too many requests. Maximum {max_per_hour} requests per hour."),
        )
        .with_standard_headers()
    }

    /// Stricter limiter in front of link creation.
    pub fn create_link() -> Self {
        Self::new(
            10,
            Duration::from_secs(15 * 60),
            "Too many link creation attempts. Please wait 15 minutes.",
        )
    }

    /// Emit `RateLimit-Limit`, `RateLimit-Remaining` and `RateLimit-Reset`.
    pub fn with_standard_headers(mut self) -> Self {
        self.standard_headers = true;
        self
    }

    /// Key requests arriving through these proxies by their forwarded
    /// address instead of the proxy's own.
    pub fn trusting(mut self, proxies: Vec<String>) -> Self {
        self.trusted_proxies = proxies;
        self
    }

    /// Count one request from `client` and say whether it may proceed.
    /// Refused requests are not counted.
    pub fn check(&self, client: &str) -> Decision {
        let now = Instant::now();

        if self.counters.len() > PRUNE_THRESHOLD {
            self.counters
                .retain(|_, w| now.duration_since(w.started) < self.window);
        }

        let mut window = self.counters.entry(client.to_owned()).or_insert(Window {
            started: now,
            count: 0,
        });

        if now.duration_since(window.started) >= self.window {
            window.started = now;
            window.count = 0;
        }

        let reset_after = self
            .window
            .saturating_sub(now.duration_since(window.started));

        if window.count >= self.max {
            return Decision {
                allowed: false,
                limit: self.max,
                remaining: 0,
                reset_after,
            };
        }

        window.count += 1;
        Decision {
            allowed: true,
            limit: self.max,
            remaining: self.max - window.count,
            reset_after,
        }
    }

    pub fn max(&self) -> u32 {
        self.max
    }
}

/// Middleware: count the request against `limiter`, answer 429 when the
/// client's window is used up.
pub async fn enforce(
    State(limiter): State<Arc<FixedWindowLimiter>>,
    req: Request,
    next: Next,
) -> Response {
    let peer = req.extensions().get::<ConnectInfo<SocketAddr>>();
    let client = client_ip(req.headers(), peer, &limiter.trusted_proxies)
        .unwrap_or_else(|| "unknown".to_owned());
    let decision = limiter.check(&client);

    let mut response = if decision.allowed {
        next.run(req).await
    } else {
        tracing::warn!(
            "Rate limit reached for {} on {} {}",
            client,
            req.method(),
            req.uri().path()
        );
        ApiResponse::error(limiter.message.clone())
            .code("RATE_LIMITED")
            .with_status(StatusCode::TOO_MANY_REQUESTS)
    };

    if limiter.standard_headers {
        let headers = response.headers_mut();
        let reset_secs = decision.reset_after.as_secs_f64().ceil() as u64;
        for (name, value) in [
            ("ratelimit-limit", decision.limit as u64),
            ("ratelimit-remaining", decision.remaining as u64),
            ("ratelimit-reset", reset_secs),
        ] {
            headers.insert(HeaderName::from_static(name), HeaderValue::from(value));
        }
    }

    response
}
