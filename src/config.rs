use anyhow::{Context, Result};

/// Which document backend holds the link table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    /// A GitHub Gist, the production store.
    Gist {
        token: String,
        gist_id: Option<String>,
        gist_name: String,
        api_url: String,
    },
    /// Process memory only; everything is lost on restart.
    Memory,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Host to bind the HTTP server to, e.g. "0.0.0.0"
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Public base URL used when generating short links, e.g. "https://s.example.com".
    /// Never has a trailing slash.
    pub app_domain: String,

    pub store: StoreBackend,

    /// Shared secret for `/linkdata` and `/clear-cache`. When unset every
    /// admin request is refused.
    pub admin_key: Option<String>,

    /// Threshold of the hourly API rate limiter.
    pub max_requests_per_hour: u32,

    /// Reverse proxies (addresses or CIDR ranges) whose `X-Forwarded-For`
    /// is believed. Requests from anyone else are keyed by socket address.
    pub trusted_proxies: Vec<String>,
}

impl AppConfig {
    /// Load configuration from environment variables (populated by dotenvy before this is called).
    pub fn from_env() -> Result<Self> {
        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "5480".into())
            .parse::<u16>()
            .context("PORT must be a valid port number (1-65535)")?;

        let app_domain = std::env::var("APP_DOMAIN")
            .unwrap_or_else(|_| format!("http://localhost:{port}"))
            .trim_end_matches('/')
            .to_owned();

        let max_requests_per_hour = std::env::var("MAX_REQUESTS_PER_HOUR")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(35);

        let store = match std::env::var("STORE_BACKEND")
            .unwrap_or_else(|_| "gist".into())
            .to_ascii_lowercase()
            .as_str()
        {
            "gist" => {
                let token = std::env::var("GITHUB_TOKEN")
                    .context("GITHUB_TOKEN must be set in the environment or .env file")?;
                if token.trim().is_empty() {
                    anyhow::bail!("GITHUB_TOKEN must not be empty");
                }

                StoreBackend::Gist {
                    token,
                    gist_id: non_empty_var("GIST_ID"),
                    gist_name: non_empty_var("GIST_NAME").unwrap_or_else(|| "links.json".into()),
                    api_url: non_empty_var("GITHUB_API_URL")
                        .unwrap_or_else(|| "https://api.github.com".into())
                        .trim_end_matches('/')
                        .to_owned(),
                }
            }
            "memory" => StoreBackend::Memory,
            other => anyhow::bail!("STORE_BACKEND must be 'gist' or 'memory', got '{other}'"),
        };

        Ok(Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port,
            app_domain,
            store,
            admin_key: non_empty_var("ADMIN_KEY"),
            max_requests_per_hour,
            trusted_proxies: non_empty_var("TRUSTED_PROXIES")
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|p| !p.is_empty())
                        .map(str::to_owned)
                        .collect()
                })
                .unwrap_or_default(),
        })
    }

    /// Public URL for a slug.
    pub fn short_url(&self, slug: &str) -> String {
        format!("{}/r/{}", self.app_domain, slug)
    }

    /// Compare a supplied admin key against the configured one.
    pub fn is_admin_key(&self, supplied: Option<&str>) -> bool {
        match (self.admin_key.as_deref(), supplied) {
            (Some(expected), Some(given)) => !given.is_empty() && expected == given,
            _ => false,
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
