use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use serde::Deserialize;
use serde_json::json;
use std::{collections::HashMap, time::Duration};

use super::DocumentBackend;
use crate::{error::StoreError, models::LinkTable};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const USER_AGENT: &str = "NVSURL-Shortener";

// ── GitHub API response shapes ─────────────────────────────────────────────

#[derive(Deserialize)]
struct GistResponse {
    id: String,
    #[serde(default)]
    files: HashMap<String, GistFile>,
}

#[derive(Deserialize)]
struct GistFile {
    content: Option<String>,
    #[serde(default)]
    truncated: bool,
    raw_url: Option<String>,
}

// ── Backend ────────────────────────────────────────────────────────────────

/// Keeps the link table as a single JSON file inside a private GitHub Gist.
///
/// Every call is a plain HTTPS request with a 10-second timeout; nothing is
/// retried here.
pub struct GistBackend {
    client: reqwest::Client,
    api_url: String,
    file_name: String,
}

impl GistBackend {
    pub fn new(
        token: &str,
        api_url: impl Into<String>,
        file_name: impl Into<String>,
    ) -> Result<Self, StoreError> {
        let mut auth = HeaderValue::from_str(&format!("token {token}"))
            .map_err(|e| StoreError::Unavailable(format!("GITHUB_TOKEN is not a valid header: {e}")))?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github.v3+json"),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            api_url: api_url.into(),
            file_name: file_name.into(),
        })
    }

    fn gist_url(&self, id: &str) -> String {
        format!("{}/gists/{}", self.api_url, id)
    }

    async fn get_gist(&self, id: &str) -> Result<GistResponse, StoreError> {
        let resp = self.client.get(self.gist_url(id)).send().await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound(id.to_owned()));
        }
        Ok(check_status(resp).await?.json().await?)
    }

    /// The API inlines at most about a megabyte of file content; past that
    /// the full text has to come from `raw_url`.
    async fn file_content(&self, file: GistFile) -> Result<String, StoreError> {
        match (file.truncated, file.content, file.raw_url) {
            (false, Some(content), _) => Ok(content),
            (_, _, Some(raw_url)) => {
                tracing::debug!("Gist file truncated, fetching {}", raw_url);
                let resp = self.client.get(&raw_url).send().await?;
                Ok(check_status(resp).await?.text().await?)
            }
            (_, Some(content), None) => Ok(content),
            (_, None, None) => Err(StoreError::MissingFile(self.file_name.clone())),
        }
    }
}

#[async_trait]
impl DocumentBackend for GistBackend {
    async fn create_document(&self, initial: &LinkTable) -> Result<String, StoreError> {
        let body = json!({
            "description": "URL Shortener Database",
            "public": false,
            "files": {
                &self.file_name: { "content": serde_json::to_string_pretty(initial)? }
            }
        });

        let resp = self
            .client
            .post(format!("{}/gists", self.api_url))
            .json(&body)
            .send()
            .await?;
        let gist: GistResponse = check_status(resp).await?.json().await?;
        Ok(gist.id)
    }

    async fn document_exists(&self, id: &str) -> Result<(), StoreError> {
        self.get_gist(id).await.map(|_| ())
    }

    async fn fetch(&self, id: &str) -> Result<LinkTable, StoreError> {
        let mut gist = self.get_gist(id).await?;
        let file = gist
            .files
            .remove(&self.file_name)
            .ok_or_else(|| StoreError::MissingFile(self.file_name.clone()))?;
        let content = self.file_content(file).await?;
        Ok(serde_json::from_str(&content)?)
    }

    async fn replace(&self, id: &str, table: &LinkTable) -> Result<(), StoreError> {
        let body = json!({
            "description": format!("URL Shortener ({} links)", table.links.len()),
            "files": {
                &self.file_name: { "content": serde_json::to_string_pretty(table)? }
            }
        });

        let resp = self.client.patch(self.gist_url(id)).json(&body).send().await?;
        check_status(resp).await?;
        Ok(())
    }
}

/// Turn a non-2xx answer into `StoreError::Status`, keeping the body for the log.
async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, StoreError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(StoreError::Status { status, body })
}
