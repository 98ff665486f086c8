use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Keys this version does not model. They are carried through unchanged so
/// a rewrite of the document never drops data written by other tools.
pub type ExtraFields = Map<String, Value>;

/// A shortened link as stored in the gist document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Link {
    pub slug: String,
    pub original_url: String,
    pub short_url: String,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub clicks: u64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub metadata: LinkMetadata,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_accessed: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: ExtraFields,
}

/// Who created a link and how.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkMetadata {
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub created_via: String,
    #[serde(flatten)]
    pub extra: ExtraFields,
}

/// A link as assembled by the shorten handler, before the store stamps it.
#[derive(Debug, Clone)]
pub struct NewLink {
    pub slug: String,
    pub original_url: String,
    pub short_url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub metadata: LinkMetadata,
}

impl NewLink {
    pub fn into_link(self, now: DateTime<Utc>) -> Link {
        Link {
            slug: self.slug,
            original_url: self.original_url,
            short_url: self.short_url,
            clicks: 0,
            title: self.title,
            description: self.description,
            is_active: true,
            metadata: self.metadata,
            created_at: now,
            updated_at: now,
            last_accessed: None,
            extra: ExtraFields::new(),
        }
    }
}

/// The whole gist document. It is always read and written as one unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkTable {
    #[serde(default)]
    pub links: BTreeMap<String, Link>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub total_links: usize,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(flatten)]
    pub extra: ExtraFields,
}

impl LinkTable {
    pub fn empty() -> Self {
        Self {
            links: BTreeMap::new(),
            created_at: Utc::now(),
            updated_at: None,
            total_links: 0,
            version: default_version(),
            extra: ExtraFields::new(),
        }
    }

    /// Refresh the bookkeeping fields before a write.
    pub fn stamp(&mut self, now: DateTime<Utc>) {
        self.updated_at = Some(now);
        self.total_links = self.links.len();
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            total_links: self.links.len(),
            total_clicks: self.links.values().map(|l| l.clicks).sum(),
            created_at: Some(self.created_at),
            updated_at: self.updated_at,
        }
    }
}

impl Default for LinkTable {
    fn default() -> Self {
        Self::empty()
    }
}

/// Aggregate figures over the whole link table.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub total_links: usize,
    pub total_clicks: u64,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// JSON body of `POST /shorten`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShortenRequest {
    pub original_url: Option<String>,
    pub custom_slug: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
}

fn default_active() -> bool {
    true
}

fn default_version() -> String {
    "1.0".to_owned()
}

fn null_as_zero<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    Ok(Option::<u64>::deserialize(deserializer)?.unwrap_or(0))
}
