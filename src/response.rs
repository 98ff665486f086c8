use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value};

pub const SERVER_NAME: &str = "NVSURL";

/// JSON envelope shared by every API endpoint.
///
/// Success bodies carry `data` and `meta`; error bodies carry an optional
/// machine-readable `code` and field-level `errors`.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T, message: impl Into<String>) -> Self {
        Self::success_with_meta(data, message, Map::new())
    }

    /// `extra` is merged over the default `server`/`version` meta.
    pub fn success_with_meta(
        data: T,
        message: impl Into<String>,
        extra: Map<String, Value>,
    ) -> Self {
        let mut meta = Map::new();
        meta.insert("server".into(), json!(SERVER_NAME));
        meta.insert("version".into(), json!(env!("CARGO_PKG_VERSION")));
        meta.extend(extra);

        Self {
            success: true,
            data: Some(data),
            message: message.into(),
            timestamp: Utc::now(),
            meta: Some(meta),
            code: None,
            errors: None,
        }
    }

    /// Pair the envelope with a status code.
    pub fn with_status(self, status: StatusCode) -> Response {
        (status, Json(self)).into_response()
    }
}

impl ApiResponse<()> {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: message.into(),
            timestamp: Utc::now(),
            meta: None,
            code: None,
            errors: None,
        }
    }

    pub fn code(mut self, code: &'static str) -> Self {
        self.code = Some(code);
        self
    }

    pub fn errors(mut self, errors: Vec<String>) -> Self {
        self.errors = Some(errors);
        self
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let status = if self.success {
            StatusCode::OK
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        self.with_status(status)
    }
}
