use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::response::ApiResponse;

/// Failures talking to the remote document store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("request to document store failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("document store answered {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("file '{0}' is missing from the document")]
    MissingFile(String),

    #[error("document is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("document '{0}' does not exist")]
    NotFound(String),

    #[error("document store unavailable: {0}")]
    Unavailable(String),
}

/// Errors a handler can answer with. Each maps to one status code and the
/// error envelope.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{}", .0.join(", "))]
    Validation(Vec<String>),

    #[error("Slug already exists")]
    Conflict,

    #[error("Link not found")]
    NotFound,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Failed to generate unique slug")]
    SlugExhausted,

    /// A write against the store failed; `context` is the user-facing text.
    #[error("{context}")]
    Store {
        context: &'static str,
        #[source]
        source: StoreError,
    },
}

impl AppError {
    pub fn store(context: &'static str, source: StoreError) -> Self {
        Self::Store { context, source }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict => StatusCode::CONFLICT,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::SlugExhausted | AppError::Store { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut body = ApiResponse::error(self.to_string());

        match self {
            AppError::Validation(errors) => body = body.errors(errors),
            AppError::Unauthorized => body = body.code("UNAUTHORIZED"),
            AppError::Store { context, source } => {
                tracing::error!("{}: {}", context, source);
            }
            _ => {}
        }

        body.with_status(status)
    }
}
