//! Error taxonomy shared across the repository, aggregation, and HTTP layers

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;

/// Typed outcome for every read/write path. Handlers never match on error
/// strings; "empty" and "broken" stay distinguishable all the way to the
/// response body.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The requested series code does not exist.
    #[error("series not found: {code}")]
    SeriesNotFound { code: String },

    /// The requested blog post does not exist (or is unpublished).
    #[error("post not found: {slug}")]
    PostNotFound { slug: String },

    /// The series exists but no points satisfy the filter. Carries the
    /// product and region so the caller can render "no data for X".
    #[error("no price data for {product} in {region}")]
    NoData { product: String, region: String },

    /// Malformed write input, rejected before touching storage. All
    /// violations are aggregated into one message.
    #[error("invalid input: {}", violations.join("; "))]
    Validation { violations: Vec<String> },

    /// A write collided with the uniqueness constraint in a way the upsert
    /// did not absorb. Retryable.
    #[error("write conflict on {key}")]
    Conflict { key: String },

    /// The persistence layer is unreachable or failed unexpectedly. Never
    /// collapsed into an empty result.
    #[error("storage error: {0}")]
    Storage(String),

    /// The server is running without a dependency it needs for this route.
    #[error("service unavailable: {0}")]
    Unavailable(String),
}

impl ApiError {
    pub fn validation(violations: Vec<String>) -> ApiError {
        ApiError::Validation { violations }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::SeriesNotFound { .. }
            | ApiError::PostNotFound { .. }
            | ApiError::NoData { .. } => StatusCode::NOT_FOUND,
            ApiError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Conflict { .. } => StatusCode::CONFLICT,
            ApiError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl From<tokio_postgres::Error> for ApiError {
    fn from(e: tokio_postgres::Error) -> Self {
        ApiError::Storage(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "request failed");
        }
        let body = match &self {
            ApiError::NoData { product, region } => json!({
                "error": self.to_string(),
                "kind": "no_data",
                "product": product,
                "region": region,
            }),
            ApiError::SeriesNotFound { code } => json!({
                "error": self.to_string(),
                "kind": "series_not_found",
                "code": code,
            }),
            ApiError::PostNotFound { slug } => json!({
                "error": self.to_string(),
                "kind": "post_not_found",
                "slug": slug,
            }),
            ApiError::Validation { violations } => json!({
                "error": self.to_string(),
                "kind": "validation",
                "violations": violations,
            }),
            ApiError::Conflict { .. } => json!({
                "error": self.to_string(),
                "kind": "conflict",
            }),
            ApiError::Storage(_) => json!({
                "error": "internal storage error",
                "kind": "storage",
            }),
            ApiError::Unavailable(_) => json!({
                "error": self.to_string(),
                "kind": "unavailable",
            }),
        };
        (status, Json(body)).into_response()
    }
}
