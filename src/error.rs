use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::worker::ClassifyError;

/// Failures surfaced by the HTTP endpoints. Response bodies carry only the
/// generic `Display` text; underlying causes are logged, never leaked.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("Classification timed out, try again later")]
    ClassificationTimeout,

    #[error("Classification failed")]
    Classification(#[source] anyhow::Error),

    #[error("Upstream RPC timed out")]
    UpstreamTimeout,

    #[error("Upstream RPC failed")]
    Upstream(#[source] anyhow::Error),

    #[error("{0} not configured")]
    NotConfigured(&'static str),
}

impl ServiceError {
    fn status(&self) -> StatusCode {
        match self {
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::ClassificationTimeout
            | Self::Classification(_)
            | Self::UpstreamTimeout
            | Self::NotConfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl From<ClassifyError> for ServiceError {
    fn from(err: ClassifyError) -> Self {
        match err {
            ClassifyError::TimedOut => Self::ClassificationTimeout,
            ClassifyError::Failed(source) => Self::Classification(source),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        match &self {
            Self::Classification(source) | Self::Upstream(source) => {
                tracing::error!(error = ?source, "request failed");
            }
            Self::ClassificationTimeout | Self::UpstreamTimeout => {
                tracing::warn!("request timed out");
            }
            Self::InvalidInput(_) | Self::NotConfigured(_) => {}
        }

        let body = Json(serde_json::json!({ "detail": self.to_string() }));
        (self.status(), body).into_response()
    }
}
