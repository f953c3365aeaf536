use http::StatusCode;
use axum::response::IntoResponse;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Schema error: {0}")]
    Schema(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Render error: {0}")]
    Render(String),
    #[error("Not found")]
    NotFound,
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        match self {
            AppError::NotFound => (StatusCode::NOT_FOUND, "Not found").into_response(),
            AppError::Schema(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg).into_response(),
            AppError::Parse(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            AppError::Render(msg) => {
                tracing::error!("Chart rendering failed: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Report rendering failed").into_response()
            }
            AppError::Storage(e) => {
                tracing::error!("Report storage failed: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
            }
            AppError::Internal(msg) => {
                tracing::error!("{}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
            }
        }
    }
}

impl From<csv::Error> for AppError {
    fn from(value: csv::Error) -> Self {
        AppError::Parse(format!("Invalid CSV: {}", value))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        AppError::Parse(format!("Invalid JSON: {}", value))
    }
}

/// Failures of the optional enrichment stages (summary, word cloud).
///
/// These never fail a report: callers log them and leave the section out.
#[derive(Debug, Error)]
pub enum EnrichmentError {
    #[error("Summarizer request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Invalid summarizer endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("Summarizer returned status {0}")]
    Status(u16),
    #[error("Summarizer returned an empty summary")]
    EmptySummary,
    #[error("Nothing to process")]
    NoInput,
    #[error("Rendering failed: {0}")]
    Render(String),
}

impl From<AppError> for EnrichmentError {
    fn from(value: AppError) -> Self {
        EnrichmentError::Render(value.to_string())
    }
}
