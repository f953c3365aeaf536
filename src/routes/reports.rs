use axum::body::Bytes;
use axum::extract::{Multipart, Path, Query, State};
use axum::response::Html;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::AppError;
use crate::models::{Kpis, NormalizationStats, ReportId};
use crate::services::ingest_service::{InputFormat, Submission};
use crate::services::report_service;
use crate::services::report_store::StoredReport;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/analyser", post(analyse_upload))
        .route("/analyser/json", post(analyse_json))
        .route("/rapport", get(latest_report))
        .route("/rapport/:id", get(report_by_id))
}

#[derive(Debug, Serialize)]
pub struct AnalyseResponse {
    pub report_id: ReportId,
    pub kpis: Kpis,
    pub html_report: String,
    pub stats: NormalizationStats,
}

impl From<StoredReport> for AnalyseResponse {
    fn from(report: StoredReport) -> Self {
        Self {
            report_id: report.id,
            kpis: report.kpis,
            html_report: report.html.to_string(),
            stats: report.stats,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct GranularityQuery {
    pub granularity: Option<String>,
}

async fn analyse_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<AnalyseResponse>, AppError> {
    let mut file: Option<(Option<String>, Bytes)> = None;
    let mut granularity = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Invalid multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let file_name = field.file_name().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Validation(format!("Failed to read upload: {}", e)))?;
                file = Some((file_name, bytes));
            }
            "granularity" => {
                granularity = Some(field.text().await.map_err(|e| {
                    AppError::Validation(format!("Failed to read granularity: {}", e))
                })?);
            }
            _ => {}
        }
    }

    let (file_name, payload) =
        file.ok_or_else(|| AppError::Validation("Missing 'file' field".to_string()))?;
    let format = InputFormat::from_file_name(file_name.as_deref());

    info!(
        "POST /analyser - {} upload {} ({} bytes, granularity {:?})",
        format.as_str(),
        file_name.as_deref().unwrap_or("<unnamed>"),
        payload.len(),
        granularity
    );

    let submission = Submission {
        format,
        payload: payload.to_vec(),
        granularity,
    };
    report_service::generate_report(&state, submission)
        .await
        .map(|report| Json(report.into()))
}

async fn analyse_json(
    State(state): State<AppState>,
    Query(params): Query<GranularityQuery>,
    body: Bytes,
) -> Result<Json<AnalyseResponse>, AppError> {
    info!(
        "POST /analyser/json - {} bytes, granularity {:?}",
        body.len(),
        params.granularity
    );

    let submission = Submission {
        format: InputFormat::Json,
        payload: body.to_vec(),
        granularity: params.granularity,
    };
    report_service::generate_report(&state, submission)
        .await
        .map(|report| Json(report.into()))
}

async fn latest_report(State(state): State<AppState>) -> Result<Html<String>, AppError> {
    info!("GET /rapport - Fetching latest report");
    state.reports.latest_html().await.map(Html)
}

async fn report_by_id(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Html<String>, AppError> {
    info!("GET /rapport/{} - Fetching report", id);
    let id = ReportId::parse(&id).ok_or(AppError::NotFound)?;
    state.reports.read_html(&id).await.map(Html)
}
