use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::AppState;
use crate::{
    analysis::{Analysis, AnalysisTarget, BatchResult, IncidentReport},
    collector::EvidenceSummary,
    config::{format_duration, parse_duration},
    metrics,
    sources::AlertManagerWebhook,
    store::{NewAnalysis, StoredAnalysis},
};

const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 500;

/// Error body returned by every endpoint: `{"error": "..."}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<crate::Error> for ApiError {
    fn from(err: crate::Error) -> Self {
        match err {
            crate::Error::NotFound(msg) => ApiError::not_found(msg),
            crate::Error::Validation(msg) => ApiError::bad_request(msg),
            other => ApiError::internal(other.to_string()),
        }
    }
}

/// Body of the single-target endpoints. `alert_id` is only meaningful for
/// `/analyze/alert` and is echoed back.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub alert_id: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub pod: Option<String>,
    #[serde(default)]
    pub lookback: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetSummary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert_id: Option<String>,
    pub namespace: String,
    pub pod: String,
    pub lookback: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    pub alert: TargetSummary,
    pub analysis: IncidentReport,
    pub collected_data: EvidenceSummary,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    limit: Option<i64>,
    offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    analyses: Vec<StoredAnalysis>,
    total: i64,
    limit: i64,
    offset: i64,
}

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "time": Utc::now().to_rfc3339(),
    }))
}

pub async fn prometheus_metrics() -> Result<String, ApiError> {
    Ok(metrics::gather_metrics()?)
}

pub async fn analyze_alert(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AnalyzeRequest>,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    run_single(&state, request).await.map(Json)
}

pub async fn analyze_pod(
    State(state): State<Arc<AppState>>,
    Json(mut request): Json<AnalyzeRequest>,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    request.alert_id = None;
    run_single(&state, request).await.map(Json)
}

fn required(value: Option<String>, field: &str) -> Result<String, ApiError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::bad_request(format!("{} is required", field)))
}

fn resolve_lookback(raw: Option<&str>, default: Duration) -> Result<Duration, ApiError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(default),
        Some(raw) => match parse_duration(raw) {
            Ok(d) if !d.is_zero() => Ok(d),
            _ => Err(ApiError::bad_request(format!("invalid lookback duration: {}", raw))),
        },
    }
}

async fn run_single(state: &AppState, request: AnalyzeRequest) -> Result<AnalyzeResponse, ApiError> {
    let namespace = required(request.namespace, "namespace")?;
    let pod = required(request.pod, "pod")?;
    let lookback = resolve_lookback(request.lookback.as_deref(), state.analysis.default_lookback)?;

    let mut target = AnalysisTarget::new(namespace.clone(), pod.clone(), lookback);
    if let Some(alert_id) = &request.alert_id {
        target = target.with_fingerprint(alert_id.clone());
    }

    let Analysis { report, collected } = state
        .analyzer
        .analyze_with_summary_within(&target, state.analysis.request_timeout)
        .await
        .map_err(|e| {
            error!(namespace = %namespace, pod = %pod, error = %e, "analysis failed");
            ApiError::internal(e.to_string())
        })?;

    let record = NewAnalysis {
        fingerprint: request.alert_id.clone().unwrap_or_default(),
        alert_name: request.alert_id.clone().unwrap_or_else(|| "manual".to_string()),
        namespace: namespace.clone(),
        pod: pod.clone(),
        severity: "unknown".to_string(),
        alert_status: "manual".to_string(),
        alert_started_at: None,
        report: report.clone(),
    };
    let analysis_id = match state.store.save_analysis(record).await {
        Ok(id) => Some(id),
        Err(e) => {
            warn!(namespace = %namespace, pod = %pod, error = %e, "failed to persist analysis");
            None
        }
    };

    Ok(AnalyzeResponse {
        alert: TargetSummary {
            alert_id: request.alert_id,
            namespace,
            pod,
            lookback: format_duration(lookback),
        },
        analysis: report,
        collected_data: collected,
        analysis_id,
    })
}

pub async fn alertmanager_webhook(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<AlertManagerWebhook>,
) -> Json<BatchResult> {
    let alerts = payload.into_alerts();
    metrics::WEBHOOK_ALERTS_TOTAL.inc_by(alerts.len() as u64);
    info!(count = alerts.len(), "Received Alertmanager webhook");

    let result = state
        .coordinator
        .process_batch_within(alerts, state.analysis.default_lookback, state.analysis.batch_timeout)
        .await;

    for success in &result.successes {
        if let Err(e) = state.store.save_analysis(NewAnalysis::from(success)).await {
            warn!(
                fingerprint = %success.fingerprint,
                alert_name = %success.alert_name,
                error = %e,
                "failed to persist analysis"
            );
        }
    }

    info!(
        received = result.received_count,
        analyzed = result.analyzed_count,
        failed = result.failed_count,
        "Webhook batch complete"
    );
    Json(result)
}

pub async fn list_analyses(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ListResponse>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let offset = query.offset.unwrap_or(0).max(0);

    let analyses = state.store.list_analyses(limit, offset).await?;
    let total = state.store.count_analyses().await?;

    Ok(Json(ListResponse {
        analyses,
        total,
        limit,
        offset,
    }))
}

pub async fn get_analysis(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<StoredAnalysis>, ApiError> {
    state
        .store
        .get_analysis(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("analysis {} not found", id)))
}
