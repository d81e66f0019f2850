mod routes;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{
    analysis::{Analyzer, BatchCoordinator},
    config::{AnalysisConfig, Config},
    store::ReportStore,
    Error, Result,
};

pub use routes::{AnalyzeRequest, AnalyzeResponse, TargetSummary};

/// Shared state handed to every handler.
pub struct AppState {
    pub analyzer: Arc<Analyzer>,
    pub coordinator: BatchCoordinator,
    pub store: Arc<dyn ReportStore>,
    pub analysis: AnalysisConfig,
}

pub struct Server {
    state: Arc<AppState>,
}

impl Server {
    pub fn new(config: &Config, analyzer: Arc<Analyzer>, store: Arc<dyn ReportStore>) -> Self {
        let coordinator = BatchCoordinator::new(analyzer.clone())
            .with_max_concurrency(config.analysis.max_concurrency);
        Self {
            state: Arc::new(AppState {
                analyzer,
                coordinator,
                store,
                analysis: config.analysis.clone(),
            }),
        }
    }

    pub fn build_router(&self) -> Router {
        Router::new()
            .route("/health", get(routes::health))
            .route("/metrics", get(routes::prometheus_metrics))
            .route("/api/v1/analyze/alert", post(routes::analyze_alert))
            .route("/api/v1/analyze/pod", post(routes::analyze_pod))
            .route("/api/v1/webhook/alertmanager", post(routes::alertmanager_webhook))
            .route("/api/v1/analyses", get(routes::list_analyses))
            .route("/api/v1/analyses/{id}", get(routes::get_analysis))
            .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
            .with_state(self.state.clone())
    }

    pub async fn start(self, addr: &str) -> Result<()> {
        let listener = TcpListener::bind(addr).await?;
        info!("Listening on {}", listener.local_addr()?);
        axum::serve(listener, self.build_router())
            .await
            .map_err(|e| Error::Internal(format!("server error: {}", e)))
    }
}
