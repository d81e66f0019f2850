//! Analysis pipeline: evidence collection, prompt assembly, model invocation,
//! and normalization of the reply into an [`IncidentReport`].

pub mod analyzer;
pub mod batch;
pub mod extract;
pub mod prompt;
pub mod report;
pub mod timestamp;

pub use analyzer::{Analysis, Analyzer};
pub use batch::{AlertFailure, AlertOutcome, AlertSuccess, BatchCoordinator, BatchResult, ValidationError};
pub use extract::extract_json;
pub use prompt::PromptBuilder;
pub use report::{
    normalize_reply, normalize_reply_at, Confidence, EventEvidence, Evidence, IncidentReport,
    LogEvidence, Recommendation, TimelineEntry, UNPARSED_ROOT_CAUSE,
};
pub use timestamp::{normalize_timestamp, parse_timestamp, TimestampLayout};

use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

use crate::{collector::CollectionError, llm::ModelError};

// Roughly 30 years.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Deadline `timeout` from now, saturating instead of overflowing `Instant`.
pub fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout).unwrap_or_else(|| now + FAR_FUTURE)
}

/// What to analyze: one pod over a lookback window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisTarget {
    pub namespace: String,
    pub pod_name: String,
    pub lookback: Duration,
    pub alert_fingerprint: Option<String>,
}

impl AnalysisTarget {
    pub fn new(namespace: impl Into<String>, pod_name: impl Into<String>, lookback: Duration) -> Self {
        Self {
            namespace: namespace.into(),
            pod_name: pod_name.into(),
            lookback,
            alert_fingerprint: None,
        }
    }

    pub fn with_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.alert_fingerprint = Some(fingerprint.into());
        self
    }
}

/// Failure of a single-target analysis.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("failed to collect data: {0}")]
    Collection(#[from] CollectionError),
    #[error("LLM analysis failed: {0}")]
    Model(#[from] ModelError),
}

impl AnalysisError {
    pub fn kind(&self) -> &'static str {
        match self {
            AnalysisError::Collection(_) => "collection",
            AnalysisError::Model(_) => "model",
        }
    }
}
