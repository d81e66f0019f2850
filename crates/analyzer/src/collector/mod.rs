//! Evidence collection for one analysis target.

mod kubernetes;

pub use kubernetes::{KubeCollector, DEFAULT_TAIL_LINES};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::Pod;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Failure to resolve the pod itself. Log and event fetch problems are not
/// reported here; they degrade to placeholders inside [`CollectedEvidence`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CollectionError {
    #[error("pod {namespace}/{pod} not found")]
    NotFound { namespace: String, pod: String },
    #[error("kubernetes API unavailable: {0}")]
    Unavailable(String),
    #[error("evidence collection timed out")]
    Timeout,
}

/// A cluster event associated with the target pod.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    #[serde(rename = "type")]
    pub type_: String,
    pub reason: String,
    pub message: String,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Everything gathered for one analysis. Owned by that analysis alone.
#[derive(Debug, Clone, Default)]
pub struct CollectedEvidence {
    pub pod: Pod,
    pub logs: String,
    pub events: Vec<EventRecord>,
}

impl CollectedEvidence {
    pub fn summary(&self, lookback: Duration) -> EvidenceSummary {
        EvidenceSummary {
            logs_lines: self.logs.lines().count(),
            events_count: self.events.len(),
            time_range: crate::config::format_duration(lookback),
        }
    }
}

/// Size of the evidence behind a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceSummary {
    pub logs_lines: usize,
    pub events_count: usize,
    pub time_range: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EvidenceCollector: Send + Sync {
    /// Collect pod state, recent logs, and recent events for `namespace/pod`.
    async fn fetch_evidence(
        &self,
        namespace: &str,
        pod: &str,
        lookback: Duration,
    ) -> Result<CollectedEvidence, CollectionError>;
}
