//! Batch fan-out over alert records.
//!
//! Each valid alert gets its own analysis task; all tasks share one deadline.
//! Outcomes flow back through the join set and are only assembled into a
//! [`BatchResult`] once every launched task has finished.

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::{self, JoinError, JoinSet};
use tokio::time::Instant;
use tracing::{error, info, warn};

use super::{deadline_after, report::IncidentReport, AnalysisTarget, Analyzer};
use crate::{metrics, sources::AlertRecord};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("missing namespace or pod in alert labels")]
    MissingTarget,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertSuccess {
    pub fingerprint: String,
    pub alert_name: String,
    pub namespace: String,
    pub pod: String,
    pub severity: String,
    pub status: String,
    pub started_at: Option<DateTime<Utc>>,
    pub analysis: IncidentReport,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertFailure {
    pub fingerprint: String,
    pub alert_name: String,
    #[serde(rename = "error")]
    pub reason: String,
}

/// Fate of one alert in a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum AlertOutcome {
    Success(AlertSuccess),
    Failure(AlertFailure),
}

/// Aggregate of a batch. `received == analyzed + failed` always holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    #[serde(rename = "received")]
    pub received_count: usize,
    #[serde(rename = "analyzed")]
    pub analyzed_count: usize,
    #[serde(rename = "failed")]
    pub failed_count: usize,
    #[serde(rename = "results")]
    pub successes: Vec<AlertSuccess>,
    #[serde(rename = "errors")]
    pub failures: Vec<AlertFailure>,
}

impl BatchResult {
    fn from_outcomes(outcomes: Vec<AlertOutcome>) -> Self {
        let received_count = outcomes.len();
        let mut successes = Vec::new();
        let mut failures = Vec::new();
        for outcome in outcomes {
            match outcome {
                AlertOutcome::Success(s) => successes.push(s),
                AlertOutcome::Failure(f) => failures.push(f),
            }
        }
        Self {
            received_count,
            analyzed_count: successes.len(),
            failed_count: failures.len(),
            successes,
            failures,
        }
    }
}

/// Alert identity carried alongside a launched analysis.
#[derive(Debug, Clone)]
struct AlertIdentity {
    fingerprint: String,
    alert_name: String,
    namespace: String,
    pod: String,
    severity: String,
    status: String,
    started_at: Option<DateTime<Utc>>,
}

impl AlertIdentity {
    fn failure(self, reason: String) -> AlertOutcome {
        AlertOutcome::Failure(AlertFailure {
            fingerprint: self.fingerprint,
            alert_name: self.alert_name,
            reason,
        })
    }

    fn success(self, analysis: IncidentReport) -> AlertOutcome {
        AlertOutcome::Success(AlertSuccess {
            fingerprint: self.fingerprint,
            alert_name: self.alert_name,
            namespace: self.namespace,
            pod: self.pod,
            severity: self.severity,
            status: self.status,
            started_at: self.started_at,
            analysis,
        })
    }
}

/// Failure for a task that ended without producing its own outcome.
fn unfinished(launched: &mut HashMap<task::Id, AlertIdentity>, err: JoinError) -> AlertOutcome {
    let reason = format!("analysis task did not complete: {}", err);
    match launched.remove(&err.id()) {
        Some(identity) => {
            error!(
                alert_name = %identity.alert_name,
                fingerprint = %identity.fingerprint,
                error = %err,
                "analysis task did not complete"
            );
            identity.failure(reason)
        }
        None => {
            error!(error = %err, "analysis task did not complete");
            AlertOutcome::Failure(AlertFailure {
                fingerprint: String::new(),
                alert_name: "unknown".to_string(),
                reason,
            })
        }
    }
}

pub struct BatchCoordinator {
    analyzer: Arc<Analyzer>,
    max_concurrency: Option<usize>,
}

impl BatchCoordinator {
    pub fn new(analyzer: Arc<Analyzer>) -> Self {
        Self {
            analyzer,
            max_concurrency: None,
        }
    }

    /// Cap the number of analyses running at once within a batch.
    pub fn with_max_concurrency(mut self, limit: Option<usize>) -> Self {
        self.max_concurrency = limit.map(|n| n.max(1));
        self
    }

    pub async fn process_batch_within(
        &self,
        alerts: Vec<AlertRecord>,
        lookback: Duration,
        timeout: Duration,
    ) -> BatchResult {
        self.process_batch(alerts, lookback, deadline_after(timeout)).await
    }

    /// Analyze every alert that names a namespace and a pod. Never fails; each
    /// alert ends up as exactly one success or failure.
    pub async fn process_batch(
        &self,
        alerts: Vec<AlertRecord>,
        lookback: Duration,
        deadline: Instant,
    ) -> BatchResult {
        let received = alerts.len();
        let mut outcomes = Vec::with_capacity(received);
        let mut tasks = JoinSet::new();
        let mut launched: HashMap<task::Id, AlertIdentity> = HashMap::new();
        let permits = self.max_concurrency.map(|n| Arc::new(Semaphore::new(n)));

        for alert in alerts {
            let identity = AlertIdentity {
                fingerprint: alert.fingerprint.clone(),
                alert_name: alert.alert_name().to_string(),
                namespace: alert.namespace().unwrap_or_default().to_string(),
                pod: alert.pod_name().unwrap_or_default().to_string(),
                severity: alert.severity().to_string(),
                status: alert.status.clone(),
                started_at: alert.starts_at,
            };

            if identity.namespace.is_empty() || identity.pod.is_empty() {
                warn!(
                    alert_name = %identity.alert_name,
                    fingerprint = %identity.fingerprint,
                    "skipping alert without namespace or pod"
                );
                metrics::ANALYSIS_FAILURES_TOTAL.with_label_values(&["validation"]).inc();
                outcomes.push(identity.failure(ValidationError::MissingTarget.to_string()));
                continue;
            }

            let target = AnalysisTarget::new(&identity.namespace, &identity.pod, lookback)
                .with_fingerprint(&identity.fingerprint);
            let analyzer = self.analyzer.clone();
            let permits = permits.clone();
            let tracked = identity.clone();

            let handle = tasks.spawn(async move {
                let _permit = match permits {
                    Some(semaphore) => semaphore.acquire_owned().await.ok(),
                    None => None,
                };

                match AssertUnwindSafe(analyzer.analyze(&target, deadline)).catch_unwind().await {
                    Ok(Ok(report)) => identity.success(report),
                    Ok(Err(e)) => identity.failure(e.to_string()),
                    Err(_) => {
                        error!(
                            namespace = %identity.namespace,
                            pod = %identity.pod,
                            "analysis task panicked"
                        );
                        identity.failure("analysis task panicked".to_string())
                    }
                }
            });
            launched.insert(handle.id(), tracked);
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((id, outcome)) => {
                    launched.remove(&id);
                    outcomes.push(outcome);
                }
                Err(e) => outcomes.push(unfinished(&mut launched, e)),
            }
        }

        let result = BatchResult::from_outcomes(outcomes);
        info!(
            received = result.received_count,
            analyzed = result.analyzed_count,
            failed = result.failed_count,
            "batch processing completed"
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::{CollectedEvidence, CollectionError, MockEvidenceCollector};
    use crate::llm::{MockLLMProvider, ModelError};

    const REPLY: &str = r#"{"root_cause":"OOM","confidence":"high","reasoning":"r","timeline":[],"evidence":{"logs":[],"events":[]},"recommendations":[]}"#;

    fn alert(fingerprint: &str, labels: &[(&str, &str)]) -> AlertRecord {
        AlertRecord {
            status: "firing".to_string(),
            fingerprint: fingerprint.to_string(),
            labels: labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
            ..Default::default()
        }
    }

    fn coordinator(collector: MockEvidenceCollector, llm: MockLLMProvider) -> BatchCoordinator {
        BatchCoordinator::new(Arc::new(Analyzer::new(Arc::new(collector), Arc::new(llm))))
    }

    #[tokio::test]
    async fn test_invalid_alert_fails_without_launching_analysis() {
        let mut collector = MockEvidenceCollector::new();
        collector
            .expect_fetch_evidence()
            .withf(|_, pod, _| pod != "")
            .times(2)
            .returning(|_, _, _| Ok(CollectedEvidence::default()));
        let mut llm = MockLLMProvider::new();
        llm.expect_complete().times(2).returning(|_| Ok(REPLY.to_string()));

        let alerts = vec![
            alert("a1", &[("alertname", "PodOOM"), ("namespace", "payments"), ("pod", "api-1")]),
            alert("a2", &[("alertname", "PodOOM"), ("namespace", "payments")]),
            alert("a3", &[("alertname", "PodOOM"), ("namespace", "payments"), ("pod", "api-3")]),
        ];

        let result = coordinator(collector, llm)
            .process_batch_within(alerts, Duration::from_secs(3600), Duration::from_secs(5))
            .await;

        assert_eq!(result.received_count, 3);
        assert_eq!(result.analyzed_count, 2);
        assert_eq!(result.failed_count, 1);
        assert_eq!(result.failures[0].fingerprint, "a2");
        assert_eq!(result.failures[0].reason, "missing namespace or pod in alert labels");
    }

    #[tokio::test]
    async fn test_collection_failure_is_isolated() {
        let mut collector = MockEvidenceCollector::new();
        collector.expect_fetch_evidence().returning(|ns, pod, _| {
            if pod == "broken" {
                Err(CollectionError::NotFound {
                    namespace: ns.to_string(),
                    pod: pod.to_string(),
                })
            } else {
                Ok(CollectedEvidence::default())
            }
        });
        let mut llm = MockLLMProvider::new();
        llm.expect_complete().returning(|_| Ok(REPLY.to_string()));

        let alerts = vec![
            alert("ok-1", &[("namespace", "ns"), ("pod", "healthy-1")]),
            alert("bad", &[("namespace", "ns"), ("pod", "broken")]),
            alert("ok-2", &[("namespace", "ns"), ("pod", "healthy-2")]),
        ];

        let result = coordinator(collector, llm)
            .process_batch_within(alerts, Duration::from_secs(60), Duration::from_secs(5))
            .await;

        assert_eq!(result.analyzed_count, 2);
        assert_eq!(result.failed_count, 1);
        assert_eq!(result.failures[0].fingerprint, "bad");
        assert!(result.failures[0].reason.contains("not found"));

        let mut ok: Vec<&str> = result.successes.iter().map(|s| s.fingerprint.as_str()).collect();
        ok.sort();
        assert_eq!(ok, vec!["ok-1", "ok-2"]);
        assert!(result.successes.iter().all(|s| s.analysis.root_cause == "OOM"));
    }

    #[tokio::test]
    async fn test_model_failure_is_recorded_as_reason() {
        let mut collector = MockEvidenceCollector::new();
        collector.expect_fetch_evidence().returning(|_, _, _| Ok(CollectedEvidence::default()));
        let mut llm = MockLLMProvider::new();
        llm.expect_complete().returning(|_| Err(ModelError::Provider("rate limited".to_string())));

        let result = coordinator(collector, llm)
            .process_batch_within(
                vec![alert("f", &[("alertname", "X"), ("namespace", "ns"), ("pod", "p")])],
                Duration::from_secs(60),
                Duration::from_secs(5),
            )
            .await;

        assert_eq!(result.failed_count, 1);
        assert_eq!(result.failures[0].alert_name, "X");
        assert!(result.failures[0].reason.contains("rate limited"));
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let result = coordinator(MockEvidenceCollector::new(), MockLLMProvider::new())
            .process_batch_within(Vec::new(), Duration::from_secs(60), Duration::from_secs(5))
            .await;
        assert_eq!(result.received_count, 0);
        assert_eq!(result.analyzed_count + result.failed_count, 0);
        assert!(result.successes.is_empty() && result.failures.is_empty());
    }

    #[tokio::test]
    async fn test_success_carries_alert_identity() {
        let mut collector = MockEvidenceCollector::new();
        collector.expect_fetch_evidence().returning(|_, _, _| Ok(CollectedEvidence::default()));
        let mut llm = MockLLMProvider::new();
        llm.expect_complete().returning(|_| Ok(REPLY.to_string()));

        let result = coordinator(collector, llm)
            .with_max_concurrency(Some(1))
            .process_batch_within(
                vec![alert(
                    "fp",
                    &[
                        ("alertname", "KubePodCrashLooping"),
                        ("kubernetes_namespace", "payments"),
                        ("pod_name", "api-1"),
                        ("severity", "critical"),
                    ],
                )],
                Duration::from_secs(60),
                Duration::from_secs(5),
            )
            .await;

        let success = &result.successes[0];
        assert_eq!(success.alert_name, "KubePodCrashLooping");
        assert_eq!(success.namespace, "payments");
        assert_eq!(success.pod, "api-1");
        assert_eq!(success.severity, "critical");
        assert_eq!(success.status, "firing");
    }

    #[test]
    fn test_batch_result_serializes_with_wire_names() {
        let result = BatchResult::from_outcomes(vec![AlertOutcome::Failure(AlertFailure {
            fingerprint: "x".to_string(),
            alert_name: "y".to_string(),
            reason: "missing namespace or pod in alert labels".to_string(),
        })]);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["received"], 1);
        assert_eq!(json["failed"], 1);
        assert_eq!(json["errors"][0]["error"], "missing namespace or pod in alert labels");
        assert_eq!(json["results"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_unfinished_task_keeps_alert_identity() {
        let identity = AlertIdentity {
            fingerprint: "fp-1".to_string(),
            alert_name: "KubePodCrashLooping".to_string(),
            namespace: "payments".to_string(),
            pod: "api-1".to_string(),
            severity: "critical".to_string(),
            status: "firing".to_string(),
            started_at: None,
        };

        async fn crash() -> AlertOutcome {
            panic!("worker died")
        }

        let mut tasks = JoinSet::new();
        let handle = tasks.spawn(crash());
        let mut launched = HashMap::new();
        launched.insert(handle.id(), identity);

        let err = tasks.join_next_with_id().await.unwrap().unwrap_err();
        let outcome = unfinished(&mut launched, err);

        match outcome {
            AlertOutcome::Failure(failure) => {
                assert_eq!(failure.fingerprint, "fp-1");
                assert_eq!(failure.alert_name, "KubePodCrashLooping");
                assert!(failure.reason.starts_with("analysis task did not complete"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert!(launched.is_empty());
    }
}
