//! Single-target analyzer.
//!
//! Collection, prompt assembly, the model call, and normalization run strictly
//! in that order. Collection and model failures abort the analysis; a reply
//! that cannot be parsed does not.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};
use tracing::{error, info};

use super::{
    deadline_after,
    prompt::PromptBuilder,
    report::{normalize_reply, IncidentReport},
    AnalysisError, AnalysisTarget,
};
use crate::{
    collector::{CollectionError, EvidenceCollector, EvidenceSummary},
    llm::{LLMProvider, ModelError},
    metrics,
};

/// A report together with the size of the evidence behind it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Analysis {
    pub report: IncidentReport,
    pub collected: EvidenceSummary,
}

pub struct Analyzer {
    collector: Arc<dyn EvidenceCollector>,
    llm: Arc<dyn LLMProvider>,
    prompt: PromptBuilder,
}

impl Analyzer {
    pub fn new(collector: Arc<dyn EvidenceCollector>, llm: Arc<dyn LLMProvider>) -> Self {
        Self {
            collector,
            llm,
            prompt: PromptBuilder::default(),
        }
    }

    pub fn with_prompt_builder(mut self, prompt: PromptBuilder) -> Self {
        self.prompt = prompt;
        self
    }

    /// Analyze `target` with `timeout` as the whole budget.
    pub async fn analyze_within(
        &self,
        target: &AnalysisTarget,
        timeout: Duration,
    ) -> Result<IncidentReport, AnalysisError> {
        self.analyze(target, deadline_after(timeout)).await
    }

    /// Analyze `target`; every suspension point is bounded by `deadline`.
    pub async fn analyze(
        &self,
        target: &AnalysisTarget,
        deadline: Instant,
    ) -> Result<IncidentReport, AnalysisError> {
        self.analyze_with_summary(target, deadline)
            .await
            .map(|analysis| analysis.report)
    }

    pub async fn analyze_with_summary_within(
        &self,
        target: &AnalysisTarget,
        timeout: Duration,
    ) -> Result<Analysis, AnalysisError> {
        self.analyze_with_summary(target, deadline_after(timeout)).await
    }

    /// Like [`Analyzer::analyze`], also reporting how much evidence was collected.
    pub async fn analyze_with_summary(
        &self,
        target: &AnalysisTarget,
        deadline: Instant,
    ) -> Result<Analysis, AnalysisError> {
        metrics::ANALYSES_STARTED_TOTAL.inc();
        info!(
            namespace = %target.namespace,
            pod = %target.pod_name,
            lookback = ?target.lookback,
            "starting analysis"
        );

        let result = self.run(target, deadline).await;
        match &result {
            Ok(Analysis { report, collected }) => {
                metrics::ANALYSES_SUCCEEDED_TOTAL.inc();
                if report.is_degraded() {
                    metrics::DEGRADED_REPORTS_TOTAL.inc();
                }
                info!(
                    namespace = %target.namespace,
                    pod = %target.pod_name,
                    root_cause = %report.root_cause,
                    confidence = %report.confidence,
                    log_lines = collected.logs_lines,
                    events = collected.events_count,
                    "analysis completed"
                );
            }
            Err(e) => {
                metrics::ANALYSIS_FAILURES_TOTAL.with_label_values(&[e.kind()]).inc();
                error!(
                    namespace = %target.namespace,
                    pod = %target.pod_name,
                    error = %e,
                    "analysis failed"
                );
            }
        }
        result
    }

    async fn run(&self, target: &AnalysisTarget, deadline: Instant) -> Result<Analysis, AnalysisError> {
        let evidence = timeout_at(
            deadline,
            self.collector
                .fetch_evidence(&target.namespace, &target.pod_name, target.lookback),
        )
        .await
        .map_err(|_| CollectionError::Timeout)??;

        let prompt = self.prompt.build(target, &evidence);
        let collected = evidence.summary(target.lookback);
        drop(evidence);

        info!(prompt_chars = prompt.len(), "sending data to LLM for analysis");
        let reply = timeout_at(deadline, self.llm.complete(&prompt))
            .await
            .map_err(|_| ModelError::Timeout)??;

        Ok(Analysis {
            report: normalize_reply(&reply),
            collected,
        })
    }
}
