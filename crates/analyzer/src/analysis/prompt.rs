//! Prompt assembly.
//!
//! Output depends only on the target and the collected evidence, so the same
//! inputs always produce the same prompt.

use k8s_openapi::api::core::v1::{Container, ContainerState, Pod};

use super::AnalysisTarget;
use crate::collector::{CollectedEvidence, EventRecord};

pub const DEFAULT_MAX_LOG_CHARS: usize = 5000;
pub const DEFAULT_MAX_EVENTS: usize = 10;

const TRUNCATION_MARKER: &str = "... (truncated)\n";

const RESPONSE_FORMAT: &str = r#"TASK:
1. Identify the root cause of the issue
2. Provide a confidence level (high/medium/low)
3. Explain your reasoning
4. Create a timeline of key events
5. Extract relevant evidence (log lines, events)
6. Provide actionable recommendations with specific commands

Please respond in JSON format with the following structure:
{
  "root_cause": "brief description",
  "confidence": "high|medium|low",
  "reasoning": "detailed explanation",
  "timeline": [{"timestamp": "...", "event": "...", "details": "..."}],
  "evidence": {
    "logs": [{"timestamp": "...", "line": "...", "container": "..."}],
    "events": [{"type": "...", "reason": "...", "message": "...", "timestamp": "..."}]
  },
  "recommendations": [
    {"priority": "high|medium|low", "action": "...", "details": "...", "command": "..."}
  ]
}"#;

#[derive(Debug, Clone, Copy)]
pub struct PromptBuilder {
    max_log_chars: usize,
    max_events: usize,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self {
            max_log_chars: DEFAULT_MAX_LOG_CHARS,
            max_events: DEFAULT_MAX_EVENTS,
        }
    }
}

impl PromptBuilder {
    pub fn new(max_log_chars: usize, max_events: usize) -> Self {
        Self { max_log_chars, max_events }
    }

    pub fn build(&self, target: &AnalysisTarget, evidence: &CollectedEvidence) -> String {
        let mut prompt = String::new();

        prompt.push_str(
            "You are an expert SRE analyzing a Kubernetes incident. Analyze the following data \
             and provide a detailed root cause analysis.\n\n",
        );

        prompt.push_str("ALERT CONTEXT:\n");
        prompt.push_str(&format!("- Namespace: {}\n", target.namespace));
        prompt.push_str(&format!("- Pod: {}\n", target.pod_name));
        prompt.push_str(&format!("- Time Range: Last {}\n", format_lookback(target.lookback)));
        if let Some(fingerprint) = &target.alert_fingerprint {
            prompt.push_str(&format!("- Alert Fingerprint: {}\n", fingerprint));
        }
        prompt.push('\n');

        prompt.push_str(&format_pod(&evidence.pod));
        prompt.push('\n');

        prompt.push_str("RECENT EVENTS:\n");
        prompt.push_str(&format_events(&evidence.events, self.max_events));
        prompt.push('\n');

        prompt.push_str("POD LOGS:\n");
        prompt.push_str(&truncate_logs(&evidence.logs, self.max_log_chars));
        prompt.push_str("\n\n");

        prompt.push_str(RESPONSE_FORMAT);
        prompt
    }
}

fn format_lookback(lookback: std::time::Duration) -> String {
    let secs = lookback.as_secs();
    match (secs / 3600, (secs % 3600) / 60, secs % 60) {
        (0, 0, s) => format!("{}s", s),
        (0, m, 0) => format!("{}m", m),
        (0, m, s) => format!("{}m{}s", m, s),
        (h, 0, 0) => format!("{}h", h),
        (h, m, 0) => format!("{}h{}m", h, m),
        (h, m, s) => format!("{}h{}m{}s", h, m, s),
    }
}

fn format_pod(pod: &Pod) -> String {
    let mut out = String::new();
    let status = pod.status.as_ref();

    out.push_str("POD STATUS:\n");
    let phase = status.and_then(|s| s.phase.as_deref()).unwrap_or("Unknown");
    out.push_str(&format!("Phase: {}\n", phase));

    let conditions: Vec<String> = status
        .and_then(|s| s.conditions.as_ref())
        .map(|conditions| {
            conditions
                .iter()
                .map(|c| match &c.reason {
                    Some(reason) => format!("{}={} ({})", c.type_, c.status, reason),
                    None => format!("{}={}", c.type_, c.status),
                })
                .collect()
        })
        .unwrap_or_default();
    out.push_str(&format!("Conditions: {}\n", join_or_none(&conditions)));

    let statuses: Vec<String> = status
        .and_then(|s| s.container_statuses.as_ref())
        .map(|statuses| {
            statuses
                .iter()
                .map(|cs| {
                    let mut line = format!(
                        "{} ready={} restarts={} state={}",
                        cs.name,
                        cs.ready,
                        cs.restart_count,
                        describe_state(cs.state.as_ref())
                    );
                    if let Some(last) = cs.last_state.as_ref().filter(|s| s.terminated.is_some()) {
                        line.push_str(&format!(" last_state={}", describe_state(Some(last))));
                    }
                    line
                })
                .collect()
        })
        .unwrap_or_default();
    out.push_str(&format!("Container Statuses: {}\n", join_or_none(&statuses)));
    out.push('\n');

    let container: Option<&Container> = pod.spec.as_ref().and_then(|s| s.containers.first());
    out.push_str("POD CONFIGURATION:\n");
    out.push_str(&format!(
        "Resources: {}\n",
        container.map(describe_resources).unwrap_or_else(|| "none".to_string())
    ));
    out.push_str(&format!(
        "Image: {}\n",
        container.and_then(|c| c.image.as_deref()).unwrap_or("unknown")
    ));

    out
}

fn describe_state(state: Option<&ContainerState>) -> String {
    let Some(state) = state else {
        return "unknown".to_string();
    };
    if let Some(running) = &state.running {
        return match &running.started_at {
            Some(t) => format!("running(since {})", t.0.to_rfc3339()),
            None => "running".to_string(),
        };
    }
    if let Some(waiting) = &state.waiting {
        return format!("waiting({})", waiting.reason.as_deref().unwrap_or("unknown"));
    }
    if let Some(terminated) = &state.terminated {
        return format!(
            "terminated({}, exit code {})",
            terminated.reason.as_deref().unwrap_or("unknown"),
            terminated.exit_code
        );
    }
    "unknown".to_string()
}

fn describe_resources(container: &Container) -> String {
    let Some(resources) = &container.resources else {
        return "none".to_string();
    };

    let render = |label: &str, values: &Option<std::collections::BTreeMap<String, k8s_openapi::apimachinery::pkg::api::resource::Quantity>>| {
        values.as_ref().filter(|v| !v.is_empty()).map(|v| {
            let pairs: Vec<String> = v.iter().map(|(k, q)| format!("{}={}", k, q.0)).collect();
            format!("{}[{}]", label, pairs.join(", "))
        })
    };

    let parts: Vec<String> = [render("limits", &resources.limits), render("requests", &resources.requests)]
        .into_iter()
        .flatten()
        .collect();

    if parts.is_empty() {
        "none".to_string()
    } else {
        parts.join(" ")
    }
}

fn join_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "none".to_string()
    } else {
        items.join("; ")
    }
}

/// Render the `max_events` most recent events, oldest first.
pub fn format_events(events: &[EventRecord], max_events: usize) -> String {
    if events.is_empty() {
        return "No recent events found\n".to_string();
    }

    let mut ordered: Vec<&EventRecord> = events.iter().collect();
    ordered.sort_by_key(|e| e.timestamp);
    let skip = ordered.len().saturating_sub(max_events);

    let mut out = String::new();
    for event in &ordered[skip..] {
        let when = event
            .timestamp
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "unknown time".to_string());
        out.push_str(&format!(
            "- [{}] {}: {} (reason: {})\n",
            when, event.type_, event.message, event.reason
        ));
    }
    out
}

/// Keep the last `max_chars` characters of `logs`, marking the cut.
pub fn truncate_logs(logs: &str, max_chars: usize) -> String {
    let total = logs.chars().count();
    if total <= max_chars {
        return logs.to_string();
    }

    let cut = logs
        .char_indices()
        .nth(total - max_chars)
        .map(|(idx, _)| idx)
        .unwrap_or(logs.len());

    format!("{}{}", TRUNCATION_MARKER, &logs[cut..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use k8s_openapi::api::core::v1::{
        ContainerStateTerminated, ContainerStatus, PodCondition, PodSpec, PodStatus,
        ResourceRequirements,
    };
    use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn event(minute: u32, reason: &str) -> EventRecord {
        EventRecord {
            type_: "Warning".to_string(),
            reason: reason.to_string(),
            message: format!("message {}", reason),
            timestamp: Some(Utc.with_ymd_and_hms(2024, 5, 1, 10, minute, 0).unwrap()),
        }
    }

    fn crashing_pod() -> Pod {
        let mut limits = BTreeMap::new();
        limits.insert("memory".to_string(), Quantity("256Mi".to_string()));

        Pod {
            spec: Some(PodSpec {
                containers: vec![Container {
                    name: "app".to_string(),
                    image: Some("registry.local/app:1.4.2".to_string()),
                    resources: Some(ResourceRequirements {
                        limits: Some(limits),
                        ..Default::default()
                    }),
                    ..Default::default()
                }],
                ..Default::default()
            }),
            status: Some(PodStatus {
                phase: Some("Running".to_string()),
                conditions: Some(vec![PodCondition {
                    type_: "Ready".to_string(),
                    status: "False".to_string(),
                    reason: Some("ContainersNotReady".to_string()),
                    ..Default::default()
                }]),
                container_statuses: Some(vec![ContainerStatus {
                    name: "app".to_string(),
                    ready: false,
                    restart_count: 4,
                    state: Some(ContainerState {
                        terminated: Some(ContainerStateTerminated {
                            reason: Some("OOMKilled".to_string()),
                            exit_code: 137,
                            ..Default::default()
                        }),
                        ..Default::default()
                    }),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_truncate_logs_keeps_tail() {
        assert_eq!(truncate_logs("short", 10), "short");

        let logs = "line-1\nline-2\nline-3";
        let truncated = truncate_logs(logs, 6);
        assert_eq!(truncated, format!("{}line-3", TRUNCATION_MARKER));
    }

    #[test]
    fn test_truncate_logs_respects_char_boundaries() {
        let logs = "ééééé✓✓";
        assert_eq!(truncate_logs(logs, 3), format!("{}é✓✓", TRUNCATION_MARKER));
    }

    #[test]
    fn test_format_events_keeps_most_recent_oldest_first() {
        let events: Vec<EventRecord> = (0..15).rev().map(|m| event(m, &format!("r{}", m))).collect();
        let out = format_events(&events, 10);
        let lines: Vec<&str> = out.lines().collect();

        assert_eq!(lines.len(), 10);
        assert!(lines[0].contains("reason: r5"));
        assert!(lines[9].contains("reason: r14"));
    }

    #[test]
    fn test_format_events_empty() {
        assert_eq!(format_events(&[], 10), "No recent events found\n");
    }

    #[test]
    fn test_prompt_embeds_evidence() {
        let target = AnalysisTarget::new("payments", "api-7d9f", Duration::from_secs(5400));
        let evidence = CollectedEvidence {
            pod: crashing_pod(),
            logs: "java.lang.OutOfMemoryError: Java heap space".to_string(),
            events: vec![event(1, "BackOff")],
        };

        let prompt = PromptBuilder::default().build(&target, &evidence);

        assert!(prompt.contains("- Namespace: payments"));
        assert!(prompt.contains("- Pod: api-7d9f"));
        assert!(prompt.contains("Last 1h30m"));
        assert!(prompt.contains("Phase: Running"));
        assert!(prompt.contains("Ready=False (ContainersNotReady)"));
        assert!(prompt.contains("terminated(OOMKilled, exit code 137)"));
        assert!(prompt.contains("limits[memory=256Mi]"));
        assert!(prompt.contains("Image: registry.local/app:1.4.2"));
        assert!(prompt.contains("(reason: BackOff)"));
        assert!(prompt.contains("OutOfMemoryError"));
        assert!(prompt.contains("\"root_cause\""));
    }

    #[test]
    fn test_prompt_tolerates_empty_pod() {
        let target = AnalysisTarget::new("default", "ghost", Duration::from_secs(60));
        let evidence = CollectedEvidence {
            pod: Pod::default(),
            logs: String::new(),
            events: Vec::new(),
        };

        let prompt = PromptBuilder::default().build(&target, &evidence);
        assert!(prompt.contains("Phase: Unknown"));
        assert!(prompt.contains("Image: unknown"));
        assert!(prompt.contains("No recent events found"));
    }

    #[test]
    fn test_prompt_is_deterministic() {
        let target = AnalysisTarget::new("payments", "api-7d9f", Duration::from_secs(3600));
        let evidence = CollectedEvidence {
            pod: crashing_pod(),
            logs: "x".repeat(8000),
            events: vec![event(3, "a"), event(1, "b")],
        };
        let builder = PromptBuilder::new(100, 1);
        assert_eq!(builder.build(&target, &evidence), builder.build(&target, &evidence));
        assert!(builder.build(&target, &evidence).contains(TRUNCATION_MARKER));
    }
}
