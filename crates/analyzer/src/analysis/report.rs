//! Incident Report Structures
//!
//! Canonical, provider-independent report shape and the normalizer that maps a
//! raw model reply onto it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use tracing::{debug, warn};

use super::{extract::extract_json, timestamp::normalize_timestamp_or};

/// Root cause recorded when the model reply holds no usable JSON object.
pub const UNPARSED_ROOT_CAUSE: &str = "Unable to parse LLM response";

/// Model confidence in its root cause.
///
/// Values outside the closed set are kept verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Confidence {
    High,
    Medium,
    Low,
    Unknown,
    Other(String),
}

impl Confidence {
    /// Collapse to the closed set for display purposes.
    pub fn display_level(&self) -> Confidence {
        match self {
            Confidence::Other(_) => Confidence::Unknown,
            level => level.clone(),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Confidence::High => "high",
            Confidence::Medium => "medium",
            Confidence::Low => "low",
            Confidence::Unknown => "unknown",
            Confidence::Other(raw) => raw,
        }
    }
}

impl Default for Confidence {
    fn default() -> Self {
        Confidence::Unknown
    }
}

impl From<String> for Confidence {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "high" => Confidence::High,
            "medium" => Confidence::Medium,
            "low" => Confidence::Low,
            "unknown" | "" => Confidence::Unknown,
            _ => Confidence::Other(raw),
        }
    }
}

impl From<&str> for Confidence {
    fn from(raw: &str) -> Self {
        Confidence::from(raw.to_string())
    }
}

impl From<Confidence> for String {
    fn from(confidence: Confidence) -> Self {
        match confidence {
            Confidence::Other(raw) => raw,
            level => level.as_str().to_string(),
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub timestamp: DateTime<Utc>,
    pub event: String,
    pub details: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEvidence {
    pub timestamp: DateTime<Utc>,
    pub line: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEvidence {
    #[serde(rename = "type")]
    pub type_: String,
    pub reason: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    pub logs: Vec<LogEvidence>,
    pub events: Vec<EventEvidence>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    pub priority: String,
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

/// Structured root cause analysis for one target.
///
/// Sequence fields are always present, possibly empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentReport {
    pub root_cause: String,
    pub confidence: Confidence,
    pub reasoning: String,
    pub timeline: Vec<TimelineEntry>,
    pub evidence: Evidence,
    pub recommendations: Vec<Recommendation>,
}

impl IncidentReport {
    /// Report used when the reply could not be parsed; the raw text becomes the reasoning.
    pub fn degraded(raw_reply: &str) -> Self {
        Self {
            root_cause: UNPARSED_ROOT_CAUSE.to_string(),
            confidence: Confidence::Unknown,
            reasoning: raw_reply.to_string(),
            ..Default::default()
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.root_cause == UNPARSED_ROOT_CAUSE && self.confidence == Confidence::Unknown
    }
}

// Wire shape requested from the model. Missing or null fields decode to their
// zero value; only a structurally invalid span is rejected.

fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Default, Deserialize)]
struct ReplyPayload {
    #[serde(default, deserialize_with = "nullable")]
    root_cause: String,
    #[serde(default, deserialize_with = "nullable")]
    confidence: String,
    #[serde(default, deserialize_with = "nullable")]
    reasoning: String,
    #[serde(default, deserialize_with = "nullable")]
    timeline: Vec<ReplyTimelineEntry>,
    #[serde(default, deserialize_with = "nullable")]
    evidence: ReplyEvidence,
    #[serde(default, deserialize_with = "nullable")]
    recommendations: Vec<ReplyRecommendation>,
}

#[derive(Debug, Default, Deserialize)]
struct ReplyTimelineEntry {
    #[serde(default, deserialize_with = "nullable")]
    timestamp: String,
    #[serde(default, deserialize_with = "nullable")]
    event: String,
    #[serde(default, deserialize_with = "nullable")]
    details: String,
}

#[derive(Debug, Default, Deserialize)]
struct ReplyEvidence {
    #[serde(default, deserialize_with = "nullable")]
    logs: Vec<ReplyLogEntry>,
    #[serde(default, deserialize_with = "nullable")]
    events: Vec<ReplyEventEntry>,
}

#[derive(Debug, Default, Deserialize)]
struct ReplyLogEntry {
    #[serde(default, deserialize_with = "nullable")]
    timestamp: String,
    #[serde(default, deserialize_with = "nullable")]
    line: String,
    #[serde(default, deserialize_with = "nullable")]
    container: String,
}

#[derive(Debug, Default, Deserialize)]
struct ReplyEventEntry {
    #[serde(rename = "type", default, deserialize_with = "nullable")]
    type_: String,
    #[serde(default, deserialize_with = "nullable")]
    reason: String,
    #[serde(default, deserialize_with = "nullable")]
    message: String,
    #[serde(default, deserialize_with = "nullable")]
    timestamp: String,
}

#[derive(Debug, Default, Deserialize)]
struct ReplyRecommendation {
    #[serde(default, deserialize_with = "nullable")]
    priority: String,
    #[serde(default, deserialize_with = "nullable")]
    action: String,
    #[serde(default, deserialize_with = "nullable")]
    details: String,
    #[serde(default, deserialize_with = "nullable")]
    command: String,
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Map a raw model reply onto an [`IncidentReport`]. Never fails.
pub fn normalize_reply(reply: &str) -> IncidentReport {
    normalize_reply_at(reply, Utc::now())
}

/// Like [`normalize_reply`], with `now` substituted for unparseable timestamps.
pub fn normalize_reply_at(reply: &str, now: DateTime<Utc>) -> IncidentReport {
    let Some(span) = extract_json(reply) else {
        warn!("no JSON found in LLM response, using raw text");
        return IncidentReport::degraded(reply);
    };

    let payload: ReplyPayload = match serde_json::from_str(span) {
        Ok(payload) => payload,
        Err(e) => {
            let preview: String = span.chars().take(200).collect();
            warn!(error = %e, json = %preview, "failed to parse JSON from LLM response");
            return IncidentReport::degraded(reply);
        }
    };

    let ts = |raw: &str| normalize_timestamp_or(raw, || now);

    let report = IncidentReport {
        root_cause: payload.root_cause,
        confidence: Confidence::from(payload.confidence),
        reasoning: payload.reasoning,
        timeline: payload
            .timeline
            .into_iter()
            .map(|t| TimelineEntry {
                timestamp: ts(&t.timestamp),
                event: t.event,
                details: t.details,
            })
            .collect(),
        evidence: Evidence {
            logs: payload
                .evidence
                .logs
                .into_iter()
                .map(|l| LogEvidence {
                    timestamp: ts(&l.timestamp),
                    line: l.line,
                    container: non_empty(l.container),
                })
                .collect(),
            events: payload
                .evidence
                .events
                .into_iter()
                .map(|e| EventEvidence {
                    timestamp: ts(&e.timestamp),
                    type_: e.type_,
                    reason: e.reason,
                    message: e.message,
                })
                .collect(),
        },
        recommendations: payload
            .recommendations
            .into_iter()
            .map(|r| Recommendation {
                priority: r.priority,
                action: r.action,
                details: non_empty(r.details),
                command: non_empty(r.command),
            })
            .collect(),
    };

    debug!(
        root_cause = %report.root_cause,
        confidence = %report.confidence,
        timeline = report.timeline.len(),
        recommendations = report.recommendations.len(),
        "normalized LLM response"
    );

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap()
    }

    const FULL_REPLY: &str = r#"After reviewing the logs, here is the analysis:
{
  "root_cause": "Container exceeded its 256Mi memory limit",
  "confidence": "high",
  "reasoning": "Exit code 137 with OOMKilled reason",
  "timeline": [
    {"timestamp": "2024-05-01T10:00:00Z", "event": "Pod started", "details": "image v1.2"},
    {"timestamp": "sometime later", "event": "OOMKilled", "details": "restart #3"}
  ],
  "evidence": {
    "logs": [{"timestamp": "2024-05-01 10:05:00", "line": "java.lang.OutOfMemoryError", "container": "app"}],
    "events": [{"type": "Warning", "reason": "BackOff", "message": "Back-off restarting failed container"}]
  },
  "recommendations": [
    {"priority": "high", "action": "Raise the memory limit", "command": "kubectl set resources deploy/app --limits=memory=512Mi"},
    {"priority": "low", "action": "Profile heap usage"}
  ]
}
Let me know if you need more detail."#;

    #[test]
    fn test_scenario_prose_then_json() {
        let reply = "I think the issue is memory.\n{\"root_cause\":\"OOM\",\"confidence\":\"high\",\"reasoning\":\"r\",\"timeline\":[],\"evidence\":{\"logs\":[],\"events\":[]},\"recommendations\":[]}";
        let report = normalize_reply(reply);
        assert_eq!(report.root_cause, "OOM");
        assert_eq!(report.confidence, Confidence::High);
        assert_eq!(report.reasoning, "r");
        assert!(!report.is_degraded());
    }

    #[test]
    fn test_scenario_no_json() {
        let reply = "No JSON here at all.";
        let report = normalize_reply(reply);
        assert_eq!(report.root_cause, UNPARSED_ROOT_CAUSE);
        assert_eq!(report.confidence, Confidence::Unknown);
        assert_eq!(report.reasoning, reply);
        assert!(report.timeline.is_empty());
        assert!(report.evidence.logs.is_empty());
        assert!(report.evidence.events.is_empty());
        assert!(report.recommendations.is_empty());
    }

    #[test]
    fn test_full_reply_is_mapped() {
        let report = normalize_reply_at(FULL_REPLY, now());

        assert_eq!(report.root_cause, "Container exceeded its 256Mi memory limit");
        assert_eq!(report.timeline.len(), 2);
        assert_eq!(
            report.timeline[0].timestamp,
            Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
        );
        assert_eq!(report.timeline[1].timestamp, now());

        let log = &report.evidence.logs[0];
        assert_eq!(log.container.as_deref(), Some("app"));
        assert_eq!(log.timestamp, Utc.with_ymd_and_hms(2024, 5, 1, 10, 5, 0).unwrap());

        let event = &report.evidence.events[0];
        assert_eq!(event.type_, "Warning");
        assert_eq!(event.timestamp, now());

        assert_eq!(report.recommendations.len(), 2);
        assert!(report.recommendations[0].command.is_some());
        assert_eq!(report.recommendations[1].details, None);
        assert_eq!(report.recommendations[1].command, None);
    }

    #[test]
    fn test_truncated_json_degrades_with_original_text() {
        let reply = "Analysis: {\"root_cause\": \"OOM\", \"confidence\": \"hi";
        let report = normalize_reply(reply);
        assert!(report.is_degraded());
        assert_eq!(report.reasoning, reply);
    }

    #[test]
    fn test_schema_mismatch_degrades_with_original_text() {
        let reply = "Here: {\"root_cause\": \"OOM\", \"timeline\": \"not a list\"} done";
        let report = normalize_reply(reply);
        assert!(report.is_degraded());
        assert_eq!(report.reasoning, reply);
    }

    #[test]
    fn test_empty_object_yields_zero_values() {
        let report = normalize_reply("{}");
        assert_eq!(report.root_cause, "");
        assert_eq!(report.reasoning, "");
        assert_eq!(report.confidence, Confidence::Unknown);
        assert!(report.timeline.is_empty());
        assert!(report.recommendations.is_empty());
    }

    #[test]
    fn test_null_fields_and_extra_fields_are_tolerated() {
        let reply = r#"{"root_cause":null,"timeline":null,"evidence":{"logs":null},"severity":"p1","extra":{"nested":true}}"#;
        let report = normalize_reply(reply);
        assert!(!report.is_degraded());
        assert_eq!(report.root_cause, "");
        assert!(report.timeline.is_empty());
        assert!(report.evidence.logs.is_empty());
    }

    #[test]
    fn test_out_of_set_confidence_is_preserved() {
        let report = normalize_reply(r#"{"root_cause":"x","confidence":"very high"}"#);
        assert_eq!(report.confidence, Confidence::Other("very high".to_string()));
        assert_eq!(report.confidence.display_level(), Confidence::Unknown);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["confidence"], "very high");
    }

    #[test]
    fn test_normalization_is_idempotent() {
        let first = normalize_reply_at(FULL_REPLY, now());
        let second = normalize_reply_at(FULL_REPLY, now());
        assert_eq!(first, second);

        let first = normalize_reply("plain prose");
        let second = normalize_reply("plain prose");
        assert_eq!(first, second);
    }

    #[test]
    fn test_serialized_report_always_has_sequences() {
        let json = serde_json::to_value(normalize_reply("")).unwrap();
        assert_eq!(json["timeline"], serde_json::json!([]));
        assert_eq!(json["evidence"]["logs"], serde_json::json!([]));
        assert_eq!(json["evidence"]["events"], serde_json::json!([]));
        assert_eq!(json["recommendations"], serde_json::json!([]));
    }
}
