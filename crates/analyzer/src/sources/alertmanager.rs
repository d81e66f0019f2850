use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

// AlertManager webhook payload structures
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AlertManagerWebhook {
    #[serde(default)]
    pub version: String,
    #[serde(rename = "groupKey", default)]
    pub group_key: String,
    #[serde(rename = "truncatedAlerts", default)]
    pub truncated_alerts: u32,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub receiver: String,
    #[serde(rename = "groupLabels", default)]
    pub group_labels: HashMap<String, String>,
    #[serde(rename = "commonLabels", default)]
    pub common_labels: HashMap<String, String>,
    #[serde(rename = "commonAnnotations", default)]
    pub common_annotations: HashMap<String, String>,
    #[serde(rename = "externalURL", default)]
    pub external_url: String,
    #[serde(default)]
    pub alerts: Vec<AlertRecord>,
}

impl AlertManagerWebhook {
    /// Alerts in payload order, each guaranteed a fingerprint.
    pub fn into_alerts(self) -> Vec<AlertRecord> {
        self.alerts.into_iter().map(AlertRecord::with_fingerprint).collect()
    }
}

/// One incident notification from the alert source.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct AlertRecord {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub annotations: HashMap<String, String>,
    #[serde(rename = "startsAt", default)]
    pub starts_at: Option<DateTime<Utc>>,
    #[serde(rename = "endsAt", default)]
    pub ends_at: Option<DateTime<Utc>>,
    #[serde(rename = "generatorURL", default)]
    pub generator_url: String,
    #[serde(default)]
    pub fingerprint: String,
}

impl AlertRecord {
    fn first_label(&self, keys: &[&str]) -> Option<&str> {
        keys.iter()
            .filter_map(|k| self.labels.get(*k))
            .map(String::as_str)
            .find(|v| !v.is_empty())
    }

    pub fn namespace(&self) -> Option<&str> {
        self.first_label(&["namespace", "kubernetes_namespace"])
    }

    pub fn pod_name(&self) -> Option<&str> {
        self.first_label(&["pod", "pod_name"])
    }

    pub fn severity(&self) -> &str {
        self.first_label(&["severity"]).unwrap_or("unknown")
    }

    pub fn alert_name(&self) -> &str {
        self.first_label(&["alertname"]).unwrap_or("unknown")
    }

    /// Fill in a fingerprint derived from the alert name and labels when the
    /// source did not supply one.
    pub fn with_fingerprint(mut self) -> Self {
        if self.fingerprint.is_empty() {
            self.fingerprint = generate_fingerprint(self.alert_name(), &self.labels);
        }
        self
    }
}

pub fn generate_fingerprint(alert_name: &str, labels: &HashMap<String, String>) -> String {
    use sha2::{Digest, Sha256};

    // Sort labels for consistent fingerprinting
    let sorted_labels: BTreeMap<_, _> = labels.iter().collect();
    let labels_str = serde_json::to_string(&sorted_labels).unwrap_or_default();

    let mut hasher = Sha256::new();
    hasher.update(alert_name.as_bytes());
    hasher.update(b"-");
    hasher.update(labels_str.as_bytes());
    format!("{:x}", hasher.finalize())
}
