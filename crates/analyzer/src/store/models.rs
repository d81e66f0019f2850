use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::analysis::{AlertSuccess, IncidentReport};

/// A report ready to be persisted, together with the alert it answers.
#[derive(Debug, Clone)]
pub struct NewAnalysis {
    pub fingerprint: String,
    pub alert_name: String,
    pub namespace: String,
    pub pod: String,
    pub severity: String,
    pub alert_status: String,
    /// Upsert key together with namespace and pod. Analyses without an alert
    /// start time are always stored as new rows.
    pub alert_started_at: Option<DateTime<Utc>>,
    pub report: IncidentReport,
}

impl From<&AlertSuccess> for NewAnalysis {
    fn from(success: &AlertSuccess) -> Self {
        Self {
            fingerprint: success.fingerprint.clone(),
            alert_name: success.alert_name.clone(),
            namespace: success.namespace.clone(),
            pod: success.pod.clone(),
            severity: success.severity.clone(),
            alert_status: success.status.clone(),
            alert_started_at: success.started_at,
            report: success.analysis.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredAnalysis {
    pub id: Uuid,
    pub fingerprint: String,
    pub alert_name: String,
    pub namespace: String,
    pub pod: String,
    pub severity: String,
    pub alert_status: String,
    pub alert_started_at: Option<DateTime<Utc>>,
    pub report: IncidentReport,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
