use async_trait::async_trait;
use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::{Event, Pod};
use kube::{
    api::{Api, ListParams, LogParams},
    config::KubeConfigOptions,
    Client,
};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{CollectedEvidence, CollectionError, EvidenceCollector, EventRecord};
use crate::{Error, Result};

pub const DEFAULT_TAIL_LINES: i64 = 500;

/// Collects evidence straight from the Kubernetes API.
#[derive(Clone)]
pub struct KubeCollector {
    client: Client,
    tail_lines: i64,
}

impl KubeCollector {
    pub fn new(client: Client, tail_lines: i64) -> Self {
        Self { client, tail_lines }
    }

    /// Build a collector from the in-cluster config or the local kubeconfig.
    /// A named context selects that entry of the kubeconfig instead.
    pub async fn infer(context: Option<&str>, tail_lines: i64) -> Result<Self> {
        let client = match context {
            Some(context) => {
                info!(context, "Using kubeconfig context");
                let options = KubeConfigOptions {
                    context: Some(context.to_string()),
                    ..Default::default()
                };
                let config = kube::Config::from_kubeconfig(&options)
                    .await
                    .map_err(|e| Error::Kubernetes(e.to_string()))?;
                Client::try_from(config).map_err(|e| Error::Kubernetes(e.to_string()))?
            }
            None => Client::try_default()
                .await
                .map_err(|e| Error::Kubernetes(e.to_string()))?,
        };
        Ok(Self::new(client, tail_lines))
    }

    async fn get_pod(&self, namespace: &str, pod: &str) -> std::result::Result<Pod, CollectionError> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        pods.get(pod).await.map_err(|e| match e {
            kube::Error::Api(resp) if resp.code == 404 => CollectionError::NotFound {
                namespace: namespace.to_string(),
                pod: pod.to_string(),
            },
            other => CollectionError::Unavailable(other.to_string()),
        })
    }

    async fn get_pod_logs(&self, namespace: &str, pod: &str, lookback: Duration) -> kube::Result<String> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let params = LogParams {
            since_seconds: Some(lookback.as_secs().clamp(1, i64::MAX as u64) as i64),
            tail_lines: Some(self.tail_lines),
            timestamps: true,
            ..Default::default()
        };
        pods.logs(pod, &params).await
    }

    async fn get_pod_events(
        &self,
        namespace: &str,
        pod: &str,
        lookback: Duration,
    ) -> kube::Result<Vec<EventRecord>> {
        let events: Api<Event> = Api::namespaced(self.client.clone(), namespace);
        let selector = format!("involvedObject.name={},involvedObject.kind=Pod", pod);
        let list = events.list(&ListParams::default().fields(&selector)).await?;

        // A window reaching past the representable range keeps every event.
        let cutoff = chrono::Duration::from_std(lookback)
            .ok()
            .and_then(|window| Utc::now().checked_sub_signed(window))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        Ok(list
            .items
            .into_iter()
            .map(to_event_record)
            .filter(|e| e.timestamp.map_or(false, |t| t > cutoff))
            .collect())
    }
}

fn event_timestamp(event: &Event) -> Option<DateTime<Utc>> {
    event
        .last_timestamp
        .as_ref()
        .map(|t| t.0)
        .or_else(|| event.event_time.as_ref().map(|t| t.0))
        .or_else(|| event.first_timestamp.as_ref().map(|t| t.0))
}

fn to_event_record(event: Event) -> EventRecord {
    EventRecord {
        timestamp: event_timestamp(&event),
        type_: event.type_.unwrap_or_default(),
        reason: event.reason.unwrap_or_default(),
        message: event.message.unwrap_or_default(),
    }
}

#[async_trait]
impl EvidenceCollector for KubeCollector {
    async fn fetch_evidence(
        &self,
        namespace: &str,
        pod: &str,
        lookback: Duration,
    ) -> std::result::Result<CollectedEvidence, CollectionError> {
        debug!(namespace, pod, "resolving pod");
        let pod_object = self.get_pod(namespace, pod).await?;

        let (logs, events) = futures::future::join(
            self.get_pod_logs(namespace, pod, lookback),
            self.get_pod_events(namespace, pod, lookback),
        )
        .await;

        let logs = logs.unwrap_or_else(|e| {
            warn!(namespace, pod, error = %e, "failed to fetch pod logs");
            format!("Error fetching logs: {}", e)
        });
        let events = events.unwrap_or_else(|e| {
            warn!(namespace, pod, error = %e, "failed to fetch pod events");
            Vec::new()
        });

        info!(namespace, pod, log_bytes = logs.len(), events = events.len(), "collected evidence");

        Ok(CollectedEvidence {
            pod: pod_object,
            logs,
            events,
        })
    }
}
