use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

lazy_static! {
    pub static ref ANALYSES_STARTED_TOTAL: IntCounter = IntCounter::new(
        "kube_rca_analyses_started_total",
        "Total number of single-target analyses started."
    )
    .expect("metric can be created");
    pub static ref ANALYSES_SUCCEEDED_TOTAL: IntCounter = IntCounter::new(
        "kube_rca_analyses_succeeded_total",
        "Total number of analyses that produced a report."
    )
    .expect("metric can be created");
    pub static ref ANALYSIS_FAILURES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "kube_rca_analysis_failures_total",
            "Total number of failed analyses by failure kind."
        ),
        &["kind"]
    )
    .expect("metric can be created");
    pub static ref DEGRADED_REPORTS_TOTAL: IntCounter = IntCounter::new(
        "kube_rca_degraded_reports_total",
        "Total number of reports built from an unparseable model reply."
    )
    .expect("metric can be created");
    pub static ref WEBHOOK_ALERTS_TOTAL: IntCounter = IntCounter::new(
        "kube_rca_webhook_alerts_total",
        "Total number of alerts received through the Alertmanager webhook."
    )
    .expect("metric can be created");
    pub static ref REGISTRY: Registry = {
        let registry = Registry::new();
        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(ANALYSES_STARTED_TOTAL.clone()),
            Box::new(ANALYSES_SUCCEEDED_TOTAL.clone()),
            Box::new(ANALYSIS_FAILURES_TOTAL.clone()),
            Box::new(DEGRADED_REPORTS_TOTAL.clone()),
            Box::new(WEBHOOK_ALERTS_TOTAL.clone()),
        ];
        for collector in collectors {
            registry.register(collector).expect("metric names are unique");
        }
        registry
    };
}

// Function to gather metrics for exposition
pub fn gather_metrics() -> crate::Result<String> {
    let mut buffer = vec![];
    let encoder = TextEncoder::new();
    encoder.encode(&REGISTRY.gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| crate::Error::Internal(e.to_string()))
}
