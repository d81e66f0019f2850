use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::{
    analysis::IncidentReport,
    store::{NewAnalysis, ReportStore, StoredAnalysis},
    Error, Result,
};

pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Open (creating if needed) a database file.
    pub async fn open(path: &Path, max_connections: u32) -> Result<Self> {
        info!("Connecting to SQLite database: {}", path.display());

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| {
                error!("Failed to connect to SQLite: {}", e);
                Error::Sqlx(e)
            })?;

        Ok(Self { pool })
    }

    /// Private in-memory database. Limited to one connection so every query
    /// sees the same database.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    fn row_to_analysis(row: &SqliteRow) -> Result<StoredAnalysis> {
        let id: String = row.try_get("id")?;
        let report: String = row.try_get("report")?;
        Ok(StoredAnalysis {
            id: Uuid::parse_str(&id)?,
            fingerprint: row.try_get("fingerprint")?,
            alert_name: row.try_get("alert_name")?,
            namespace: row.try_get("namespace")?,
            pod: row.try_get("pod_name")?,
            severity: row.try_get("severity")?,
            alert_status: row.try_get("alert_status")?,
            alert_started_at: row.try_get::<Option<DateTime<Utc>>, _>("alert_started_at")?,
            report: serde_json::from_str::<IncidentReport>(&report)?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl ReportStore for SqliteStore {
    async fn init(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to run migrations: {}", e);
                Error::Migrate(e)
            })?;

        Ok(())
    }

    async fn save_analysis(&self, analysis: NewAnalysis) -> Result<Uuid> {
        debug!(
            namespace = %analysis.namespace,
            pod = %analysis.pod,
            fingerprint = %analysis.fingerprint,
            "Saving analysis"
        );

        let report_json = serde_json::to_string(&analysis.report)?;
        let now = Utc::now();

        let id: String = sqlx::query_scalar(
            r#"
            INSERT INTO analyses (
                id, fingerprint, alert_name, namespace, pod_name, severity, alert_status,
                alert_started_at, root_cause, confidence, report, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)
            ON CONFLICT(namespace, pod_name, alert_started_at) DO UPDATE SET
                fingerprint = excluded.fingerprint,
                alert_name = excluded.alert_name,
                severity = excluded.severity,
                alert_status = excluded.alert_status,
                root_cause = excluded.root_cause,
                confidence = excluded.confidence,
                report = excluded.report,
                updated_at = excluded.updated_at
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&analysis.fingerprint)
        .bind(&analysis.alert_name)
        .bind(&analysis.namespace)
        .bind(&analysis.pod)
        .bind(&analysis.severity)
        .bind(&analysis.alert_status)
        .bind(analysis.alert_started_at)
        .bind(&analysis.report.root_cause)
        .bind(analysis.report.confidence.as_str())
        .bind(report_json)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(Uuid::parse_str(&id)?)
    }

    async fn get_analysis(&self, id: Uuid) -> Result<Option<StoredAnalysis>> {
        let row = sqlx::query("SELECT * FROM analyses WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_analysis).transpose()
    }

    async fn list_analyses(&self, limit: i64, offset: i64) -> Result<Vec<StoredAnalysis>> {
        let rows = sqlx::query(
            "SELECT * FROM analyses ORDER BY created_at DESC, rowid DESC LIMIT ?1 OFFSET ?2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_analysis).collect()
    }

    async fn count_analyses(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM analyses")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::report::{Confidence, IncidentReport};
    use chrono::TimeZone;

    async fn store() -> SqliteStore {
        let store = SqliteStore::in_memory().await.unwrap();
        store.init().await.unwrap();
        store
    }

    fn analysis(pod: &str, started_at: Option<DateTime<Utc>>, root_cause: &str) -> NewAnalysis {
        NewAnalysis {
            fingerprint: format!("fp-{}", pod),
            alert_name: "KubePodCrashLooping".to_string(),
            namespace: "payments".to_string(),
            pod: pod.to_string(),
            severity: "critical".to_string(),
            alert_status: "firing".to_string(),
            alert_started_at: started_at,
            report: IncidentReport {
                root_cause: root_cause.to_string(),
                confidence: Confidence::High,
                reasoning: "container exited with code 137".to_string(),
                ..Default::default()
            },
        }
    }

    #[tokio::test]
    async fn test_save_and_get() {
        let store = store().await;
        let started = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();

        let id = store.save_analysis(analysis("api-1", Some(started), "OOMKilled")).await.unwrap();
        let saved = store.get_analysis(id).await.unwrap().unwrap();

        assert_eq!(saved.id, id);
        assert_eq!(saved.pod, "api-1");
        assert_eq!(saved.alert_started_at, Some(started));
        assert_eq!(saved.report.root_cause, "OOMKilled");
        assert_eq!(saved.report.confidence, Confidence::High);

        assert!(store.get_analysis(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_redelivered_alert_updates_in_place() {
        let store = store().await;
        let started = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();

        let first = store.save_analysis(analysis("api-1", Some(started), "first")).await.unwrap();
        let second = store.save_analysis(analysis("api-1", Some(started), "second")).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(store.count_analyses().await.unwrap(), 1);
        let saved = store.get_analysis(first).await.unwrap().unwrap();
        assert_eq!(saved.report.root_cause, "second");
    }

    #[tokio::test]
    async fn test_analyses_without_start_time_are_distinct() {
        let store = store().await;

        let a = store.save_analysis(analysis("api-1", None, "a")).await.unwrap();
        let b = store.save_analysis(analysis("api-1", None, "b")).await.unwrap();

        assert_ne!(a, b);
        assert_eq!(store.count_analyses().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_list_is_newest_first_and_paginated() {
        let store = store().await;
        for pod in ["api-1", "api-2", "api-3"] {
            store.save_analysis(analysis(pod, None, pod)).await.unwrap();
        }

        let page = store.list_analyses(2, 0).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].pod, "api-3");
        assert_eq!(page[1].pod, "api-2");

        let rest = store.list_analyses(2, 2).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].pod, "api-1");
    }
}
