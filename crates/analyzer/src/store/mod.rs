//! Durable storage for finished incident reports.

mod config;
mod factory;
mod models;
mod sqlite;

pub use config::DatabaseConfig;
pub use factory::create_store;
pub use models::{NewAnalysis, StoredAnalysis};
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use uuid::Uuid;

#[async_trait]
pub trait ReportStore: Send + Sync {
    // Initialize database schema
    async fn init(&self) -> crate::Result<()>;

    /// Insert or refresh the report for an alert. Returns the row id, which is
    /// stable across re-deliveries of the same alert.
    async fn save_analysis(&self, analysis: NewAnalysis) -> crate::Result<Uuid>;
    async fn get_analysis(&self, id: Uuid) -> crate::Result<Option<StoredAnalysis>>;
    /// Newest first.
    async fn list_analyses(&self, limit: i64, offset: i64) -> crate::Result<Vec<StoredAnalysis>>;
    async fn count_analyses(&self) -> crate::Result<i64>;
}
