use std::sync::Arc;
use tracing::info;

use crate::store::{DatabaseConfig, ReportStore, SqliteStore};

/// Open the configured store and bring its schema up to date.
pub async fn create_store(config: &DatabaseConfig) -> crate::Result<Arc<dyn ReportStore>> {
    info!(path = %config.sqlite_path.display(), "Opening report store");
    let store = SqliteStore::open(&config.sqlite_path, config.max_connections).await?;
    store.init().await?;
    Ok(Arc::new(store))
}
