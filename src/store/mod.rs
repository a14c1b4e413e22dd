//! Persistence layer: JSON files or libSQL behind one trait.

pub mod file_backend;
pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use file_backend::FileStore;
pub use libsql_backend::LibSqlStore;
pub use traits::HealthStore;

use std::sync::Arc;

use crate::config::SyncConfig;
use crate::error::DatabaseError;

/// Open the store selected by configuration: libSQL when a database path is
/// set, JSON files in the data directory otherwise.
pub async fn open_store(config: &SyncConfig) -> Result<Arc<dyn HealthStore>, DatabaseError> {
    match &config.db_path {
        Some(path) => Ok(Arc::new(LibSqlStore::new_local(path).await?)),
        None => {
            tracing::info!(dir = %config.data_dir.display(), "Using JSON file store");
            Ok(Arc::new(FileStore::new(&config.data_dir)))
        }
    }
}
