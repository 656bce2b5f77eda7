mod config;

use std::sync::Arc;

use thiserror::Error;

pub use config::DatabaseConfig;

use crate::buffer::BufferPool;
use crate::catalog::{Catalog, CatalogError};
use crate::file::StorageError;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Cannot read/write file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    ConfigError(#[from] serde_json::Error),

    #[error("Catalog error: {0}")]
    CatalogError(#[from] CatalogError),

    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),
}

pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// One database session: the catalog and the buffer pool reading through it.
///
/// Nothing here is global; two sessions in one process do not share pages or locks.
pub struct Database {
    config: DatabaseConfig,
    catalog: Arc<Catalog>,
    buffer_pool: Arc<BufferPool>,
}

impl Database {
    pub fn open(config: DatabaseConfig) -> Self {
        let catalog = Arc::new(Catalog::new());
        let buffer_pool = Arc::new(BufferPool::new(
            Arc::clone(&catalog),
            config.buffer_pool_pages,
            config.lock_timeout(),
        ));
        Self {
            config,
            catalog,
            buffer_pool,
        }
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn buffer_pool(&self) -> &Arc<BufferPool> {
        &self.buffer_pool
    }

    /// End the session. Transactions still running are rolled back: their
    /// dirty pages are dropped, never written.
    pub fn close(self) -> DatabaseResult<()> {
        self.buffer_pool.discard_all_pages();
        self.catalog.clear();
        Ok(())
    }
}

impl Default for Database {
    fn default() -> Self {
        Self::open(DatabaseConfig::default())
    }
}
