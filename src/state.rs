//! Shared application state handed to every handler.

use crate::catalog::SchemaCatalog;
use crate::config::AppConfig;
use crate::db::Db;
use crate::service::ResourceService;
use crate::storage::ContentStore;
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub catalog: Arc<SchemaCatalog>,
    pub store: Arc<ContentStore>,
    pub file_columns: Arc<HashSet<String>>,
}

impl AppState {
    pub fn new(db: Db, config: &AppConfig) -> Self {
        let catalog = SchemaCatalog::with_cache_file(&db, config.catalog_cache.clone());
        AppState {
            db,
            catalog: Arc::new(catalog),
            store: Arc::new(ContentStore::new(config.storage_path.clone())),
            file_columns: Arc::new(config.file_columns.clone()),
        }
    }

    /// A service scoped to one request's authenticated user.
    pub fn service(&self, user: Option<String>) -> ResourceService<'_> {
        ResourceService::new(&self.db, &self.catalog, &self.store, &self.file_columns, user)
    }
}
