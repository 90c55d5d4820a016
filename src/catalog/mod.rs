//! Schema catalog: runtime introspection of the connected database.
//!
//! The catalog answers "what resources exist", "what columns does a resource
//! have" and "what is its primary key", caching the answers for the process
//! lifetime (the schema is assumed stable). An optional persistent cache
//! skips introspection entirely across restarts.

mod postgres;
mod sqlite;

pub use postgres::PostgresIntrospector;
pub use sqlite::SqliteIntrospector;

use crate::db::Db;
use crate::error::ApiError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Bumped whenever the serialized layout changes; stale caches are ignored.
pub const CATALOG_CACHE_VERSION: u32 = 1;

/// One column of a resource, in the database's native column order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub native_type: String,
    #[serde(rename = "pk")]
    pub is_primary_key: bool,
}

/// A table or view exposed as a REST resource.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    pub name: String,
    #[serde(rename = "pk")]
    primary_key: Option<String>,
    composite: bool,
    pub columns: Vec<ColumnDescriptor>,
}

impl ResourceDescriptor {
    pub fn new(name: String, columns: Vec<ColumnDescriptor>) -> Self {
        let mut pk_columns = columns.iter().filter(|c| c.is_primary_key);
        let first = pk_columns.next().map(|c| c.name.clone());
        let composite = pk_columns.next().is_some();
        ResourceDescriptor {
            name,
            primary_key: if composite { None } else { first },
            composite,
            columns,
        }
    }

    /// The single-column primary key, or `None` for keyless tables/views.
    /// Composite keys are a hard error, never truncated to the first column.
    pub fn primary_key(&self) -> Result<Option<&str>, ApiError> {
        if self.composite {
            return Err(ApiError::CompositePrimaryKey(self.name.clone()));
        }
        Ok(self.primary_key.as_deref())
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

/// Dialect-specific introspection. Implementations must agree on the
/// external contract while using their platform's native metadata queries.
#[async_trait]
pub trait Introspector: Send + Sync {
    /// All user-facing table and view names. Internal tables (reserved `_`
    /// prefix, plus platform system tables) are excluded.
    async fn resource_names(&self) -> Result<Vec<String>, sqlx::Error>;

    /// Columns of one table, in native order, with primary-key markers.
    async fn describe(&self, table: &str) -> Result<Vec<ColumnDescriptor>, sqlx::Error>;
}

#[derive(Serialize, Deserialize)]
struct CacheFile {
    version: u32,
    resources: BTreeMap<String, ResourceDescriptor>,
}

/// Deterministic serialization of the catalog (stable key order via the
/// BTreeMap), so byte-for-byte comparison is meaningful.
pub fn serialize_catalog(resources: &BTreeMap<String, ResourceDescriptor>) -> String {
    let file = CacheFile { version: CATALOG_CACHE_VERSION, resources: resources.clone() };
    // BTreeMap of plain data; serialization cannot fail.
    serde_json::to_string(&file).unwrap_or_default()
}

fn read_cache_file(path: &Path) -> Option<BTreeMap<String, ResourceDescriptor>> {
    let raw = std::fs::read_to_string(path).ok()?;
    let file: CacheFile = serde_json::from_str(&raw).ok()?;
    if file.version != CATALOG_CACHE_VERSION {
        return None;
    }
    Some(file.resources)
}

fn write_cache_file(path: &Path, resources: &BTreeMap<String, ResourceDescriptor>) {
    if let Err(e) = std::fs::write(path, serialize_catalog(resources)) {
        tracing::warn!(path = %path.display(), error = %e, "could not persist schema cache");
    }
}

/// Process-wide schema cache in front of a dialect introspector.
///
/// Safe for concurrent readers; first population takes the write lock so
/// concurrent cache misses do not trigger an introspection storm.
pub struct SchemaCatalog {
    introspector: Box<dyn Introspector>,
    cache_path: Option<PathBuf>,
    cache: RwLock<Option<Arc<BTreeMap<String, ResourceDescriptor>>>>,
}

impl SchemaCatalog {
    pub fn new(db: &Db) -> Self {
        Self::with_cache_file(db, None)
    }

    /// With `cache_path`, a valid persisted catalog skips introspection
    /// entirely, and a freshly introspected one is written back.
    pub fn with_cache_file(db: &Db, cache_path: Option<PathBuf>) -> Self {
        let introspector: Box<dyn Introspector> = match db {
            Db::Sqlite(pool) => Box::new(SqliteIntrospector::new(pool.clone())),
            Db::Postgres(pool) => Box::new(PostgresIntrospector::new(pool.clone())),
        };
        SchemaCatalog { introspector, cache_path, cache: RwLock::new(None) }
    }

    /// All resource names, sorted lexicographically.
    pub async fn list_resources(&self) -> Result<Vec<String>, ApiError> {
        let map = self.resources().await?;
        Ok(map.keys().cloned().collect())
    }

    pub async fn contains(&self, table: &str) -> Result<bool, ApiError> {
        Ok(self.resources().await?.contains_key(table))
    }

    /// Full descriptor for one resource.
    pub async fn descriptor(&self, table: &str) -> Result<ResourceDescriptor, ApiError> {
        let map = self.resources().await?;
        map.get(table)
            .cloned()
            .ok_or_else(|| ApiError::UnknownResource(table.to_string()))
    }

    /// Column names of one resource, in native order.
    pub async fn columns(&self, table: &str) -> Result<Vec<String>, ApiError> {
        let descriptor = self.descriptor(table).await?;
        Ok(descriptor.columns.into_iter().map(|c| c.name).collect())
    }

    /// Single-column primary key name, if any.
    pub async fn primary_key(&self, table: &str) -> Result<Option<String>, ApiError> {
        let descriptor = self.descriptor(table).await?;
        Ok(descriptor.primary_key()?.map(String::from))
    }

    /// Drop the in-memory cache; the next call re-introspects (or re-reads
    /// the persistent cache).
    pub async fn reset(&self) {
        *self.cache.write().await = None;
    }

    async fn resources(&self) -> Result<Arc<BTreeMap<String, ResourceDescriptor>>, ApiError> {
        if let Some(map) = self.cache.read().await.as_ref() {
            return Ok(Arc::clone(map));
        }
        let mut slot = self.cache.write().await;
        // Another request may have populated while we waited for the lock.
        if let Some(map) = slot.as_ref() {
            return Ok(Arc::clone(map));
        }
        if let Some(path) = &self.cache_path {
            if let Some(resources) = read_cache_file(path) {
                let map = Arc::new(resources);
                *slot = Some(Arc::clone(&map));
                return Ok(map);
            }
        }
        let mut resources = BTreeMap::new();
        for name in self.introspector.resource_names().await? {
            let columns = self.introspector.describe(&name).await?;
            resources.insert(name.clone(), ResourceDescriptor::new(name, columns));
        }
        if let Some(path) = &self.cache_path {
            write_cache_file(path, &resources);
        }
        let map = Arc::new(resources);
        *slot = Some(Arc::clone(&map));
        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(name: &str, pk: bool) -> ColumnDescriptor {
        ColumnDescriptor { name: name.into(), native_type: "TEXT".into(), is_primary_key: pk }
    }

    #[test]
    fn single_primary_key_resolves() {
        let d = ResourceDescriptor::new(
            "todos".into(),
            vec![column("id", true), column("description", false)],
        );
        assert_eq!(d.primary_key().unwrap(), Some("id"));
    }

    #[test]
    fn keyless_table_has_no_primary_key() {
        let d = ResourceDescriptor::new("categories".into(), vec![column("name", false)]);
        assert_eq!(d.primary_key().unwrap(), None);
    }

    #[test]
    fn composite_primary_key_is_rejected() {
        let d = ResourceDescriptor::new(
            "link".into(),
            vec![column("a", true), column("b", true)],
        );
        let err = d.primary_key().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Resource link uses a composite primary key which is not supported"
        );
    }

    #[test]
    fn catalog_serialization_is_deterministic() {
        let mut a = BTreeMap::new();
        a.insert(
            "test".to_string(),
            ResourceDescriptor::new("test".into(), vec![column("name", false)]),
        );
        // Same content inserted in a different order serializes identically.
        let mut b = BTreeMap::new();
        b.insert(
            "zzz".to_string(),
            ResourceDescriptor::new("zzz".into(), vec![column("id", true)]),
        );
        b.insert(
            "test".to_string(),
            ResourceDescriptor::new("test".into(), vec![column("name", false)]),
        );
        b.remove("zzz");
        assert_eq!(serialize_catalog(&a), serialize_catalog(&b));
        assert!(serialize_catalog(&a).contains("\"pk\":null"));
    }

    #[test]
    fn stale_cache_version_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema.cache");
        std::fs::write(&path, r#"{"version":999,"resources":{}}"#).unwrap();
        assert!(read_cache_file(&path).is_none());

        let mut resources = BTreeMap::new();
        resources.insert(
            "test".to_string(),
            ResourceDescriptor::new("test".into(), vec![column("name", false)]),
        );
        write_cache_file(&path, &resources);
        assert_eq!(read_cache_file(&path).unwrap(), resources);
    }
}
