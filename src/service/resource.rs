//! Resource operations: the service every request handler talks to.
//!
//! One instance per request, carrying that request's authenticated user.
//! Every operation returns an [`Envelope`]; failures are translated into
//! message envelopes here, so handlers never see an error type.

use crate::catalog::{ResourceDescriptor, SchemaCatalog};
use crate::db::{self, Db, Dialect};
use crate::error::ApiError;
use crate::response::Envelope;
use crate::service::collection::{resolve_fields, CollectionQuery};
use crate::sql;
use crate::storage::ContentStore;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::Instant;

pub struct ResourceService<'a> {
    db: &'a Db,
    catalog: &'a SchemaCatalog,
    store: &'a ContentStore,
    file_columns: &'a HashSet<String>,
    user: Option<String>,
}

impl<'a> ResourceService<'a> {
    pub fn new(
        db: &'a Db,
        catalog: &'a SchemaCatalog,
        store: &'a ContentStore,
        file_columns: &'a HashSet<String>,
        user: Option<String>,
    ) -> Self {
        ResourceService { db, catalog, store, file_columns, user }
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    /// All exposed resource names, sorted.
    pub async fn list_resources(&self) -> Envelope {
        match self.catalog.list_resources().await {
            Ok(names) => Envelope::ok(Value::from(names)),
            Err(e) => e.into_envelope(),
        }
    }

    pub async fn read_collection(&self, table: &str, params: &Map<String, Value>) -> Envelope {
        self.try_read_collection(table, params)
            .await
            .unwrap_or_else(ApiError::into_envelope)
    }

    pub async fn create_resource(
        &self,
        table: &str,
        payload: Map<String, Value>,
        files: &HashMap<String, PathBuf>,
    ) -> Envelope {
        let result = self.try_create(table, payload, files).await;
        if result.is_err() {
            discard_uploads(files);
        }
        result.unwrap_or_else(ApiError::into_envelope)
    }

    pub async fn read_resource(
        &self,
        table: &str,
        pk: &str,
        params: &Map<String, Value>,
    ) -> Envelope {
        self.try_read(table, pk, params)
            .await
            .unwrap_or_else(ApiError::into_envelope)
    }

    pub async fn update_resource(
        &self,
        table: &str,
        pk: &str,
        payload: Map<String, Value>,
        files: &HashMap<String, PathBuf>,
    ) -> Envelope {
        let result = self.try_update(table, pk, payload, files).await;
        if result.is_err() {
            discard_uploads(files);
        }
        result.unwrap_or_else(ApiError::into_envelope)
    }

    pub async fn delete_resource(&self, table: &str, pk: &str) -> Envelope {
        self.try_delete(table, pk)
            .await
            .unwrap_or_else(ApiError::into_envelope)
    }

    /// Resolve a content hash to its blob path. The body is the path as a
    /// string; serving bytes is the HTTP layer's concern.
    pub async fn fetch_file(&self, hash: &str) -> Envelope {
        match self.store.hash_to_path(hash) {
            Some(path) if path.exists() => {
                Envelope::ok(Value::String(path.display().to_string()))
            }
            _ => ApiError::NotFound.into_envelope(),
        }
    }

    async fn try_read_collection(
        &self,
        table: &str,
        params: &Map<String, Value>,
    ) -> Result<Envelope, ApiError> {
        let resource = self.catalog.descriptor(table).await?;
        let query = CollectionQuery::from_params(&resource, params)?;
        let (count, page) =
            sql::select_collection(&resource, &query, self.user(), self.db.dialect())?;

        let started = Instant::now();
        let total = self.db.fetch_scalar_i64(&count.sql, &count.params).await?;
        let rows = self.db.fetch_all(&page.sql, &page.params).await?;
        let elapsed = started.elapsed();

        Ok(Envelope::ok(Value::Array(rows))
            .header("X-Pagination-Limit", query.limit)
            .header("X-Pagination-Offset", query.offset)
            .header("X-Pagination-Total", total)
            .header("X-Query", &page.sql)
            .header("X-Query-Time", format!("{:.6}s", elapsed.as_secs_f64())))
    }

    async fn try_create(
        &self,
        table: &str,
        mut payload: Map<String, Value>,
        files: &HashMap<String, PathBuf>,
    ) -> Result<Envelope, ApiError> {
        let resource = self.catalog.descriptor(table).await?;
        let pk = resource
            .primary_key()?
            .ok_or(ApiError::UnsupportedOperation)?
            .to_string();

        if payload.contains_key("user_id") || files.contains_key("user_id") {
            return Err(ApiError::UserIdNotAllowed);
        }
        if payload.contains_key(&pk) || files.contains_key(&pk) {
            return Err(ApiError::PrimaryKeyNotAllowed);
        }
        reject_unrecognized(&resource, &payload, files)?;
        if payload.is_empty() && files.is_empty() {
            let missing: Vec<&str> = resource
                .column_names()
                .into_iter()
                .filter(|&c| c != pk)
                .collect();
            return Err(ApiError::MissingFields(missing.join(", ")));
        }

        if resource.has_column("user_id") {
            let owner = self.user().map(Value::from).unwrap_or(Value::Null);
            payload.insert("user_id".to_string(), owner);
        }
        self.apply_file_values(&mut payload, files)?;

        let dialect = self.db.dialect();
        let returning = matches!(dialect, Dialect::Postgres).then_some(pk.as_str());
        let buf = sql::insert(&resource, &payload, returning, dialect);

        let new_pk = match dialect {
            Dialect::Postgres => {
                let row = self
                    .db
                    .fetch_optional(&buf.sql, &buf.params)
                    .await
                    .map_err(translate_constraint)?;
                row.as_ref().and_then(|r| r.get(&pk)).map(key_text)
            }
            Dialect::Sqlite => {
                let outcome = self
                    .db
                    .execute(&buf.sql, &buf.params)
                    .await
                    .map_err(translate_constraint)?;
                outcome.last_insert_rowid.map(|n| n.to_string())
            }
        };
        let new_pk = new_pk.ok_or(ApiError::NotFound)?;

        self.try_read(table, &new_pk, &Map::new()).await
    }

    async fn try_read(
        &self,
        table: &str,
        pk: &str,
        params: &Map<String, Value>,
    ) -> Result<Envelope, ApiError> {
        let resource = self.catalog.descriptor(table).await?;
        let pk_column = resource
            .primary_key()?
            .ok_or(ApiError::UnsupportedOperation)?;
        let fields = resolve_fields(&resource, params)?;
        let buf = sql::select_one(&resource, &fields, pk_column, pk, self.user(), self.db.dialect());
        match self.db.fetch_optional(&buf.sql, &buf.params).await? {
            Some(row) => Ok(Envelope::ok(row)),
            None => Err(ApiError::NotFound),
        }
    }

    async fn try_update(
        &self,
        table: &str,
        pk: &str,
        mut payload: Map<String, Value>,
        files: &HashMap<String, PathBuf>,
    ) -> Result<Envelope, ApiError> {
        let resource = self.catalog.descriptor(table).await?;
        let pk_column = resource
            .primary_key()?
            .ok_or(ApiError::UnsupportedOperation)?
            .to_string();

        reject_unrecognized(&resource, &payload, files)?;
        if payload.is_empty() && files.is_empty() {
            return Err(ApiError::EmptyRequest);
        }
        if payload.contains_key(&pk_column) || files.contains_key(&pk_column) {
            return Err(ApiError::PrimaryKeyChangeNotAllowed);
        }
        if payload.contains_key("user_id") || files.contains_key("user_id") {
            return Err(ApiError::UserIdChangeNotAllowed);
        }
        self.apply_file_values(&mut payload, files)?;

        let buf = sql::update(&resource, &pk_column, pk, &payload, self.user(), self.db.dialect());
        let outcome = self
            .db
            .execute(&buf.sql, &buf.params)
            .await
            .map_err(translate_constraint)?;
        if outcome.rows_affected == 0 {
            return Err(ApiError::NotFound);
        }

        self.try_read(table, pk, &Map::new()).await
    }

    async fn try_delete(&self, table: &str, pk: &str) -> Result<Envelope, ApiError> {
        let resource = self.catalog.descriptor(table).await?;
        let pk_column = resource
            .primary_key()?
            .ok_or(ApiError::UnsupportedOperation)?;
        let buf = sql::delete(&resource, pk_column, pk, self.user(), self.db.dialect());
        let outcome = self.db.execute(&buf.sql, &buf.params).await?;
        if outcome.rows_affected == 0 {
            return Err(ApiError::NotFound);
        }
        Ok(Envelope::no_content())
    }

    /// Resolve file-valued columns: uploaded paths become content hashes,
    /// string values must reference an existing blob, null passes through as
    /// an explicit unset.
    fn apply_file_values(
        &self,
        payload: &mut Map<String, Value>,
        files: &HashMap<String, PathBuf>,
    ) -> Result<(), ApiError> {
        for (column, path) in files {
            let hash = self.store.save(path)?;
            payload.insert(column.clone(), Value::String(hash));
        }
        for column in self.file_columns {
            if files.contains_key(column) {
                continue;
            }
            if let Some(Value::String(hash)) = payload.get(column) {
                if !self.store.exists(hash) {
                    return Err(ApiError::UnknownBlob {
                        column: column.clone(),
                        hash: hash.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Spooled uploads belong to the operation once handed over. On the success
/// path the store consumes them; a rejected request must not leave them
/// behind in the temp directory.
fn discard_uploads(files: &HashMap<String, PathBuf>) {
    for path in files.values() {
        if !path.exists() {
            continue;
        }
        if let Err(e) = std::fs::remove_file(path) {
            tracing::warn!(path = %path.display(), error = %e, "could not discard upload");
        }
    }
}

/// Every payload and upload key must be a schema column.
fn reject_unrecognized(
    resource: &ResourceDescriptor,
    payload: &Map<String, Value>,
    files: &HashMap<String, PathBuf>,
) -> Result<(), ApiError> {
    let mut unknown: Vec<&str> = payload
        .keys()
        .chain(files.keys())
        .map(String::as_str)
        .filter(|k| !resource.has_column(k))
        .collect();
    if unknown.is_empty() {
        return Ok(());
    }
    unknown.sort_unstable();
    unknown.dedup();
    Err(ApiError::UnrecognizedFields(unknown.join(", ")))
}

/// A not-null violation means the client omitted required fields; anything
/// else is a genuine server-side failure.
fn translate_constraint(err: sqlx::Error) -> ApiError {
    if db::is_not_null_violation(&err) {
        ApiError::RequiredParametersMissing
    } else {
        ApiError::Db(err)
    }
}

/// Primary-key text of a freshly returned row, for the re-read by key.
fn key_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
