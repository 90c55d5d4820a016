//! Dialect-aware database handle: one enum over the SQLite and PostgreSQL
//! pools, JSON-value parameter binding, and row-to-JSON decoding.
//!
//! The dialect is selected once per connection; everything downstream
//! (introspection, lookup rendering, placeholder syntax) keys off it.

use serde_json::Value;
use sqlx::encode::{Encode, IsNull};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow, PgTypeInfo, Postgres};
use sqlx::sqlite::{Sqlite, SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow, SqliteTypeInfo};
use sqlx::{Column, Database, Row, TypeInfo, ValueRef};
use std::str::FromStr;

/// SQL dialect of the connected database.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    Postgres,
}

impl Dialect {
    /// Placeholder for the n-th bound parameter (1-based).
    pub fn placeholder(&self, n: usize) -> String {
        match self {
            Dialect::Sqlite => "?".to_string(),
            Dialect::Postgres => format!("${n}"),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Dialect::Sqlite => "sqlite",
            Dialect::Postgres => "postgresql",
        }
    }
}

/// Outcome of a mutating statement.
pub struct ExecOutcome {
    pub rows_affected: u64,
    /// Rowid of the inserted row; SQLite only.
    pub last_insert_rowid: Option<i64>,
}

/// Connection handle over either backend pool. Cloning is cheap (pools are
/// internally reference counted).
#[derive(Clone)]
pub enum Db {
    Sqlite(SqlitePool),
    Postgres(PgPool),
}

impl Db {
    /// Connect from a database URL; the scheme picks the backend.
    pub async fn connect(url: &str) -> Result<Db, sqlx::Error> {
        if url.starts_with("sqlite") {
            let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
            let pool = SqlitePoolOptions::new().connect_with(options).await?;
            Ok(Db::Sqlite(pool))
        } else if url.starts_with("postgres") {
            let pool = PgPoolOptions::new().max_connections(5).connect(url).await?;
            Ok(Db::Postgres(pool))
        } else {
            Err(sqlx::Error::Configuration(
                format!("unsupported database url: {url}").into(),
            ))
        }
    }

    pub fn dialect(&self) -> Dialect {
        match self {
            Db::Sqlite(_) => Dialect::Sqlite,
            Db::Postgres(_) => Dialect::Postgres,
        }
    }

    pub async fn fetch_all(&self, sql: &str, params: &[Value]) -> Result<Vec<Value>, sqlx::Error> {
        tracing::debug!(sql = %sql, params = ?params, "query");
        match self {
            Db::Sqlite(pool) => {
                let mut query = sqlx::query(sql);
                for p in params {
                    query = query.bind(SqliteBindValue::from_json(p));
                }
                let rows = query.fetch_all(pool).await?;
                Ok(rows.iter().map(sqlite_row_to_json).collect())
            }
            Db::Postgres(pool) => {
                let mut query = sqlx::query(sql);
                for p in params {
                    query = query.bind(PgBindValue::from_json(p));
                }
                let rows = query.fetch_all(pool).await?;
                Ok(rows.iter().map(pg_row_to_json).collect())
            }
        }
    }

    pub async fn fetch_optional(
        &self,
        sql: &str,
        params: &[Value],
    ) -> Result<Option<Value>, sqlx::Error> {
        tracing::debug!(sql = %sql, params = ?params, "query");
        match self {
            Db::Sqlite(pool) => {
                let mut query = sqlx::query(sql);
                for p in params {
                    query = query.bind(SqliteBindValue::from_json(p));
                }
                let row = query.fetch_optional(pool).await?;
                Ok(row.as_ref().map(sqlite_row_to_json))
            }
            Db::Postgres(pool) => {
                let mut query = sqlx::query(sql);
                for p in params {
                    query = query.bind(PgBindValue::from_json(p));
                }
                let row = query.fetch_optional(pool).await?;
                Ok(row.as_ref().map(pg_row_to_json))
            }
        }
    }

    /// First column of the first row as an integer; used for `COUNT(*)`.
    pub async fn fetch_scalar_i64(&self, sql: &str, params: &[Value]) -> Result<i64, sqlx::Error> {
        tracing::debug!(sql = %sql, params = ?params, "query");
        match self {
            Db::Sqlite(pool) => {
                let mut query = sqlx::query(sql);
                for p in params {
                    query = query.bind(SqliteBindValue::from_json(p));
                }
                let row = query.fetch_one(pool).await?;
                row.try_get::<i64, _>(0)
            }
            Db::Postgres(pool) => {
                let mut query = sqlx::query(sql);
                for p in params {
                    query = query.bind(PgBindValue::from_json(p));
                }
                let row = query.fetch_one(pool).await?;
                row.try_get::<i64, _>(0)
            }
        }
    }

    pub async fn execute(&self, sql: &str, params: &[Value]) -> Result<ExecOutcome, sqlx::Error> {
        tracing::debug!(sql = %sql, params = ?params, "execute");
        match self {
            Db::Sqlite(pool) => {
                let mut query = sqlx::query(sql);
                for p in params {
                    query = query.bind(SqliteBindValue::from_json(p));
                }
                let result = query.execute(pool).await?;
                Ok(ExecOutcome {
                    rows_affected: result.rows_affected(),
                    last_insert_rowid: Some(result.last_insert_rowid()),
                })
            }
            Db::Postgres(pool) => {
                let mut query = sqlx::query(sql);
                for p in params {
                    query = query.bind(PgBindValue::from_json(p));
                }
                let result = query.execute(pool).await?;
                Ok(ExecOutcome {
                    rows_affected: result.rows_affected(),
                    last_insert_rowid: None,
                })
            }
        }
    }
}

/// True when the error is a NOT NULL constraint violation on either backend
/// (PostgreSQL SQLSTATE 23502, SQLite extended code 1299).
pub fn is_not_null_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => {
            db.code().map(|c| c == "23502" || c == "1299").unwrap_or(false)
                || db.message().contains("NOT NULL constraint failed")
        }
        _ => false,
    }
}

/// A value that can be bound to a PostgreSQL query. Converts from serde_json::Value.
#[derive(Clone, Debug)]
pub enum PgBindValue {
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    String(String),
    Uuid(uuid::Uuid),
    Json(Value),
}

impl PgBindValue {
    pub fn from_json(v: &Value) -> Self {
        match v {
            Value::Null => PgBindValue::Null,
            Value::Bool(b) => PgBindValue::Bool(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    PgBindValue::I64(i)
                } else {
                    PgBindValue::F64(n.as_f64().unwrap_or(0.0))
                }
            }
            Value::String(s) => {
                if let Ok(u) = uuid::Uuid::parse_str(s) {
                    PgBindValue::Uuid(u)
                } else {
                    PgBindValue::String(s.clone())
                }
            }
            Value::Array(_) | Value::Object(_) => PgBindValue::Json(v.clone()),
        }
    }
}

impl<'q> Encode<'q, Postgres> for PgBindValue {
    fn encode_by_ref(
        &self,
        buf: &mut <Postgres as Database>::ArgumentBuffer<'q>,
    ) -> Result<IsNull, Box<dyn std::error::Error + Send + Sync>> {
        Ok(match self {
            PgBindValue::Null => <Option<i32> as Encode<Postgres>>::encode_by_ref(&None, buf)?,
            PgBindValue::Bool(b) => <bool as Encode<Postgres>>::encode_by_ref(b, buf)?,
            PgBindValue::I64(n) => <i64 as Encode<Postgres>>::encode_by_ref(n, buf)?,
            PgBindValue::F64(n) => <f64 as Encode<Postgres>>::encode_by_ref(n, buf)?,
            PgBindValue::String(s) => {
                let s_ref: &str = s.as_str();
                <&str as Encode<Postgres>>::encode_by_ref(&s_ref, buf)?
            }
            PgBindValue::Uuid(u) => {
                let u_str = u.to_string();
                <&str as Encode<Postgres>>::encode_by_ref(&u_str.as_str(), buf)?
            }
            PgBindValue::Json(v) => <Value as Encode<Postgres>>::encode_by_ref(v, buf)?,
        })
    }

    /// Declare the wire type actually encoded; without this every parameter
    /// would claim TEXT while carrying binary integers or booleans.
    fn produces(&self) -> Option<PgTypeInfo> {
        Some(match self {
            PgBindValue::Bool(_) => <bool as sqlx::Type<Postgres>>::type_info(),
            PgBindValue::I64(_) => <i64 as sqlx::Type<Postgres>>::type_info(),
            PgBindValue::F64(_) => <f64 as sqlx::Type<Postgres>>::type_info(),
            PgBindValue::Json(_) => <Value as sqlx::Type<Postgres>>::type_info(),
            // Strings (uuids included) stay text; comparisons cast the
            // column side with ::text.
            PgBindValue::Null | PgBindValue::String(_) | PgBindValue::Uuid(_) => {
                PgTypeInfo::with_name("TEXT")
            }
        })
    }
}

impl sqlx::Type<Postgres> for PgBindValue {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_name("TEXT")
    }
}

/// SQLite counterpart of [`PgBindValue`]. SQLite has no UUID storage class,
/// so UUID strings bind as text.
#[derive(Clone, Debug)]
pub enum SqliteBindValue {
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    String(String),
    Json(Value),
}

impl SqliteBindValue {
    pub fn from_json(v: &Value) -> Self {
        match v {
            Value::Null => SqliteBindValue::Null,
            Value::Bool(b) => SqliteBindValue::Bool(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    SqliteBindValue::I64(i)
                } else {
                    SqliteBindValue::F64(n.as_f64().unwrap_or(0.0))
                }
            }
            Value::String(s) => SqliteBindValue::String(s.clone()),
            Value::Array(_) | Value::Object(_) => SqliteBindValue::Json(v.clone()),
        }
    }
}

impl<'q> Encode<'q, Sqlite> for SqliteBindValue {
    fn encode_by_ref(
        &self,
        buf: &mut <Sqlite as Database>::ArgumentBuffer<'q>,
    ) -> Result<IsNull, Box<dyn std::error::Error + Send + Sync>> {
        Ok(match self {
            SqliteBindValue::Null => <Option<i32> as Encode<Sqlite>>::encode_by_ref(&None, buf)?,
            SqliteBindValue::Bool(b) => <bool as Encode<Sqlite>>::encode_by_ref(b, buf)?,
            SqliteBindValue::I64(n) => <i64 as Encode<Sqlite>>::encode_by_ref(n, buf)?,
            SqliteBindValue::F64(n) => <f64 as Encode<Sqlite>>::encode_by_ref(n, buf)?,
            SqliteBindValue::String(s) => {
                <String as Encode<Sqlite>>::encode_by_ref(s, buf)?
            }
            SqliteBindValue::Json(v) => <Value as Encode<Sqlite>>::encode_by_ref(v, buf)?,
        })
    }
}

impl sqlx::Type<Sqlite> for SqliteBindValue {
    fn type_info() -> SqliteTypeInfo {
        <&str as sqlx::Type<Sqlite>>::type_info()
    }
}

/// Decode a SQLite row into a JSON object keyed by column name. SQLite values
/// carry their own storage class, so decoding follows the value, not the
/// declared column type.
pub fn sqlite_row_to_json(row: &SqliteRow) -> Value {
    let mut map = serde_json::Map::new();
    for (i, col) in row.columns().iter().enumerate() {
        map.insert(col.name().to_string(), sqlite_cell_to_value(row, i));
    }
    Value::Object(map)
}

fn sqlite_cell_to_value(row: &SqliteRow, index: usize) -> Value {
    let raw = match row.try_get_raw(index) {
        Ok(raw) => raw,
        Err(_) => return Value::Null,
    };
    if raw.is_null() {
        return Value::Null;
    }
    match raw.type_info().name() {
        "INTEGER" => row
            .try_get::<i64, _>(index)
            .map(|n| Value::Number(n.into()))
            .unwrap_or(Value::Null),
        "BOOLEAN" => row.try_get::<bool, _>(index).map(Value::Bool).unwrap_or(Value::Null),
        "REAL" | "NUMERIC" => row
            .try_get::<f64, _>(index)
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        // BLOB columns are not representable in a JSON row; file content
        // belongs in the ContentStore, addressed by hash.
        "BLOB" => Value::Null,
        _ => row.try_get::<String, _>(index).map(Value::String).unwrap_or(Value::Null),
    }
}

/// Decode a PostgreSQL row into a JSON object keyed by column name.
pub fn pg_row_to_json(row: &PgRow) -> Value {
    let mut map = serde_json::Map::new();
    for col in row.columns() {
        map.insert(col.name().to_string(), pg_cell_to_value(row, col.name()));
    }
    Value::Object(map)
}

fn pg_cell_to_value(row: &PgRow, name: &str) -> Value {
    if let Ok(Some(n)) = row.try_get::<Option<i16>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i32>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i64>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<f32>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(n as f64) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(n)) = row.try_get::<Option<f64>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(n) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(b)) = row.try_get::<Option<bool>, _>(name) {
        return Value::Bool(b);
    }
    if let Ok(Some(u)) = row.try_get::<Option<uuid::Uuid>, _>(name) {
        return Value::String(u.to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(name) {
        return Value::String(d.to_rfc3339());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDateTime>, _>(name) {
        return Value::String(d.format("%Y-%m-%dT%H:%M:%S%.f").to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDate>, _>(name) {
        return Value::String(d.format("%Y-%m-%d").to_string());
    }
    if let Ok(Some(s)) = row.try_get::<Option<String>, _>(name) {
        return Value::String(s);
    }
    if let Ok(Some(j)) = row.try_get::<Option<Value>, _>(name) {
        return j;
    }
    Value::Null
}
