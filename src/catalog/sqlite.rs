//! SQLite introspection via `sqlite_master` and `PRAGMA table_info`.

use super::{ColumnDescriptor, Introspector};
use crate::sql::quote_ident;
use async_trait::async_trait;
use sqlx::sqlite::SqlitePool;
use sqlx::Row;

pub struct SqliteIntrospector {
    pool: SqlitePool,
}

impl SqliteIntrospector {
    pub fn new(pool: SqlitePool) -> Self {
        SqliteIntrospector { pool }
    }
}

#[async_trait]
impl Introspector for SqliteIntrospector {
    async fn resource_names(&self) -> Result<Vec<String>, sqlx::Error> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r"SELECT name FROM sqlite_master
              WHERE type IN ('table', 'view')
                AND name NOT LIKE 'sqlite\_%' ESCAPE '\'
                AND name NOT LIKE '\_%' ESCAPE '\'
              ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    async fn describe(&self, table: &str) -> Result<Vec<ColumnDescriptor>, sqlx::Error> {
        // PRAGMA arguments cannot be bound; the table name comes from
        // resource_names(), quoted defensively.
        let sql = format!("PRAGMA table_info({})", quote_ident(table));
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        let mut columns = Vec::with_capacity(rows.len());
        for row in rows {
            let name: String = row.try_get("name")?;
            let native_type: String = row.try_get("type")?;
            // `pk` is the 1-based position of the column within the primary
            // key, or 0 when it is not part of it.
            let pk: i64 = row.try_get("pk")?;
            columns.push(ColumnDescriptor { name, native_type, is_primary_key: pk > 0 });
        }
        Ok(columns)
    }
}
