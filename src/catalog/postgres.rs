//! PostgreSQL introspection via `information_schema` and `pg_catalog`.

use super::{ColumnDescriptor, Introspector};
use async_trait::async_trait;
use sqlx::postgres::PgPool;
use sqlx::Row;

pub struct PostgresIntrospector {
    pool: PgPool,
}

impl PostgresIntrospector {
    pub fn new(pool: PgPool) -> Self {
        PostgresIntrospector { pool }
    }
}

#[async_trait]
impl Introspector for PostgresIntrospector {
    async fn resource_names(&self) -> Result<Vec<String>, sqlx::Error> {
        // information_schema.tables lists views as well as base tables.
        let rows: Vec<(String,)> = sqlx::query_as(
            r"SELECT table_name::text FROM information_schema.tables
              WHERE table_schema = 'public' AND table_name NOT LIKE '\_%'
              ORDER BY table_name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    async fn describe(&self, table: &str) -> Result<Vec<ColumnDescriptor>, sqlx::Error> {
        let rows = sqlx::query(
            r"SELECT
                  a.attname::text AS name,
                  t.typname::text AS type,
                  COALESCE(i.indisprimary, FALSE) AS pk
              FROM pg_attribute a
              LEFT JOIN pg_type t ON a.atttypid = t.oid
              LEFT JOIN pg_index i
                ON a.attrelid = i.indrelid
               AND a.attnum = ANY(i.indkey)
               AND i.indisprimary
              WHERE a.attisdropped = FALSE
                AND a.attnum > 0
                AND a.attrelid = $1::regclass
              ORDER BY a.attnum",
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await?;
        let mut columns = Vec::with_capacity(rows.len());
        for row in rows {
            let name: String = row.try_get("name")?;
            let native_type: Option<String> = row.try_get("type")?;
            let is_primary_key: bool = row.try_get("pk")?;
            columns.push(ColumnDescriptor {
                name,
                native_type: native_type.unwrap_or_default(),
                is_primary_key,
            });
        }
        Ok(columns)
    }
}
