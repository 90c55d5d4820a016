//! Statement builders for the generic CRUD operations.
//!
//! Every builder takes a validated descriptor and returns a [`QueryBuf`]:
//! identifiers are quoted schema names, values are bound parameters. When a
//! resource has a `user_id` column, a scope predicate is appended so rows
//! belonging to other users are invisible to every operation, not just reads.

use super::{quote_ident, QueryBuf};
use crate::catalog::ResourceDescriptor;
use crate::db::Dialect;
use crate::error::ApiError;
use crate::lookup::{self, Lookup};
use crate::service::collection::CollectionQuery;
use serde_json::{Map, Value};

/// Count and page statements for a collection read. Both share the same
/// WHERE clause; the page adds projection, ordering and pagination.
pub fn select_collection(
    resource: &ResourceDescriptor,
    query: &CollectionQuery,
    user: Option<&str>,
    dialect: Dialect,
) -> Result<(QueryBuf, QueryBuf), ApiError> {
    let table = quote_ident(&resource.name);

    let mut count = QueryBuf::new(dialect);
    let where_sql = collection_where(&mut count, resource, query, user)?;
    count.sql = format!("SELECT COUNT(*) FROM {table}{where_sql}");

    let mut page = QueryBuf::new(dialect);
    let where_sql = collection_where(&mut page, resource, query, user)?;
    let fields = query.fields.iter().map(|f| quote_ident(f)).collect::<Vec<_>>().join(", ");
    page.sql = format!(
        "SELECT {fields} FROM {table}{where_sql} ORDER BY {} {} LIMIT {} OFFSET {}",
        quote_ident(&query.sort),
        query.order.as_sql(),
        query.limit,
        query.offset,
    );

    Ok((count, page))
}

/// Fetch a single row by primary key, within the user scope.
pub fn select_one(
    resource: &ResourceDescriptor,
    fields: &[String],
    pk_column: &str,
    pk: &str,
    user: Option<&str>,
    dialect: Dialect,
) -> QueryBuf {
    let mut buf = QueryBuf::new(dialect);
    let projection = fields.iter().map(|f| quote_ident(f)).collect::<Vec<_>>().join(", ");
    let mut clauses = vec![pk_clause(&mut buf, pk_column, pk)];
    if resource.has_column("user_id") {
        clauses.push(scope_clause(&mut buf, user));
    }
    buf.sql = format!(
        "SELECT {projection} FROM {} WHERE {}",
        quote_ident(&resource.name),
        clauses.join(" AND "),
    );
    buf
}

/// Insert a row. Columns follow schema order regardless of payload order.
/// On PostgreSQL a `RETURNING` clause hands back the generated key.
pub fn insert(
    resource: &ResourceDescriptor,
    payload: &Map<String, Value>,
    returning_pk: Option<&str>,
    dialect: Dialect,
) -> QueryBuf {
    let mut buf = QueryBuf::new(dialect);
    let mut columns = Vec::new();
    let mut placeholders = Vec::new();
    for column in &resource.columns {
        if let Some(value) = payload.get(&column.name) {
            columns.push(quote_ident(&column.name));
            placeholders.push(buf.push_param(value.clone()));
        }
    }
    buf.sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(&resource.name),
        columns.join(", "),
        placeholders.join(", "),
    );
    if let Some(pk) = returning_pk {
        buf.sql.push_str(" RETURNING ");
        buf.sql.push_str(&quote_ident(pk));
    }
    buf
}

/// Update the given columns of one row, scoped by primary key and user.
pub fn update(
    resource: &ResourceDescriptor,
    pk_column: &str,
    pk: &str,
    payload: &Map<String, Value>,
    user: Option<&str>,
    dialect: Dialect,
) -> QueryBuf {
    let mut buf = QueryBuf::new(dialect);
    let mut assignments = Vec::new();
    for column in &resource.columns {
        if let Some(value) = payload.get(&column.name) {
            let ph = buf.push_param(value.clone());
            assignments.push(format!("{} = {ph}", quote_ident(&column.name)));
        }
    }
    let mut clauses = vec![pk_clause(&mut buf, pk_column, pk)];
    if resource.has_column("user_id") {
        clauses.push(scope_clause(&mut buf, user));
    }
    buf.sql = format!(
        "UPDATE {} SET {} WHERE {}",
        quote_ident(&resource.name),
        assignments.join(", "),
        clauses.join(" AND "),
    );
    buf
}

/// Delete one row, scoped by primary key and user.
pub fn delete(
    resource: &ResourceDescriptor,
    pk_column: &str,
    pk: &str,
    user: Option<&str>,
    dialect: Dialect,
) -> QueryBuf {
    let mut buf = QueryBuf::new(dialect);
    let mut clauses = vec![pk_clause(&mut buf, pk_column, pk)];
    if resource.has_column("user_id") {
        clauses.push(scope_clause(&mut buf, user));
    }
    buf.sql = format!("DELETE FROM {} WHERE {}", quote_ident(&resource.name), clauses.join(" AND "));
    buf
}

fn collection_where(
    buf: &mut QueryBuf,
    resource: &ResourceDescriptor,
    query: &CollectionQuery,
    user: Option<&str>,
) -> Result<String, ApiError> {
    let mut clauses = Vec::new();
    if resource.has_column("user_id") {
        clauses.push(scope_clause(buf, user));
    }
    for filter in &query.filters {
        clauses.push(lookup::render(buf, &filter.column, filter.lookup, filter.value.as_deref())?);
    }
    if let Some(term) = &query.search {
        let pk = resource.primary_key()?;
        let mut branches = Vec::new();
        for column in resource.column_names() {
            if Some(column) == pk || column == "user_id" {
                continue;
            }
            branches.push(lookup::render(buf, column, Lookup::IContains, Some(term))?);
        }
        if !branches.is_empty() {
            clauses.push(format!("({})", branches.join(" OR ")));
        }
    }
    Ok(if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    })
}

/// Primary-key match. The key arrives as path text, so PostgreSQL compares
/// as text to stay agnostic of the column's actual type.
fn pk_clause(buf: &mut QueryBuf, pk_column: &str, pk: &str) -> String {
    let ph = buf.push_param(pk.into());
    match buf.dialect() {
        Dialect::Sqlite => format!("{} = {ph}", quote_ident(pk_column)),
        Dialect::Postgres => format!("{}::text = {ph}", quote_ident(pk_column)),
    }
}

/// Row scope: authenticated requests see their own rows, anonymous requests
/// see rows with no owner.
fn scope_clause(buf: &mut QueryBuf, user: Option<&str>) -> String {
    match user {
        Some(user) => {
            let ph = buf.push_param(user.into());
            match buf.dialect() {
                Dialect::Sqlite => format!("\"user_id\" = {ph}"),
                Dialect::Postgres => format!("\"user_id\"::text = {ph}"),
            }
        }
        None => "\"user_id\" IS NULL".to_string(),
    }
}
