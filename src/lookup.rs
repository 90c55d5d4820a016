//! Filter lookup operators and their per-dialect SQL rendering.
//!
//! A query key `column__operator` selects one of the operators below; a bare
//! `column` key means equality. Rendering produces a WHERE fragment with the
//! value as a bound parameter, never interpolated.

use crate::db::Dialect;
use crate::error::ApiError;
use crate::sql::{quote_ident, QueryBuf};

/// The fixed set of supported lookup operators. Anything else is an error,
/// never silently treated as equality.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lookup {
    Eq,
    Neq,
    Gt,
    Lt,
    Gte,
    Lte,
    IsNull,
    NotNull,
    Contains,
    IContains,
    Month,
    Year,
}

impl Lookup {
    pub fn parse(s: &str) -> Result<Lookup, ApiError> {
        Ok(match s {
            "eq" => Lookup::Eq,
            "neq" => Lookup::Neq,
            "gt" => Lookup::Gt,
            "lt" => Lookup::Lt,
            "gte" => Lookup::Gte,
            "lte" => Lookup::Lte,
            "isnull" => Lookup::IsNull,
            "notnull" => Lookup::NotNull,
            "contains" => Lookup::Contains,
            "icontains" => Lookup::IContains,
            "month" => Lookup::Month,
            "year" => Lookup::Year,
            other => return Err(ApiError::UnknownLookupType(other.to_string())),
        })
    }

}

/// Split a filter key into its column and operator parts. A missing suffix
/// means equality: `done` and `done__eq` are the same filter.
pub fn split_filter_key(key: &str) -> (&str, &str) {
    match key.split_once("__") {
        Some((column, lookup)) => (column, lookup),
        None => (key, "eq"),
    }
}

/// Render one filter as a WHERE fragment, pushing bound parameters into
/// `buf`. A null value is an IS NULL test no matter the operator, matching
/// the REST convention that `column=` with no value means "is unset".
pub fn render(
    buf: &mut QueryBuf,
    column: &str,
    lookup: Lookup,
    value: Option<&str>,
) -> Result<String, ApiError> {
    let dialect = buf.dialect();
    let ident = quote_ident(column);

    let Some(value) = value else {
        return Ok(format!("{ident} IS NULL"));
    };

    match lookup {
        Lookup::IsNull => Ok(format!("{ident} IS NULL")),
        Lookup::NotNull => Ok(format!("{ident} IS NOT NULL")),
        Lookup::Contains | Lookup::IContains => {
            let ph = buf.push_param(format!("%{value}%").into());
            Ok(match dialect {
                // SQLite LIKE is case-insensitive for ASCII, so icontains
                // falls back to plain LIKE there.
                Dialect::Sqlite => format!("{ident} LIKE {ph}"),
                Dialect::Postgres if lookup == Lookup::IContains => {
                    format!("{ident}::text ILIKE {ph}")
                }
                Dialect::Postgres => format!("{ident}::text LIKE {ph}"),
            })
        }
        Lookup::Year | Lookup::Month => {
            let expr = date_part_expr(dialect, lookup, &ident)?;
            let ph = buf.push_param(value.into());
            Ok(format!("{expr} = {ph}"))
        }
        Lookup::Eq => Ok(comparison(buf, &ident, "=", value)),
        Lookup::Neq => Ok(comparison(buf, &ident, "!=", value)),
        Lookup::Gt => Ok(comparison(buf, &ident, ">", value)),
        Lookup::Lt => Ok(comparison(buf, &ident, "<", value)),
        Lookup::Gte => Ok(comparison(buf, &ident, ">=", value)),
        Lookup::Lte => Ok(comparison(buf, &ident, "<=", value)),
    }
}

fn comparison(buf: &mut QueryBuf, ident: &str, op: &'static str, value: &str) -> String {
    let ph = buf.push_param(value.into());
    match buf.dialect() {
        Dialect::Sqlite => format!("{ident} {op} {ph}"),
        // Cast to text so heterogeneous column types compare against the
        // text-typed bound value.
        Dialect::Postgres => format!("{ident}::text {op} {ph}"),
    }
}

/// Date-part extraction expression for the dialect, compared as text so the
/// bound value needs no numeric cast.
fn date_part_expr(dialect: Dialect, lookup: Lookup, ident: &str) -> Result<String, ApiError> {
    match (dialect, lookup) {
        (Dialect::Sqlite, Lookup::Year) => Ok(format!("strftime('%Y', {ident})")),
        (Dialect::Sqlite, Lookup::Month) => Ok(format!("strftime('%m', {ident})")),
        (Dialect::Postgres, Lookup::Year) => Ok(format!("date_part('year', {ident})::text")),
        (Dialect::Postgres, Lookup::Month) => Ok(format!("date_part('month', {ident})::text")),
        (dialect, _) => Err(ApiError::UnsupportedPlatform(dialect.name().to_string())),
    }
}
