//! Validated collection query built from raw request parameters.
//!
//! All validation happens here, before any SQL executes: unknown columns,
//! bad operators and malformed integers are rejected with the exact
//! user-facing message, naming the offending input.

use crate::catalog::ResourceDescriptor;
use crate::error::ApiError;
use crate::lookup::{split_filter_key, Lookup};
use serde_json::{Map, Value};

pub const DEFAULT_LIMIT: u64 = 25;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

impl Order {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Order::Asc => "ASC",
            Order::Desc => "DESC",
        }
    }
}

/// One `column[__operator]=value` filter from the query string.
#[derive(Clone, Debug)]
pub struct FilterClause {
    pub column: String,
    pub lookup: Lookup,
    pub value: Option<String>,
}

/// A fully validated collection read: projection, sorting, pagination,
/// filters and search, all checked against the resource's schema.
#[derive(Clone, Debug)]
pub struct CollectionQuery {
    pub fields: Vec<String>,
    pub sort: String,
    pub order: Order,
    pub limit: u64,
    pub offset: u64,
    pub filters: Vec<FilterClause>,
    pub search: Option<String>,
}

impl CollectionQuery {
    pub fn from_params(
        resource: &ResourceDescriptor,
        params: &Map<String, Value>,
    ) -> Result<CollectionQuery, ApiError> {
        let fields = resolve_fields(resource, params)?;

        let sort = match params.get("_sort").and_then(value_to_raw) {
            Some(sort) => {
                if !resource.has_column(&sort) {
                    return Err(ApiError::UnknownSortProperty(sort));
                }
                sort
            }
            None => default_sort(resource)?,
        };

        let order = match params.get("_order").and_then(value_to_raw) {
            None => Order::Asc,
            Some(raw) => match raw.as_str() {
                "ASC" => Order::Asc,
                "DESC" => Order::Desc,
                _ => return Err(ApiError::InvalidOrder(raw)),
            },
        };

        let limit = parse_non_negative(params, "_limit", "limit", DEFAULT_LIMIT)?;
        let offset = parse_non_negative(params, "_offset", "offset", 0)?;

        let mut filters = Vec::new();
        for (key, value) in params {
            if key.starts_with('_') {
                continue;
            }
            let (column, lookup) = split_filter_key(key);
            if !resource.has_column(column) {
                return Err(ApiError::UnknownFilterProperty(key.clone()));
            }
            filters.push(FilterClause {
                column: column.to_string(),
                lookup: Lookup::parse(lookup)?,
                value: value_to_raw(value),
            });
        }

        let search = params
            .get("_search")
            .and_then(value_to_raw)
            .filter(|s| !s.is_empty());

        Ok(CollectionQuery { fields, sort, order, limit, offset, filters, search })
    }
}

/// Resolve `_fields` into a concrete projection: all columns unless an
/// explicit comma-separated list is given; every named field must exist.
pub fn resolve_fields(
    resource: &ResourceDescriptor,
    params: &Map<String, Value>,
) -> Result<Vec<String>, ApiError> {
    match params.get("_fields").and_then(value_to_raw).filter(|s| !s.is_empty()) {
        Some(list) => {
            let mut fields = Vec::new();
            for field in list.split(',') {
                if !resource.has_column(field) {
                    return Err(ApiError::UnknownField(field.to_string()));
                }
                fields.push(field.to_string());
            }
            Ok(fields)
        }
        None => Ok(resource.column_names().into_iter().map(String::from).collect()),
    }
}

/// Default sort column: the primary key if there is one, else the first
/// column in schema order.
fn default_sort(resource: &ResourceDescriptor) -> Result<String, ApiError> {
    if let Some(pk) = resource.primary_key()? {
        return Ok(pk.to_string());
    }
    resource
        .columns
        .first()
        .map(|c| c.name.clone())
        .ok_or(ApiError::UnsupportedOperation)
}

fn parse_non_negative(
    params: &Map<String, Value>,
    key: &str,
    name: &'static str,
    default: u64,
) -> Result<u64, ApiError> {
    let Some(value) = params.get(key) else { return Ok(default) };
    let invalid = || ApiError::InvalidInteger { param: name, value: display_value(value) };
    match value {
        Value::Null => Ok(default),
        Value::Number(n) => n.as_u64().ok_or_else(invalid),
        Value::String(s) => s.parse::<u64>().map_err(|_| invalid()),
        _ => Err(invalid()),
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Raw text of a parameter value; `null` stays `None` so it can drive the
/// IS NULL special case downstream.
pub fn value_to_raw(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ColumnDescriptor;
    use serde_json::json;

    fn todos() -> ResourceDescriptor {
        let columns = ["id", "created", "updated", "user_id", "description", "file", "done"]
            .iter()
            .map(|&name| ColumnDescriptor {
                name: name.into(),
                native_type: "TEXT".into(),
                is_primary_key: name == "id",
            })
            .collect();
        ResourceDescriptor::new("todos".into(), columns)
    }

    fn params(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn defaults() {
        let q = CollectionQuery::from_params(&todos(), &Map::new()).unwrap();
        assert_eq!(q.fields.len(), 7);
        assert_eq!(q.sort, "id");
        assert_eq!(q.order, Order::Asc);
        assert_eq!(q.limit, 25);
        assert_eq!(q.offset, 0);
        assert!(q.filters.is_empty());
        assert!(q.search.is_none());
    }

    #[test]
    fn explicit_fields_are_validated() {
        let q = CollectionQuery::from_params(&todos(), &params(json!({"_fields": "id,description"})))
            .unwrap();
        assert_eq!(q.fields, vec!["id", "description"]);

        let err =
            CollectionQuery::from_params(&todos(), &params(json!({"_fields": "id,foobar"})))
                .unwrap_err();
        assert_eq!(err.to_string(), "Unknown _field foobar detected.");
    }

    #[test]
    fn unknown_sort_property() {
        let err = CollectionQuery::from_params(&todos(), &params(json!({"_sort": "foobar"})))
            .unwrap_err();
        assert_eq!(err.to_string(), "Cannot sort on unknown property: foobar");
    }

    #[test]
    fn null_sort_falls_back_to_default() {
        let q = CollectionQuery::from_params(&todos(), &params(json!({"_sort": null}))).unwrap();
        assert_eq!(q.sort, "id");
    }

    #[test]
    fn invalid_order_and_integers() {
        let err = CollectionQuery::from_params(&todos(), &params(json!({"_order": "BLAAT"})))
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid value for _order: BLAAT");

        let err = CollectionQuery::from_params(&todos(), &params(json!({"_limit": "BLAAT"})))
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid value for _limit: BLAAT");

        let err = CollectionQuery::from_params(&todos(), &params(json!({"_offset": -1})))
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid value for _offset: -1");
    }

    #[test]
    fn filters_split_on_double_underscore() {
        let q = CollectionQuery::from_params(
            &todos(),
            &params(json!({"done": 1, "created__year": 2014, "file__isnull": "x"})),
        )
        .unwrap();
        assert_eq!(q.filters.len(), 3);
        let by_col: Vec<_> = q.filters.iter().map(|f| (f.column.as_str(), f.lookup)).collect();
        assert!(by_col.contains(&("done", Lookup::Eq)));
        assert!(by_col.contains(&("created", Lookup::Year)));
        assert!(by_col.contains(&("file", Lookup::IsNull)));
    }

    #[test]
    fn unknown_filter_property_reports_full_key() {
        let err = CollectionQuery::from_params(&todos(), &params(json!({"foo": "bar"})))
            .unwrap_err();
        assert_eq!(err.to_string(), "Cannot filter on unknown property: foo");
    }

    #[test]
    fn unknown_lookup_type_reports_suffix() {
        let err =
            CollectionQuery::from_params(&todos(), &params(json!({"description__foo": "bar"})))
                .unwrap_err();
        assert_eq!(err.to_string(), "Lookup type `foo` does not exist.");
    }

    #[test]
    fn empty_search_is_ignored() {
        let q = CollectionQuery::from_params(&todos(), &params(json!({"_search": ""}))).unwrap();
        assert!(q.search.is_none());
    }
}
