//! Parameterized SQL assembly. Values are always bound parameters; only
//! identifiers validated against the schema catalog are interpolated.

pub mod builder;

pub use builder::{delete, insert, select_collection, select_one, update};

use crate::db::Dialect;
use serde_json::Value;

/// Quote an identifier for either dialect (double quotes work on both
/// SQLite and PostgreSQL). Safe: identifiers come from the schema catalog.
pub fn quote_ident(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// A SQL statement under construction: text plus positional parameters,
/// with placeholder syntax chosen by the dialect.
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
    dialect: Dialect,
}

impl QueryBuf {
    pub fn new(dialect: Dialect) -> Self {
        QueryBuf { sql: String::new(), params: Vec::new(), dialect }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Bind a value and return its placeholder text.
    pub fn push_param(&mut self, v: Value) -> String {
        self.params.push(v);
        self.dialect.placeholder(self.params.len())
    }
}
