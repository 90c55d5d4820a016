//! Generic REST API over a relational database.
//!
//! The database schema is the API definition: every table and view becomes a
//! REST collection with filtering, sorting, pagination, full-text-ish search,
//! per-user row scoping, and content-addressed file columns. Supports SQLite
//! and PostgreSQL behind one dialect abstraction.

pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod lookup;
pub mod response;
pub mod routes;
pub mod service;
pub mod sql;
pub mod state;
pub mod storage;

pub use catalog::{ColumnDescriptor, ResourceDescriptor, SchemaCatalog};
pub use config::AppConfig;
pub use db::{Db, Dialect};
pub use error::ApiError;
pub use response::Envelope;
pub use routes::{app, common_routes, resource_routes};
pub use service::{CollectionQuery, ResourceService};
pub use state::AppState;
pub use storage::{ContentStore, StorageError};
