//! Typed errors and HTTP mapping.

use crate::response::Envelope;
use crate::storage::StorageError;
use axum::http::StatusCode;
use thiserror::Error;

/// Everything that can go wrong while serving a resource operation.
///
/// Every variant carries the exact user-visible message; the service layer
/// converts errors into `{statusCode, body: {message}}` envelopes and never
/// lets them escape to the HTTP layer as panics or raw database errors.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Resource {0} does not exist")]
    UnknownResource(String),
    #[error("Unknown _field {0} detected.")]
    UnknownField(String),
    #[error("Cannot sort on unknown property: {0}")]
    UnknownSortProperty(String),
    #[error("Cannot filter on unknown property: {0}")]
    UnknownFilterProperty(String),
    #[error("Lookup type `{0}` does not exist.")]
    UnknownLookupType(String),
    #[error("Invalid value for _order: {0}")]
    InvalidOrder(String),
    #[error("Invalid value for _{param}: {value}")]
    InvalidInteger { param: &'static str, value: String },
    #[error("This operation is not supported on this resource")]
    UnsupportedOperation,
    #[error("Resource {0} uses a composite primary key which is not supported")]
    CompositePrimaryKey(String),
    #[error("Not allowed to POST a primary key")]
    PrimaryKeyNotAllowed,
    #[error("Not allowed to POST a user_id")]
    UserIdNotAllowed,
    #[error("Not allowed to change the primary key of this resource")]
    PrimaryKeyChangeNotAllowed,
    #[error("Not allowed to change the user of this resource")]
    UserIdChangeNotAllowed,
    #[error("Unrecognized fields detected: {0}")]
    UnrecognizedFields(String),
    #[error("Missing fields: {0}")]
    MissingFields(String),
    #[error("Empty request not allowed")]
    EmptyRequest,
    #[error("Required parameters missing.")]
    RequiredParametersMissing,
    #[error("Resource not found")]
    NotFound,
    #[error("{column} {hash} does not exist")]
    UnknownBlob { column: String, hash: String },
    #[error("Unsupported platform {0}")]
    UnsupportedPlatform(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// Unexpected database failure. The message is deliberately generic; the
    /// underlying error is logged, never serialized.
    #[error("Internal server error")]
    Db(#[from] sqlx::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Db(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Storage(StorageError::Io(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    /// Convert into the uniform response envelope. Server-side failures are
    /// logged here so callers can stay on the happy path.
    pub fn into_envelope(self) -> Envelope {
        if self.status() == StatusCode::INTERNAL_SERVER_ERROR {
            match &self {
                ApiError::Db(e) => tracing::error!(error = %e, "database failure"),
                ApiError::Storage(e) => tracing::error!(error = %e, "storage failure"),
                _ => {}
            }
        }
        Envelope::message(self.status(), self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_match_api_contract() {
        assert_eq!(
            ApiError::UnknownResource("todos".into()).to_string(),
            "Resource todos does not exist"
        );
        assert_eq!(
            ApiError::UnknownLookupType("foo".into()).to_string(),
            "Lookup type `foo` does not exist."
        );
        assert_eq!(
            ApiError::InvalidInteger { param: "limit", value: "BLAAT".into() }.to_string(),
            "Invalid value for _limit: BLAAT"
        );
        assert_eq!(
            ApiError::UnknownBlob { column: "file".into(), hash: "abc".into() }.to_string(),
            "file abc does not exist"
        );
    }

    #[test]
    fn status_codes() {
        assert_eq!(ApiError::NotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::EmptyRequest.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::Db(sqlx::Error::RowNotFound).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
