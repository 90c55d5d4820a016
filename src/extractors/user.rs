//! Extract the authenticated user from the request (X-Auth-User header).

use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::request::Parts,
};

/// Header carrying the authenticated user id, set by the auth proxy in
/// front of this service. Absent means an anonymous request.
pub const AUTH_USER_HEADER: &str = "X-Auth-User";

/// Extractor for the optional authenticated user.
#[derive(Clone, Debug)]
pub struct AuthUser(pub Option<String>);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(AUTH_USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        Ok(AuthUser(value))
    }
}
