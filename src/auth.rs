//! Request identity
//!
//! Sessions are issued by the upstream auth gateway, which forwards the
//! caller's id in `x-user-id`. Admin routes compare the `token` header with
//! the configured admin token.

use axum::extract::{FromRef, FromRequestParts};
use axum::http::request::Parts;
use secrecy::{ExposeSecret, SecretString};

use crate::error::StoreError;

pub const USER_HEADER: &str = "x-user-id";
pub const ADMIN_HEADER: &str = "token";

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts.headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim).filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser(pub String);

impl AuthUser {
    pub fn id(&self) -> &str {
        &self.0
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = StoreError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        header(parts, USER_HEADER)
            .map(|id| AuthUser(id.to_string()))
            .ok_or_else(|| StoreError::Unauthorized("Unauthorized".into()))
    }
}

/// Caller id when present; for handlers that report a missing user themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaybeUser(pub Option<String>);

#[axum::async_trait]
impl<S> FromRequestParts<S> for MaybeUser
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(header(parts, USER_HEADER).map(str::to_string)))
    }
}

/// Configured admin token; `None` locks every admin route.
#[derive(Clone)]
pub struct AdminToken(pub Option<SecretString>);

impl AdminToken {
    fn accepts(&self, presented: &str) -> bool {
        let Some(expected) = &self.0 else { return false };
        let expected = expected.expose_secret().as_bytes();
        let presented = presented.as_bytes();
        expected.len() == presented.len() && expected.iter().zip(presented).fold(0u8, |acc, (a, b)| acc | (a ^ b)) == 0
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AdminAccess;

#[axum::async_trait]
impl<S> FromRequestParts<S> for AdminAccess
where
    AdminToken: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = StoreError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = AdminToken::from_ref(state);
        match header(parts, ADMIN_HEADER) {
            Some(presented) if token.accepts(presented) => Ok(AdminAccess),
            _ => Err(StoreError::Unauthorized("Not Authorized Login Again".into())),
        }
    }
}
