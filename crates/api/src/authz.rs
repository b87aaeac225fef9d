//! Resolution of the request's [`Principal`] from validated token claims.
//!
//! Handlers take [`CurrentPrincipal`] and pass it to the services, which do
//! every permission and warehouse-scope check.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use warehub_auth::{JwtClaims, Principal};

use crate::app::errors::ApiError;

/// Build a principal for the token's tenant using the static role policy.
pub fn resolve_principal(claims: JwtClaims) -> Principal {
    Principal::from_roles(claims.sub, claims.tenant_id, claims.roles)
}

/// The caller, as placed in request extensions by the auth middleware.
#[derive(Debug, Clone)]
pub struct CurrentPrincipal(pub Principal);

#[axum::async_trait]
impl<S> FromRequestParts<S> for CurrentPrincipal
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .map(CurrentPrincipal)
            .ok_or(ApiError::Unauthorized)
    }
}
