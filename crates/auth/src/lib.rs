//! `warehub-auth`: authentication/authorization boundary.
//!
//! Decoupled from HTTP and storage: token validation, roles, and the
//! role → permission policy.

pub mod authorize;
pub mod claims;
pub mod jwt;
pub mod policy;
pub mod roles;

pub use authorize::{authorize, AuthzError, Principal, TenantMembership};
pub use claims::{validate_claims, JwtClaims, TokenValidationError};
pub use jwt::{Hs256JwtValidator, JwtError, JwtValidator};
pub use policy::permissions_for_roles;
pub use roles::{Permission, Role};
