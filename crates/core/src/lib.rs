//! `warehub-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod aggregate;
pub mod code;
pub mod error;
pub mod id;

pub use aggregate::{AggregateRoot, ExpectedVersion};
pub use code::BusinessCode;
pub use error::{DomainError, DomainResult};
pub use id::{EntityId, TenantId, UserId};

#[doc(hidden)]
pub use uuid;
