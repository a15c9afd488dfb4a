//! `academia-core` — shared building blocks for the access-control core.
//!
//! This crate contains **pure** primitives (no infrastructure concerns).

pub mod entity;
pub mod error;
pub mod id;

pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{GrantId, PermissionId, RoleId, SchoolId, UserId};
