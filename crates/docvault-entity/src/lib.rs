//! # docvault-entity
//!
//! Domain models for DocVault. Every struct in this crate represents a
//! database row or a domain value object. Persisted rows additionally
//! derive `sqlx::FromRow`.

pub mod entity;
pub mod permission;
pub mod principal;
pub mod upload;
