//! Short-lived single-entity read tokens.
//!
//! A bypass token binds one entity id and an expiry at most a minute away.
//! Presenting a valid token grants read access to that entity's content
//! without consulting the permission resolver. It is not a general
//! authentication mechanism.

pub mod claims;
pub mod service;

pub use claims::BypassClaims;
pub use service::{BypassToken, BypassTokenService};
