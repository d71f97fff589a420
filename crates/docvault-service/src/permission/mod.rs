//! Sharing: capability overrides and bypass tokens.

pub mod service;

pub use service::{GrantRequest, PermissionService};
