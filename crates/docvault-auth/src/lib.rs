//! # docvault-auth
//!
//! Access decisions over the entity tree.
//!
//! ## Modules
//!
//! - `acl`: ancestor walk, capability aggregation and effective access
//! - `token`: short-lived single-entity read tokens

pub mod acl;
pub mod token;

pub use acl::{AccessResolver, Breadcrumb, ChainLink, PathResolver, PermissionAggregator};
pub use token::{BypassClaims, BypassToken, BypassTokenService};
