//! # docvault-core
//!
//! Core crate for DocVault. Contains the unified error system, configuration
//! schemas, typed identifiers, and the seams implemented by the other crates:
//! storage backends and the deferred task queue.
//!
//! This crate has **no** internal dependencies on other DocVault crates.

pub mod config;
pub mod error;
pub mod result;
pub mod traits;
pub mod types;

pub use error::{AppError, ErrorKind};
pub use result::AppResult;
