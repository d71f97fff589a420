//! # docvault-database
//!
//! PostgreSQL connection and migrations, the repository traits the rest of the
//! workspace programs against, their PostgreSQL implementations, and an
//! in-memory store implementing the same traits.

pub mod connection;
pub mod memory;
pub mod repositories;

pub use connection::DatabasePool;
pub use memory::MemoryStore;
pub use repositories::{EntityRepository, OverrideRepository};
