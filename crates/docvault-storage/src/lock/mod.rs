//! Cross-process advisory locking keyed by storage path.

pub mod advisory;

pub use advisory::{AdvisoryLock, LockGuard, LockMode};
