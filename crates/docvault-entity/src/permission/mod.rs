//! Per-node capability overrides.

pub mod capability;
pub mod model;

pub use capability::{Capabilities, Capability};
pub use model::{Grantee, GranteeKind, NewOverride, PermissionOverride};
