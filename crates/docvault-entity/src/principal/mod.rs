//! Principals as established by the authentication layer.

pub mod model;

pub use model::{Membership, Principal, TenantRole};
