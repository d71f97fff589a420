//! Entity tree nodes.

pub mod kind;
pub mod mime;
pub mod model;

pub use kind::{EntityKind, Lifecycle};
pub use mime::{FileClass, classify};
pub use model::{Entity, NewEntity};
