//! Hierarchical access resolution.

pub mod aggregator;
pub mod path;
pub mod resolver;

pub use aggregator::PermissionAggregator;
pub use path::{AncestorWalk, ChainLink, PathResolver};
pub use resolver::{AccessResolver, Breadcrumb};
