//! Tree mutations and folder size bookkeeping.

pub mod naming;
pub mod service;
pub mod size;

pub use service::EntityService;
pub use size::FolderSizeService;
