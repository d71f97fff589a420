//! Storage backend implementations.

pub mod local;
pub mod s3;

pub use local::LocalBackend;
pub use s3::S3Backend;
