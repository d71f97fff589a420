//! File content use cases.

pub mod download;
pub mod upload;

pub use download::{Download, DownloadService, PartialContent, ThumbnailView};
pub use upload::UploadService;
