//! Thumbnail derivation configuration.

use serde::{Deserialize, Serialize};

/// Thumbnail pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThumbnailConfig {
    /// Whether uploads schedule thumbnail generation at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Bounding box edge in pixels. Aspect ratio is preserved.
    #[serde(default = "default_max_dimension")]
    pub max_dimension: u32,
    /// Scratch directory for intermediate renders.
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: String,
    /// `ffmpeg` executable used to grab the midpoint frame of a video.
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg_path: String,
    /// `ffprobe` executable used to read a video's duration.
    #[serde(default = "default_ffprobe")]
    pub ffprobe_path: String,
    /// Headless office renderer (LibreOffice `soffice`).
    #[serde(default = "default_office_renderer")]
    pub office_renderer_path: String,
    /// Upper bound for one external render.
    #[serde(default = "default_render_timeout")]
    pub render_timeout_seconds: u64,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_dimension: default_max_dimension(),
            scratch_dir: default_scratch_dir(),
            ffmpeg_path: default_ffmpeg(),
            ffprobe_path: default_ffprobe(),
            office_renderer_path: default_office_renderer(),
            render_timeout_seconds: default_render_timeout(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_dimension() -> u32 {
    512
}

fn default_scratch_dir() -> String {
    "./data/thumbnails".to_string()
}

fn default_ffmpeg() -> String {
    "ffmpeg".to_string()
}

fn default_ffprobe() -> String {
    "ffprobe".to_string()
}

fn default_office_renderer() -> String {
    "soffice".to_string()
}

fn default_render_timeout() -> u64 {
    120
}
