//! Raster rendering for each thumbnail route.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;

use image::metadata::Orientation;
use image::{DynamicImage, ImageDecoder, ImageFormat, ImageReader};
use tokio::process::Command;
use tracing::debug;

use docvault_core::config::thumbnail::ThumbnailConfig;
use docvault_core::error::{AppError, ErrorKind};
use docvault_core::result::AppResult;

/// Decode, apply EXIF orientation, fit within `max_dimension` square and
/// encode as WebP. CPU bound; call from a blocking thread.
pub fn encode_thumbnail(data: &[u8], max_dimension: u32) -> AppResult<Vec<u8>> {
    let reader = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| AppError::with_source(ErrorKind::Validation, "Unreadable image data", e))?;
    let mut decoder = reader
        .into_decoder()
        .map_err(|e| AppError::with_source(ErrorKind::Validation, "Unsupported image format", e))?;
    let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);
    let mut image = DynamicImage::from_decoder(decoder)
        .map_err(|e| AppError::with_source(ErrorKind::Validation, "Failed to decode image", e))?;
    image.apply_orientation(orientation);

    if image.width() > max_dimension || image.height() > max_dimension {
        image = image.thumbnail(max_dimension, max_dimension);
    }

    let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
    let mut out = Vec::new();
    rgb.write_to(&mut Cursor::new(&mut out), ImageFormat::WebP)
        .map_err(|e| AppError::with_source(ErrorKind::Internal, "Failed to encode thumbnail", e))?;
    Ok(out)
}

/// [`encode_thumbnail`] on the blocking pool.
pub async fn image_thumbnail(data: Vec<u8>, max_dimension: u32) -> AppResult<Vec<u8>> {
    tokio::task::spawn_blocking(move || encode_thumbnail(&data, max_dimension))
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Internal, "Thumbnail task panicked", e))?
}

/// Extract the frame at the temporal midpoint of a video into `dest` (PNG).
pub async fn video_midpoint_frame(
    config: &ThumbnailConfig,
    source: &Path,
    dest: &Path,
) -> AppResult<()> {
    let timeout = Duration::from_secs(config.render_timeout_seconds);

    let mut probe = Command::new(&config.ffprobe_path);
    probe
        .args(["-v", "error", "-show_entries", "format=duration"])
        .args(["-of", "default=noprint_wrappers=1:nokey=1"])
        .arg(source);
    let output = run_tool(probe, timeout, "ffprobe").await?;
    let duration = String::from_utf8_lossy(&output.stdout)
        .trim()
        .parse::<f64>()
        .unwrap_or(0.0);
    let midpoint = if duration.is_finite() && duration > 0.0 {
        duration / 2.0
    } else {
        0.0
    };

    let mut extract = Command::new(&config.ffmpeg_path);
    extract
        .args(["-v", "error", "-y", "-ss"])
        .arg(format!("{midpoint:.3}"))
        .arg("-i")
        .arg(source)
        .args(["-frames:v", "1"])
        .arg(dest);
    run_tool(extract, timeout, "ffmpeg").await?;

    debug!(source = %source.display(), midpoint, "Extracted video frame");
    Ok(())
}

/// Render the first page of an office document or PDF to PNG inside
/// `out_dir` and return the produced file.
pub async fn document_preview(
    config: &ThumbnailConfig,
    source: &Path,
    out_dir: &Path,
) -> AppResult<PathBuf> {
    let mut render = Command::new(&config.office_renderer_path);
    render
        .args(["--headless", "--convert-to", "png", "--outdir"])
        .arg(out_dir)
        .arg(source);
    run_tool(
        render,
        Duration::from_secs(config.render_timeout_seconds),
        "document renderer",
    )
    .await?;

    let stem = source
        .file_stem()
        .ok_or_else(|| AppError::internal("Document source has no file name"))?;
    let produced = out_dir.join(format!("{}.png", stem.to_string_lossy()));
    if !tokio::fs::try_exists(&produced).await.unwrap_or(false) {
        return Err(AppError::internal(format!(
            "Document renderer produced no output for '{}'",
            source.display()
        )));
    }
    Ok(produced)
}

async fn run_tool(mut command: Command, timeout: Duration, tool: &str) -> AppResult<Output> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = tokio::time::timeout(timeout, command.output())
        .await
        .map_err(|_| {
            AppError::internal(format!("{tool} timed out after {}s", timeout.as_secs()))
        })?
        .map_err(|e| AppError::with_source(ErrorKind::Internal, format!("Failed to run {tool}"), e))?;

    if !output.status.success() {
        return Err(AppError::internal(format!(
            "{tool} exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(output)
}
