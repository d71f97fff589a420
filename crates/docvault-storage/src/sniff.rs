//! MIME detection for uploads that arrive without a declared type.

use std::path::Path;

use tokio::io::AsyncReadExt;

use docvault_core::result::AppResult;

/// Bytes inspected for magic numbers.
pub const SNIFF_LEN: usize = 2048;

const OCTET_STREAM: &str = "application/octet-stream";

/// Sniff the artifact at `path`, falling back to the extension of `title`.
pub async fn sniff_file(path: &Path, title: &str) -> AppResult<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut head = vec![0u8; SNIFF_LEN];
    let mut filled = 0;
    while filled < SNIFF_LEN {
        let n = file.read(&mut head[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    head.truncate(filled);
    Ok(sniff(&head, title))
}

/// Magic numbers first, then the title's extension, then a text heuristic.
/// Zip-based containers (docx, xlsx, epub) carry no distinguishing magic, so
/// they are left to the extension.
pub fn sniff(head: &[u8], title: &str) -> String {
    if let Some(mime) = from_magic(head) {
        return mime.to_string();
    }
    if let Some(mime) = mime_guess::from_path(Path::new(title)).first_raw() {
        return mime.to_string();
    }
    if head.starts_with(b"PK\x03\x04") {
        return "application/zip".to_string();
    }
    if !head.is_empty() && looks_like_text(head) {
        return "text/plain".to_string();
    }
    OCTET_STREAM.to_string()
}

fn from_magic(head: &[u8]) -> Option<&'static str> {
    let riff_kind = |tag: &[u8]| head.len() >= 12 && &head[0..4] == b"RIFF" && &head[8..12] == tag;
    let mime = if head.starts_with(b"\x89PNG\r\n\x1a\n") {
        "image/png"
    } else if head.starts_with(&[0xFF, 0xD8, 0xFF]) {
        "image/jpeg"
    } else if head.starts_with(b"GIF87a") || head.starts_with(b"GIF89a") {
        "image/gif"
    } else if riff_kind(b"WEBP") {
        "image/webp"
    } else if head.starts_with(b"BM") && head.len() >= 14 {
        "image/bmp"
    } else if head.starts_with(b"II*\0") || head.starts_with(b"MM\0*") {
        "image/tiff"
    } else if head.starts_with(b"%PDF-") {
        "application/pdf"
    } else if head.len() >= 12 && &head[4..8] == b"ftyp" {
        if &head[8..12] == b"qt  " {
            "video/quicktime"
        } else {
            "video/mp4"
        }
    } else if head.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]) {
        "video/webm"
    } else if riff_kind(b"AVI ") {
        "video/x-msvideo"
    } else if riff_kind(b"WAVE") {
        "audio/wav"
    } else if head.starts_with(b"ID3") || head.starts_with(&[0xFF, 0xFB]) {
        "audio/mpeg"
    } else if head.starts_with(b"OggS") {
        "audio/ogg"
    } else if head.starts_with(b"fLaC") {
        "audio/flac"
    } else if head.starts_with(&[0x1F, 0x8B]) {
        "application/gzip"
    } else if head.starts_with(b"7z\xBC\xAF\x27\x1C") {
        "application/x-7z-compressed"
    } else if head.starts_with(b"Rar!\x1A\x07") {
        "application/vnd.rar"
    } else {
        return None;
    };
    Some(mime)
}

fn looks_like_text(head: &[u8]) -> bool {
    if head.contains(&0) {
        return false;
    }
    match std::str::from_utf8(head) {
        Ok(_) => true,
        // A multi-byte sequence cut at the sniff boundary is still text.
        Err(e) => e.error_len().is_none(),
    }
}
