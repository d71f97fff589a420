//! `Range: bytes=<start>-[<end>]` handling.
//!
//! The end is inclusive. A missing end means "to the end of the content";
//! an end past the content is clamped to its last byte. Whatever the request,
//! a single response never carries more than the configured maximum.

use docvault_core::error::AppError;
use docvault_core::result::AppResult;

/// A parsed, not yet resolved, byte range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: Option<u64>,
}

impl ByteRange {
    /// Parse a `Range` header value.
    pub fn parse(header: &str) -> AppResult<Self> {
        let spec = header
            .trim()
            .strip_prefix("bytes=")
            .ok_or_else(|| AppError::invalid_range(format!("Unsupported range unit: '{header}'")))?;
        if spec.contains(',') {
            return Err(AppError::invalid_range("Multiple ranges are not supported"));
        }
        let (start, end) = spec
            .split_once('-')
            .ok_or_else(|| AppError::invalid_range(format!("Malformed range: '{header}'")))?;

        let start = start
            .trim()
            .parse::<u64>()
            .map_err(|_| AppError::invalid_range(format!("Malformed range start: '{header}'")))?;
        let end = match end.trim() {
            "" => None,
            end => Some(end.parse::<u64>().map_err(|_| {
                AppError::invalid_range(format!("Malformed range end: '{header}'"))
            })?),
        };

        if end.is_some_and(|end| end < start) {
            return Err(AppError::invalid_range(format!(
                "Range end precedes start: '{header}'"
            )));
        }
        Ok(Self { start, end })
    }

    /// Resolve against content of `total` bytes, capping the length at
    /// `max_len`.
    pub fn resolve(&self, total: u64, max_len: u64) -> AppResult<ResolvedRange> {
        if self.start >= total {
            return Err(AppError::invalid_range(format!(
                "Range start {} is beyond content size {total}",
                self.start
            )));
        }
        let last = total - 1;
        let requested_end = self.end.map_or(last, |end| end.min(last));
        let capped_end = self.start + max_len.max(1) - 1;
        Ok(ResolvedRange {
            start: self.start,
            end: requested_end.min(capped_end),
            total,
        })
    }
}

/// A satisfiable range within content of a known size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct ResolvedRange {
    pub start: u64,
    /// Inclusive.
    pub end: u64,
    pub total: u64,
}

impl ResolvedRange {
    /// Number of bytes covered.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Always false; a resolved range covers at least one byte.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// `Content-Range` header value.
    pub fn content_range(&self) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, self.total)
    }
}
