//! Multipart/raw header and boundary parsing (`spec.md` §4.4). Small
//! dedicated parsers with explicit size limits, per Design Notes — not a
//! regex engine and not a general JSON parser.

use crate::error::Kind;

/// Multipart part-header accumulation buffer size (`spec.md` §4.4).
pub const HEADER_BUFFER_LIMIT: usize = 16 * 1024;
/// Boundary marker tail buffer size (`spec.md` §4.4).
pub const TAIL_BUFFER_LIMIT: usize = 128;

/// Extracts the boundary token from a `Content-Type` header value, e.g.
/// `multipart/form-data; boundary=BDY`.
pub fn extract_boundary(content_type: &str) -> Result<String, Kind> {
    if !content_type.starts_with("multipart/") {
        return Err(Kind::NoBoundary);
    }
    for part in content_type.split(';').skip(1) {
        let part = part.trim();
        if let Some(value) = part.strip_prefix("boundary=") {
            let value = value.trim_matches('"');
            if value.is_empty() {
                return Err(Kind::NoBoundary);
            }
            return Ok(value.to_string());
        }
    }
    Err(Kind::NoBoundary)
}

/// Extracts `filename="..."` from a part's `Content-Disposition` header
/// block, then sanitizes it down to a bare file name (no directory
/// components, matching the staging-file rules in `spec.md` §6).
pub fn extract_filename(header: &[u8]) -> Result<String, Kind> {
    let header = std::str::from_utf8(header).map_err(|_| Kind::BadMultipart)?;
    let marker = "filename=\"";
    let start = header.find(marker).ok_or(Kind::NoFilename)?;
    let rest = &header[start + marker.len()..];
    let end = rest.find('"').ok_or(Kind::BadMultipart)?;
    let raw = &rest[..end];
    sanitize_filename(raw).ok_or(Kind::NoFilename)
}

/// Strips any directory components and rejects empty/`.`/`..` names.
pub fn sanitize_filename(raw: &str) -> Option<String> {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or(raw).trim();
    if base.is_empty() || base == "." || base == ".." {
        return None;
    }
    if base.bytes().any(|b| b < 0x20) {
        return None;
    }
    Some(base.to_string())
}

/// Accumulates the bytes of one multipart part header until the blank-line
/// terminator (`\r\n\r\n` or `\n\n`) is seen, enforcing
/// [`HEADER_BUFFER_LIMIT`].
#[derive(Default)]
pub struct HeaderAccumulator {
    buf: Vec<u8>,
}

impl HeaderAccumulator {
    /// Feeds more bytes in. Returns `Some((header, rest))` once the blank
    /// line has been seen, where `rest` is the part of `data` that follows
    /// the header and must be fed to a [`BoundaryScanner`].
    pub fn push<'a>(&mut self, data: &'a [u8]) -> Result<Option<(Vec<u8>, &'a [u8])>, Kind> {
        // Search across the buffer/data boundary by scanning the
        // concatenation's tail region, bounded by the terminator length.
        let search_start = self.buf.len().saturating_sub(3);
        self.buf.extend_from_slice(data);
        if self.buf.len() > HEADER_BUFFER_LIMIT {
            return Err(Kind::HeaderTooLarge);
        }

        if let Some(pos) = find_subslice(&self.buf[search_start..], b"\r\n\r\n") {
            let end = search_start + pos + 4;
            let rest_in_data = end.saturating_sub(self.buf.len() - data.len());
            let header = self.buf[..end].to_vec();
            return Ok(Some((header, &data[rest_in_data.min(data.len())..])));
        }
        if let Some(pos) = find_subslice(&self.buf[search_start..], b"\n\n") {
            let end = search_start + pos + 2;
            let rest_in_data = end.saturating_sub(self.buf.len() - data.len());
            let header = self.buf[..end].to_vec();
            return Ok(Some((header, &data[rest_in_data.min(data.len())..])));
        }
        Ok(None)
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Streaming scanner for the `\r\n--<boundary>` delimiter that terminates a
/// part's body. Carries only the last `marker.len() - 1` bytes between
/// calls so a marker split across two `recv` chunks is still detected
/// (`spec.md` §4.4).
pub struct BoundaryScanner {
    marker: Vec<u8>,
    tail: Vec<u8>,
}

/// Outcome of feeding one chunk to a [`BoundaryScanner`].
pub struct ScanOutput {
    /// Bytes confirmed to be body content (safe to push to the ring).
    pub data: Vec<u8>,
    /// Whether the boundary marker was found in this chunk (scanning
    /// should stop; `data` already excludes the marker and everything
    /// after it).
    pub boundary_found: bool,
}

impl BoundaryScanner {
    pub fn new(boundary: &str) -> Result<Self, Kind> {
        let mut marker = Vec::with_capacity(boundary.len() + 4);
        marker.extend_from_slice(b"\r\n--");
        marker.extend_from_slice(boundary.as_bytes());
        if marker.len() > TAIL_BUFFER_LIMIT {
            return Err(Kind::BoundaryTooLong);
        }
        Ok(BoundaryScanner {
            marker,
            tail: Vec::new(),
        })
    }

    /// Feeds the next chunk of body bytes (already past the part header).
    pub fn feed(&mut self, chunk: &[u8]) -> ScanOutput {
        let mut combined = std::mem::take(&mut self.tail);
        combined.extend_from_slice(chunk);

        if let Some(pos) = find_subslice(&combined, &self.marker) {
            let data = combined[..pos].to_vec();
            return ScanOutput {
                data,
                boundary_found: true,
            };
        }

        let keep = self.marker.len().saturating_sub(1).min(combined.len());
        let safe_len = combined.len() - keep;
        let data = combined[..safe_len].to_vec();
        self.tail = combined[safe_len..].to_vec();
        ScanOutput {
            data,
            boundary_found: false,
        }
    }
}
