//! `PathGuard`: normalizes user paths, rejects `..`, enforces a virtual
//! root, and composes filesystem-absolute paths against a fixed mount point
//! (`spec.md` §4.7).

use crate::error::Kind;
use std::path::{Path, PathBuf};

/// Hard limit on the normalized path length, in bytes (`spec.md` §4.7).
pub const MAX_PATH_LEN: usize = 256;
/// Hard limit on a single path segment's length, in bytes (`spec.md` §4.7).
pub const MAX_NAME_LEN: usize = 96;

/// A normalized, absolute, virtual-root-relative path. Never contains `..`.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct VirtualPath(String);

impl VirtualPath {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// The final path segment, or `None` for the root.
    pub fn file_name(&self) -> Option<&str> {
        if self.is_root() {
            return None;
        }
        self.0.rsplit('/').next()
    }

    /// Composes the filesystem-absolute path by concatenating the mount
    /// point with this virtual path (`spec.md` §4.7 rule 7).
    pub fn to_real(&self, mount: &Path) -> PathBuf {
        if self.is_root() {
            return mount.to_path_buf();
        }
        mount.join(self.0.trim_start_matches('/'))
    }

    /// Builds a virtual path for a child name under this directory.
    pub fn join_name(&self, name: &str) -> Result<VirtualPath, Kind> {
        validate_name(name)?;
        let joined = if self.is_root() {
            format!("/{name}")
        } else {
            format!("{}/{name}", self.0)
        };
        if joined.len() > MAX_PATH_LEN {
            return Err(Kind::PathTooLong);
        }
        Ok(VirtualPath(joined))
    }
}

/// Rejects `.`/`..` literal names and segment-illegal bytes for names used
/// in `mkdir`/`rename` (`spec.md` §4.7 rule 6).
pub fn validate_name(name: &str) -> Result<(), Kind> {
    if name.is_empty() || name == "." || name == ".." {
        return Err(Kind::BadName);
    }
    if name.len() > MAX_NAME_LEN {
        return Err(Kind::BadName);
    }
    if name.bytes().any(|b| b < 0x20 || b == b'/' || b == b'\\') {
        return Err(Kind::BadName);
    }
    Ok(())
}

/// Normalizes a raw, user-supplied path per the deterministic rules in
/// `spec.md` §4.7.
pub fn normalize(input: &str) -> Result<VirtualPath, Kind> {
    if input.is_empty() || input == "/" {
        return Ok(VirtualPath("/".to_string()));
    }

    let mut segments: Vec<&str> = Vec::new();
    for raw_segment in input.split('/') {
        if raw_segment.is_empty() || raw_segment == "." {
            continue;
        }
        if raw_segment == ".." {
            return Err(Kind::BadPath);
        }
        if raw_segment.bytes().any(|b| b < 0x20 || b == b'\\') {
            return Err(Kind::BadPath);
        }
        if raw_segment.len() > MAX_NAME_LEN {
            return Err(Kind::BadPath);
        }
        segments.push(raw_segment);
    }

    let normalized = if segments.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", segments.join("/"))
    };

    if normalized.len() > MAX_PATH_LEN {
        return Err(Kind::PathTooLong);
    }

    Ok(VirtualPath(normalized))
}
