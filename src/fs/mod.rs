//! The mounted-filesystem side of the bridge (`spec.md` §4.6, §4.7).

pub mod handlers;
pub mod overlay;
pub mod path;

pub use overlay::{DirEntryInfo, FilesystemOverlay, WriteFile};
pub use path::{normalize, validate_name, VirtualPath};
