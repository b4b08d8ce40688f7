//! HTTP endpoint bodies for the mounted-filesystem API (`spec.md` §4.6).
//!
//! Every handler follows the same shape: gate on [`SdArbiter`], acquire
//! [`FsOpLock`] for mutating operations, normalize the path with
//! [`crate::fs::path`], perform the operation against the
//! [`FilesystemOverlay`], and map any `io::Error` to a tagged [`Kind`].

use crate::arbiter::SdArbiter;
use crate::error::Kind;
use crate::fs::overlay::{DirEntryInfo, FilesystemOverlay};
use crate::fs::path::{self, VirtualPath};
use crate::upload::pipeline::{self, BodyReader, UploadOutcome, UploadRequest};
use std::path::Path;

/// Endpoint bodies bound to one arbiter, overlay, and mount point.
pub struct FsHandlers<'a> {
    arbiter: &'a SdArbiter,
    overlay: &'a dyn FilesystemOverlay,
    mount: &'a Path,
}

impl<'a> FsHandlers<'a> {
    pub fn new(arbiter: &'a SdArbiter, overlay: &'a dyn FilesystemOverlay, mount: &'a Path) -> Self {
        FsHandlers {
            arbiter,
            overlay,
            mount,
        }
    }

    /// `GET /fs/list?path=...`
    pub fn list(&self, raw_path: &str) -> Result<Vec<DirEntryInfo>, Kind> {
        let vpath = path::normalize(raw_path)?;
        self.arbiter.with_app_fs(|| {
            self.overlay
                .list_dir(&vpath.to_real(self.mount))
                .map_err(|_| Kind::NotFound)
        })?
    }

    /// `POST /fs/mkdir` with `{"path": "...", "name": "..."}`.
    pub fn mkdir(&self, raw_path: &str, name: &str) -> Result<(), Kind> {
        if name.is_empty() {
            return Err(Kind::NameRequired);
        }
        let dir = path::normalize(raw_path)?;
        let target = dir.join_name(name)?;
        let _guard = self.arbiter.fs_op_lock().try_acquire()?;
        self.arbiter.with_app_fs(|| {
            self.overlay
                .mkdir(&target.to_real(self.mount))
                .map_err(|_| Kind::MkdirFail)
        })?
    }

    /// `POST /fs/delete` with `{"path": "..."}`. Files only — deleting a
    /// directory is refused with `IsDirectory` (Open Question: no recursive
    /// delete in this bridge).
    pub fn delete(&self, raw_path: &str) -> Result<(), Kind> {
        if raw_path.is_empty() {
            return Err(Kind::PathRequired);
        }
        let vpath = path::normalize(raw_path)?;
        if vpath.is_root() {
            return Err(Kind::IsDirectory);
        }
        let real = vpath.to_real(self.mount);
        let _guard = self.arbiter.fs_op_lock().try_acquire()?;
        self.arbiter.with_app_fs(|| {
            let info = self.overlay.stat(&real).map_err(|_| Kind::NotFound)?;
            if info.is_dir {
                return Err(Kind::IsDirectory);
            }
            self.overlay.unlink(&real).map_err(|_| Kind::DeleteFail)
        })?
    }

    /// `POST /fs/rename` with `{"path": "...", "new_name": "..."}`. Only
    /// renames within the same parent directory (Open Question: no
    /// cross-directory move via this endpoint).
    pub fn rename(&self, raw_path: &str, new_name: &str) -> Result<(), Kind> {
        if new_name.is_empty() {
            return Err(Kind::NewNameRequired);
        }
        let vpath = path::normalize(raw_path)?;
        if vpath.is_root() {
            return Err(Kind::IsDirectory);
        }
        let parent_str = vpath
            .as_str()
            .rsplit_once('/')
            .map(|(parent, _)| if parent.is_empty() { "/" } else { parent })
            .unwrap_or("/");
        let parent = path::normalize(parent_str)?;
        let target = parent.join_name(new_name)?;

        let _guard = self.arbiter.fs_op_lock().try_acquire()?;
        self.arbiter.with_app_fs(|| {
            let from_real = vpath.to_real(self.mount);
            let to_real = target.to_real(self.mount);
            if self.overlay.stat(&to_real).is_ok() {
                return Err(Kind::FileExists);
            }
            self.overlay
                .rename(&from_real, &to_real)
                .map_err(|_| Kind::RenameFail)
        })?
    }

    /// `GET /fs/download?path=...`
    pub fn download(&self, raw_path: &str) -> Result<Box<dyn std::io::Read + Send>, Kind> {
        let vpath = path::normalize(raw_path)?;
        self.arbiter.with_app_fs(|| {
            let real = vpath.to_real(self.mount);
            let info = self.overlay.stat(&real).map_err(|_| Kind::NotFound)?;
            if info.is_dir {
                return Err(Kind::IsDirectory);
            }
            self.overlay.open_read(&real).map_err(|_| Kind::OpenFail)
        })?
    }

    /// `POST /fs/upload` (multipart) and `POST /fs/upload_raw` (raw body),
    /// driven through [`pipeline::run_upload`].
    pub fn upload(
        &self,
        raw_dir: &str,
        request: UploadRequest<'_>,
        overwrite: bool,
        body: &mut dyn BodyReader,
    ) -> Result<UploadOutcome, Kind> {
        let dir: VirtualPath = path::normalize(raw_dir)?;
        let _guard = self.arbiter.fs_op_lock().try_acquire()?;
        self.arbiter
            .with_app_fs(|| pipeline::run_upload(self.overlay, self.mount, &dir, request, overwrite, body))?
    }
}
