//! Tagged error kinds shared by every component.
//!
//! The wire format for HTTP error bodies is `{"error":"<TOKEN>"}`, where
//! `<TOKEN>` is one of the literal strings below. Components never hand a
//! free-form string across a boundary; they hand a [`Kind`].

use thiserror::Error;

/// A single tagged failure cause, matching the tokens in the spec's error
/// table verbatim.
#[derive(Error, Debug, Copy, Clone, Eq, PartialEq)]
pub enum Kind {
    #[error("mode is UsbExposed")]
    Busy,
    #[error("a mutating filesystem operation is already in progress")]
    FileopInProgress,
    #[error("mode is not AppMounted")]
    NotMounted,
    #[error("path failed normalization")]
    BadPath,
    #[error("name violates naming rules")]
    BadName,
    #[error("path exceeds the length limit")]
    PathTooLong,
    #[error("the `name` field is required")]
    NameRequired,
    #[error("the `path` field is required")]
    PathRequired,
    #[error("the `new_name` field is required")]
    NewNameRequired,
    #[error("request body was empty")]
    NoBody,
    #[error("no `name` query parameter")]
    NoName,
    #[error("no `filename=` in multipart headers")]
    NoFilename,
    #[error("no Content-Type header")]
    NoContentType,
    #[error("no boundary in Content-Type")]
    NoBoundary,
    #[error("boundary exceeds the tail buffer")]
    BoundaryTooLong,
    #[error("multipart header exceeds the header buffer")]
    HeaderTooLarge,
    #[error("malformed multipart body")]
    BadMultipart,
    #[error("malformed request body")]
    BadBody,
    #[error("target does not exist")]
    NotFound,
    #[error("target already exists")]
    FileExists,
    #[error("target is a directory")]
    IsDirectory,
    #[error("could not open target")]
    OpenFail,
    #[error("could not delete target")]
    DeleteFail,
    #[error("could not rename target")]
    RenameFail,
    #[error("could not create directory")]
    MkdirFail,
    #[error("could not write target")]
    WriteFail,
    #[error("could not receive request body")]
    RecvFail,
    #[error("could not resolve path")]
    PathFail,
    #[error("allocation failed")]
    NoMem,
    #[error("could not detach USB")]
    DetachFail,
    #[error("could not attach USB")]
    AttachFail,
}

impl Kind {
    /// The exact JSON token for this kind, per the spec's error table.
    pub fn token(self) -> &'static str {
        match self {
            Kind::Busy => "BUSY",
            Kind::FileopInProgress => "FILEOP_IN_PROGRESS",
            Kind::NotMounted => "NOT_MOUNTED",
            Kind::BadPath => "BAD_PATH",
            Kind::BadName => "BAD_NAME",
            Kind::PathTooLong => "PATH_TOO_LONG",
            Kind::NameRequired => "NAME_REQUIRED",
            Kind::PathRequired => "PATH_REQUIRED",
            Kind::NewNameRequired => "NEW_NAME_REQUIRED",
            Kind::NoBody => "NO_BODY",
            Kind::NoName => "NO_NAME",
            Kind::NoFilename => "NO_FILENAME",
            Kind::NoContentType => "NO_CONTENT_TYPE",
            Kind::NoBoundary => "NO_BOUNDARY",
            Kind::BoundaryTooLong => "BOUNDARY_TOO_LONG",
            Kind::HeaderTooLarge => "HEADER_TOO_LARGE",
            Kind::BadMultipart => "BAD_MULTIPART",
            Kind::BadBody => "BAD_BODY",
            Kind::NotFound => "NOT_FOUND",
            Kind::FileExists => "FILE_EXISTS",
            Kind::IsDirectory => "IS_DIRECTORY",
            Kind::OpenFail => "OPEN_FAIL",
            Kind::DeleteFail => "DELETE_FAIL",
            Kind::RenameFail => "RENAME_FAIL",
            Kind::MkdirFail => "MKDIR_FAIL",
            Kind::WriteFail => "WRITE_FAIL",
            Kind::RecvFail => "RECV_FAIL",
            Kind::PathFail => "PATH_FAIL",
            Kind::NoMem => "NO_MEM",
            Kind::DetachFail => "DETACH_FAIL",
            Kind::AttachFail => "ATTACH_FAIL",
        }
    }

    /// HTTP status code this kind is surfaced as.
    pub fn status(self) -> u16 {
        match self {
            Kind::Busy | Kind::FileopInProgress => 423,
            Kind::NotMounted | Kind::FileExists | Kind::IsDirectory => 409,
            Kind::NotFound => 404,
            Kind::OpenFail
            | Kind::DeleteFail
            | Kind::RenameFail
            | Kind::MkdirFail
            | Kind::WriteFail
            | Kind::RecvFail
            | Kind::PathFail
            | Kind::NoMem
            | Kind::DetachFail
            | Kind::AttachFail => 500,
            _ => 400,
        }
    }

    /// Renders the `{"error":"<TOKEN>"}` body this kind is surfaced as.
    pub fn to_json(self) -> serde_json::Value {
        serde_json::json!({ "error": self.token() })
    }
}

pub type Result<T> = core::result::Result<T, Kind>;
