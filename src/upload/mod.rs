//! Upload ingestion: ring buffer, multipart/raw parsing, and the
//! producer/consumer pipeline that drives them (`spec.md` §4.4).

pub mod multipart;
pub mod pipeline;
pub mod ring;

pub use pipeline::{UploadOutcome, UploadRequest};
pub use ring::BoundedByteQueue;
