//! Producer/consumer orchestration for one upload request (`spec.md` §4.4).
//!
//! The calling (HTTP handler) thread is the producer: it pulls chunks from
//! the request body, runs them through the multipart/raw parser, and pushes
//! confirmed body bytes into a [`BoundedByteQueue`]. A dedicated writer
//! thread is the consumer: it pops from the ring and writes large buffered
//! chunks to the staged `.part` file, matching the "writer task spawned per
//! upload" shape in Design Notes. Whichever side hits an error first wins;
//! the other side is unblocked via the ring's close/abort signal rather than
//! left to block forever.

use crate::error::Kind;
use crate::fs::overlay::FilesystemOverlay;
use crate::fs::path::{validate_name, VirtualPath};
use crate::upload::multipart::{extract_boundary, extract_filename, BoundaryScanner, HeaderAccumulator};
use crate::upload::ring::BoundedByteQueue;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const RECV_CHUNK: usize = 16 * 1024;
const POP_CHUNK: usize = 64 * 1024;
const POP_TIMEOUT: Duration = Duration::from_millis(250);
const STAGING_SUFFIX: &str = ".part";

/// The source of upload bytes: an HTTP request body (`spec.md` §6).
pub trait BodyReader {
    /// Reads the next chunk into `buf`. Returns `Ok(0)` on end of body.
    fn recv_chunk(&mut self, buf: &mut [u8]) -> std::io::Result<usize>;
}

/// Which wire format the request body is encoded in.
pub enum UploadRequest<'a> {
    /// `POST /fs/upload_raw?name=...`: the whole body is the file content.
    Raw { filename: &'a str },
    /// `POST /fs/upload`: one `multipart/form-data` file part.
    Multipart { content_type: &'a str },
}

/// What a successful upload produced.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct UploadOutcome {
    pub filename: String,
    pub bytes_written: u64,
}

/// Runs one upload end to end: stages into `<name>.part`, then renames into
/// place on success or unlinks on any failure (`spec.md` §4.4, §6).
pub fn run_upload(
    overlay: &dyn FilesystemOverlay,
    mount: &Path,
    dir: &VirtualPath,
    request: UploadRequest<'_>,
    overwrite: bool,
    body: &mut dyn BodyReader,
) -> Result<UploadOutcome, Kind> {
    let mut recv_buf = [0u8; RECV_CHUNK];

    let (filename, leftover, mut scanner) = match request {
        UploadRequest::Raw { filename } => {
            validate_name(filename).map_err(|_| Kind::NoFilename)?;
            (filename.to_string(), Vec::new(), None)
        }
        UploadRequest::Multipart { content_type } => {
            let boundary = extract_boundary(content_type)?;
            let (header, leftover) = read_part_header(body, &mut recv_buf)?;
            let filename = extract_filename(&header)?;
            let scanner = BoundaryScanner::new(&boundary)?;
            (filename, leftover, Some(scanner))
        }
    };

    let target = dir.join_name(&filename)?;
    let target_real = target.to_real(mount);

    if let Ok(info) = overlay.stat(&target_real) {
        if info.is_dir {
            return Err(Kind::IsDirectory);
        }
        if !overwrite {
            return Err(Kind::FileExists);
        }
        overlay.unlink(&target_real).map_err(|_| Kind::DeleteFail)?;
    }

    let staging_name = format!("{filename}{STAGING_SUFFIX}");
    let staging_real = dir.join_name(&staging_name)?.to_real(mount);

    let ring = BoundedByteQueue::try_new_sized().ok_or(Kind::NoMem)?;
    let ring = Arc::new(ring);
    let aborted = Arc::new(AtomicBool::new(false));
    let consumer_error: Arc<Mutex<Option<Kind>>> = Arc::new(Mutex::new(None));

    let mut writer = overlay.open_write(&staging_real).map_err(|_| Kind::OpenFail)?;
    let consumer_ring = ring.clone();
    let consumer_aborted = aborted.clone();
    let consumer_error_slot = consumer_error.clone();
    let consumer = std::thread::spawn(move || -> u64 {
        let mut total = 0u64;
        let mut buf = vec![0u8; POP_CHUNK];
        loop {
            let n = consumer_ring.pop_timeout(&mut buf, POP_TIMEOUT);
            if n == 0 {
                if consumer_ring.is_drained() {
                    break;
                }
                continue;
            }
            if writer.write_all(&buf[..n]).is_err() {
                *consumer_error_slot.lock().unwrap_or_else(|p| p.into_inner()) = Some(Kind::WriteFail);
                consumer_aborted.store(true, Ordering::Release);
                continue;
            }
            total += n as u64;
        }
        if consumer_error_slot.lock().unwrap_or_else(|p| p.into_inner()).is_none() {
            if writer.flush_and_sync().is_err() {
                *consumer_error_slot.lock().unwrap_or_else(|p| p.into_inner()) = Some(Kind::WriteFail);
            }
        }
        total
    });

    let producer_result = run_producer(body, &mut recv_buf, leftover, scanner.as_mut(), &ring, &aborted);

    ring.close();
    let bytes_written = consumer.join().unwrap_or(0);
    let consumer_err = consumer_error.lock().unwrap_or_else(|p| p.into_inner()).take();

    if let Err(err) = producer_result {
        let _ = overlay.unlink(&staging_real);
        return Err(err);
    }
    if let Some(err) = consumer_err {
        let _ = overlay.unlink(&staging_real);
        return Err(err);
    }

    overlay
        .rename(&staging_real, &target_real)
        .map_err(|_| Kind::RenameFail)?;

    Ok(UploadOutcome {
        filename,
        bytes_written,
    })
}

/// Runs either the raw-copy loop or the boundary-scanning loop depending on
/// whether `scanner` was set up by the caller (multipart) or not (raw);
/// `leftover` is the bytes already read past the multipart header (may be
/// empty for raw). When `scanner` is `Some`, every chunk — `leftover`
/// included — is fed through it first so the trailing `\r\n--<boundary>`
/// delimiter is stripped before bytes ever reach the ring (`spec.md` §4.4).
fn run_producer(
    body: &mut dyn BodyReader,
    recv_buf: &mut [u8],
    leftover: Vec<u8>,
    mut scanner: Option<&mut BoundaryScanner>,
    ring: &BoundedByteQueue,
    aborted: &AtomicBool,
) -> Result<(), Kind> {
    let mut total = 0u64;

    let mut feed = |chunk: &[u8], total: &mut u64| -> bool {
        match scanner.as_deref_mut() {
            Some(s) => {
                let out = s.feed(chunk);
                if !out.data.is_empty() {
                    ring.push(&out.data);
                    *total += out.data.len() as u64;
                }
                out.boundary_found
            }
            None => {
                if !chunk.is_empty() {
                    ring.push(chunk);
                    *total += chunk.len() as u64;
                }
                false
            }
        }
    };

    if !leftover.is_empty() && feed(&leftover, &mut total) {
        return if total == 0 { Err(Kind::NoBody) } else { Ok(()) };
    }
    loop {
        if aborted.load(Ordering::Acquire) {
            return Ok(());
        }
        let n = body.recv_chunk(recv_buf).map_err(|_| Kind::RecvFail)?;
        if n == 0 {
            break;
        }
        if feed(&recv_buf[..n], &mut total) {
            break;
        }
    }
    if total == 0 {
        return Err(Kind::NoBody);
    }
    Ok(())
}

/// Accumulates bytes from `body` until the multipart part header's blank
/// line, then strips the boundary-delimited body using a fresh
/// [`BoundaryScanner`] layered on top so the remaining "header" parsing here
/// stays limited to header bytes only.
fn read_part_header(
    body: &mut dyn BodyReader,
    recv_buf: &mut [u8],
) -> Result<(Vec<u8>, Vec<u8>), Kind> {
    let mut acc = HeaderAccumulator::default();
    loop {
        let n = body.recv_chunk(recv_buf).map_err(|_| Kind::RecvFail)?;
        if n == 0 {
            return Err(Kind::BadMultipart);
        }
        if let Some((header, rest)) = acc.push(&recv_buf[..n])? {
            return Ok((header, rest.to_vec()));
        }
    }
}
