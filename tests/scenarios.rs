//! End-to-end scenarios and cross-module invariants (`spec.md` §8), run
//! against the in-memory `BlockDevice`/`FilesystemOverlay` test doubles.

use sdbridge_core::block::MemoryBlockDevice;
use sdbridge_core::config::MemoryConfigStore;
use sdbridge_core::error::Kind;
use sdbridge_core::fs::overlay::memory::InMemoryOverlay;
use sdbridge_core::mode::Mode;
use sdbridge_core::scsi::adapter::UsbBlockAdapter;
use sdbridge_core::upload::pipeline::{BodyReader, UploadRequest};
use sdbridge_core::usb_stack::NullUsbStack;
use sdbridge_core::Core;
use std::io::Read;
use std::path::PathBuf;

struct ChunkedBody {
    chunks: Vec<Vec<u8>>,
    idx: usize,
}

impl ChunkedBody {
    fn new(chunks: Vec<&[u8]>) -> Self {
        ChunkedBody {
            chunks: chunks.into_iter().map(|c| c.to_vec()).collect(),
            idx: 0,
        }
    }
}

impl BodyReader for ChunkedBody {
    fn recv_chunk(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.idx >= self.chunks.len() {
            return Ok(0);
        }
        let chunk = &self.chunks[self.idx];
        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        self.idx += 1;
        Ok(n)
    }
}

fn new_core() -> Core {
    Core::new(
        Box::new(MemoryBlockDevice::new(512, 64)),
        Box::new(InMemoryOverlay::default()),
        Box::new(NullUsbStack::default()),
        Box::new(MemoryConfigStore::default()),
        PathBuf::from("/"),
        Mode::AppMounted,
    )
}

/// Scenario 1: upload then read back, then attach — the uploaded bytes are
/// durable across the attach boundary and the mode arbiter enforces
/// exclusion for the duration of the USB session.
#[test]
fn upload_then_attach_after_read_back() {
    let core = new_core();
    let mut body = ChunkedBody::new(vec![b"HELLO\n"]);
    let outcome = core
        .fs_handlers()
        .upload(
            "/",
            UploadRequest::Raw {
                filename: "hello.txt",
            },
            true,
            &mut body,
        )
        .unwrap();
    assert_eq!(outcome.filename, "hello.txt");
    assert_eq!(outcome.bytes_written, 6);

    let mut out = String::new();
    core.fs_handlers()
        .download("/hello.txt")
        .unwrap()
        .read_to_string(&mut out)
        .unwrap();
    assert_eq!(out, "HELLO\n");

    core.attach_usb((0x1234, 0x5678)).unwrap();
    assert_eq!(core.arbiter.current_mode(), Mode::UsbExposed);
    assert_eq!(core.fs_handlers().list("/").unwrap_err(), Kind::Busy);
}

/// Scenario 2: attach is refused with `FILEOP_IN_PROGRESS` while a mutating
/// filesystem operation holds `FsOpLock`; the upload that holds it still
/// completes successfully once released.
#[test]
fn attach_refused_while_upload_holds_fs_op_lock() {
    let core = new_core();
    let _guard = core.arbiter.fs_op_lock().try_acquire().unwrap();
    assert_eq!(
        core.attach_usb((0x1234, 0x5678)).unwrap_err(),
        Kind::FileopInProgress
    );
    drop(_guard);

    let mut body = ChunkedBody::new(vec![&vec![0x41u8; 10 * 1024 * 1024]]);
    let outcome = core
        .fs_handlers()
        .upload(
            "/",
            UploadRequest::Raw {
                filename: "big.bin",
            },
            false,
            &mut body,
        )
        .unwrap();
    assert_eq!(outcome.bytes_written, 10 * 1024 * 1024);
}

/// Scenario 3: multipart upload with the boundary delivered in the same
/// chunk as the trailing body bytes.
#[test]
fn multipart_with_late_boundary_match() {
    let core = new_core();
    let wire = b"Content-Disposition: form-data; name=\"file\"; filename=\"a.bin\"\r\n\r\nAB\r\n--BDY--\r\n";
    let mut body = ChunkedBody::new(vec![wire]);

    let outcome = core
        .fs_handlers()
        .upload(
            "/",
            UploadRequest::Multipart {
                content_type: "multipart/form-data; boundary=BDY",
            },
            false,
            &mut body,
        )
        .unwrap();

    assert_eq!(outcome.filename, "a.bin");
    assert_eq!(outcome.bytes_written, 2);

    let mut out = Vec::new();
    core.fs_handlers()
        .download("/a.bin")
        .unwrap()
        .read_to_end(&mut out)
        .unwrap();
    assert_eq!(out, b"AB");
}

/// Scenario 4: same multipart body, but the boundary marker is split across
/// two `recv_chunk` calls.
#[test]
fn multipart_boundary_straddling_chunks() {
    let core = new_core();
    let header = b"Content-Disposition: form-data; name=\"file\"; filename=\"a.bin\"\r\n\r\nA".to_vec();
    let tail = b"B\r\n--BDY--\r\n".to_vec();
    let mut body = ChunkedBody::new(vec![&header, &tail]);

    let outcome = core
        .fs_handlers()
        .upload(
            "/",
            UploadRequest::Multipart {
                content_type: "multipart/form-data; boundary=BDY",
            },
            false,
            &mut body,
        )
        .unwrap();

    assert_eq!(outcome.bytes_written, 2);
    let mut out = Vec::new();
    core.fs_handlers()
        .download("/a.bin")
        .unwrap()
        .read_to_end(&mut out)
        .unwrap();
    assert_eq!(out, b"AB");
}

/// Scenario 5: path traversal is rejected before any I/O is attempted.
#[test]
fn path_traversal_rejected_without_io() {
    let core = new_core();
    assert_eq!(
        core.fs_handlers().delete("/../etc").unwrap_err(),
        Kind::BadPath
    );
}

/// Scenario 6: USB write-coherence — a partial-sector write followed by a
/// whole-sector read returns the written bytes at the correct offset and
/// leaves the rest of the sector untouched.
#[test]
fn usb_write_coherence_partial_then_whole_sector_read() {
    let mut adapter = UsbBlockAdapter::new(MemoryBlockDevice::new(512, 64));
    adapter.write_partial(100, 10, &[0xAA; 5]).unwrap();
    let out = adapter.read_partial(100, 0, 512).unwrap();
    assert_eq!(&out[10..15], &[0xAA; 5]);
    assert!(out[..10].iter().all(|&b| b == 0));
    assert!(out[15..].iter().all(|&b| b == 0));
}

/// Invariant: a failed upload (conflict) leaves no new file and no `.part`
/// staging leak at the target path.
#[test]
fn failed_upload_leaves_no_file_and_no_part_leak() {
    let core = new_core();
    core.fs_handlers()
        .mkdir("/", "taken")
        .unwrap();

    let mut body = ChunkedBody::new(vec![b"data"]);
    let err = core
        .fs_handlers()
        .upload(
            "/",
            UploadRequest::Raw { filename: "taken" },
            true,
            &mut body,
        )
        .unwrap_err();
    assert_eq!(err, Kind::IsDirectory);

    let entries = core.fs_handlers().list("/").unwrap();
    assert!(!entries.iter().any(|e| e.name == "taken.part"));
}

/// Invariant: `normalize` is idempotent, never emits `..`, and the output
/// always begins with `/`.
#[test]
fn path_normalize_is_idempotent_and_traversal_free() {
    use sdbridge_core::fs::path::normalize;
    let once = normalize("/a/./b/../../b/c").unwrap_err();
    assert_eq!(once, Kind::BadPath);

    let clean = normalize("/a//./b/").unwrap();
    assert!(clean.as_str().starts_with('/'));
    assert!(!clean.as_str().contains(".."));
    let twice = normalize(clean.as_str()).unwrap();
    assert_eq!(clean, twice);
}

/// Invariant: unit-attention is raised exactly once per attach, across an
/// attach → detach → attach cycle.
#[test]
fn unit_attention_raised_once_per_attach_cycle() {
    use sdbridge_core::scsi::command::ScsiCommand;
    use sdbridge_core::scsi::adapter::Outcome;
    use sdbridge_core::scsi::sense::SenseKey;

    let mut session1 = UsbBlockAdapter::new(MemoryBlockDevice::new(512, 16));
    assert!(matches!(
        session1.handle(ScsiCommand::TestUnitReady),
        Outcome::Refused(sense) if sense.key == SenseKey::UnitAttention
    ));
    assert!(matches!(
        session1.handle(ScsiCommand::TestUnitReady),
        Outcome::Ok
    ));
    let device = session1.detach().unwrap();

    let mut session2 = UsbBlockAdapter::new(device);
    assert!(matches!(
        session2.handle(ScsiCommand::TestUnitReady),
        Outcome::Refused(sense) if sense.key == SenseKey::UnitAttention
    ));
    assert!(matches!(
        session2.handle(ScsiCommand::TestUnitReady),
        Outcome::Ok
    ));
}
