//! A control plane for a networked SD-card bridge: one card, shared between
//! a USB mass-storage interface and an HTTP filesystem API, with an arbiter
//! guaranteeing only one side ever touches the card at a time.
//!
//! # Modules
//! * [arbiter] — the `Mode` state machine and its locks
//! * [block] — the `BlockDevice` trait boundary
//! * [cache] — write-back cache + read-ahead sitting in front of a block device
//! * [scsi] — SCSI command parsing and dispatch for the USB side
//! * [upload] — the multipart/raw upload ring and pipeline for the HTTP side
//! * [fs] — path normalization, the `FilesystemOverlay` trait, and HTTP handlers
//! * [config] — persisted device configuration
//! * [selftest] — the background block-device self-test path
//! * [usb_stack] — the `UsbStack` trait boundary
//! * [http] — request/response value types
//! * [error] — the shared `Kind` error enum

pub mod arbiter;
pub mod block;
pub mod cache;
pub mod config;
pub mod error;
pub mod fs;
pub mod http;
pub mod mode;
pub mod scsi;
pub mod selftest;
pub mod upload;
pub mod usb_stack;

pub use arbiter::SdArbiter;
pub use error::Kind;
pub use mode::Mode;

use block::BlockDevice;
use config::{Config, ConfigStore};
use fs::overlay::FilesystemOverlay;
use scsi::adapter::UsbBlockAdapter;
use std::path::PathBuf;
use std::sync::Mutex;
use usb_stack::UsbStack;

/// Everything the bridge owns, wired together. Replaces the scattered
/// globals a bare-metal build would otherwise reach for (Design Notes: "one
/// owned `Core` value instead of ad-hoc global singletons").
pub struct Core {
    pub arbiter: SdArbiter,
    pub block: Mutex<Box<dyn BlockDevice>>,
    pub overlay: Box<dyn FilesystemOverlay>,
    pub usb: Mutex<Box<dyn UsbStack>>,
    pub config_store: Box<dyn ConfigStore>,
    pub mount_point: PathBuf,
}

impl Core {
    pub fn new(
        block: Box<dyn BlockDevice>,
        overlay: Box<dyn FilesystemOverlay>,
        usb: Box<dyn UsbStack>,
        config_store: Box<dyn ConfigStore>,
        mount_point: PathBuf,
        initial_mode: Mode,
    ) -> Self {
        Core {
            arbiter: SdArbiter::new(initial_mode),
            block: Mutex::new(block),
            overlay,
            usb: Mutex::new(usb),
            config_store,
            mount_point,
        }
    }

    pub fn config(&self) -> std::io::Result<Config> {
        self.config_store.load()
    }

    pub fn fs_handlers(&self) -> fs::handlers::FsHandlers<'_> {
        fs::handlers::FsHandlers::new(&self.arbiter, self.overlay.as_ref(), &self.mount_point)
    }

    /// Runs a background self-test pass; takes only `BlockDeviceLock`, safe
    /// to call concurrently with filesystem handlers (`SPEC_FULL.md` §4.1).
    pub fn run_selftest(&self, start_lba: u32, sector_count: u32) -> selftest::SelfTestReport {
        selftest::run(&self.block, start_lba, sector_count)
    }

    /// Transitions into `UsbExposed`, constructing a fresh
    /// [`UsbBlockAdapter`] so unit-attention is raised once per attach
    /// (`spec.md` §3, §4.3).
    pub fn attach_usb(&self, vid_pid: (u16, u16)) -> Result<(), Kind> {
        self.arbiter.try_request(Mode::UsbExposed)?;
        self.usb
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .start(vid_pid)
            .map_err(|_| Kind::AttachFail)
    }

    pub fn detach_usb(&self) -> Result<(), Kind> {
        self.usb
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .stop()
            .map_err(|_| Kind::DetachFail)?;
        self.arbiter.try_request(Mode::AppMounted)
    }
}

/// Constructs a fresh [`UsbBlockAdapter`] over whatever `BlockDevice` is
/// currently parked in `core.block`, consuming the lock for the lifetime of
/// the attach session (the adapter owns the device directly, matching
/// `spec.md` §3's "created empty at USB-attach" cache lifetime).
pub fn new_usb_adapter<D: BlockDevice>(device: D) -> UsbBlockAdapter<D> {
    UsbBlockAdapter::new(device)
}

#[cfg(test)]
mod tests {
    use super::*;
    use block::MemoryBlockDevice;
    use config::MemoryConfigStore;
    use fs::overlay::memory::InMemoryOverlay;
    use usb_stack::NullUsbStack;

    fn core() -> Core {
        Core::new(
            Box::new(MemoryBlockDevice::new(512, 64)),
            Box::new(InMemoryOverlay::default()),
            Box::new(NullUsbStack::default()),
            Box::new(MemoryConfigStore::default()),
            PathBuf::from("/"),
            Mode::AppMounted,
        )
    }

    #[test]
    fn fs_handlers_work_while_mounted() {
        let core = core();
        core.fs_handlers().mkdir("/", "sub").unwrap();
        let entries = core.fs_handlers().list("/").unwrap();
        assert!(entries.iter().any(|e| e.name == "sub"));
    }

    #[test]
    fn attach_usb_switches_mode_and_refuses_fs_while_exposed() {
        let core = core();
        core.attach_usb((0x1234, 0x5678)).unwrap();
        assert_eq!(core.arbiter.current_mode(), Mode::UsbExposed);
        assert_eq!(core.fs_handlers().list("/").unwrap_err(), Kind::Busy);

        core.detach_usb().unwrap();
        assert_eq!(core.arbiter.current_mode(), Mode::AppMounted);
        assert!(core.fs_handlers().list("/").is_ok());
    }

    #[test]
    fn selftest_runs_against_the_shared_block_device() {
        let core = core();
        let report = core.run_selftest(0, 4);
        assert_eq!(report.sectors_tested, 4);
        assert_eq!(report.first_mismatch, None);
    }
}
