//! `UsbBlockAdapter`: answers the SCSI/MSC commands a USB mass-storage host
//! issues, on top of a [`BlockDevice`] and a [`SectorCache`] (`spec.md`
//! §4.3). Grounded on `usbd-storage::subclass::scsi::Scsi::poll`'s
//! callback-driven shape, narrowed from "drive the transport" to "answer one
//! already-parsed command" since the transport itself is the external
//! `UsbStack` collaborator here.

use crate::block::BlockDevice;
use crate::cache::SectorCache;
use crate::scsi::command::ScsiCommand;
use crate::scsi::sense::Sense;
use std::io;

/// Fixed INQUIRY identification strings (`spec.md` §4.3).
#[derive(Copy, Clone, Debug)]
pub struct Inquiry {
    pub vendor: &'static str,
    pub product: &'static str,
    pub revision: &'static str,
}

pub const INQUIRY_DATA: Inquiry = Inquiry {
    vendor: "SDBRIDGE",
    product: "SD CARD BRIDGE",
    revision: "1.0",
};

/// `(block_count, block_size)` as reported by `ReadCapacity`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Capacity {
    pub block_count: u32,
    pub block_size: u16,
}

/// Minimal mode-sense stub: mode data length only (`spec.md` §4.3).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ModeSenseData {
    pub mode_data_length: u16,
}

/// The result of dispatching one parsed [`ScsiCommand`].
///
/// `Read10`/`Write10` only *authorize* a transfer here — the bulk data phase
/// itself flows over the USB stack's data endpoints (the external
/// `UsbStack` collaborator per `spec.md` §6), which then calls
/// [`UsbBlockAdapter::read_partial`]/[`UsbBlockAdapter::write_partial`] to
/// actually move bytes through the cache.
#[derive(Debug)]
pub enum Outcome {
    Inquiry(Inquiry),
    ReadCapacity(Capacity),
    ReadFormatCapacities(Capacity),
    ReadAuthorized { lba: u32, len: u16 },
    WriteAuthorized { lba: u32, len: u16 },
    ModeSense(ModeSenseData),
    Ok,
    Refused(Sense),
}

/// Answers SCSI/MSC commands on top of a [`BlockDevice`] and its
/// [`SectorCache`]. One instance is created per USB attach session
/// (`spec.md` §3: the cache is "created empty at USB-attach").
pub struct UsbBlockAdapter<D: BlockDevice> {
    device: D,
    cache: SectorCache,
    media_present: bool,
    unit_attention_pending: bool,
    started: bool,
}

impl<D: BlockDevice> UsbBlockAdapter<D> {
    /// Creates a fresh adapter for a new attach session: unit-attention is
    /// armed once, per `spec.md` §4.3 ("on first call after attach raise
    /// unit-attention once").
    pub fn new(device: D) -> Self {
        let sector_size = device.sector_size();
        UsbBlockAdapter {
            device,
            cache: SectorCache::new(sector_size),
            media_present: true,
            unit_attention_pending: true,
            started: true,
        }
    }

    /// Flushes the cache and hands the device back to the arbiter on
    /// detach.
    pub fn detach(mut self) -> io::Result<D> {
        self.cache.invalidate(&mut self.device)?;
        Ok(self.device)
    }

    /// Reads `len` bytes starting `offset` bytes into sector `lba` —
    /// partial-sector transfers go through the dirty cache slot.
    pub fn read_partial(&mut self, lba: u32, offset: usize, len: usize) -> io::Result<Vec<u8>> {
        let mut out = vec![0u8; len];
        self.cache.read(&mut self.device, lba, offset, len, &mut out)?;
        Ok(out)
    }

    /// Writes `data` starting `offset` bytes into sector `lba`.
    pub fn write_partial(&mut self, lba: u32, offset: usize, data: &[u8]) -> io::Result<()> {
        self.cache.write(&mut self.device, lba, offset, data.len(), data)
    }

    /// Dispatches one already-parsed SCSI command. Never panics (`spec.md`
    /// §4.3 "never panic the callback"); every error path returns
    /// `Outcome::Refused` with sense data set.
    pub fn handle(&mut self, command: ScsiCommand) -> Outcome {
        match command {
            ScsiCommand::Inquiry { .. } => Outcome::Inquiry(INQUIRY_DATA),
            ScsiCommand::TestUnitReady => {
                if self.unit_attention_pending {
                    self.unit_attention_pending = false;
                    return Outcome::Refused(Sense::UNIT_ATTENTION);
                }
                if !self.media_present {
                    return Outcome::Refused(Sense::NOT_READY);
                }
                Outcome::Ok
            }
            ScsiCommand::ReadCapacity10 => {
                if !self.media_present {
                    return Outcome::Refused(Sense::NOT_READY);
                }
                Outcome::ReadCapacity(Capacity {
                    block_count: self.device.sector_count(),
                    block_size: self.device.sector_size(),
                })
            }
            ScsiCommand::ReadFormatCapacities { .. } => {
                if !self.media_present {
                    return Outcome::Refused(Sense::NOT_READY);
                }
                Outcome::ReadFormatCapacities(Capacity {
                    block_count: self.device.sector_count(),
                    block_size: self.device.sector_size(),
                })
            }
            ScsiCommand::Read10 { lba, len } => {
                let end = lba as u64 + len as u64;
                if !self.media_present || end > self.device.sector_count() as u64 {
                    return Outcome::Refused(Sense::MEDIUM_ERROR_READ);
                }
                Outcome::ReadAuthorized { lba, len }
            }
            ScsiCommand::Write10 { lba, len } => {
                let end = lba as u64 + len as u64;
                if !self.media_present || end > self.device.sector_count() as u64 {
                    return Outcome::Refused(Sense::MEDIUM_ERROR_WRITE);
                }
                Outcome::WriteAuthorized { lba, len }
            }
            ScsiCommand::SynchronizeCache => match self.cache.flush(&mut self.device) {
                Ok(()) => Outcome::Ok,
                Err(_) => Outcome::Refused(Sense::MEDIUM_ERROR_WRITE),
            },
            ScsiCommand::PreventAllowRemoval { .. } => match self.cache.flush(&mut self.device) {
                Ok(()) => Outcome::Ok,
                Err(_) => Outcome::Refused(Sense::MEDIUM_ERROR_WRITE),
            },
            ScsiCommand::StartStopUnit { start, .. } => {
                self.started = start;
                Outcome::Ok
            }
            ScsiCommand::ModeSense6 { .. } => Outcome::ModeSense(ModeSenseData {
                mode_data_length: 3,
            }),
            ScsiCommand::ModeSense10 { .. } => Outcome::ModeSense(ModeSenseData {
                mode_data_length: 6,
            }),
            ScsiCommand::Unknown => Outcome::Refused(Sense::ILLEGAL_REQUEST),
        }
    }

    /// Marks media as removed; subsequent `TestUnitReady`/`ReadCapacity`
    /// refuse with `NotReady` until [`Self::set_media_present`] is called
    /// again. Not exercised by the SD-hot-swap non-goal, but kept for
    /// completeness of the media-absent sense path.
    pub fn set_media_present(&mut self, present: bool) {
        self.media_present = present;
    }

    pub fn is_started(&self) -> bool {
        self.started
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::MemoryBlockDevice;
    use crate::scsi::command::parse_cb;
    use crate::scsi::sense::SenseKey;

    fn adapter() -> UsbBlockAdapter<MemoryBlockDevice> {
        UsbBlockAdapter::new(MemoryBlockDevice::new(512, 64))
    }

    #[test]
    fn unit_attention_raised_once_per_attach() {
        let mut dev = adapter();
        assert!(matches!(
            dev.handle(ScsiCommand::TestUnitReady),
            Outcome::Refused(Sense { key: SenseKey::UnitAttention, .. })
        ));
        assert!(matches!(dev.handle(ScsiCommand::TestUnitReady), Outcome::Ok));
    }

    #[test]
    fn write_then_read_same_lba_is_coherent() {
        let mut dev = adapter();
        let pattern = vec![0xAB; 512];
        dev.write_partial(100, 0, &pattern).unwrap();
        let out = dev.read_partial(100, 0, 512).unwrap();
        assert_eq!(out, pattern);
    }

    #[test]
    fn partial_write_coherence_at_offsets() {
        let mut dev = adapter();
        dev.write_partial(100, 10, &[0xAA; 5]).unwrap();
        let out = dev.read_partial(100, 0, 512).unwrap();
        assert_eq!(&out[10..15], &[0xAA; 5]);
        assert!(out[..10].iter().all(|&b| b == 0));
    }

    #[test]
    fn unknown_opcode_is_illegal_request() {
        let mut dev = adapter();
        let outcome = dev.handle(parse_cb(&[0xFF]));
        assert!(matches!(
            outcome,
            Outcome::Refused(Sense { key: SenseKey::IllegalRequest, .. })
        ));
    }

    #[test]
    fn read_capacity_reports_device_geometry() {
        let mut dev = adapter();
        match dev.handle(ScsiCommand::ReadCapacity10) {
            Outcome::ReadCapacity(cap) => {
                assert_eq!(cap.block_size, 512);
                assert_eq!(cap.block_count, 64);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn detach_flushes_pending_dirty_sector() {
        let mut dev = adapter();
        dev.write_partial(3, 2, &[0x5A; 4]).unwrap();
        let mem = dev.detach().unwrap();
        assert_eq!(mem.raw()[3 * 512 + 2], 0x5A);
    }
}
