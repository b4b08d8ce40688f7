//! Background self-test/benchmark path (`spec.md` §2, §5;
//! `SPEC_FULL.md` §4.1). Takes only `BlockDeviceLock`, so it runs
//! concurrently with filesystem handlers and is mutually exclusive only with
//! other direct card access (USB, another self-test run).

use crate::block::BlockDevice;
use log::info;
use std::sync::Mutex;
use std::time::Instant;

const PATTERN: u8 = 0xA5;

/// Result of one completed self-test pass (`spec.md` §3).
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct SelfTestReport {
    pub sectors_tested: u32,
    pub bytes_per_second: u64,
    pub first_mismatch: Option<u32>,
}

/// Writes a known pattern across `sector_count` sectors starting at `start`,
/// reads it back, and reports throughput plus the first mismatching sector
/// if the read-back diverges. Exclusive with the SCSI callbacks only via
/// whatever locking the caller applies to `lock` (`spec.md` §5) — this
/// function itself does not know about `Mode` or the arbiter.
pub fn run(lock: &Mutex<Box<dyn BlockDevice>>, start: u32, sector_count: u32) -> SelfTestReport {
    let mut dev = lock.lock().unwrap_or_else(|p| p.into_inner());
    let sector_size = dev.sector_size() as usize;
    let mut buf = vec![PATTERN; sector_size];
    let mut readback = vec![0u8; sector_size];
    let mut first_mismatch = None;
    let started = Instant::now();

    for offset in 0..sector_count {
        let lba = start + offset;
        // Vary the pattern per sector so a stuck-bit cell can't pass by
        // reading back a neighboring sector's leftover data.
        buf.iter_mut().for_each(|b| *b = PATTERN ^ (offset as u8));
        if dev.write_sectors(lba, 1, &buf).is_err() {
            first_mismatch.get_or_insert(lba);
            break;
        }
        if dev.read_sectors(lba, 1, &mut readback).is_err() {
            first_mismatch.get_or_insert(lba);
            break;
        }
        if readback != buf {
            first_mismatch.get_or_insert(lba);
        }
    }

    let elapsed = started.elapsed().as_secs_f64().max(f64::EPSILON);
    let bytes_tested = sector_count as u64 * sector_size as u64;
    let bytes_per_second = (bytes_tested as f64 / elapsed) as u64;

    info!(
        "selftest: {} sectors, {} B/s, first_mismatch={:?}",
        sector_count, bytes_per_second, first_mismatch
    );

    SelfTestReport {
        sectors_tested: sector_count,
        bytes_per_second,
        first_mismatch,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::MemoryBlockDevice;

    #[test]
    fn clean_device_reports_no_mismatch() {
        let lock: Mutex<Box<dyn BlockDevice>> = Mutex::new(Box::new(MemoryBlockDevice::new(512, 64)));
        let report = run(&lock, 0, 16);
        assert_eq!(report.sectors_tested, 16);
        assert_eq!(report.first_mismatch, None);
    }

    #[test]
    fn run_past_device_end_reports_mismatch_at_failing_sector() {
        let lock: Mutex<Box<dyn BlockDevice>> = Mutex::new(Box::new(MemoryBlockDevice::new(512, 8)));
        let report = run(&lock, 4, 16);
        assert_eq!(report.first_mismatch, Some(8));
    }
}
