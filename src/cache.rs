//! Write-back single-sector cache plus N-sector read-ahead, used
//! exclusively by [`crate::scsi::adapter::UsbBlockAdapter`] (`spec.md` §4.2).
//!
//! Both buffers are plain growable `Vec<u8>`s sized once at construction —
//! there is no shift-on-overflow here (unlike `usbd-storage`'s
//! `buffer::Buffer`, which this is grounded on) because every access is
//! whole-sector-aligned by construction; the cache only ever holds exactly
//! one dirty sector and one read-ahead window, so there is nothing to shift.

use crate::block::BlockDevice;
use std::io;

/// Sectors of read-ahead to keep, per `spec.md` §4.2 ("typical 8").
pub const READ_AHEAD_SECTORS: u16 = 8;

struct DirtySlot {
    valid: bool,
    dirty: bool,
    lba: u32,
    data: Vec<u8>,
}

struct ReadAheadWindow {
    valid: bool,
    base_lba: u32,
    count: u16,
    data: Vec<u8>,
}

/// Translates arbitrary-offset, arbitrary-length transfers into whole-sector
/// [`BlockDevice`] I/O, amortizing small sequential reads.
pub struct SectorCache {
    sector_size: u16,
    ra_capacity: u16,
    dirty: DirtySlot,
    ra: ReadAheadWindow,
}

impl SectorCache {
    pub fn new(sector_size: u16) -> Self {
        SectorCache::with_read_ahead(sector_size, READ_AHEAD_SECTORS)
    }

    pub fn with_read_ahead(sector_size: u16, ra_capacity: u16) -> Self {
        SectorCache {
            sector_size,
            ra_capacity,
            dirty: DirtySlot {
                valid: false,
                dirty: false,
                lba: 0,
                data: vec![0u8; sector_size as usize],
            },
            ra: ReadAheadWindow {
                valid: false,
                base_lba: 0,
                count: 0,
                data: vec![0u8; sector_size as usize * ra_capacity as usize],
            },
        }
    }

    fn sector_size(&self) -> usize {
        self.sector_size as usize
    }

    /// Writes the dirty sector back if one is pending, clearing `dirty`.
    pub fn flush(&mut self, dev: &mut dyn BlockDevice) -> io::Result<()> {
        if self.dirty.dirty {
            dev.write_sectors(self.dirty.lba, 1, &self.dirty.data)?;
            self.dirty.dirty = false;
        }
        Ok(())
    }

    /// Flushes and drops both caches.
    pub fn invalidate(&mut self, dev: &mut dyn BlockDevice) -> io::Result<()> {
        self.flush(dev)?;
        self.dirty.valid = false;
        self.ra.valid = false;
        Ok(())
    }

    fn invalidate_ra_if_overlaps(&mut self, lba: u32, count: u32) {
        if !self.ra.valid {
            return;
        }
        let ra_end = self.ra.base_lba as u64 + self.ra.count as u64;
        let end = lba as u64 + count as u64;
        if (lba as u64) < ra_end && (self.ra.base_lba as u64) < end {
            self.ra.valid = false;
        }
    }

    fn load_dirty_sector(&mut self, dev: &mut dyn BlockDevice, lba: u32) -> io::Result<()> {
        if self.dirty.valid && self.dirty.lba == lba {
            return Ok(());
        }
        if self.dirty.valid && self.dirty.lba != lba {
            self.flush(dev)?;
        }
        dev.read_sectors(lba, 1, &mut self.dirty.data)?;
        self.dirty.valid = true;
        self.dirty.lba = lba;
        Ok(())
    }

    /// Serves a transfer of `len` bytes starting `offset` bytes into sector
    /// `lba`. `spec.md` §4.2.
    pub fn read(
        &mut self,
        dev: &mut dyn BlockDevice,
        lba: u32,
        offset: usize,
        len: usize,
        out: &mut [u8],
    ) -> io::Result<()> {
        let sector_size = self.sector_size();
        if offset == 0 && len % sector_size == 0 {
            self.flush(dev)?;
            let sectors = (len / sector_size) as u32;

            if self.ra.valid
                && lba >= self.ra.base_lba
                && lba as u64 + sectors as u64 <= self.ra.base_lba as u64 + self.ra.count as u64
            {
                let start = (lba - self.ra.base_lba) as usize * sector_size;
                out[..len].copy_from_slice(&self.ra.data[start..start + len]);
                return Ok(());
            }

            if sectors as u16 <= self.ra_capacity {
                let remaining = dev.sector_count().saturating_sub(lba).max(sectors);
                let window = (self.ra_capacity as u32).min(remaining);
                dev.read_sectors(lba, window, &mut self.ra.data[..window as usize * sector_size])?;
                self.ra.valid = true;
                self.ra.base_lba = lba;
                self.ra.count = window as u16;
                out[..len].copy_from_slice(&self.ra.data[..len]);
                return Ok(());
            }

            dev.read_sectors(lba, sectors, &mut out[..len])?;
            return Ok(());
        }

        // Partial sector: route through the dirty-sector slot.
        self.load_dirty_sector(dev, lba)?;
        out[..len].copy_from_slice(&self.dirty.data[offset..offset + len]);
        Ok(())
    }

    /// Writes `len` bytes starting `offset` bytes into sector `lba`.
    /// `spec.md` §4.2. An aligned whole-sector write always supersedes any
    /// overlapping cached content rather than merging with it (Open Question,
    /// resolved in `DESIGN.md`).
    pub fn write(
        &mut self,
        dev: &mut dyn BlockDevice,
        lba: u32,
        offset: usize,
        len: usize,
        src: &[u8],
    ) -> io::Result<()> {
        let sector_size = self.sector_size();
        if offset == 0 && len % sector_size == 0 {
            let sectors = (len / sector_size) as u32;

            if self.dirty.valid {
                let dirty_end = self.dirty.lba as u64 + 1;
                let end = lba as u64 + sectors as u64;
                if (lba as u64) < dirty_end && (self.dirty.lba as u64) < end {
                    // Overlapping write supersedes the dirty sector: drop it
                    // without flushing stale bytes.
                    self.dirty.valid = false;
                    self.dirty.dirty = false;
                } else {
                    self.flush(dev)?;
                }
            }

            self.invalidate_ra_if_overlaps(lba, sectors);
            dev.write_sectors(lba, sectors, &src[..len])?;
            return Ok(());
        }

        if self.dirty.valid && self.dirty.lba != lba {
            self.flush(dev)?;
        }
        self.load_dirty_sector(dev, lba)?;
        self.dirty.data[offset..offset + len].copy_from_slice(&src[..len]);
        self.dirty.dirty = true;
        self.invalidate_ra_if_overlaps(lba, 1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::MemoryBlockDevice;

    #[test]
    fn partial_write_then_full_sector_read_is_coherent() {
        let mut dev = MemoryBlockDevice::new(512, 16);
        let mut cache = SectorCache::new(512);

        let pattern = [0xAAu8; 5];
        cache.write(&mut dev, 100, 10, 5, &pattern).unwrap();

        let mut out = [0u8; 512];
        cache.read(&mut dev, 100, 0, 512, &mut out).unwrap();
        assert_eq!(&out[10..15], &pattern);
        assert!(out[..10].iter().all(|&b| b == 0));
    }

    #[test]
    fn aligned_write_supersedes_dirty_sector() {
        let mut dev = MemoryBlockDevice::new(512, 16);
        let mut cache = SectorCache::new(512);

        cache.write(&mut dev, 5, 2, 3, &[0xFF; 3]).unwrap();
        assert!(cache.dirty.valid && cache.dirty.dirty);

        let whole = vec![0x11u8; 512];
        cache.write(&mut dev, 5, 0, 512, &whole).unwrap();
        assert!(!cache.dirty.valid);

        let mut out = [0u8; 512];
        cache.read(&mut dev, 5, 0, 512, &mut out).unwrap();
        assert!(out.iter().all(|&b| b == 0x11));
    }

    #[test]
    fn read_ahead_serves_small_sequential_reads() {
        let mut dev = MemoryBlockDevice::new(512, 32);
        let mut pattern = vec![0u8; 512 * 4];
        for (i, b) in pattern.iter_mut().enumerate() {
            *b = (i % 251) as u8;
        }
        dev.write_sectors(0, 4, &pattern).unwrap();

        let mut cache = SectorCache::new(512);
        let mut out = [0u8; 512];
        cache.read(&mut dev, 0, 0, 512, &mut out).unwrap();
        assert_eq!(&out[..], &pattern[..512]);
        assert!(cache.ra.valid);

        // Second sector should come straight from the read-ahead window.
        let mut out2 = [0u8; 512];
        cache.read(&mut dev, 1, 0, 512, &mut out2).unwrap();
        assert_eq!(&out2[..], &pattern[512..1024]);
    }

    #[test]
    fn write_invalidates_overlapping_read_ahead() {
        let mut dev = MemoryBlockDevice::new(512, 32);
        let mut cache = SectorCache::new(512);

        let mut out = [0u8; 512];
        cache.read(&mut dev, 0, 0, 512, &mut out).unwrap();
        assert!(cache.ra.valid);

        cache.write(&mut dev, 2, 0, 512, &[0x42; 512]).unwrap();
        assert!(!cache.ra.valid);
    }

    #[test]
    fn flush_writes_through_dirty_sector() {
        let mut dev = MemoryBlockDevice::new(512, 4);
        let mut cache = SectorCache::new(512);

        cache.write(&mut dev, 1, 0, 1, &[0x77]).unwrap();
        assert!(cache.dirty.dirty);
        cache.flush(&mut dev).unwrap();
        assert!(!cache.dirty.dirty);

        assert_eq!(dev.raw()[512], 0x77);
    }
}
