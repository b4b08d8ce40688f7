//! SCSI command parsing, grounded on `usbd-storage::subclass::scsi`'s
//! `ScsiCommand`/`parse_cb` — same opcode constants, same enum shape,
//! narrowed to the subset `spec.md` §4.3 lists.

/* SPC */
const TEST_UNIT_READY: u8 = 0x00;
const INQUIRY: u8 = 0x12;
const MODE_SENSE_6: u8 = 0x1A;
const MODE_SENSE_10: u8 = 0x5A;
const START_STOP_UNIT: u8 = 0x1B;
const PREVENT_ALLOW_REMOVAL: u8 = 0x1E;
const SYNCHRONIZE_CACHE_10: u8 = 0x35;

/* SBC */
const READ_10: u8 = 0x28;
const READ_CAPACITY_10: u8 = 0x25;
const WRITE_10: u8 = 0x2A;

/* MMC */
const READ_FORMAT_CAPACITIES: u8 = 0x23;

/// A parsed SCSI command block, addressed to one LUN by the caller.
#[derive(Copy, Clone, Debug)]
#[non_exhaustive]
pub enum ScsiCommand {
    Unknown,
    Inquiry { evpd: bool, page_code: u8, alloc_len: u16 },
    TestUnitReady,
    ModeSense6 { page_code: u8, alloc_len: u8 },
    ModeSense10 { page_code: u8, alloc_len: u16 },
    ReadCapacity10,
    ReadFormatCapacities { alloc_len: u16 },
    Read10 { lba: u32, len: u16 },
    Write10 { lba: u32, len: u16 },
    SynchronizeCache,
    StartStopUnit { start: bool, load_eject: bool },
    PreventAllowRemoval { prevent: bool },
}

/// Parses a raw SCSI command descriptor block.
pub fn parse_cb(cb: &[u8]) -> ScsiCommand {
    if cb.is_empty() {
        return ScsiCommand::Unknown;
    }
    match cb[0] {
        TEST_UNIT_READY => ScsiCommand::TestUnitReady,
        INQUIRY if cb.len() >= 5 => ScsiCommand::Inquiry {
            evpd: (cb[1] & 0b0000_0001) != 0,
            page_code: cb[2],
            alloc_len: u16::from_be_bytes([cb[3], cb[4]]),
        },
        READ_CAPACITY_10 => ScsiCommand::ReadCapacity10,
        READ_FORMAT_CAPACITIES if cb.len() >= 9 => ScsiCommand::ReadFormatCapacities {
            alloc_len: u16::from_be_bytes([cb[7], cb[8]]),
        },
        READ_10 if cb.len() >= 9 => ScsiCommand::Read10 {
            lba: u32::from_be_bytes([cb[2], cb[3], cb[4], cb[5]]),
            len: u16::from_be_bytes([cb[7], cb[8]]),
        },
        WRITE_10 if cb.len() >= 9 => ScsiCommand::Write10 {
            lba: u32::from_be_bytes([cb[2], cb[3], cb[4], cb[5]]),
            len: u16::from_be_bytes([cb[7], cb[8]]),
        },
        MODE_SENSE_6 if cb.len() >= 5 => ScsiCommand::ModeSense6 {
            page_code: cb[2] & 0b0011_1111,
            alloc_len: cb[4],
        },
        MODE_SENSE_10 if cb.len() >= 9 => ScsiCommand::ModeSense10 {
            page_code: cb[2] & 0b0011_1111,
            alloc_len: u16::from_be_bytes([cb[7], cb[8]]),
        },
        SYNCHRONIZE_CACHE_10 => ScsiCommand::SynchronizeCache,
        START_STOP_UNIT if cb.len() >= 5 => ScsiCommand::StartStopUnit {
            start: (cb[4] & 0b0000_0001) != 0,
            load_eject: (cb[4] & 0b0000_0010) != 0,
        },
        PREVENT_ALLOW_REMOVAL if cb.len() >= 5 => ScsiCommand::PreventAllowRemoval {
            prevent: (cb[4] & 0b0000_0001) != 0,
        },
        _ => ScsiCommand::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_read10() {
        let cb = [READ_10, 0, 0, 0, 100, 0, 0, 0, 1];
        match parse_cb(&cb) {
            ScsiCommand::Read10 { lba, len } => {
                assert_eq!(lba, 100);
                assert_eq!(len, 1);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unknown_opcode() {
        assert!(matches!(parse_cb(&[0xFF]), ScsiCommand::Unknown));
    }
}
