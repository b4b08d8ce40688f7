//! The access-mode word published by [`crate::arbiter::SdArbiter`].
//!
//! Readers load it lock-free; the arbiter is the only writer and always
//! publishes with `Release` ordering (Design Notes §9: replace ad-hoc
//! condition flags with a single atomic word).

use std::sync::atomic::{AtomicU8, Ordering};

/// The SD card's current owner.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Mode {
    /// The card is presented to the host as a USB block device.
    UsbExposed,
    /// The filesystem overlay is mounted and reachable over HTTP.
    AppMounted,
    /// A transition is in flight; neither side owns the card yet.
    Transition,
    /// A transport-fatal error occurred; requires explicit recovery.
    Error,
}

impl Mode {
    fn from_raw(raw: u8) -> Mode {
        match raw {
            0 => Mode::UsbExposed,
            1 => Mode::AppMounted,
            2 => Mode::Transition,
            _ => Mode::Error,
        }
    }

    fn to_raw(self) -> u8 {
        match self {
            Mode::UsbExposed => 0,
            Mode::AppMounted => 1,
            Mode::Transition => 2,
            Mode::Error => 3,
        }
    }
}

/// A single atomically published [`Mode`].
pub struct ModeCell(AtomicU8);

impl ModeCell {
    pub fn new(initial: Mode) -> Self {
        ModeCell(AtomicU8::new(initial.to_raw()))
    }

    /// Constant-time read, safe from any context (including USB callbacks).
    pub fn load(&self) -> Mode {
        Mode::from_raw(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn publish(&self, mode: Mode) {
        self.0.store(mode.to_raw(), Ordering::Release);
    }
}
