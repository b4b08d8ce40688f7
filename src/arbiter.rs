//! [`SdArbiter`]: serializes all SD-card access and guarantees the USB block
//! interface and the host filesystem overlay are never both live
//! (`spec.md` §4.1).

use crate::error::Kind;
use crate::mode::{Mode, ModeCell};
use log::{debug, warn};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, TryLockError};

/// Non-blocking mutex held for the duration of one mutating filesystem
/// operation (`spec.md` §4.6). `usb attach` is refused while held.
pub struct FsOpLock(Mutex<()>);

impl Default for FsOpLock {
    fn default() -> Self {
        FsOpLock(Mutex::new(()))
    }
}

/// RAII guard held for the duration of one filesystem mutation.
pub struct FsOpGuard<'a>(#[allow(dead_code)] MutexGuard<'a, ()>);

impl FsOpLock {
    /// Never blocks: returns `FileopInProgress` instead.
    pub fn try_acquire(&self) -> Result<FsOpGuard<'_>, Kind> {
        match self.0.try_lock() {
            Ok(guard) => Ok(FsOpGuard(guard)),
            Err(TryLockError::WouldBlock) => Err(Kind::FileopInProgress),
            Err(TryLockError::Poisoned(poisoned)) => Ok(FsOpGuard(poisoned.into_inner())),
        }
    }

    pub fn is_held(&self) -> bool {
        self.0.try_lock().is_err()
    }
}

/// RAII guard proving the filesystem overlay is mounted for as long as it is
/// held; `attach` is serialized against outstanding guards (`spec.md` §4.1).
pub struct AppFsGuard<'a> {
    outstanding: &'a AtomicUsize,
}

impl Drop for AppFsGuard<'_> {
    fn drop(&mut self) {
        self.outstanding.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Process-wide state machine owning the card (`spec.md` §4.1).
pub struct SdArbiter {
    mode: ModeCell,
    transition: Mutex<()>,
    fs_op: FsOpLock,
    outstanding_fs_guards: AtomicUsize,
}

impl SdArbiter {
    pub fn new(initial: Mode) -> Self {
        SdArbiter {
            mode: ModeCell::new(initial),
            transition: Mutex::new(()),
            fs_op: FsOpLock::default(),
            outstanding_fs_guards: AtomicUsize::new(0),
        }
    }

    /// Constant-time read, safe from any context (including USB callbacks).
    pub fn current_mode(&self) -> Mode {
        self.mode.load()
    }

    pub fn fs_op_lock(&self) -> &FsOpLock {
        &self.fs_op
    }

    /// Requests a transition to `target`. Cooperates with [`FsOpLock`]:
    /// refuses with `FileopInProgress` if a mutation (or outstanding reader)
    /// is in progress (`spec.md` §8 scenario 2), or `Busy` if another
    /// transition is already racing this one.
    pub fn try_request(&self, target: Mode) -> Result<(), Kind> {
        let _transition_lock = self
            .transition
            .try_lock()
            .map_err(|_| Kind::Busy)?;

        let current = self.mode.load();
        if current == target {
            return Ok(());
        }
        if current == Mode::Error {
            return Err(Kind::AttachFail);
        }

        if self.fs_op.is_held() || self.outstanding_fs_guards.load(Ordering::Acquire) > 0 {
            return Err(Kind::FileopInProgress);
        }

        debug!("arbiter: transition {:?} -> {:?}", current, target);
        self.mode.publish(Mode::Transition);
        self.mode.publish(target);
        Ok(())
    }

    /// Publishes `Error` after a transport-fatal condition. Not automatically
    /// retried; callers must issue an explicit [`Self::recover`].
    pub fn publish_fatal(&self) {
        warn!("arbiter: publishing fatal state");
        self.mode.publish(Mode::Error);
    }

    /// Explicit recovery from `Error`, bypassing the "no-op if fatal"
    /// refusal in [`Self::try_request`]. The caller is responsible for
    /// having already restored the underlying collaborators to a sane
    /// state before calling this.
    pub fn recover(&self, target: Mode) {
        let _transition_lock = self.transition.lock().unwrap_or_else(|p| p.into_inner());
        debug!("arbiter: recovering into {:?}", target);
        self.mode.publish(target);
    }

    /// Guarantees the mount point is live for the duration of `f`, by
    /// holding a read-guard on `Mode` that `attach` is serialized against.
    ///
    /// Per `spec.md` §4.5 step 1, the gate distinguishes `Busy` (USB is
    /// attached) from `NotMounted` (mode is `Transition`/`Error`).
    pub fn with_app_fs<R>(&self, f: impl FnOnce() -> R) -> Result<R, Kind> {
        match self.mode.load() {
            Mode::AppMounted => {}
            Mode::UsbExposed => return Err(Kind::Busy),
            Mode::Transition | Mode::Error => return Err(Kind::NotMounted),
        }
        self.outstanding_fs_guards.fetch_add(1, Ordering::AcqRel);
        let guard = AppFsGuard {
            outstanding: &self.outstanding_fs_guards,
        };
        // Re-check after registering the guard: an attach could have raced
        // us between the first load and the increment.
        match self.mode.load() {
            Mode::AppMounted => {}
            Mode::UsbExposed => {
                drop(guard);
                return Err(Kind::Busy);
            }
            Mode::Transition | Mode::Error => {
                drop(guard);
                return Err(Kind::NotMounted);
            }
        }
        let result = f();
        drop(guard);
        Ok(result)
    }
}
