//! `BoundedByteQueue`: the single conduit between the upload producer and
//! consumer (`spec.md` §4.4). A byte-buffer ring with copy-in/copy-out
//! semantics, not object messages — grounded on `usbd-storage::buffer::Buffer`'s
//! shift-on-overflow algorithm, made cross-thread with a `Mutex` + two
//! `Condvar`s so the producer can block on `push` and the consumer can block
//! on `pop` with a timeout (`spec.md` §5).

use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// Preferred ring capacity (`spec.md` §4.4).
pub const PREFERRED_CAPACITY: usize = 512 * 1024;
/// Fallback ring capacity if the preferred allocation fails.
pub const FALLBACK_CAPACITY: usize = 256 * 1024;

struct Inner {
    data: Vec<u8>,
    rpos: usize,
    wpos: usize,
    input_done: bool,
}

impl Inner {
    fn available_read(&self) -> usize {
        self.wpos - self.rpos
    }

    fn available_write(&self) -> usize {
        self.data.len() - self.wpos
    }

    fn shift(&mut self) {
        if self.rpos == self.wpos {
            self.rpos = 0;
            self.wpos = 0;
            return;
        }
        self.data.copy_within(self.rpos..self.wpos, 0);
        self.wpos -= self.rpos;
        self.rpos = 0;
    }
}

/// A bounded byte ring shared between one producer and one consumer thread.
pub struct BoundedByteQueue {
    inner: Mutex<Inner>,
    not_empty: Condvar,
    not_full: Condvar,
}

impl BoundedByteQueue {
    pub fn new(capacity: usize) -> Self {
        BoundedByteQueue {
            inner: Mutex::new(Inner {
                data: vec![0u8; capacity],
                rpos: 0,
                wpos: 0,
                input_done: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        }
    }

    /// Allocates with the preferred/fallback sizing described in `spec.md`
    /// §4.4, using a fallible reservation so an allocation failure surfaces
    /// as `None` instead of aborting the process.
    pub fn try_new_sized() -> Option<Self> {
        for capacity in [PREFERRED_CAPACITY, FALLBACK_CAPACITY] {
            let mut probe: Vec<u8> = Vec::new();
            if probe.try_reserve_exact(capacity).is_ok() {
                probe.resize(capacity, 0);
                return Some(BoundedByteQueue {
                    inner: Mutex::new(Inner {
                        data: probe,
                        rpos: 0,
                        wpos: 0,
                        input_done: false,
                    }),
                    not_empty: Condvar::new(),
                    not_full: Condvar::new(),
                });
            }
        }
        None
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().unwrap_or_else(|p| p.into_inner()).data.len()
    }

    /// Blocks until all of `data` has been copied into the ring, or the
    /// consumer side has been closed by a panic-poisoned lock recovery.
    /// Producer-side back-pressure: §5 "producer suspends in ring push when
    /// full".
    pub fn push(&self, mut data: &[u8]) {
        while !data.is_empty() {
            let mut guard = self.inner.lock().unwrap_or_else(|p| p.into_inner());
            // Only a ring holding `capacity` unread bytes is truly full: a
            // zero `available_write()` with `rpos > 0` just means the tail
            // needs reclaiming via `shift()`, not that the producer must wait.
            while guard.available_read() == guard.data.len() {
                guard = self.not_full.wait(guard).unwrap_or_else(|p| p.into_inner());
            }
            if guard.available_write() < data.len() {
                guard.shift();
            }
            let count = data.len().min(guard.available_write());
            let wpos = guard.wpos;
            guard.data[wpos..wpos + count].copy_from_slice(&data[..count]);
            guard.wpos += count;
            data = &data[count..];
            drop(guard);
            self.not_empty.notify_one();
        }
    }

    /// Copies out up to `buf.len()` bytes, blocking for at most `timeout` if
    /// the ring is currently empty and not yet closed. Returns the number of
    /// bytes copied (0 means "timed out, check `input_done`" per §4.4's
    /// consumer loop).
    pub fn pop_timeout(&self, buf: &mut [u8], timeout: Duration) -> usize {
        let mut guard = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        if guard.available_read() == 0 && !guard.input_done {
            let (g, _timeout_result) = self
                .not_empty
                .wait_timeout(guard, timeout)
                .unwrap_or_else(|p| p.into_inner());
            guard = g;
        }
        let count = buf.len().min(guard.available_read());
        let rpos = guard.rpos;
        buf[..count].copy_from_slice(&guard.data[rpos..rpos + count]);
        guard.rpos += count;
        if guard.rpos == guard.wpos {
            guard.rpos = 0;
            guard.wpos = 0;
        }
        drop(guard);
        if count > 0 {
            self.not_full.notify_one();
        }
        count
    }

    /// Producer-side close: no more bytes will ever be pushed.
    pub fn close(&self) {
        let mut guard = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        guard.input_done = true;
        drop(guard);
        self.not_empty.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().unwrap_or_else(|p| p.into_inner()).input_done
    }

    /// True once the producer has closed and every pushed byte has been
    /// popped — the consumer's drain-to-completion condition (`spec.md` §4.4).
    pub fn is_drained(&self) -> bool {
        let guard = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        guard.input_done && guard.available_read() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_then_pop_round_trips() {
        let ring = BoundedByteQueue::new(16);
        ring.push(b"hello");
        let mut buf = [0u8; 16];
        let n = ring.pop_timeout(&mut buf, Duration::from_millis(50));
        assert_eq!(&buf[..n], b"hello");
    }

    #[test]
    fn pop_returns_zero_on_timeout_when_open_and_empty() {
        let ring = BoundedByteQueue::new(16);
        let mut buf = [0u8; 16];
        let n = ring.pop_timeout(&mut buf, Duration::from_millis(10));
        assert_eq!(n, 0);
        assert!(!ring.is_drained());
    }

    #[test]
    fn drained_after_close_and_full_pop() {
        let ring = BoundedByteQueue::new(16);
        ring.push(b"ab");
        ring.close();
        let mut buf = [0u8; 16];
        let n = ring.pop_timeout(&mut buf, Duration::from_millis(50));
        assert_eq!(n, 2);
        assert!(ring.is_drained());
    }

    #[test]
    fn shifts_instead_of_wrapping_when_space_freed() {
        let ring = BoundedByteQueue::new(8);
        ring.push(b"abcdefgh");
        let mut buf = [0u8; 4];
        assert_eq!(ring.pop_timeout(&mut buf, Duration::from_millis(10)), 4);
        assert_eq!(&buf, b"abcd");
        ring.push(b"ijkl");
        let mut buf2 = [0u8; 8];
        assert_eq!(ring.pop_timeout(&mut buf2, Duration::from_millis(10)), 8);
        assert_eq!(&buf2, b"efghijkl");
    }

    #[test]
    fn producer_consumer_threads_preserve_order() {
        use std::sync::Arc;
        use std::thread;

        let ring = Arc::new(BoundedByteQueue::new(64));
        let producer_ring = ring.clone();
        let producer = thread::spawn(move || {
            for chunk in [b"one-".as_slice(), b"two-".as_slice(), b"three".as_slice()] {
                producer_ring.push(chunk);
            }
            producer_ring.close();
        });

        let mut collected = Vec::new();
        loop {
            let mut buf = [0u8; 8];
            let n = ring.pop_timeout(&mut buf, Duration::from_millis(200));
            if n == 0 {
                if ring.is_drained() {
                    break;
                }
                continue;
            }
            collected.extend_from_slice(&buf[..n]);
        }
        producer.join().unwrap();
        assert_eq!(collected, b"one-two-three");
    }
}
