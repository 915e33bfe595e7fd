// Copyright 2025-2026 CEMAXECUTER LLC

//! Bounded ring of complex samples shared between the driver callback thread
//! and consumer threads.

use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::types::Sample;

struct Ring {
    slots: Vec<Sample>,
    read_pos: usize,
    write_pos: usize,
    overflowed: bool,
}

impl Ring {
    fn available(&self) -> usize {
        let size = self.slots.len();
        (self.write_pos + size - self.read_pos) % size
    }

    fn free(&self) -> usize {
        // one slot reserved so that read_pos == write_pos always means empty
        self.slots.len() - 1 - self.available()
    }
}

/// Single-producer / single-consumer circular buffer of IQ samples.
///
/// Storage is allocated once at construction. Writes are all-or-nothing: a
/// batch that does not fit is dropped entirely and the sticky overflow flag
/// is raised.
pub struct SampleBuffer {
    ring: Mutex<Ring>,
    data_available: Condvar,
}

impl SampleBuffer {
    /// Create a buffer with `size` slots, of which `size - 1` hold data.
    pub fn new(size: usize) -> Self {
        let size = size.max(2);
        Self {
            ring: Mutex::new(Ring {
                slots: vec![Sample::new(0, 0); size],
                read_pos: 0,
                write_pos: 0,
                overflowed: false,
            }),
            data_available: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Ring> {
        // A poisoned ring still has consistent cursors: every mutation below
        // completes before anything that could panic.
        self.ring.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append `samples`. Returns `false` and sets the overflow flag if the
    /// whole batch does not fit.
    pub fn write(&self, samples: &[Sample]) -> bool {
        if samples.is_empty() {
            return true;
        }

        let mut ring = self.lock();
        if samples.len() > ring.free() {
            ring.overflowed = true;
            return false;
        }

        let size = ring.slots.len();
        let start = ring.write_pos;
        let first = samples.len().min(size - start);
        ring.slots[start..start + first].copy_from_slice(&samples[..first]);
        let rest = samples.len() - first;
        if rest > 0 {
            ring.slots[..rest].copy_from_slice(&samples[first..]);
        }
        ring.write_pos = (start + samples.len()) % size;
        drop(ring);

        self.data_available.notify_all();
        true
    }

    /// Copy up to `dest.len()` samples out of the buffer. Never blocks;
    /// returns 0 when empty.
    pub fn read(&self, dest: &mut [Sample]) -> usize {
        if dest.is_empty() {
            return 0;
        }

        let mut ring = self.lock();
        let count = ring.available().min(dest.len());
        if count == 0 {
            return 0;
        }

        let size = ring.slots.len();
        let start = ring.read_pos;
        let first = count.min(size - start);
        dest[..first].copy_from_slice(&ring.slots[start..start + first]);
        let rest = count - first;
        if rest > 0 {
            dest[first..count].copy_from_slice(&ring.slots[..rest]);
        }
        ring.read_pos = (start + count) % size;
        count
    }

    /// Block until at least `count` samples are buffered.
    ///
    /// `timeout_ms == 0` waits indefinitely. Returns `false` if the timeout
    /// expired first.
    pub fn wait_for_samples(&self, count: usize, timeout_ms: u32) -> bool {
        let mut ring = self.lock();

        if timeout_ms == 0 {
            while ring.available() < count {
                ring = self
                    .data_available
                    .wait(ring)
                    .unwrap_or_else(|e| e.into_inner());
            }
            return true;
        }

        let deadline = Instant::now() + Duration::from_millis(timeout_ms as u64);
        while ring.available() < count {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .data_available
                .wait_timeout(ring, deadline - now)
                .unwrap_or_else(|e| e.into_inner());
            ring = guard;
        }
        true
    }

    /// Number of samples currently buffered.
    pub fn available(&self) -> usize {
        self.lock().available()
    }

    /// Whether a batch has been dropped since the last [`reset`](Self::reset).
    pub fn overflow(&self) -> bool {
        self.lock().overflowed
    }

    /// Discard buffered data and clear the overflow flag.
    pub fn reset(&self) {
        let mut ring = self.lock();
        ring.read_pos = 0;
        ring.write_pos = 0;
        ring.overflowed = false;
    }

    /// Usable capacity in samples (`size - 1`).
    pub fn capacity(&self) -> usize {
        self.lock().slots.len() - 1
    }
}
