//! Lock-free coefficient hand-off
//!
//! A sequence-locked slot holding one [`Coefficients`] set. The control
//! thread publishes new sets; the audio thread polls for them without ever
//! blocking or spinning. Each field is stored as `f64` bits in an
//! `AtomicU64`, and a version counter (odd while a write is in flight)
//! lets the reader detect and discard a torn read.

use std::sync::atomic::{fence, AtomicU64, Ordering};

use crate::coefficients::Coefficients;

pub(crate) struct CoefficientSlot {
    version: AtomicU64,
    words: [AtomicU64; 5],
}

impl CoefficientSlot {
    pub(crate) fn new(initial: Coefficients) -> Self {
        let bits = initial.to_array().map(f64::to_bits);
        Self {
            version: AtomicU64::new(0),
            words: bits.map(AtomicU64::new),
        }
    }

    /// Publish a new coefficient set
    ///
    /// Writers must be serialized by the caller; the owning filter holds its
    /// parameter lock around every call.
    pub(crate) fn publish(&self, coefficients: Coefficients) {
        let version = self.version.load(Ordering::Relaxed);
        self.version.store(version.wrapping_add(1), Ordering::Relaxed);
        fence(Ordering::Release);

        for (word, value) in self.words.iter().zip(coefficients.to_array()) {
            word.store(value.to_bits(), Ordering::Relaxed);
        }

        self.version.store(version.wrapping_add(2), Ordering::Release);
    }

    /// Current version; even when no write is in flight
    #[cfg(test)]
    pub(crate) fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Try to read a set newer than `seen`
    ///
    /// Returns `None` when nothing changed or a write is in flight. Never
    /// waits, so this is safe on the audio thread; a missed update is picked
    /// up on the next call.
    #[inline]
    pub(crate) fn try_read_newer(&self, seen: u64) -> Option<(u64, Coefficients)> {
        let before = self.version.load(Ordering::Acquire);
        if before == seen || before & 1 == 1 {
            return None;
        }

        let values = self.read_words();
        fence(Ordering::Acquire);

        let after = self.version.load(Ordering::Relaxed);
        (before == after).then(|| (before, Coefficients::from_array(values)))
    }

    /// Read a consistent snapshot, retrying while a write is in flight
    ///
    /// For control and analysis threads only.
    pub(crate) fn read(&self) -> (u64, Coefficients) {
        loop {
            let before = self.version.load(Ordering::Acquire);
            if before & 1 == 0 {
                let values = self.read_words();
                fence(Ordering::Acquire);
                if self.version.load(Ordering::Relaxed) == before {
                    return (before, Coefficients::from_array(values));
                }
            }
            std::hint::spin_loop();
        }
    }

    #[inline]
    fn read_words(&self) -> [f64; 5] {
        let mut values = [0.0; 5];
        for (value, word) in values.iter_mut().zip(self.words.iter()) {
            *value = f64::from_bits(word.load(Ordering::Relaxed));
        }
        values
    }
}
