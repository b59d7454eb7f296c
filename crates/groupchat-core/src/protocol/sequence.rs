//! Thread-safe sequence counter for outbound frames.
//!
//! Each channel numbers the frames it multicasts.  Receivers only use the
//! number for diagnostics (gaps in the debug log hint at datagram loss); the
//! group primitive makes no delivery or ordering guarantees from it.
//!
//! The counter is an `AtomicU64`, so the channel can number frames from the
//! application's send path and from transport threads answering joins without
//! taking a lock.

use std::sync::atomic::{AtomicU64, Ordering};

/// A thread-safe, monotonically increasing counter for frame sequence numbers.
///
/// Starts at 0 and wraps from `u64::MAX` back to 0 without panicking.
///
/// # Examples
///
/// ```rust
/// use groupchat_core::protocol::SequenceCounter;
///
/// let counter = SequenceCounter::new();
/// assert_eq!(counter.next(), 0);
/// assert_eq!(counter.next(), 1);
/// ```
#[derive(Debug)]
pub struct SequenceCounter {
    inner: AtomicU64,
}

impl SequenceCounter {
    /// Creates a new counter starting at 0.
    pub fn new() -> Self {
        Self {
            inner: AtomicU64::new(0),
        }
    }

    /// Returns the next sequence number and atomically increments the counter.
    ///
    /// `Ordering::Relaxed` is enough: the value labels frames, it does not
    /// publish other memory.
    pub fn next(&self) -> u64 {
        self.inner.fetch_add(1, Ordering::Relaxed)
    }

    /// Returns the current value without incrementing.
    pub fn current(&self) -> u64 {
        self.inner.load(Ordering::Relaxed)
    }
}

impl Default for SequenceCounter {
    fn default() -> Self {
        Self::new()
    }
}
