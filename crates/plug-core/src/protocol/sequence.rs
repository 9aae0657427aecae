//! Thread-safe sequence counter for frame numbering.
//!
//! Every frame carries a sequence number so a reply can be matched to the
//! request that caused it.  Plugs echo the request's sequence number in their
//! reply frame.

use std::sync::atomic::{AtomicU32, Ordering};

/// A thread-safe, monotonically increasing counter for frame sequence numbers.
///
/// Starts at 1 (plugs treat 0 as "unsolicited") and wraps from `u32::MAX`
/// back to 1.
///
/// # Examples
///
/// ```rust
/// use plug_core::protocol::SequenceCounter;
///
/// let counter = SequenceCounter::new();
/// assert_eq!(counter.next(), 1);
/// assert_eq!(counter.next(), 2);
/// ```
#[derive(Debug)]
pub struct SequenceCounter {
    inner: AtomicU32,
}

impl SequenceCounter {
    /// Creates a new counter whose first value is 1.
    pub fn new() -> Self {
        Self {
            inner: AtomicU32::new(1),
        }
    }

    /// Returns the next sequence number, skipping 0 on wrap-around.
    pub fn next(&self) -> u32 {
        loop {
            let value = self.inner.fetch_add(1, Ordering::Relaxed);
            if value != 0 {
                return value;
            }
        }
    }
}

impl Default for SequenceCounter {
    fn default() -> Self {
        Self::new()
    }
}
