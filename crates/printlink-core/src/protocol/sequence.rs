//! Thread-safe sequence counter for Bambu command numbering.
//!
//! # What is a sequence id? (for beginners)
//!
//! Every command published to a Bambu printer carries a `sequence_id`.  The
//! printer echoes it back in its acknowledgement, which would let a client
//! match a reply to the request that caused it.  PrintLink does not
//! correlate replies; it only guarantees that ids from one counter are
//! unique and strictly increasing so that printer-side logs stay readable.
//!
//! # Thread safety
//!
//! The counter is an `AtomicU64`.  `fetch_add` reads and increments the value
//! as one indivisible step, so concurrent `next()` calls from a status poll
//! and a pause command can never hand out the same id.

use std::sync::atomic::{AtomicU64, Ordering};

/// A thread-safe, strictly increasing counter for command sequence ids.
///
/// The first id handed out is 1.  A counter only resets when a new one is
/// built; the Bambu adapter owns one for its whole lifetime, so ids keep
/// increasing across reconnects.
///
/// # Examples
///
/// ```rust
/// use printlink_core::protocol::SequenceCounter;
///
/// let counter = SequenceCounter::new();
/// assert_eq!(counter.next(), 1);
/// assert_eq!(counter.next(), 2);
/// ```
#[derive(Debug)]
pub struct SequenceCounter {
    /// The last id handed out (0 before the first call).
    last: AtomicU64,
}

impl SequenceCounter {
    pub fn new() -> Self {
        Self {
            last: AtomicU64::new(0),
        }
    }

    /// Returns the next sequence id.
    ///
    /// `Ordering::Relaxed` is enough: the ids order messages, they do not
    /// publish any other memory to other threads.
    pub fn next(&self) -> u64 {
        // `fetch_add` returns the value before the addition.
        self.last.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
    }

    /// Returns the last id handed out without advancing (0 if none yet).
    pub fn current(&self) -> u64 {
        self.last.load(Ordering::Relaxed)
    }
}

impl Default for SequenceCounter {
    fn default() -> Self {
        Self::new()
    }
}
