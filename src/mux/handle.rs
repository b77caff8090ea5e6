//! Transaction handles and their allocator

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

/// Opaque key for a submitted transaction.
///
/// Handles are plain values with no ownership of their own; releasing the
/// transaction they point to is done through the multiplexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HttpHandle(u32);

impl HttpHandle {
    /// Never issued by [`HandleAllocator`]
    pub const INVALID: HttpHandle = HttpHandle(0);

    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }

    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }
}

impl Default for HttpHandle {
    fn default() -> Self {
        Self::INVALID
    }
}

impl fmt::Display for HttpHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lock-free monotonic handle source.
///
/// Values are unique until the 32-bit counter wraps; after `u32::MAX` the
/// sequence restarts at 1, skipping [`HttpHandle::INVALID`]. Whether a wrapped
/// value is still in use is checked by the registry, not here.
#[derive(Debug)]
pub struct HandleAllocator {
    last: AtomicU32,
}

impl HandleAllocator {
    pub fn new() -> Self {
        Self::starting_after(0)
    }

    /// The first handle issued is `last + 1` (or 1 on wraparound)
    pub fn starting_after(last: u32) -> Self {
        Self { last: AtomicU32::new(last) }
    }

    pub fn next(&self) -> HttpHandle {
        // fetch_update retries the CAS until it wins; the closure never fails
        let prev = match self
            .last
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| Some(successor(cur)))
        {
            Ok(prev) | Err(prev) => prev,
        };
        HttpHandle(successor(prev))
    }
}

impl Default for HandleAllocator {
    fn default() -> Self {
        Self::new()
    }
}

fn successor(cur: u32) -> u32 {
    if cur == u32::MAX {
        1
    } else {
        cur + 1
    }
}
