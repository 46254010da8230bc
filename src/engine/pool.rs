//! Accounting for columnar memory held by payload elements.
//!
//! Arrow buffers are allocated by the global allocator, so the pool does not
//! allocate anything itself. Elements take a `Reservation` for each batch
//! they own; the reservation is returned to the pool when the element is
//! dropped (on tree flush).

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Default)]
struct PoolInner {
    allocated: AtomicUsize,
    peak: AtomicUsize,
}

/// Shared byte counter. Clones observe the same totals.
#[derive(Debug, Clone, Default)]
pub struct MemoryPool {
    inner: Arc<PoolInner>,
}

impl MemoryPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account `bytes` until the returned reservation is dropped.
    #[must_use]
    pub fn reserve(&self, bytes: usize) -> Reservation {
        self.grow(bytes);
        Reservation {
            pool: self.clone(),
            bytes,
        }
    }

    pub fn total_allocated_bytes(&self) -> usize {
        self.inner.allocated.load(Ordering::Relaxed)
    }

    /// Highest total seen since the pool was created.
    pub fn peak_allocated_bytes(&self) -> usize {
        self.inner.peak.load(Ordering::Relaxed)
    }

    fn grow(&self, bytes: usize) {
        let now = self.inner.allocated.fetch_add(bytes, Ordering::Relaxed) + bytes;
        self.inner.peak.fetch_max(now, Ordering::Relaxed);
    }

    fn shrink(&self, bytes: usize) {
        self.inner.allocated.fetch_sub(bytes, Ordering::Relaxed);
    }
}

/// RAII share of a `MemoryPool`.
#[derive(Debug)]
pub struct Reservation {
    pool: MemoryPool,
    bytes: usize,
}

impl Reservation {
    pub fn size(&self) -> usize {
        self.bytes
    }

    /// Change the reserved amount in place.
    pub fn resize(&mut self, bytes: usize) {
        if bytes > self.bytes {
            self.pool.grow(bytes - self.bytes);
        } else {
            self.pool.shrink(self.bytes - bytes);
        }
        self.bytes = bytes;
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        self.pool.shrink(self.bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reservations_release_on_drop() {
        let pool = MemoryPool::new();
        let a = pool.reserve(100);
        {
            let _b = pool.clone().reserve(50);
            assert_eq!(pool.total_allocated_bytes(), 150);
        }
        assert_eq!(pool.total_allocated_bytes(), 100);
        drop(a);
        assert_eq!(pool.total_allocated_bytes(), 0);
        assert_eq!(pool.peak_allocated_bytes(), 150);
    }

    #[test]
    fn resize_moves_the_total() {
        let pool = MemoryPool::new();
        let mut r = pool.reserve(10);
        r.resize(40);
        assert_eq!(pool.total_allocated_bytes(), 40);
        r.resize(5);
        assert_eq!(pool.total_allocated_bytes(), 5);
        assert_eq!(r.size(), 5);
    }
}
