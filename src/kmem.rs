use std::time::Instant;

use serde::Serialize;
use thiserror::Error;

/// A region handed out by the pool: an offset/length pair into the pool's
/// single backing buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolRegion {
    pub offset: usize,
    pub len: usize,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("memory pool exhausted (requested {requested}, available {available})")]
    OutOfMemory { requested: usize, available: usize },
    #[error("memory pool backing allocation of {0} bytes failed")]
    AllocationFailure(usize),
}

/// Point-in-time view of the pool counters.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct PoolStats {
    pub size: usize,
    pub used: usize,
    pub peak: usize,
    pub allocations: u64,
    pub frees: u64,
    pub avg_alloc_ns: f64,
    pub max_alloc_ns: u64,
    pub budget_overruns: u64,
}

/// Fixed-capacity bump arena. `used` only ever grows: `free` is a
/// statistics-only no-op, by contract, not omission.
#[derive(Debug)]
pub struct MemoryPool {
    buf: Vec<u8>,
    size: usize,
    used: usize,
    peak: usize,
    allocations: u64,
    frees: u64,
    avg_alloc_ns: f64,
    max_alloc_ns: u64,
    alloc_budget_ns: u64,
    budget_overruns: u64,
}

impl MemoryPool {
    pub fn init(pool_size: usize, alloc_budget_ns: u64) -> Result<Self, PoolError> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(pool_size)
            .map_err(|_| PoolError::AllocationFailure(pool_size))?;
        buf.resize(pool_size, 0);

        Ok(Self {
            buf,
            size: pool_size,
            used: 0,
            peak: 0,
            allocations: 0,
            frees: 0,
            avg_alloc_ns: 0.0,
            max_alloc_ns: 0,
            alloc_budget_ns,
            budget_overruns: 0,
        })
    }

    /// Bump-allocate `size` bytes. Fails without touching any counter when
    /// the request does not fit.
    pub fn alloc(&mut self, size: usize) -> Result<PoolRegion, PoolError> {
        let start = Instant::now();

        if self.used + size > self.size {
            return Err(PoolError::OutOfMemory {
                requested: size,
                available: self.size - self.used,
            });
        }

        let region = PoolRegion {
            offset: self.used,
            len: size,
        };
        self.used += size;
        if self.used > self.peak {
            self.peak = self.used;
        }
        self.allocations += 1;

        let duration_ns = start.elapsed().as_nanos() as u64;
        if duration_ns > self.max_alloc_ns {
            self.max_alloc_ns = duration_ns;
        }
        if duration_ns > self.alloc_budget_ns {
            self.budget_overruns += 1;
        }
        // Exact incremental mean over all successful allocations.
        self.avg_alloc_ns += (duration_ns as f64 - self.avg_alloc_ns) / self.allocations as f64;

        Ok(region)
    }

    /// The arena never reclaims space; only the free counter moves.
    pub fn free(&mut self, _region: PoolRegion) {
        self.frees += 1;
    }

    pub fn bytes(&self, region: PoolRegion) -> Option<&[u8]> {
        self.buf.get(region.offset..region.offset + region.len)
    }

    pub fn bytes_mut(&mut self, region: PoolRegion) -> Option<&mut [u8]> {
        self.buf.get_mut(region.offset..region.offset + region.len)
    }

    pub fn used(&self) -> usize {
        self.used
    }

    pub fn peak(&self) -> usize {
        self.peak
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            size: self.size,
            used: self.used,
            peak: self.peak,
            allocations: self.allocations,
            frees: self.frees,
            avg_alloc_ns: self.avg_alloc_ns,
            max_alloc_ns: self.max_alloc_ns,
            budget_overruns: self.budget_overruns,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn used_tracks_the_sum_of_successful_requests() {
        let mut pool = MemoryPool::init(256, 1_000_000).expect("pool init");
        let sizes = [16usize, 32, 64, 8];
        let mut total = 0;
        for size in sizes {
            let region = pool.alloc(size).expect("allocation fits");
            assert_eq!(region.len, size);
            total += size;
            assert_eq!(pool.used(), total);
        }
        assert_eq!(pool.peak(), total);
        assert!(pool.used() <= pool.size());
    }

    #[test]
    fn exhaustion_fails_exactly_at_the_boundary_and_leaves_used_unchanged() {
        let mut pool = MemoryPool::init(100, 1_000_000).expect("pool init");
        pool.alloc(60).expect("first fits");
        pool.alloc(40).expect("second fits exactly");

        let err = pool.alloc(1).expect_err("pool exhausted");
        assert_eq!(
            err,
            PoolError::OutOfMemory {
                requested: 1,
                available: 0,
            }
        );
        assert_eq!(pool.used(), 100);

        // No allocation beyond the boundary ever succeeds.
        assert!(pool.alloc(8).is_err());
        assert_eq!(pool.used(), 100);
    }

    #[test]
    fn oversized_request_does_not_move_used() {
        let mut pool = MemoryPool::init(64, 1_000_000).expect("pool init");
        pool.alloc(10).expect("fits");
        let err = pool.alloc(100).expect_err("does not fit");
        assert!(matches!(err, PoolError::OutOfMemory { requested: 100, .. }));
        assert_eq!(pool.used(), 10);
        assert_eq!(pool.stats().allocations, 1);
    }

    #[test]
    fn free_is_statistics_only() {
        let mut pool = MemoryPool::init(64, 1_000_000).expect("pool init");
        let region = pool.alloc(32).expect("fits");
        pool.free(region);
        assert_eq!(pool.used(), 32);
        assert_eq!(pool.stats().frees, 1);
    }

    #[test]
    fn regions_are_bounds_checked_views() {
        let mut pool = MemoryPool::init(16, 1_000_000).expect("pool init");
        let region = pool.alloc(8).expect("fits");
        pool.bytes_mut(region).expect("valid region")[0] = 7;
        assert_eq!(pool.bytes(region).expect("valid region")[0], 7);

        let bogus = PoolRegion {
            offset: 12,
            len: 8,
        };
        assert!(pool.bytes(bogus).is_none());
    }
}
