use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SyncError {
    #[error("lock held by owner {held_by}, release attempted by {attempted_by}")]
    NotOwner { held_by: u64, attempted_by: u64 },
    #[error("release of a lock that is not held")]
    NotHeld,
}

/// Busy-wait mutual exclusion for short critical sections. Tracks the owning
/// task so misuse surfaces as an error instead of silent corruption.
#[derive(Debug, Default)]
pub struct SpinLock {
    locked: AtomicBool,
    owner: AtomicU64,
}

impl SpinLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&self, owner: u64) {
        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            std::hint::spin_loop();
        }
        self.owner.store(owner, Ordering::Release);
    }

    pub fn try_acquire(&self, owner: u64) -> bool {
        if self
            .locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            self.owner.store(owner, Ordering::Release);
            true
        } else {
            false
        }
    }

    pub fn release(&self, owner: u64) -> Result<(), SyncError> {
        if !self.locked.load(Ordering::Acquire) {
            return Err(SyncError::NotHeld);
        }
        let held_by = self.owner.load(Ordering::Acquire);
        if held_by != owner {
            return Err(SyncError::NotOwner {
                held_by,
                attempted_by: owner,
            });
        }
        self.locked.store(false, Ordering::Release);
        Ok(())
    }

    pub fn owner(&self) -> Option<u64> {
        if self.locked.load(Ordering::Acquire) {
            Some(self.owner.load(Ordering::Acquire))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_release_cycle_tracks_ownership() {
        let lock = SpinLock::new();
        assert_eq!(lock.owner(), None);

        lock.acquire(7);
        assert_eq!(lock.owner(), Some(7));
        assert!(!lock.try_acquire(8));

        lock.release(7).expect("owner releases");
        assert_eq!(lock.owner(), None);
        assert!(lock.try_acquire(8));
    }

    #[test]
    fn release_by_non_owner_is_rejected() {
        let lock = SpinLock::new();
        lock.acquire(1);
        assert_eq!(
            lock.release(2),
            Err(SyncError::NotOwner {
                held_by: 1,
                attempted_by: 2,
            })
        );
        lock.release(1).expect("real owner releases");
        assert_eq!(lock.release(1), Err(SyncError::NotHeld));
    }
}
