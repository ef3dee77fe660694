//! Pair mutexes guarding the shared staging buffers
//!
//! One flag per (execution block, thread-group pair). Only the designated
//! lane of a thread-group touches the flag, so locking is per group, never
//! per lane. There is no owner tracking: a group must never acquire a pair
//! it already holds.

use std::sync::atomic::{AtomicU32, Ordering};

const FREE: u32 = 0;
const HELD: u32 = 1;

/// Bounded exponential spin policy used while a pair is held by the partner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    /// Spin hints issued after the first failed attempt.
    pub min_spins: u32,
    /// Ceiling for the doubling spin count. Once reached, the waiter also
    /// yields its OS thread between attempts.
    pub max_spins: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            min_spins: Self::DEFAULT_MIN_SPINS,
            max_spins: Self::DEFAULT_MAX_SPINS,
        }
    }
}

impl Backoff {
    pub const DEFAULT_MIN_SPINS: u32 = 4;
    pub const DEFAULT_MAX_SPINS: u32 = 1024;

    pub fn new(min_spins: u32, max_spins: u32) -> Self {
        let min_spins = min_spins.max(1);
        Self {
            min_spins,
            max_spins: max_spins.max(min_spins),
        }
    }

    /// Spin count after `spins` failed to see the pair free.
    #[inline]
    pub fn grow(&self, spins: u32) -> u32 {
        spins.saturating_mul(2).min(self.max_spins)
    }
}

/// Caller-allocated mutex array, zeroed before every fill/mix cycle.
#[derive(Debug)]
pub struct PairMutexArray {
    flags: Box<[AtomicU32]>,
}

impl PairMutexArray {
    /// All flags start free.
    pub fn new(len: usize) -> Self {
        Self {
            flags: (0..len).map(|_| AtomicU32::new(FREE)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    /// True when no pair is held.
    pub fn is_zeroed(&self) -> bool {
        self.flags.iter().all(|f| f.load(Ordering::Acquire) == FREE)
    }

    pub fn reset(&self) {
        for flag in self.flags.iter() {
            flag.store(FREE, Ordering::Release);
        }
    }

    /// Spin until the flag for `pair_id` moves free -> held.
    pub fn acquire(&self, pair_id: usize, backoff: Backoff) {
        let flag = &self.flags[pair_id];
        let mut spins = backoff.min_spins;
        loop {
            if flag
                .compare_exchange_weak(FREE, HELD, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                return;
            }

            // Wait on plain loads so the waiter does not keep pulling the
            // line exclusive while the partner works.
            while flag.load(Ordering::Relaxed) != FREE {
                for _ in 0..spins {
                    std::hint::spin_loop();
                }
                if spins >= backoff.max_spins {
                    std::thread::yield_now();
                } else {
                    spins = backoff.grow(spins);
                }
            }
        }
    }

    /// Reset the flag for `pair_id` to free.
    pub fn release(&self, pair_id: usize) {
        let prev = self.flags[pair_id].swap(FREE, Ordering::Release);
        debug_assert_eq!(prev, HELD, "pair {pair_id} released while free");
    }

    /// Raw flag value, for inspection after a launch.
    pub fn state(&self, pair_id: usize) -> u32 {
        self.flags[pair_id].load(Ordering::Acquire)
    }
}
