//! Device memory: word buffers shared by every thread-group of a launch
//!
//! Buffers are arrays of `AtomicU32` accessed with relaxed ordering. The
//! pair mutex and the phase boundaries provide all cross-group ordering.

use std::collections::TryReserveError;
use std::sync::atomic::{AtomicU32, Ordering};

use super::layout::{SCRATCH_REGION_WORDS, SCRATCH_SLOTS, WIDE_WORDS, WORK_UNIT_WORDS};
use crate::error::LaunchError;

/// Flat buffer of 32-bit words.
#[derive(Debug)]
pub struct DeviceBuffer {
    words: Box<[AtomicU32]>,
}

impl DeviceBuffer {
    pub fn zeroed(len: usize) -> Self {
        Self {
            words: (0..len).map(|_| AtomicU32::new(0)).collect(),
        }
    }

    /// Fallible allocation for large pools.
    pub fn try_zeroed(len: usize) -> Result<Self, TryReserveError> {
        let mut words = Vec::new();
        words.try_reserve_exact(len)?;
        words.extend((0..len).map(|_| AtomicU32::new(0)));
        Ok(Self {
            words: words.into_boxed_slice(),
        })
    }

    pub fn from_words(src: &[u32]) -> Self {
        Self {
            words: src.iter().map(|&w| AtomicU32::new(w)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    #[inline]
    pub fn load(&self, index: usize) -> u32 {
        self.words[index].load(Ordering::Relaxed)
    }

    #[inline]
    pub fn store(&self, index: usize, value: u32) {
        self.words[index].store(value, Ordering::Relaxed);
    }

    /// Two-word transaction. `index` must be wide-aligned.
    #[inline]
    pub fn load_wide(&self, index: usize) -> [u32; WIDE_WORDS] {
        debug_assert_eq!(index % WIDE_WORDS, 0);
        [self.load(index), self.load(index + 1)]
    }

    #[inline]
    pub fn store_wide(&self, index: usize, value: [u32; WIDE_WORDS]) {
        debug_assert_eq!(index % WIDE_WORDS, 0);
        self.store(index, value[0]);
        self.store(index + 1, value[1]);
    }

    /// Streaming read for data that will not be touched again soon
    /// (random scratchpad reads). Host memory has no cache bypass, so this
    /// is a plain wide load.
    #[inline]
    pub fn load_wide_streaming(&self, index: usize) -> [u32; WIDE_WORDS] {
        self.load_wide(index)
    }

    pub fn fill(&self, value: u32) {
        for word in self.words.iter() {
            word.store(value, Ordering::Relaxed);
        }
    }

    pub fn to_vec(&self) -> Vec<u32> {
        self.words
            .iter()
            .map(|w| w.load(Ordering::Relaxed))
            .collect()
    }
}

/// Constant table mapping a work unit's logical scratch region to its base
/// word offset in the pool. Populated once and reused across launches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScratchTable {
    bases: Vec<usize>,
}

impl ScratchTable {
    /// Regions laid out back to back.
    pub fn contiguous(regions: usize) -> Result<Self, LaunchError> {
        if regions.checked_mul(SCRATCH_REGION_WORDS).is_none() {
            return Err(LaunchError::Resource(format!(
                "{regions} scratch regions overflow the address space"
            )));
        }
        let mut bases = Vec::new();
        bases.try_reserve_exact(regions).map_err(|err| {
            LaunchError::Resource(format!("scratch table of {regions} regions: {err}"))
        })?;
        bases.extend((0..regions).map(|r| r * SCRATCH_REGION_WORDS));
        Ok(Self { bases })
    }

    /// Arbitrary base offsets. Every region must be wide-aligned, fit inside
    /// `pool_words` and not overlap any other region.
    pub fn from_bases(bases: Vec<usize>, pool_words: usize) -> Result<Self, LaunchError> {
        let mut sorted: Vec<(usize, usize)> = bases.iter().copied().enumerate().map(|(i, b)| (b, i)).collect();
        sorted.sort_unstable();

        for &(base, region) in &sorted {
            if base % WIDE_WORDS != 0 {
                return Err(LaunchError::ScratchTable(format!(
                    "region {region} base {base} is not aligned to {WIDE_WORDS} words"
                )));
            }
            let end = base.checked_add(SCRATCH_REGION_WORDS).unwrap_or(usize::MAX);
            if end > pool_words {
                return Err(LaunchError::ScratchTable(format!(
                    "region {region} [{base}, {end}) exceeds pool of {pool_words} words"
                )));
            }
        }
        for pair in sorted.windows(2) {
            let ((a_base, a), (b_base, b)) = (pair[0], pair[1]);
            if a_base + SCRATCH_REGION_WORDS > b_base {
                return Err(LaunchError::ScratchTable(format!(
                    "regions {a} and {b} overlap"
                )));
            }
        }

        Ok(Self { bases })
    }

    pub fn len(&self) -> usize {
        self.bases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bases.is_empty()
    }

    #[inline]
    pub fn base(&self, region: usize) -> usize {
        self.bases[region]
    }

    /// Words a pool needs to hold every region of this table.
    pub fn required_pool_words(&self) -> usize {
        self.bases
            .iter()
            .map(|b| b + SCRATCH_REGION_WORDS)
            .max()
            .unwrap_or(0)
    }
}

/// Pre-allocated scratch memory and the table addressing it.
#[derive(Debug)]
pub struct ScratchPool {
    words: DeviceBuffer,
    table: ScratchTable,
}

impl ScratchPool {
    /// Back-to-back regions for `work_units` work units. The pool is
    /// reserved before the table so an oversized request fails on the
    /// larger allocation first.
    pub fn contiguous(work_units: usize) -> Result<Self, LaunchError> {
        let pool_words = work_units
            .checked_mul(SCRATCH_REGION_WORDS)
            .ok_or_else(|| {
                LaunchError::Resource(format!(
                    "{work_units} scratch regions overflow the address space"
                ))
            })?;
        let words = allocate_pool(pool_words)?;
        let table = ScratchTable::contiguous(work_units)?;
        Ok(Self { words, table })
    }

    pub fn with_table(table: ScratchTable) -> Result<Self, LaunchError> {
        let words = allocate_pool(table.required_pool_words())?;
        Ok(Self { words, table })
    }

    pub fn table(&self) -> &ScratchTable {
        &self.table
    }

    pub fn words(&self) -> &DeviceBuffer {
        &self.words
    }

    /// Word offset of `slot` in the region of `work_unit`.
    #[inline]
    pub fn slot_offset(&self, work_unit: usize, slot: usize) -> usize {
        debug_assert!(slot < SCRATCH_SLOTS);
        self.table.base(work_unit) + slot * WORK_UNIT_WORDS
    }

    pub fn read_slot(&self, work_unit: usize, slot: usize) -> [u32; WORK_UNIT_WORDS] {
        let base = self.slot_offset(work_unit, slot);
        std::array::from_fn(|w| self.words.load(base + w))
    }
}

fn allocate_pool(pool_words: usize) -> Result<DeviceBuffer, LaunchError> {
    DeviceBuffer::try_zeroed(pool_words).map_err(|err| {
        LaunchError::Resource(format!(
            "scratch pool of {} MiB: {err}",
            pool_words.saturating_mul(4) >> 20
        ))
    })
}
