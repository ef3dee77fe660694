//! Launch geometry and the pure indexing functions shared by Fill and Mix

use crate::error::LaunchError;

/// Slots in one scratchpad (scrypt N).
pub const SCRATCH_SLOTS: usize = 1024;
/// Words of scrypt state per work unit (r = 1).
pub const WORK_UNIT_WORDS: usize = 32;
/// Words in one scratchpad region.
pub const SCRATCH_REGION_WORDS: usize = SCRATCH_SLOTS * WORK_UNIT_WORDS;

/// Lock-step lanes per thread-group.
pub const LANES_PER_GROUP: usize = 32;
/// Lanes cooperating on one work unit: one per word of a sub-block.
pub const LANES_PER_LANE_GROUP: usize = 16;
/// Work units packed into one thread-group.
pub const LANE_GROUPS_PER_GROUP: usize = LANES_PER_GROUP / LANES_PER_LANE_GROUP;

/// Words moved by one wide transaction.
pub const WIDE_WORDS: usize = 2;
/// Wide transactions needed to move one work unit.
pub const TRANSACTIONS_PER_UNIT: usize = WORK_UNIT_WORDS / WIDE_WORDS;

/// Padding after each work unit in a staging buffer, so consecutive units
/// start on different wide banks.
pub const STAGING_PAD_WORDS: usize = WIDE_WORDS;
pub const STAGING_UNIT_STRIDE: usize = WORK_UNIT_WORDS + STAGING_PAD_WORDS;
/// One staging buffer holds a single thread-group's state and is shared by
/// both groups of a pair.
pub const STAGING_PAIR_WORDS: usize = LANE_GROUPS_PER_GROUP * STAGING_UNIT_STRIDE;

pub const MIN_GROUPS_PER_BLOCK: usize = 1;
pub const MAX_GROUPS_PER_BLOCK: usize = 24;

/// Validated shape of one launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchGeometry {
    groups_per_block: usize,
    blocks: usize,
}

impl LaunchGeometry {
    pub fn new(groups_per_block: usize, blocks: usize) -> Result<Self, LaunchError> {
        if !(MIN_GROUPS_PER_BLOCK..=MAX_GROUPS_PER_BLOCK).contains(&groups_per_block) {
            return Err(LaunchError::UnsupportedGroupCount {
                requested: groups_per_block,
                min: MIN_GROUPS_PER_BLOCK,
                max: MAX_GROUPS_PER_BLOCK,
            });
        }
        if blocks == 0 {
            return Err(LaunchError::EmptyLaunch);
        }
        // Scratch is the largest allocation; if its byte size fits, every
        // derived count does too.
        blocks
            .checked_mul(groups_per_block * LANE_GROUPS_PER_GROUP)
            .and_then(|units| units.checked_mul(SCRATCH_REGION_WORDS))
            .and_then(|words| words.checked_mul(std::mem::size_of::<u32>()))
            .ok_or_else(|| {
                LaunchError::Resource(format!(
                    "{blocks} blocks of {groups_per_block} groups overflow the scratch address space"
                ))
            })?;
        Ok(Self {
            groups_per_block,
            blocks,
        })
    }

    pub fn groups_per_block(&self) -> usize {
        self.groups_per_block
    }

    pub fn blocks(&self) -> usize {
        self.blocks
    }

    /// An odd group count leaves the last group without a partner; it still
    /// owns a pair slot.
    pub fn pairs_per_block(&self) -> usize {
        self.groups_per_block.div_ceil(2)
    }

    pub fn work_units_per_block(&self) -> usize {
        self.groups_per_block * LANE_GROUPS_PER_GROUP
    }

    pub fn work_units(&self) -> usize {
        self.blocks * self.work_units_per_block()
    }

    pub fn state_words(&self) -> usize {
        self.work_units() * WORK_UNIT_WORDS
    }

    /// Words of contiguous scratch for every work unit of the launch.
    pub fn scratch_words(&self) -> usize {
        self.work_units() * SCRATCH_REGION_WORDS
    }

    pub fn mutex_count(&self) -> usize {
        self.blocks * self.pairs_per_block()
    }

    pub fn staging_words_per_block(&self) -> usize {
        self.pairs_per_block() * STAGING_PAIR_WORDS
    }

    /// Work-unit index of `lane_group` in thread-group `group` of `block`.
    #[inline]
    pub fn work_unit(&self, block: usize, group: usize, lane_group: usize) -> usize {
        (block * self.groups_per_block + group) * LANE_GROUPS_PER_GROUP + lane_group
    }

    /// Global mutex index of the pair containing `group`.
    #[inline]
    pub fn mutex_index(&self, block: usize, group: usize) -> usize {
        block * self.pairs_per_block() + group / 2
    }

    /// Word offset of `lane_group`'s state inside the block's staging memory.
    /// Both groups of a pair resolve to the same words.
    #[inline]
    pub fn staging_offset(&self, group: usize, lane_group: usize) -> usize {
        (group / 2) * STAGING_PAIR_WORDS + lane_group * STAGING_UNIT_STRIDE
    }
}

/// Lane-group and word covered by the wide transaction issued by `lane`.
/// The 32 lanes of a group together move both work units exactly once.
#[inline]
pub fn lane_transaction(lane: usize) -> (usize, usize) {
    (
        lane / TRANSACTIONS_PER_UNIT,
        (lane % TRANSACTIONS_PER_UNIT) * WIDE_WORDS,
    )
}

/// Scratchpad index derived from the first word of sub-block C.
#[inline]
pub fn integerify(c0: u32) -> usize {
    c0 as usize & (SCRATCH_SLOTS - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_geometry_rejects_out_of_range() {
        for bad in [0, MAX_GROUPS_PER_BLOCK + 1] {
            let err = LaunchGeometry::new(bad, 4).unwrap_err();
            assert!(matches!(
                err,
                LaunchError::UnsupportedGroupCount { requested, .. } if requested == bad
            ));
        }
        assert_eq!(LaunchGeometry::new(4, 0), Err(LaunchError::EmptyLaunch));
    }

    #[test]
    fn test_geometry_rejects_overflowing_sizes() {
        for (groups, blocks) in [(24, usize::MAX / 16), (1, usize::MAX), (1, usize::MAX / 8)] {
            let err = LaunchGeometry::new(groups, blocks).unwrap_err();
            assert!(matches!(err, LaunchError::Resource(_)), "{groups}x{blocks}: {err}");
        }

        let geometry = LaunchGeometry::new(24, 1000).unwrap();
        assert_eq!(geometry.scratch_words(), 48_000 * SCRATCH_REGION_WORDS);
    }

    #[test]
    fn test_work_units_are_unique_and_dense() {
        let geometry = LaunchGeometry::new(5, 3).unwrap();
        let mut seen = HashSet::new();
        for block in 0..geometry.blocks() {
            for group in 0..geometry.groups_per_block() {
                for lane_group in 0..LANE_GROUPS_PER_GROUP {
                    assert!(seen.insert(geometry.work_unit(block, group, lane_group)));
                }
            }
        }
        assert_eq!(seen.len(), geometry.work_units());
        assert_eq!(seen.into_iter().max(), Some(geometry.work_units() - 1));
    }

    #[test]
    fn test_pairs_share_mutex_and_staging() {
        let geometry = LaunchGeometry::new(5, 2).unwrap();
        assert_eq!(geometry.pairs_per_block(), 3);
        assert_eq!(geometry.mutex_count(), 6);

        assert_eq!(geometry.mutex_index(1, 2), geometry.mutex_index(1, 3));
        assert_ne!(geometry.mutex_index(1, 1), geometry.mutex_index(1, 2));
        assert_eq!(geometry.mutex_index(1, 4), 5);

        assert_eq!(geometry.staging_offset(2, 1), geometry.staging_offset(3, 1));
        assert_eq!(
            geometry.staging_offset(4, 1) + STAGING_UNIT_STRIDE,
            geometry.staging_words_per_block()
        );
    }

    #[test]
    fn test_lane_transactions_cover_group_once() {
        let mut covered = HashSet::new();
        for lane in 0..LANES_PER_GROUP {
            let (lane_group, word) = lane_transaction(lane);
            assert!(lane_group < LANE_GROUPS_PER_GROUP);
            assert_eq!(word % WIDE_WORDS, 0);
            for w in word..word + WIDE_WORDS {
                assert!(covered.insert((lane_group, w)));
            }
        }
        assert_eq!(covered.len(), LANE_GROUPS_PER_GROUP * WORK_UNIT_WORDS);
    }

    #[test]
    fn test_integerify_truncates() {
        assert_eq!(integerify(0), 0);
        assert_eq!(integerify(1023), 1023);
        assert_eq!(integerify(1024), 0);
        assert_eq!(integerify(u32::MAX), 1023);
    }
}
