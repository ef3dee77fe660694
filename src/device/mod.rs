//! SIMT execution model for the ROMix core
//!
//! A launch is a grid of execution blocks. Each block holds
//! `groups_per_block` lock-step thread-groups of 32 lanes; every
//! thread-group carries two work units (16 lanes each). Thread-groups are
//! paired and each pair shares one staging buffer under a pair mutex.
//!
//! On the host, a thread-group runs as one OS thread and lane-level work is
//! expressed as loops over lanes. Blocks are handed to a bounded number of
//! resident block slots, mirroring how a device keeps only a few blocks in
//! flight per multiprocessor.

mod fill;
pub mod layout;
pub mod memory;
mod mix;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use tracing::debug;

use crate::mutex::{Backoff, PairMutexArray};
use crate::salsa::{block_mix, SUB_BLOCK_WORDS};
use layout::{
    lane_transaction, LaunchGeometry, LANES_PER_GROUP, LANES_PER_LANE_GROUP, LANE_GROUPS_PER_GROUP,
    WIDE_WORDS,
};
use memory::{DeviceBuffer, ScratchPool};

/// Kernel selected for a launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Fill,
    Mix,
}

impl Phase {
    pub fn name(self) -> &'static str {
        match self {
            Phase::Fill => "fill",
            Phase::Mix => "mix",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceConfig {
    /// Execution blocks in flight at once.
    pub resident_blocks: usize,
    /// Spin policy for pair mutex acquisition.
    pub backoff: Backoff,
    /// Spin hints burned by odd thread-groups on every iteration outside
    /// the critical section. Shifts pair interleaving without changing
    /// results.
    pub stagger_spins: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            resident_blocks: thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            backoff: Backoff::default(),
            stagger_spins: 0,
        }
    }
}

/// Per-lane registers of a thread-group: lane `16 * h + k` holds `b[h][k]`
/// and `c[h][k]` of lane-group `h`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct GroupRegisters {
    pub b: [[u32; SUB_BLOCK_WORDS]; LANE_GROUPS_PER_GROUP],
    pub c: [[u32; SUB_BLOCK_WORDS]; LANE_GROUPS_PER_GROUP],
}

impl GroupRegisters {
    /// `mix(B, C); mix(C, B)` on both lane-groups.
    #[inline]
    pub fn block_mix(&mut self) {
        for (b, c) in self.b.iter_mut().zip(self.c.iter_mut()) {
            block_mix(b, c);
        }
    }

    /// Word `word` (0..32) of lane-group `h`'s logical state.
    #[inline]
    pub fn word(&self, h: usize, word: usize) -> u32 {
        if word < SUB_BLOCK_WORDS {
            self.b[h][word]
        } else {
            self.c[h][word - SUB_BLOCK_WORDS]
        }
    }
}

/// Everything one thread-group needs while running a phase.
pub(crate) struct GroupContext<'a> {
    pub geometry: &'a LaunchGeometry,
    pub block: usize,
    pub group: usize,
    pub scratch: &'a ScratchPool,
    pub staging: &'a DeviceBuffer,
    pub mutexes: &'a PairMutexArray,
    pub backoff: Backoff,
    pub stagger_spins: u32,
}

impl GroupContext<'_> {
    #[inline]
    pub fn work_unit(&self, h: usize) -> usize {
        self.geometry.work_unit(self.block, self.group, h)
    }

    #[inline]
    pub fn staging_offset(&self, h: usize) -> usize {
        self.geometry.staging_offset(self.group, h)
    }

    /// Issued by lane 0 on behalf of the whole group.
    #[inline]
    pub fn lock(&self) {
        self.mutexes
            .acquire(self.geometry.mutex_index(self.block, self.group), self.backoff);
    }

    #[inline]
    pub fn unlock(&self) {
        self.mutexes
            .release(self.geometry.mutex_index(self.block, self.group));
    }

    /// Register-only mixing step, run outside the critical section.
    #[inline]
    pub fn compute(&self, regs: &mut GroupRegisters) {
        regs.block_mix();
        if self.group % 2 == 1 {
            for _ in 0..self.stagger_spins {
                std::hint::spin_loop();
            }
        }
    }

    /// Registers -> staging, B then C, one word per lane.
    pub fn stage_registers(&self, regs: &GroupRegisters) {
        for half in 0..2 {
            for lane in 0..LANES_PER_GROUP {
                let (h, k) = (lane / LANES_PER_LANE_GROUP, lane % LANES_PER_LANE_GROUP);
                let (value, word) = if half == 0 {
                    (regs.b[h][k], k)
                } else {
                    (regs.c[h][k], SUB_BLOCK_WORDS + k)
                };
                self.staging.store(self.staging_offset(h) + word, value);
            }
        }
    }

    /// Staging -> registers, one word per lane.
    pub fn unstage_registers(&self, regs: &mut GroupRegisters) {
        for lane in 0..LANES_PER_GROUP {
            let (h, k) = (lane / LANES_PER_LANE_GROUP, lane % LANES_PER_LANE_GROUP);
            let base = self.staging_offset(h);
            regs.b[h][k] = self.staging.load(base + k);
            regs.c[h][k] = self.staging.load(base + SUB_BLOCK_WORDS + k);
        }
    }

    /// Staging -> scratchpad slot, one wide transaction per lane.
    pub fn flush_staging(&self, slot: usize) {
        for lane in 0..LANES_PER_GROUP {
            let (h, word) = lane_transaction(lane);
            let value = self.staging.load_wide(self.staging_offset(h) + word);
            self.scratch
                .words()
                .store_wide(self.scratch.slot_offset(self.work_unit(h), slot) + word, value);
        }
    }
}

/// Host model of one accelerator.
#[derive(Debug, Clone)]
pub struct Device {
    config: DeviceConfig,
}

impl Device {
    pub fn new(config: DeviceConfig) -> Self {
        Self { config }
    }

    /// Run one phase over every block of `geometry`. `io` is the input
    /// buffer for Fill and the output buffer for Mix. Callers validate the
    /// launch beforehand; nothing here can fail.
    pub fn run_phase(
        &self,
        phase: Phase,
        geometry: &LaunchGeometry,
        io: &DeviceBuffer,
        scratch: &ScratchPool,
        mutexes: &PairMutexArray,
    ) {
        debug_assert_eq!(io.len(), geometry.state_words());
        debug_assert!(scratch.table().len() >= geometry.work_units());
        debug_assert_eq!(mutexes.len(), geometry.mutex_count());

        let resident = self.config.resident_blocks.clamp(1, geometry.blocks());
        let next_block = AtomicUsize::new(0);

        debug!(
            phase = phase.name(),
            blocks = geometry.blocks(),
            groups_per_block = geometry.groups_per_block(),
            resident,
            "launching phase"
        );

        thread::scope(|scope| {
            for _ in 0..resident {
                scope.spawn(|| {
                    // On-chip staging memory of this slot, reused by every
                    // block it executes.
                    let staging = DeviceBuffer::zeroed(geometry.staging_words_per_block());
                    loop {
                        let block = next_block.fetch_add(1, Ordering::Relaxed);
                        if block >= geometry.blocks() {
                            break;
                        }
                        self.run_block(phase, geometry, block, io, scratch, &staging, mutexes);
                    }
                });
            }
        });
    }

    #[allow(clippy::too_many_arguments)]
    fn run_block(
        &self,
        phase: Phase,
        geometry: &LaunchGeometry,
        block: usize,
        io: &DeviceBuffer,
        scratch: &ScratchPool,
        staging: &DeviceBuffer,
        mutexes: &PairMutexArray,
    ) {
        thread::scope(|scope| {
            for group in 0..geometry.groups_per_block() {
                let ctx = GroupContext {
                    geometry,
                    block,
                    group,
                    scratch,
                    staging,
                    mutexes,
                    backoff: self.config.backoff,
                    stagger_spins: self.config.stagger_spins,
                };
                scope.spawn(move || match phase {
                    Phase::Fill => fill::fill_group(&ctx, io),
                    Phase::Mix => mix::mix_group(&ctx, io),
                });
            }
        });
    }
}

/// Wide transaction `lane` moves between a state buffer and the registers.
#[inline]
pub(crate) fn state_offset(ctx: &GroupContext<'_>, lane: usize) -> (usize, usize, usize) {
    let (h, word) = lane_transaction(lane);
    (
        h,
        word,
        ctx.work_unit(h) * layout::WORK_UNIT_WORDS + word,
    )
}

const _: () = assert!(LANES_PER_GROUP * WIDE_WORDS == LANE_GROUPS_PER_GROUP * layout::WORK_UNIT_WORDS);

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::device::layout::{STAGING_PAIR_WORDS, WORK_UNIT_WORDS};

    /// Single-block context with its own buffers.
    pub(crate) struct Harness {
        pub geometry: LaunchGeometry,
        pub scratch: ScratchPool,
        pub staging: DeviceBuffer,
        pub mutexes: PairMutexArray,
    }

    impl Harness {
        pub fn new(groups_per_block: usize) -> Self {
            let geometry = LaunchGeometry::new(groups_per_block, 1).unwrap();
            Self {
                scratch: ScratchPool::contiguous(geometry.work_units()).unwrap(),
                staging: DeviceBuffer::zeroed(geometry.staging_words_per_block()),
                mutexes: PairMutexArray::new(geometry.mutex_count()),
                geometry,
            }
        }

        pub fn context(&self, group: usize) -> GroupContext<'_> {
            GroupContext {
                geometry: &self.geometry,
                block: 0,
                group,
                scratch: &self.scratch,
                staging: &self.staging,
                mutexes: &self.mutexes,
                backoff: Backoff::default(),
                stagger_spins: 0,
            }
        }
    }

    #[test]
    fn test_stage_unstage_roundtrip() {
        let harness = Harness::new(2);
        let ctx = harness.context(1);

        let mut regs = GroupRegisters::default();
        for h in 0..LANE_GROUPS_PER_GROUP {
            for k in 0..SUB_BLOCK_WORDS {
                regs.b[h][k] = (h * 100 + k) as u32;
                regs.c[h][k] = (h * 100 + 50 + k) as u32;
            }
        }

        ctx.stage_registers(&regs);
        assert_eq!(harness.staging.load(ctx.staging_offset(1) + 16), 150);

        let mut back = GroupRegisters::default();
        ctx.unstage_registers(&mut back);
        assert_eq!(back, regs);
    }

    #[test]
    fn test_flush_staging_writes_both_units() {
        let harness = Harness::new(1);
        let ctx = harness.context(0);
        for w in 0..STAGING_PAIR_WORDS {
            harness.staging.store(w, w as u32 + 1);
        }

        ctx.flush_staging(7);

        let first = harness.scratch.read_slot(ctx.work_unit(0), 7);
        let second = harness.scratch.read_slot(ctx.work_unit(1), 7);
        assert_eq!(first[0], 1);
        assert_eq!(first[WORK_UNIT_WORDS - 1], WORK_UNIT_WORDS as u32);
        assert_eq!(second[0], ctx.staging_offset(1) as u32 + 1);
    }

    #[test]
    fn test_register_word_view() {
        let mut regs = GroupRegisters::default();
        regs.b[1][3] = 11;
        regs.c[1][3] = 22;
        assert_eq!(regs.word(1, 3), 11);
        assert_eq!(regs.word(1, 19), 22);
    }
}
