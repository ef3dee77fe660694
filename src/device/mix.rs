//! Scratchpad mix kernel
//!
//! 1024 data-dependent reads of the scratchpad written by the fill kernel,
//! each merged into the state before a BlockMix. The result is streamed to
//! the output buffer.

use super::layout::{integerify, LANE_GROUPS_PER_GROUP, LANES_PER_GROUP, SCRATCH_SLOTS};
use super::memory::DeviceBuffer;
use super::{state_offset, GroupContext, GroupRegisters};
use crate::device::layout::lane_transaction;

pub(crate) fn mix_group(ctx: &GroupContext<'_>, output: &DeviceBuffer) {
    let mut regs = GroupRegisters::default();

    ctx.lock();
    for lane in 0..LANES_PER_GROUP {
        let (h, word) = lane_transaction(lane);
        let value = ctx
            .scratch
            .words()
            .load_wide(ctx.scratch.slot_offset(ctx.work_unit(h), SCRATCH_SLOTS - 1) + word);
        ctx.staging.store_wide(ctx.staging_offset(h) + word, value);
    }
    ctx.unstage_registers(&mut regs);
    ctx.unlock();
    ctx.compute(&mut regs);
    ctx.lock();

    for _ in 0..SCRATCH_SLOTS {
        merge_scratch_slot(ctx, &mut regs);
        ctx.unlock();
        ctx.compute(&mut regs);
        ctx.lock();
    }
    ctx.unlock();

    for lane in 0..LANES_PER_GROUP {
        let (h, word, dst) = state_offset(ctx, lane);
        output.store_wide(dst, [regs.word(h, word), regs.word(h, word + 1)]);
    }
}

/// Stage the registers, XOR in the slot selected by integerify and fold the
/// result back. Caller holds the pair lock.
pub(super) fn merge_scratch_slot(ctx: &GroupContext<'_>, regs: &mut GroupRegisters) {
    ctx.stage_registers(regs);

    // Lane 0 of each lane-group owns C[0]; the index is broadcast to the
    // other 15 lanes.
    let slots: [usize; LANE_GROUPS_PER_GROUP] = std::array::from_fn(|h| integerify(regs.c[h][0]));

    for lane in 0..LANES_PER_GROUP {
        let (h, word) = lane_transaction(lane);
        let src = ctx.scratch.slot_offset(ctx.work_unit(h), slots[h]) + word;
        let dst = ctx.staging_offset(h) + word;

        let v = ctx.scratch.words().load_wide_streaming(src);
        let s = ctx.staging.load_wide(dst);
        ctx.staging.store_wide(dst, [s[0] ^ v[0], s[1] ^ v[1]]);
    }

    ctx.unstage_registers(regs);
}
