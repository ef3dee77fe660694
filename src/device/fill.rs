//! Scratchpad fill kernel
//!
//! Writes slots 0..1024 of every work unit's scratchpad: slot 0 is the
//! input state, slot i is the state after i BlockMix applications. The
//! pair lock is dropped around each register-only mix so the partner group
//! can stage while this one computes.

use super::layout::SCRATCH_SLOTS;
use super::memory::DeviceBuffer;
use super::{state_offset, GroupContext, GroupRegisters};
use crate::device::layout::LANES_PER_GROUP;

pub(crate) fn fill_group(ctx: &GroupContext<'_>, input: &DeviceBuffer) {
    let mut regs = GroupRegisters::default();

    ctx.lock();
    for lane in 0..LANES_PER_GROUP {
        let (h, word, src) = state_offset(ctx, lane);
        let value = input.load_wide(src);
        ctx.scratch
            .words()
            .store_wide(ctx.scratch.slot_offset(ctx.work_unit(h), 0) + word, value);
        ctx.staging.store_wide(ctx.staging_offset(h) + word, value);
    }
    ctx.unstage_registers(&mut regs);

    for slot in 1..SCRATCH_SLOTS {
        ctx.unlock();
        ctx.compute(&mut regs);
        ctx.lock();
        ctx.stage_registers(&regs);
        ctx.flush_staging(slot);
    }
    ctx.unlock();
}
