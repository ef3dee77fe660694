//! Single-threaded ROMix, used to check the SIMT engine
//!
//! Straight from the scrypt definition with N = 1024 and r = 1:
//!
//! ```text
//! for i in 0..N: V[i] = X; X = BlockMix(X)
//! for i in 0..N: j = Integerify(X) mod N; X = BlockMix(X ^ V[j])
//! ```

use crate::device::layout::{integerify, SCRATCH_SLOTS, WORK_UNIT_WORDS};
use crate::salsa::{block_mix, SUB_BLOCK_WORDS};

pub type State = [u32; WORK_UNIT_WORDS];

fn split(state: &State) -> ([u32; SUB_BLOCK_WORDS], [u32; SUB_BLOCK_WORDS]) {
    let mut b = [0u32; SUB_BLOCK_WORDS];
    let mut c = [0u32; SUB_BLOCK_WORDS];
    b.copy_from_slice(&state[..SUB_BLOCK_WORDS]);
    c.copy_from_slice(&state[SUB_BLOCK_WORDS..]);
    (b, c)
}

fn join(b: &[u32; SUB_BLOCK_WORDS], c: &[u32; SUB_BLOCK_WORDS], state: &mut State) {
    state[..SUB_BLOCK_WORDS].copy_from_slice(b);
    state[SUB_BLOCK_WORDS..].copy_from_slice(c);
}

/// The 1024 scratchpad slots produced from `state`.
pub fn scratchpad(state: &State) -> Vec<State> {
    let (mut b, mut c) = split(state);
    let mut v = Vec::with_capacity(SCRATCH_SLOTS);
    let mut slot = [0u32; WORK_UNIT_WORDS];
    for _ in 0..SCRATCH_SLOTS {
        join(&b, &c, &mut slot);
        v.push(slot);
        block_mix(&mut b, &mut c);
    }
    v
}

/// Run ROMix on `state` in place.
pub fn romix(state: &mut State) {
    let v = scratchpad(state);

    // The first phase ends one BlockMix past the last stored slot.
    let (mut b, mut c) = split(&v[SCRATCH_SLOTS - 1]);
    block_mix(&mut b, &mut c);

    for _ in 0..SCRATCH_SLOTS {
        let j = integerify(c[0]);
        let (vb, vc) = split(&v[j]);
        for k in 0..SUB_BLOCK_WORDS {
            b[k] ^= vb[k];
            c[k] ^= vc[k];
        }
        block_mix(&mut b, &mut c);
    }

    join(&b, &c, state);
}
