//! Salsa20/8 mixing transform
//!
//! The block mixer used by scrypt's BlockMix with r = 1. A work unit's
//! 32-word state is split into two 16-word sub-blocks, B and C, which are
//! mixed against each other symmetrically: `mix(B, C); mix(C, B)`.

/// Words in one sub-block (one Salsa20 matrix).
pub const SUB_BLOCK_WORDS: usize = 16;

/// Double-rounds applied by the core (8 rounds).
const DOUBLE_ROUNDS: usize = 4;

/// Quarter-round lanes for the column pass, as (a, b, c, d) matrix indices.
/// The row pass uses the transposed layout in [`ROWS`].
const COLUMNS: [[usize; 4]; 4] = [[0, 4, 8, 12], [5, 9, 13, 1], [10, 14, 2, 6], [15, 3, 7, 11]];
const ROWS: [[usize; 4]; 4] = [[0, 1, 2, 3], [5, 6, 7, 4], [10, 11, 8, 9], [15, 12, 13, 14]];

#[inline(always)]
fn quarter_round(x: &mut [u32; SUB_BLOCK_WORDS], [a, b, c, d]: [usize; 4]) {
    x[b] ^= x[a].wrapping_add(x[d]).rotate_left(7);
    x[c] ^= x[b].wrapping_add(x[a]).rotate_left(9);
    x[d] ^= x[c].wrapping_add(x[b]).rotate_left(13);
    x[a] ^= x[d].wrapping_add(x[c]).rotate_left(18);
}

/// Salsa20/8 core: 4 double-rounds followed by the feed-forward addition.
#[inline]
pub fn salsa20_8(block: &mut [u32; SUB_BLOCK_WORDS]) {
    let mut x = *block;
    for _ in 0..DOUBLE_ROUNDS {
        for lanes in COLUMNS {
            quarter_round(&mut x, lanes);
        }
        for lanes in ROWS {
            quarter_round(&mut x, lanes);
        }
    }
    for (out, mixed) in block.iter_mut().zip(x) {
        *out = out.wrapping_add(mixed);
    }
}

/// `b ^= c`, then Salsa20/8 over `b`.
#[inline]
pub fn mix(b: &mut [u32; SUB_BLOCK_WORDS], c: &[u32; SUB_BLOCK_WORDS]) {
    for (x, y) in b.iter_mut().zip(c) {
        *x ^= *y;
    }
    salsa20_8(b);
}

/// One scrypt BlockMix (r = 1) on a work unit held as two sub-blocks.
#[inline]
pub fn block_mix(b: &mut [u32; SUB_BLOCK_WORDS], c: &mut [u32; SUB_BLOCK_WORDS]) {
    mix(b, c);
    mix(c, b);
}
