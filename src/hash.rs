//! Full scrypt(N=1024, r=1, p=1) around the ROMix core
//!
//! scrypt wraps ROMix in two single-iteration PBKDF2-HMAC-SHA256 calls:
//! the first expands (password, salt) into the 128-byte ROMix input, the
//! second compresses the ROMix output (used as salt) into the digest.
//! Block headers are hashed with the header as both password and salt.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::Instant;

use tracing::debug;

use crate::device::layout::WORK_UNIT_WORDS;
use crate::error::{HashError, LaunchError};
use crate::launch::{Dispatcher, LaunchConfig};
use crate::reference::{self, State};

type HmacSha256 = Hmac<Sha256>;

/// Bytes of ROMix state per work unit.
pub const STATE_BYTES: usize = WORK_UNIT_WORDS * 4;
/// Largest digest this front-end produces.
pub const MAX_OUTPUT_LEN: usize = 1024;
/// Block header length for proof-of-work hashing.
pub const HEADER_LEN: usize = 80;
pub const HEADER_DIGEST_LEN: usize = 32;

const SHA256_LEN: usize = 32;

/// PBKDF2-HMAC-SHA256 with a single iteration.
pub fn pbkdf2_sha256(password: &[u8], salt: &[u8], out: &mut [u8]) -> Result<(), HashError> {
    if out.is_empty() || out.len() > MAX_OUTPUT_LEN {
        return Err(HashError::OutputLength(out.len()));
    }

    let prf = HmacSha256::new_from_slice(password).map_err(|_| HashError::InvalidKey)?;
    for (i, chunk) in out.chunks_mut(SHA256_LEN).enumerate() {
        let mut mac = prf.clone();
        mac.update(salt);
        mac.update(&(i as u32 + 1).to_be_bytes());
        let block = mac.finalize().into_bytes();
        chunk.copy_from_slice(&block[..chunk.len()]);
    }
    Ok(())
}

/// ROMix input for (password, salt), as little-endian words.
pub fn romix_input(password: &[u8], salt: &[u8]) -> Result<State, HashError> {
    let mut bytes = [0u8; STATE_BYTES];
    pbkdf2_sha256(password, salt, &mut bytes)?;
    Ok(state_from_bytes(&bytes))
}

/// Final digest from the ROMix output.
pub fn romix_output(password: &[u8], state: &State, out: &mut [u8]) -> Result<(), HashError> {
    pbkdf2_sha256(password, &state_to_bytes(state), out)
}

pub fn state_from_bytes(bytes: &[u8; STATE_BYTES]) -> State {
    let mut state = [0u32; WORK_UNIT_WORDS];
    for (word, chunk) in state.iter_mut().zip(bytes.chunks_exact(4)) {
        *word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    state
}

pub fn state_to_bytes(state: &State) -> [u8; STATE_BYTES] {
    let mut bytes = [0u8; STATE_BYTES];
    for (chunk, word) in bytes.chunks_exact_mut(4).zip(state) {
        chunk.copy_from_slice(&word.to_le_bytes());
    }
    bytes
}

/// One scrypt hash on the calling thread, through the reference ROMix.
pub fn hash_one(password: &[u8], salt: &[u8], out: &mut [u8]) -> Result<(), HashError> {
    let mut state = romix_input(password, salt)?;
    reference::romix(&mut state);
    romix_output(password, &state, out)
}

/// Anything that can run ROMix over a batch of states.
pub trait RomixEngine {
    fn name(&self) -> &'static str;

    /// States per launch cycle.
    fn capacity(&self) -> usize;

    /// ROMix over at most [`capacity`](Self::capacity) states, in order.
    fn romix_batch(&self, states: &[State]) -> Result<Vec<State>, HashError>;
}

impl RomixEngine for Dispatcher {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn capacity(&self) -> usize {
        Dispatcher::capacity(self)
    }

    /// Unused work units are zero-padded and discarded.
    fn romix_batch(&self, states: &[State]) -> Result<Vec<State>, HashError> {
        let capacity = Dispatcher::capacity(self);
        if states.len() > capacity {
            return Err(LaunchError::BufferSize {
                buffer: "input",
                expected: capacity * WORK_UNIT_WORDS,
                actual: states.len() * WORK_UNIT_WORDS,
            }
            .into());
        }

        let mut words = vec![0u32; capacity * WORK_UNIT_WORDS];
        for (dst, state) in words.chunks_exact_mut(WORK_UNIT_WORDS).zip(states) {
            dst.copy_from_slice(state);
        }

        let (out, _report) = self.dispatch(&words)?;
        Ok(states_from_words(&out, states.len()))
    }
}

/// First `count` states of a flat word buffer.
pub fn states_from_words(words: &[u32], count: usize) -> Vec<State> {
    words
        .chunks_exact(WORK_UNIT_WORDS)
        .take(count)
        .map(|chunk| {
            let mut state = [0u32; WORK_UNIT_WORDS];
            state.copy_from_slice(chunk);
            state
        })
        .collect()
}

/// Batches scrypt hashes through a [`RomixEngine`].
#[derive(Debug)]
pub struct ScryptHasher<E = Dispatcher> {
    engine: E,
}

impl ScryptHasher<Dispatcher> {
    pub fn new(config: LaunchConfig) -> Result<Self, HashError> {
        Ok(Self {
            engine: Dispatcher::new(config)?,
        })
    }
}

impl<E: RomixEngine> ScryptHasher<E> {
    pub fn with_engine(engine: E) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Hashes per launch cycle.
    pub fn capacity(&self) -> usize {
        self.engine.capacity().max(1)
    }

    /// scrypt for every (password, salt) pair, `out_len` bytes each.
    pub fn hash_batch<P, S>(
        &self,
        inputs: &[(P, S)],
        out_len: usize,
    ) -> Result<Vec<Vec<u8>>, HashError>
    where
        P: AsRef<[u8]>,
        S: AsRef<[u8]>,
    {
        if out_len == 0 || out_len > MAX_OUTPUT_LEN {
            return Err(HashError::OutputLength(out_len));
        }

        let mut digests = Vec::with_capacity(inputs.len());
        for chunk in inputs.chunks(self.capacity()) {
            let t0 = Instant::now();
            let states = chunk
                .iter()
                .map(|(p, s)| romix_input(p.as_ref(), s.as_ref()))
                .collect::<Result<Vec<_>, _>>()?;

            let mixed = self.engine.romix_batch(&states)?;

            for ((password, _), state) in chunk.iter().zip(&mixed) {
                let mut digest = vec![0u8; out_len];
                romix_output(password.as_ref(), state, &mut digest)?;
                digests.push(digest);
            }
            debug!(
                engine = self.engine.name(),
                "hashed {} inputs in {:.3}s",
                chunk.len(),
                t0.elapsed().as_secs_f64()
            );
        }
        Ok(digests)
    }

    /// Proof-of-work hash of 80-byte block headers.
    pub fn hash_headers(
        &self,
        headers: &[[u8; HEADER_LEN]],
    ) -> Result<Vec<[u8; HEADER_DIGEST_LEN]>, HashError> {
        let inputs: Vec<(&[u8], &[u8])> = headers.iter().map(|h| (&h[..], &h[..])).collect();
        let digests = self.hash_batch(&inputs, HEADER_DIGEST_LEN)?;
        Ok(digests
            .into_iter()
            .map(|d| {
                let mut out = [0u8; HEADER_DIGEST_LEN];
                out.copy_from_slice(&d);
                out
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceConfig;

    #[test]
    fn test_pbkdf2_rfc6070_style_vector() {
        // PBKDF2-HMAC-SHA256, P = "password", S = "salt", c = 1, dkLen = 32
        let mut out = [0u8; 32];
        pbkdf2_sha256(b"password", b"salt", &mut out).unwrap();
        assert_eq!(
            hex::encode(out),
            "120fb6cffcf8b32c43e7225256c4f837a86548c92ccc35480805987cb70be17b"
        );
    }

    #[test]
    fn test_pbkdf2_rejects_bad_lengths() {
        let mut empty: [u8; 0] = [];
        assert_eq!(
            pbkdf2_sha256(b"p", b"s", &mut empty),
            Err(HashError::OutputLength(0))
        );
    }

    #[test]
    fn test_state_bytes_roundtrip_is_little_endian() {
        let state: State = std::array::from_fn(|i| 0x0403_0201 + i as u32);
        let bytes = state_to_bytes(&state);
        assert_eq!(&bytes[..4], &[1, 2, 3, 4]);
        assert_eq!(state_from_bytes(&bytes), state);
    }

    #[test]
    fn test_hasher_matches_single_path() {
        let config = LaunchConfig::new(1, 1).with_device(DeviceConfig {
            resident_blocks: 1,
            ..DeviceConfig::default()
        });
        let hasher = ScryptHasher::new(config).unwrap();
        assert_eq!(hasher.capacity(), 2);

        // Three inputs force a second, padded launch.
        let inputs = [
            (b"alpha".to_vec(), b"salt".to_vec()),
            (b"beta".to_vec(), b"salt".to_vec()),
            (b"gamma".to_vec(), b"NaCl".to_vec()),
        ];
        let digests = hasher.hash_batch(&inputs, 32).unwrap();
        assert_eq!(digests.len(), 3);

        for ((p, s), digest) in inputs.iter().zip(&digests) {
            let mut expected = [0u8; 32];
            hash_one(p, s, &mut expected).unwrap();
            assert_eq!(digest.as_slice(), &expected);
        }
    }

    #[test]
    fn test_romix_batch_rejects_overflow() {
        let config = LaunchConfig::new(1, 1);
        let hasher = ScryptHasher::new(config).unwrap();
        let states = vec![[0u32; WORK_UNIT_WORDS]; 3];
        assert!(matches!(
            hasher.engine().romix_batch(&states),
            Err(HashError::Launch(_))
        ));
    }
}
