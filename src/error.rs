//! Launch and hashing errors
//!
//! Everything here is detected before any device work starts. The kernels
//! themselves have no failure path.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LaunchError {
    #[error("unsupported group count {requested}: supported range is {min}..={max} thread-groups per block")]
    UnsupportedGroupCount {
        requested: usize,
        min: usize,
        max: usize,
    },

    #[error("launch covers no execution blocks")]
    EmptyLaunch,

    #[error("{buffer} buffer holds {actual} words, launch needs {expected}")]
    BufferSize {
        buffer: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("mutex array has {actual} entries, launch needs {expected}")]
    MutexCount { expected: usize, actual: usize },

    #[error("mutex array must be zeroed before a fill/mix cycle")]
    MutexNotZeroed,

    #[error("scratch table: {0}")]
    ScratchTable(String),

    #[error("resource exhausted: {0}")]
    Resource(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HashError {
    #[error(transparent)]
    Launch(#[from] LaunchError),

    #[error("device error: {0}")]
    Device(String),

    #[error("HMAC-SHA256 rejected the password as key")]
    InvalidKey,

    #[error("output length {0} is outside 1..={max}", max = crate::hash::MAX_OUTPUT_LEN)]
    OutputLength(usize),
}
