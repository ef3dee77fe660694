//! Integration tests: launch validation
//!
//! A rejected launch must leave the input, output, scratch pool and mutex
//! array untouched.

use romix_simt::device::layout::{LaunchGeometry, SCRATCH_REGION_WORDS, WORK_UNIT_WORDS};
use romix_simt::launch::{fill, mix, run};
use romix_simt::{
    DeviceBuffer, DeviceConfig, Dispatcher, LaunchConfig, LaunchError, PairMutexArray, ScratchPool,
    ScratchTable, MAX_GROUPS_PER_BLOCK, MIN_GROUPS_PER_BLOCK,
};

const SENTINEL: u32 = 0xA5A5_5A5A;

/// Buffers sized for a valid 2-group, 1-block launch, filled with sentinels.
struct Buffers {
    input: DeviceBuffer,
    output: DeviceBuffer,
    scratch: ScratchPool,
    mutexes: PairMutexArray,
}

impl Buffers {
    fn new() -> Self {
        let geometry = LaunchGeometry::new(2, 1).unwrap();
        let buffers = Self {
            input: DeviceBuffer::zeroed(geometry.state_words()),
            output: DeviceBuffer::zeroed(geometry.state_words()),
            scratch: ScratchPool::contiguous(geometry.work_units()).unwrap(),
            mutexes: PairMutexArray::new(geometry.mutex_count()),
        };
        buffers.input.fill(SENTINEL);
        buffers.output.fill(SENTINEL);
        buffers.scratch.words().fill(SENTINEL);
        buffers
    }

    fn assert_untouched(&self) {
        assert!(self.input.to_vec().iter().all(|&w| w == SENTINEL));
        assert!(self.output.to_vec().iter().all(|&w| w == SENTINEL));
        assert!(self.scratch.words().to_vec().iter().all(|&w| w == SENTINEL));
        assert!(self.mutexes.is_zeroed());
    }
}

fn config(groups: usize) -> LaunchConfig {
    LaunchConfig::new(groups, 1).with_device(DeviceConfig {
        resident_blocks: 1,
        ..DeviceConfig::default()
    })
}

#[test]
fn test_unsupported_group_counts_do_nothing() {
    for groups in [0, MAX_GROUPS_PER_BLOCK + 1, 64] {
        let buffers = Buffers::new();
        let expected = LaunchError::UnsupportedGroupCount {
            requested: groups,
            min: MIN_GROUPS_PER_BLOCK,
            max: MAX_GROUPS_PER_BLOCK,
        };

        let cfg = config(groups);
        assert_eq!(
            fill(&cfg, &buffers.input, &buffers.scratch, &buffers.mutexes),
            Err(expected.clone())
        );
        assert_eq!(
            mix(&cfg, &buffers.output, &buffers.scratch, &buffers.mutexes),
            Err(expected.clone())
        );
        assert_eq!(
            run(
                &cfg,
                &buffers.input,
                &buffers.output,
                &buffers.scratch,
                &buffers.mutexes
            )
            .unwrap_err(),
            expected
        );
        buffers.assert_untouched();
    }
}

#[test]
fn test_every_supported_group_count_is_accepted() {
    for groups in MIN_GROUPS_PER_BLOCK..=MAX_GROUPS_PER_BLOCK {
        let geometry = config(groups).geometry().unwrap();
        assert_eq!(geometry.work_units(), 2 * groups);
        assert_eq!(geometry.mutex_count(), groups.div_ceil(2));
    }
}

#[test]
fn test_zero_blocks_rejected() {
    let cfg = LaunchConfig::new(2, 0);
    assert_eq!(cfg.geometry(), Err(LaunchError::EmptyLaunch));
}

#[test]
fn test_oversized_launch_is_a_resource_error() {
    let huge = LaunchConfig::new(MAX_GROUPS_PER_BLOCK, usize::MAX / 16);
    let err = Dispatcher::new(huge).unwrap_err();
    assert!(matches!(err, LaunchError::Resource(_)), "{err}");

    let buffers = Buffers::new();
    let err = run(
        &huge,
        &buffers.input,
        &buffers.output,
        &buffers.scratch,
        &buffers.mutexes,
    )
    .unwrap_err();
    assert!(matches!(err, LaunchError::Resource(_)));
    buffers.assert_untouched();
}

#[cfg(target_pointer_width = "64")]
#[test]
fn test_unallocatable_scratch_is_a_resource_error() {
    // Size arithmetic fits, but a petabyte pool cannot be reserved.
    let config = LaunchConfig::new(1, 1 << 32);
    assert!(config.geometry().is_ok());

    let err = Dispatcher::new(config).unwrap_err();
    assert!(matches!(err, LaunchError::Resource(_)), "{err}");
}

#[test]
fn test_wrong_buffer_sizes_rejected() {
    let buffers = Buffers::new();
    let short = DeviceBuffer::zeroed(WORK_UNIT_WORDS);
    short.fill(SENTINEL);

    let err = fill(&config(2), &short, &buffers.scratch, &buffers.mutexes).unwrap_err();
    assert!(matches!(err, LaunchError::BufferSize { buffer: "input", .. }));

    let err = mix(&config(2), &short, &buffers.scratch, &buffers.mutexes).unwrap_err();
    assert!(matches!(err, LaunchError::BufferSize { buffer: "output", .. }));

    let wrong_mutexes = PairMutexArray::new(3);
    let err = fill(&config(2), &buffers.input, &buffers.scratch, &wrong_mutexes).unwrap_err();
    assert_eq!(err, LaunchError::MutexCount { expected: 1, actual: 3 });

    buffers.assert_untouched();
    assert!(short.to_vec().iter().all(|&w| w == SENTINEL));
}

#[test]
fn test_held_mutex_rejected() {
    let buffers = Buffers::new();
    buffers.mutexes.acquire(0, Default::default());

    let result = run(
        &config(2),
        &buffers.input,
        &buffers.output,
        &buffers.scratch,
        &buffers.mutexes,
    );
    assert_eq!(result.unwrap_err(), LaunchError::MutexNotZeroed);

    buffers.mutexes.release(0);
    buffers.assert_untouched();
}

#[test]
fn test_scratch_table_validation() {
    let pool = 3 * SCRATCH_REGION_WORDS;

    let err = ScratchTable::from_bases(vec![0, SCRATCH_REGION_WORDS - 2], pool).unwrap_err();
    assert!(matches!(err, LaunchError::ScratchTable(_)));

    let err = ScratchTable::from_bases(vec![1], pool).unwrap_err();
    assert!(matches!(err, LaunchError::ScratchTable(_)));

    let err = ScratchTable::from_bases(vec![0, 3 * SCRATCH_REGION_WORDS], pool).unwrap_err();
    assert!(matches!(err, LaunchError::ScratchTable(_)));

    let table = ScratchTable::from_bases(vec![2 * SCRATCH_REGION_WORDS, 0], pool).unwrap();
    assert_eq!(table.len(), 2);
    assert_eq!(table.required_pool_words(), pool);
}
