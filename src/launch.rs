//! Launch dispatch: validation, phase sequencing and pacing
//!
//! Both phases are separate launches over the same geometry. Every check
//! runs before a lock or buffer is touched, so a rejected launch leaves the
//! input, output, scratch pool and mutex array exactly as they were.

use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info};

use crate::device::layout::{LaunchGeometry, LANE_GROUPS_PER_GROUP, WORK_UNIT_WORDS};
use crate::device::memory::{DeviceBuffer, ScratchPool};
use crate::device::{Device, DeviceConfig, Phase};
use crate::error::LaunchError;
use crate::mutex::PairMutexArray;

/// Default thread-groups per block.
pub const DEFAULT_GROUPS_PER_BLOCK: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchConfig {
    pub groups_per_block: usize,
    pub blocks: usize,
    /// Pause between the fill and mix launches, leaving the device to other
    /// consumers. No effect on results.
    pub pacing: Option<Duration>,
    pub device: DeviceConfig,
}

impl LaunchConfig {
    pub fn new(groups_per_block: usize, blocks: usize) -> Self {
        Self {
            groups_per_block,
            blocks,
            pacing: None,
            device: DeviceConfig::default(),
        }
    }

    /// Fewest blocks that cover `work_units`, at least one.
    pub fn for_work_units(groups_per_block: usize, work_units: usize) -> Self {
        let per_block = groups_per_block.saturating_mul(LANE_GROUPS_PER_GROUP).max(1);
        Self::new(groups_per_block, work_units.div_ceil(per_block).max(1))
    }

    pub fn with_pacing(mut self, pacing: Option<Duration>) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_device(mut self, device: DeviceConfig) -> Self {
        self.device = device;
        self
    }

    pub fn geometry(&self) -> Result<LaunchGeometry, LaunchError> {
        LaunchGeometry::new(self.groups_per_block, self.blocks)
    }
}

/// Timings of one fill/mix cycle.
#[derive(Debug, Clone, Serialize)]
pub struct LaunchReport {
    pub groups_per_block: usize,
    pub blocks: usize,
    pub work_units: usize,
    pub fill_secs: f64,
    pub pause_secs: f64,
    pub mix_secs: f64,
}

impl LaunchReport {
    pub fn total_secs(&self) -> f64 {
        self.fill_secs + self.pause_secs + self.mix_secs
    }

    pub fn hashes_per_sec(&self) -> f64 {
        let compute = (self.fill_secs + self.mix_secs).max(f64::EPSILON);
        self.work_units as f64 / compute
    }
}

fn check_state_buffer(
    name: &'static str,
    buffer: &DeviceBuffer,
    geometry: &LaunchGeometry,
) -> Result<(), LaunchError> {
    let expected = geometry.state_words();
    if buffer.len() != expected {
        return Err(LaunchError::BufferSize {
            buffer: name,
            expected,
            actual: buffer.len(),
        });
    }
    Ok(())
}

fn check_shared(
    geometry: &LaunchGeometry,
    scratch: &ScratchPool,
    mutexes: &PairMutexArray,
) -> Result<(), LaunchError> {
    if scratch.table().len() < geometry.work_units() {
        return Err(LaunchError::ScratchTable(format!(
            "table addresses {} regions, launch needs {}",
            scratch.table().len(),
            geometry.work_units()
        )));
    }
    if mutexes.len() != geometry.mutex_count() {
        return Err(LaunchError::MutexCount {
            expected: geometry.mutex_count(),
            actual: mutexes.len(),
        });
    }
    if !mutexes.is_zeroed() {
        return Err(LaunchError::MutexNotZeroed);
    }
    Ok(())
}

/// Fill launch: writes the scratchpad of every work unit from `input`.
pub fn fill(
    config: &LaunchConfig,
    input: &DeviceBuffer,
    scratch: &ScratchPool,
    mutexes: &PairMutexArray,
) -> Result<(), LaunchError> {
    let geometry = config.geometry()?;
    check_state_buffer("input", input, &geometry)?;
    check_shared(&geometry, scratch, mutexes)?;

    Device::new(config.device).run_phase(Phase::Fill, &geometry, input, scratch, mutexes);
    Ok(())
}

/// Mix launch: consumes scratchpads written by a prior [`fill`] over the same
/// geometry and writes the final states to `output`.
pub fn mix(
    config: &LaunchConfig,
    output: &DeviceBuffer,
    scratch: &ScratchPool,
    mutexes: &PairMutexArray,
) -> Result<(), LaunchError> {
    let geometry = config.geometry()?;
    check_state_buffer("output", output, &geometry)?;
    check_shared(&geometry, scratch, mutexes)?;

    Device::new(config.device).run_phase(Phase::Mix, &geometry, output, scratch, mutexes);
    Ok(())
}

/// Fill, optional pause, mix.
pub fn run(
    config: &LaunchConfig,
    input: &DeviceBuffer,
    output: &DeviceBuffer,
    scratch: &ScratchPool,
    mutexes: &PairMutexArray,
) -> Result<LaunchReport, LaunchError> {
    let geometry = config.geometry()?;
    check_state_buffer("input", input, &geometry)?;
    check_state_buffer("output", output, &geometry)?;
    check_shared(&geometry, scratch, mutexes)?;

    let device = Device::new(config.device);

    let t0 = Instant::now();
    device.run_phase(Phase::Fill, &geometry, input, scratch, mutexes);
    let fill_time = t0.elapsed();

    let t1 = Instant::now();
    if let Some(pause) = config.pacing {
        debug!("pacing {:?} between fill and mix", pause);
        std::thread::sleep(pause);
    }
    let pause_time = t1.elapsed();

    let t2 = Instant::now();
    device.run_phase(Phase::Mix, &geometry, output, scratch, mutexes);
    let mix_time = t2.elapsed();

    Ok(LaunchReport {
        groups_per_block: geometry.groups_per_block(),
        blocks: geometry.blocks(),
        work_units: geometry.work_units(),
        fill_secs: fill_time.as_secs_f64(),
        pause_secs: pause_time.as_secs_f64(),
        mix_secs: mix_time.as_secs_f64(),
    })
}

/// Owns the scratch pool and mutex array for repeated launches of one
/// geometry.
#[derive(Debug)]
pub struct Dispatcher {
    config: LaunchConfig,
    geometry: LaunchGeometry,
    scratch: ScratchPool,
    mutexes: PairMutexArray,
}

impl Dispatcher {
    pub fn new(config: LaunchConfig) -> Result<Self, LaunchError> {
        let geometry = config.geometry()?;
        let scratch = ScratchPool::contiguous(geometry.work_units())?;
        Self::with_scratch(config, scratch)
    }

    /// Use a caller-built pool, e.g. one with a custom scratch table.
    pub fn with_scratch(config: LaunchConfig, scratch: ScratchPool) -> Result<Self, LaunchError> {
        let geometry = config.geometry()?;
        let mutexes = PairMutexArray::new(geometry.mutex_count());
        check_shared(&geometry, &scratch, &mutexes)?;

        info!(
            "Dispatcher ready: {} blocks x {} groups ({} work units, {} MiB scratch)",
            geometry.blocks(),
            geometry.groups_per_block(),
            geometry.work_units(),
            (scratch.words().len() * 4) >> 20
        );

        Ok(Self {
            config,
            geometry,
            scratch,
            mutexes,
        })
    }

    pub fn config(&self) -> &LaunchConfig {
        &self.config
    }

    pub fn geometry(&self) -> &LaunchGeometry {
        &self.geometry
    }

    /// Work units covered by one cycle.
    pub fn capacity(&self) -> usize {
        self.geometry.work_units()
    }

    pub fn scratch(&self) -> &ScratchPool {
        &self.scratch
    }

    /// Run one cycle on `input` (32 words per work unit, exactly
    /// [`capacity`](Self::capacity) units) and return the final states.
    pub fn dispatch(&self, input: &[u32]) -> Result<(Vec<u32>, LaunchReport), LaunchError> {
        let expected = self.capacity() * WORK_UNIT_WORDS;
        if input.len() != expected {
            return Err(LaunchError::BufferSize {
                buffer: "input",
                expected,
                actual: input.len(),
            });
        }

        self.mutexes.reset();
        let input = DeviceBuffer::from_words(input);
        let output = DeviceBuffer::zeroed(expected);
        let report = run(&self.config, &input, &output, &self.scratch, &self.mutexes)?;

        debug!(
            "cycle done: fill {:.3}s, mix {:.3}s, {:.1} H/s",
            report.fill_secs,
            report.mix_secs,
            report.hashes_per_sec()
        );

        Ok((output.to_vec(), report))
    }
}
