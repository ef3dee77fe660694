//! wgpu backend for the fill and mix kernels
//!
//! Runs the same launch geometry as the host device model. Workgroups play
//! the role of execution blocks and each invocation carries one work unit.
//! Pair exclusion on the staging region is barrier-phased: WGSL gives no
//! forward-progress guarantee for spin locks inside a workgroup.
//!
//! Scratch is one contiguous buffer indexed by work unit. The kernels do
//! not consult a [`ScratchTable`](crate::ScratchTable); custom region
//! layouts exist only on the host device model.

mod buffers;
mod context;
mod pipeline;

pub use buffers::GpuBuffers;
pub use context::{scratch_bytes, GpuBackend, GpuContext};
pub use pipeline::RomixPipelines;

use anyhow::Result;
use bytemuck::{Pod, Zeroable};
use std::time::Instant;
use tracing::{debug, info};

use crate::device::layout::{LaunchGeometry, WORK_UNIT_WORDS};
use crate::device::Phase;
use crate::error::{HashError, LaunchError};
use crate::hash::{states_from_words, RomixEngine};
use crate::launch::{LaunchConfig, LaunchReport};
use crate::reference::State;

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct GpuParams {
    pub work_units: u32,
    pub groups_per_block: u32,
    pub _padding: [u32; 2],
}

pub struct GpuDispatcher {
    ctx: GpuContext,
    config: LaunchConfig,
    geometry: LaunchGeometry,
    pipelines: RomixPipelines,
    buffers: GpuBuffers,
}

impl GpuDispatcher {
    /// Validates `config` against the device limits before allocating.
    pub fn new(ctx: GpuContext, config: LaunchConfig) -> Result<Self, LaunchError> {
        let geometry = config.geometry()?;
        let scratch_bytes = ctx.check_launch(&geometry)?;

        let pipelines = RomixPipelines::new(&ctx, geometry.work_units_per_block() as u32);
        let buffers = GpuBuffers::new(&ctx, &pipelines, &geometry, scratch_bytes);

        info!(
            "GPU dispatcher ready on {}: {} workgroups x {} invocations",
            ctx.device_name(),
            geometry.blocks(),
            pipelines.workgroup_size
        );

        Ok(Self {
            ctx,
            config,
            geometry,
            pipelines,
            buffers,
        })
    }

    pub fn capacity(&self) -> usize {
        self.geometry.work_units()
    }

    fn run_phase(&self, phase: Phase) -> Result<()> {
        let mut encoder = self
            .ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(phase.name()),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(phase.name()),
                timestamp_writes: None,
            });
            pass.set_pipeline(self.pipelines.pipeline(phase));
            pass.set_bind_group(0, &self.buffers.bind_group, &[]);
            pass.dispatch_workgroups(self.geometry.blocks() as u32, 1, 1);
        }
        if phase == Phase::Mix {
            encoder.copy_buffer_to_buffer(
                &self.buffers.states_buffer,
                0,
                &self.buffers.readback_buffer,
                0,
                self.buffers.state_bytes(),
            );
        }
        self.ctx.queue.submit(Some(encoder.finish()));
        self.ctx.wait_idle()
    }

    /// Same contract as [`crate::launch::Dispatcher::dispatch`].
    pub fn dispatch(&self, input: &[u32]) -> Result<(Vec<u32>, LaunchReport)> {
        let expected = self.capacity() * WORK_UNIT_WORDS;
        if input.len() != expected {
            return Err(LaunchError::BufferSize {
                buffer: "input",
                expected,
                actual: input.len(),
            }
            .into());
        }

        self.ctx
            .queue
            .write_buffer(&self.buffers.states_buffer, 0, bytemuck::cast_slice(input));

        let t0 = Instant::now();
        self.run_phase(Phase::Fill)?;
        let fill_time = t0.elapsed();

        let t1 = Instant::now();
        if let Some(pause) = self.config.pacing {
            std::thread::sleep(pause);
        }
        let pause_time = t1.elapsed();

        let t2 = Instant::now();
        self.run_phase(Phase::Mix)?;
        let mix_time = t2.elapsed();

        let output = pollster::block_on(
            self.ctx
                .read_words(&self.buffers.readback_buffer, expected as u64),
        )?;

        let report = LaunchReport {
            groups_per_block: self.geometry.groups_per_block(),
            blocks: self.geometry.blocks(),
            work_units: self.geometry.work_units(),
            fill_secs: fill_time.as_secs_f64(),
            pause_secs: pause_time.as_secs_f64(),
            mix_secs: mix_time.as_secs_f64(),
        };
        debug!(
            "GPU cycle done: fill {:.3}s, mix {:.3}s, {:.1} H/s",
            report.fill_secs,
            report.mix_secs,
            report.hashes_per_sec()
        );
        Ok((output, report))
    }
}

impl RomixEngine for GpuDispatcher {
    fn name(&self) -> &'static str {
        "gpu"
    }

    fn capacity(&self) -> usize {
        GpuDispatcher::capacity(self)
    }

    fn romix_batch(&self, states: &[State]) -> Result<Vec<State>, HashError> {
        let capacity = GpuDispatcher::capacity(self);
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

        let (out, _report) = self
            .dispatch(&words)
            .map_err(|e| match e.downcast::<LaunchError>() {
                Ok(launch) => HashError::Launch(launch),
                Err(other) => HashError::Device(format!("{other:#}")),
            })?;
        Ok(states_from_words(&out, states.len()))
    }
}
