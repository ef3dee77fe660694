//! Device buffers for one launch geometry
//!
//! The state buffer is shared by both kernels: fill reads the inputs from
//! it and mix overwrites it with the results, which are then copied to the
//! readback buffer.

use super::{GpuContext, GpuParams, RomixPipelines};
use crate::device::layout::LaunchGeometry;
use wgpu::{BindGroup, Buffer, BufferUsages};

pub struct GpuBuffers {
    #[allow(dead_code)]
    params_buffer: Buffer,
    pub states_buffer: Buffer,
    #[allow(dead_code)]
    scratch_buffer: Buffer,
    pub readback_buffer: Buffer,
    pub bind_group: BindGroup,
    state_bytes: u64,
}

impl GpuBuffers {
    /// `scratch_bytes` comes from [`GpuContext::check_launch`].
    pub fn new(
        ctx: &GpuContext,
        pipelines: &RomixPipelines,
        geometry: &LaunchGeometry,
        scratch_bytes: u64,
    ) -> Self {
        let params = GpuParams {
            work_units: geometry.work_units() as u32,
            groups_per_block: geometry.groups_per_block() as u32,
            _padding: [0; 2],
        };
        let params_buffer = ctx.create_buffer_init(
            "Params Buffer",
            BufferUsages::UNIFORM | BufferUsages::COPY_DST,
            &[params],
        );

        let state_bytes = geometry.state_words() as u64 * 4;
        let states_buffer = ctx.create_buffer(
            "States Buffer",
            BufferUsages::STORAGE | BufferUsages::COPY_DST | BufferUsages::COPY_SRC,
            state_bytes,
        );
        let scratch_buffer = ctx.create_buffer(
            "Scratch Buffer",
            BufferUsages::STORAGE,
            scratch_bytes,
        );
        let readback_buffer = ctx.create_buffer(
            "Readback Buffer",
            BufferUsages::MAP_READ | BufferUsages::COPY_DST,
            state_bytes,
        );

        let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("ROMix Bind Group"),
            layout: &pipelines.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: params_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: states_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: scratch_buffer.as_entire_binding(),
                },
            ],
        });

        Self {
            params_buffer,
            states_buffer,
            scratch_buffer,
            readback_buffer,
            bind_group,
            state_bytes,
        }
    }

    pub fn state_bytes(&self) -> u64 {
        self.state_bytes
    }
}
