//! Fill and mix compute pipelines

use super::{GpuContext, GpuParams};
use std::sync::Arc;
use tracing::debug;
use wgpu::{BindGroupLayout, ComputePipeline};

use crate::device::Phase;

const ROMIX_WGSL: &str = include_str!("../shaders/romix.wgsl");

fn storage_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only: false },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

/// Both kernels compiled for one workgroup size (Clone is cheap - wgpu
/// types are Arc-wrapped).
#[derive(Clone)]
pub struct RomixPipelines {
    pub fill: Arc<ComputePipeline>,
    pub mix: Arc<ComputePipeline>,
    pub bind_group_layout: Arc<BindGroupLayout>,
    pub workgroup_size: u32,
}

impl RomixPipelines {
    /// One invocation per work unit, so `workgroup_size` is the work-unit
    /// count of a block.
    pub fn new(ctx: &GpuContext, workgroup_size: u32) -> Self {
        debug!("Compiling ROMix kernels (workgroup size {})", workgroup_size);

        let shader = ctx
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("ROMix Shader"),
                source: wgpu::ShaderSource::Wgsl(ROMIX_WGSL.into()),
            });

        let bind_group_layout =
            ctx.device
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("ROMix Bind Group Layout"),
                    entries: &[
                        // Params (uniform)
                        wgpu::BindGroupLayoutEntry {
                            binding: 0,
                            visibility: wgpu::ShaderStages::COMPUTE,
                            ty: wgpu::BindingType::Buffer {
                                ty: wgpu::BufferBindingType::Uniform,
                                has_dynamic_offset: false,
                                min_binding_size: wgpu::BufferSize::new(
                                    std::mem::size_of::<GpuParams>() as u64,
                                ),
                            },
                            count: None,
                        },
                        // States: input for fill, output for mix
                        storage_entry(1),
                        // Scratchpads
                        storage_entry(2),
                    ],
                });

        let pipeline_layout = ctx
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("ROMix Pipeline Layout"),
                bind_group_layouts: &[&bind_group_layout],
                immediate_size: 0,
            });

        let constants = [("WORKGROUP_SIZE", workgroup_size as f64)];
        let build = |phase: Phase| {
            let entry_point = match phase {
                Phase::Fill => "romix_fill",
                Phase::Mix => "romix_mix",
            };
            ctx.device
                .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                    label: Some(entry_point),
                    layout: Some(&pipeline_layout),
                    module: &shader,
                    entry_point: Some(entry_point),
                    compilation_options: wgpu::PipelineCompilationOptions {
                        constants: &constants,
                        zero_initialize_workgroup_memory: true,
                    },
                    cache: None,
                })
        };

        Self {
            fill: Arc::new(build(Phase::Fill)),
            mix: Arc::new(build(Phase::Mix)),
            bind_group_layout: Arc::new(bind_group_layout),
            workgroup_size,
        }
    }

    pub fn pipeline(&self, phase: Phase) -> &ComputePipeline {
        match phase {
            Phase::Fill => &self.fill,
            Phase::Mix => &self.mix,
        }
    }
}
