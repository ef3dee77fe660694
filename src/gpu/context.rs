//! wgpu adapter selection and device helpers

use anyhow::{anyhow, Context, Result};
use clap::ValueEnum;
use std::sync::Arc;
use tracing::{debug, info};
use wgpu::util::DeviceExt;

use crate::device::layout::{LaunchGeometry, SCRATCH_REGION_WORDS};
use crate::error::LaunchError;

const SCRATCH_REGION_BYTES: u64 = (SCRATCH_REGION_WORDS * 4) as u64;

/// Bytes of contiguous scratch for `work_units` regions.
pub fn scratch_bytes(work_units: usize) -> Option<u64> {
    (work_units as u64).checked_mul(SCRATCH_REGION_BYTES)
}

/// Graphics API used to reach the GPU
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum GpuBackend {
    /// First working API in the order Vulkan, Metal, DX12, GL
    #[default]
    Auto,
    Vulkan,
    Dx12,
    Metal,
    Gl,
}

impl GpuBackend {
    fn backends(self) -> wgpu::Backends {
        match self {
            GpuBackend::Auto => wgpu::Backends::all(),
            GpuBackend::Vulkan => wgpu::Backends::VULKAN,
            GpuBackend::Dx12 => wgpu::Backends::DX12,
            GpuBackend::Metal => wgpu::Backends::METAL,
            GpuBackend::Gl => wgpu::Backends::GL,
        }
    }

    const FALLBACK: [GpuBackend; 4] = [
        GpuBackend::Vulkan,
        GpuBackend::Metal,
        GpuBackend::Dx12,
        GpuBackend::Gl,
    ];

    pub fn name(self) -> &'static str {
        match self {
            GpuBackend::Auto => "auto",
            GpuBackend::Vulkan => "Vulkan",
            GpuBackend::Dx12 => "DX12",
            GpuBackend::Metal => "Metal",
            GpuBackend::Gl => "OpenGL",
        }
    }
}

impl std::fmt::Display for GpuBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

fn is_software_adapter(info: &wgpu::AdapterInfo) -> bool {
    if info.device_type == wgpu::DeviceType::Cpu {
        return true;
    }
    let name = info.name.to_lowercase();
    ["llvmpipe", "lavapipe", "swiftshader", "software"]
        .iter()
        .any(|s| name.contains(s))
}

#[derive(Clone)]
pub struct GpuContext {
    pub device: Arc<wgpu::Device>,
    pub queue: Arc<wgpu::Queue>,
    adapter_info: wgpu::AdapterInfo,
    limits: wgpu::Limits,
}

impl GpuContext {
    pub async fn new(device_index: u32, backend: GpuBackend) -> Result<Self> {
        if backend != GpuBackend::Auto {
            return Self::open(device_index, backend, false).await;
        }

        // Hardware adapters on any API first, software renderers last.
        for hardware_only in [true, false] {
            for backend in GpuBackend::FALLBACK {
                match Self::open(device_index, backend, hardware_only).await {
                    Ok(ctx) => {
                        info!("Using {} backend: {}", backend, ctx.device_name());
                        return Ok(ctx);
                    }
                    Err(e) => debug!("{} backend unavailable (hardware_only={}): {}", backend, hardware_only, e),
                }
            }
        }

        Err(anyhow!("No GPU backends available"))
    }

    async fn open(device_index: u32, backend: GpuBackend, hardware_only: bool) -> Result<Self> {
        let backends = backend.backends();
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends,
            ..Default::default()
        });

        let mut adapters: Vec<_> = instance.enumerate_adapters(backends).await;
        if hardware_only {
            adapters.retain(|a| !is_software_adapter(&a.get_info()));
        }
        if adapters.is_empty() {
            anyhow::bail!("No {} adapters found", backend);
        }

        adapters.sort_by_key(|a| match a.get_info().device_type {
            wgpu::DeviceType::DiscreteGpu => 0,
            wgpu::DeviceType::VirtualGpu => 1,
            wgpu::DeviceType::IntegratedGpu => 2,
            wgpu::DeviceType::Cpu => 3,
            _ => 4,
        });

        let adapter = adapters
            .into_iter()
            .nth(device_index as usize)
            .context("GPU device index out of range")?;
        let adapter_info = adapter.get_info();

        // Scratchpads are large; ask for whatever the adapter allows.
        let adapter_limits = adapter.limits();
        let required_limits = wgpu::Limits {
            max_storage_buffer_binding_size: adapter_limits.max_storage_buffer_binding_size,
            max_buffer_size: adapter_limits.max_buffer_size,
            ..wgpu::Limits::default()
        };

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("romix"),
                required_features: wgpu::Features::empty(),
                required_limits,
                memory_hints: wgpu::MemoryHints::Performance,
                ..Default::default()
            })
            .await
            .context("Failed to create GPU device")?;

        let limits = device.limits();
        Ok(Self {
            device: Arc::new(device),
            queue: Arc::new(queue),
            adapter_info,
            limits,
        })
    }

    pub fn device_name(&self) -> &str {
        &self.adapter_info.name
    }

    pub fn backend(&self) -> wgpu::Backend {
        self.adapter_info.backend
    }

    pub fn is_software(&self) -> bool {
        is_software_adapter(&self.adapter_info)
    }

    /// Largest work-unit count whose scratchpads fit in one storage binding.
    pub fn max_work_units(&self) -> u64 {
        let binding = (self.limits.max_storage_buffer_binding_size as u64).min(self.limits.max_buffer_size);
        binding / SCRATCH_REGION_BYTES
    }

    /// Reject a geometry the device cannot run, before anything is
    /// allocated. Returns the scratch buffer size in bytes.
    pub fn check_launch(&self, geometry: &LaunchGeometry) -> Result<u64, LaunchError> {
        let work_units = geometry.work_units() as u64;
        let scratch_bytes = scratch_bytes(geometry.work_units()).ok_or_else(|| {
            LaunchError::Resource(format!(
                "{work_units} work units overflow a 64-bit scratch size"
            ))
        })?;
        if work_units > self.max_work_units() {
            return Err(LaunchError::Resource(format!(
                "{work_units} work units need {} MiB of scratch, device binding limit allows {} units",
                scratch_bytes >> 20,
                self.max_work_units()
            )));
        }
        if geometry.blocks() as u64 > self.limits.max_compute_workgroups_per_dimension as u64 {
            return Err(LaunchError::Resource(format!(
                "{} blocks exceed the device limit of {} workgroups",
                geometry.blocks(),
                self.limits.max_compute_workgroups_per_dimension
            )));
        }
        let invocations = geometry.work_units_per_block() as u32;
        if invocations > self.limits.max_compute_invocations_per_workgroup
            || invocations > self.limits.max_compute_workgroup_size_x
        {
            return Err(LaunchError::Resource(format!(
                "{} invocations per workgroup exceed the device limit",
                invocations
            )));
        }
        Ok(scratch_bytes)
    }

    pub fn create_buffer(&self, label: &str, usage: wgpu::BufferUsages, size: u64) -> wgpu::Buffer {
        self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage,
            mapped_at_creation: false,
        })
    }

    pub fn create_buffer_init<T: bytemuck::Pod>(
        &self,
        label: &str,
        usage: wgpu::BufferUsages,
        data: &[T],
    ) -> wgpu::Buffer {
        self.device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::cast_slice(data),
                usage,
            })
    }

    /// Block until every submitted command has finished.
    pub fn wait_idle(&self) -> Result<()> {
        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|e| anyhow!("device poll failed: {e}"))?;
        Ok(())
    }

    /// Read `count` words from a mappable buffer.
    pub async fn read_words(&self, buffer: &wgpu::Buffer, count: u64) -> Result<Vec<u32>> {
        let slice = buffer.slice(0..count * 4);

        let (tx, rx) = futures::channel::oneshot::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });

        self.wait_idle()?;
        rx.await.context("map callback dropped")??;

        let data = slice.get_mapped_range();
        let words: Vec<u32> = bytemuck::cast_slice(&data).to_vec();
        drop(data);
        buffer.unmap();

        Ok(words)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scratch_bytes_checked() {
        assert_eq!(scratch_bytes(0), Some(0));
        assert_eq!(scratch_bytes(3), Some(3 * 128 * 1024));
        #[cfg(target_pointer_width = "64")]
        assert_eq!(scratch_bytes(usize::MAX), None);
    }
}
