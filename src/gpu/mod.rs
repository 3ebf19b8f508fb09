//! wgpu plumbing shared by the group, the isosurface extractor and the
//! raymarch renderer
//!
//! # Features
//! - **GpuContext**: one device/queue pair shared by every component
//! - **StructuredBuffer**: typed storage buffer with a host shadow copy and
//!   stable identity until its element count changes
//! - **FieldBindings**: group 0 of every field shader, rebuilt on handle changes
//! - **Readback**: poll-based staging buffer reads with a blocking wait

mod buffer;
mod field;
mod readback;

pub use buffer::{BufferHandle, BufferId, StructuredBuffer};
pub use field::{FieldBindings, GpuFieldInfo};
pub use readback::{PendingRead, ReadState};

use std::sync::Arc;

use crate::error::{FieldError, Result};

/// Device and queue shared by every GPU consumer of a field
#[derive(Debug)]
pub struct GpuContext {
    device: wgpu::Device,
    queue: wgpu::Queue,
    adapter_name: String,
}

impl GpuContext {
    /// Create a context on the default high-performance adapter
    pub fn new() -> Result<Arc<Self>> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .ok_or(FieldError::NoAdapter)?;

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("isofield device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::Performance,
            },
            None,
        ))
        .map_err(|e: wgpu::RequestDeviceError| FieldError::DeviceCreation(e.to_string()))?;

        let adapter_name = adapter.get_info().name;
        tracing::info!(adapter = %adapter_name, "gpu context created");

        Ok(Arc::new(GpuContext {
            device,
            queue,
            adapter_name,
        }))
    }

    /// Wrap a device created by the host application
    pub fn from_device(device: wgpu::Device, queue: wgpu::Queue) -> Arc<Self> {
        Arc::new(GpuContext {
            device,
            queue,
            adapter_name: String::from("external"),
        })
    }

    /// The device
    #[inline]
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// The queue
    #[inline]
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Adapter name, or `"external"` for host devices
    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    /// Block until all submitted work and pending maps are done
    pub fn wait_idle(&self) {
        self.device.poll(wgpu::Maintain::Wait);
    }
}

/// Bind group layout entry for a compute-visible buffer
pub(crate) fn bgl_entry(binding: u32, ty: wgpu::BufferBindingType) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

/// Read-only storage binding type
pub(crate) const STORAGE_READ: wgpu::BufferBindingType =
    wgpu::BufferBindingType::Storage { read_only: true };

/// Read-write storage binding type
pub(crate) const STORAGE_RW: wgpu::BufferBindingType =
    wgpu::BufferBindingType::Storage { read_only: false };

/// Uniform binding type
pub(crate) const UNIFORM: wgpu::BufferBindingType = wgpu::BufferBindingType::Uniform;

/// Create a compute pipeline for one entry point of a shader module
pub(crate) fn create_pipeline(
    device: &wgpu::Device,
    bind_group_layouts: &[&wgpu::BindGroupLayout],
    shader: &wgpu::ShaderModule,
    entry_point: &str,
    label: &str,
) -> wgpu::ComputePipeline {
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts,
        push_constant_ranges: &[],
    });

    device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(label),
        layout: Some(&layout),
        module: shader,
        entry_point: Some(entry_point),
        compilation_options: Default::default(),
        cache: None,
    })
}

/// Compile a WGSL module, reporting validation errors instead of panicking
pub(crate) fn create_shader(device: &wgpu::Device, source: &str, label: &str) -> Result<wgpu::ShaderModule> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });
    match pollster::block_on(device.pop_error_scope()) {
        Some(err) => Err(FieldError::ShaderCompilation(err.to_string())),
        None => Ok(module),
    }
}

/// Number of workgroups needed to cover `count` items
#[inline]
pub(crate) fn workgroups(count: u32, size: u32) -> u32 {
    count.div_ceil(size)
}
