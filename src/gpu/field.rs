//! Group 0 bindings of every field shader
//!
//! Consumers receive the group's buffer handles through notifications;
//! `FieldBindings` collects them, owns the small per-consumer info uniform
//! and rebuilds the bind group only when a handle identity changes.

use bytemuck::{Pod, Zeroable};

use super::{BufferHandle, GpuContext};

/// Per-consumer uniform: node count and sentinel distance
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct GpuFieldInfo {
    /// Number of valid node records
    pub node_count: u32,
    /// Distance of an empty field
    pub sentinel: f32,
    /// Padding to 16 bytes
    pub _pad: [u32; 2],
}

/// Buffer handles of one group plus the bind group built from them
#[derive(Debug, Default)]
pub struct FieldBindings {
    nodes: Option<BufferHandle>,
    materials: Option<BufferHandle>,
    samples: Option<BufferHandle>,
    settings: Option<BufferHandle>,
    node_count: usize,
    info: Option<wgpu::Buffer>,
    fallback_samples: Option<wgpu::Buffer>,
    bind_group: Option<wgpu::BindGroup>,
}

impl FieldBindings {
    /// Node and material buffers changed identity or count
    pub fn set_nodes(&mut self, nodes: &BufferHandle, materials: &BufferHandle, count: usize) {
        if self.nodes.as_ref() != Some(nodes) || self.materials.as_ref() != Some(materials) {
            self.bind_group = None;
        }
        self.nodes = Some(nodes.clone());
        self.materials = Some(materials.clone());
        self.node_count = count;
    }

    /// Settings buffer changed identity
    pub fn set_settings(&mut self, settings: &BufferHandle) {
        if self.settings.as_ref() != Some(settings) {
            self.bind_group = None;
        }
        self.settings = Some(settings.clone());
    }

    /// Mesh sample buffer changed identity
    pub fn set_samples(&mut self, samples: Option<&BufferHandle>) {
        if self.samples.as_ref() != samples {
            self.bind_group = None;
        }
        self.samples = samples.cloned();
    }

    /// Node records currently valid
    pub fn node_count(&self) -> usize {
        self.node_count
    }

    /// Whether node, material and settings handles have been received
    pub fn is_complete(&self) -> bool {
        self.nodes.is_some() && self.materials.is_some() && self.settings.is_some()
    }

    /// Whether the bind group must be rebuilt before the next use
    pub fn needs_rebuild(&self) -> bool {
        self.bind_group.is_none()
    }

    /// Layout of group 0 for the given shader stages
    pub fn layout(device: &wgpu::Device, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayout {
        let entry = |binding: u32, ty: wgpu::BufferBindingType| wgpu::BindGroupLayoutEntry {
            binding,
            visibility,
            ty: wgpu::BindingType::Buffer {
                ty,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };
        device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("field bindings"),
            entries: &[
                entry(0, super::STORAGE_READ),
                entry(1, super::STORAGE_READ),
                entry(2, super::STORAGE_READ),
                entry(3, super::UNIFORM),
                entry(4, super::UNIFORM),
            ],
        })
    }

    /// Upload the info uniform and return the bind group, building it if a
    /// handle changed. `None` until the group has published its buffers or
    /// when the handles carry no GPU buffer.
    pub fn bind_group(
        &mut self,
        ctx: &GpuContext,
        layout: &wgpu::BindGroupLayout,
        sentinel: f32,
    ) -> Option<&wgpu::BindGroup> {
        let device = ctx.device();
        let info = self.info.get_or_insert_with(|| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("field info"),
                size: std::mem::size_of::<GpuFieldInfo>() as u64,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        });
        let data = GpuFieldInfo {
            node_count: self.node_count as u32,
            sentinel,
            _pad: [0; 2],
        };
        ctx.queue().write_buffer(info, 0, bytemuck::bytes_of(&data));

        if self.bind_group.is_none() {
            let nodes = self.nodes.as_ref()?.gpu()?;
            let materials = self.materials.as_ref()?.gpu()?;
            let settings = self.settings.as_ref()?.gpu()?;
            let samples = match self.samples.as_ref().and_then(BufferHandle::gpu) {
                Some(buffer) => buffer,
                None => self.fallback_samples.get_or_insert_with(|| {
                    device.create_buffer(&wgpu::BufferDescriptor {
                        label: Some("empty mesh samples"),
                        size: 4,
                        usage: wgpu::BufferUsages::STORAGE,
                        mapped_at_creation: false,
                    })
                }),
            };
            let info = self.info.as_ref()?;
            self.bind_group = Some(device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("field bindings"),
                layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: nodes.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: materials.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: samples.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: settings.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 4,
                        resource: info.as_entire_binding(),
                    },
                ],
            }));
            tracing::debug!(nodes = self.node_count, "field bind group rebuilt");
        }
        self.bind_group.as_ref()
    }

    /// Bind group built by the last [`FieldBindings::bind_group`] call, if
    /// no handle has changed since
    pub fn current(&self) -> Option<&wgpu::BindGroup> {
        self.bind_group.as_ref()
    }

    /// Forget every handle and GPU object
    pub fn clear(&mut self) {
        *self = FieldBindings::default();
    }
}
