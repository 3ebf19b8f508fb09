//! Field raymarcher
//!
//! Renders the group's field directly: a bounding cube proxy is rasterised
//! and each fragment sphere-traces the field from the camera through it.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};
use wgpu::util::DeviceExt;

use crate::error::Result;
use crate::gpu::{create_shader, BufferHandle, FieldBindings, GpuContext};
use crate::group::{FieldConsumer, FieldFrame};
use crate::mapper::EMPTY_FIELD_DISTANCE;
use crate::shaders::RAYMARCH_WGSL;

/// Proxy and trace parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RaymarchVisuals {
    /// Edge lengths of the bounding cube proxy
    pub size: Vec3,
    /// Sphere-trace step limit
    pub max_iterations: u32,
    /// Hit threshold
    pub surface_distance: f32,
    /// Trace length limit from the camera
    pub max_distance: f32,
    /// Direction the light travels in
    pub light_direction: Vec3,
    /// Tint multiplied into the material colour
    pub diffuse_colour: Vec3,
    /// Light added regardless of the surface orientation
    pub ambient_colour: Vec3,
    /// Highlight sharpness, scaled to a specular exponent of `128 * gloss_power`
    pub gloss_power: f32,
    /// Highlight strength
    pub gloss_multiplier: f32,
}

impl Default for RaymarchVisuals {
    fn default() -> Self {
        RaymarchVisuals {
            size: Vec3::splat(10.0),
            max_iterations: 128,
            surface_distance: 0.001,
            max_distance: 100.0,
            light_direction: Vec3::new(-0.4, -1.0, -0.3),
            diffuse_colour: Vec3::ONE,
            ambient_colour: Vec3::splat(0.1),
            gloss_power: 0.1,
            gloss_multiplier: 0.5,
        }
    }
}

/// Group 1 uniform of the raymarch shader
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct GpuRaymarchParams {
    /// Camera view-projection
    pub view_proj: [[f32; 4]; 4],
    /// Proxy model transform
    pub model: [[f32; 4]; 4],
    /// Camera position (w unused)
    pub camera_position: [f32; 4],
    /// Light direction (w unused)
    pub light_direction: [f32; 4],
    /// Diffuse tint (w unused)
    pub diffuse_colour: [f32; 4],
    /// Ambient light (w unused)
    pub ambient_colour: [f32; 4],
    /// Sphere-trace step limit
    pub max_iterations: u32,
    /// Hit threshold
    pub surface_distance: f32,
    /// Trace length limit
    pub max_distance: f32,
    /// Highlight sharpness
    pub gloss_power: f32,
    /// Highlight strength
    pub gloss_multiplier: f32,
    /// Padding
    pub _pad: [f32; 3],
}

/// Camera state for one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RaymarchCamera {
    /// Projection times view
    pub view_proj: Mat4,
    /// Eye position in field space
    pub position: Vec3,
}

/// Triangle list of the cube proxy, outward facing counter-clockwise
pub const CUBE_INDICES: [u16; 36] = [
    0, 2, 1, 0, 3, 2, // -z
    4, 5, 6, 4, 6, 7, // +z
    0, 1, 5, 0, 5, 4, // -y
    3, 7, 6, 3, 6, 2, // +y
    0, 4, 7, 0, 7, 3, // -x
    1, 2, 6, 1, 6, 5, // +x
];

/// Corners of a cube of the given edge lengths centred on the origin
pub fn cube_vertices(size: Vec3) -> [Vec3; 8] {
    let h = size * 0.5;
    [
        Vec3::new(-h.x, -h.y, -h.z),
        Vec3::new(h.x, -h.y, -h.z),
        Vec3::new(h.x, h.y, -h.z),
        Vec3::new(-h.x, h.y, -h.z),
        Vec3::new(-h.x, -h.y, h.z),
        Vec3::new(h.x, -h.y, h.z),
        Vec3::new(h.x, h.y, h.z),
        Vec3::new(-h.x, h.y, h.z),
    ]
}

struct RenderState {
    field_layout: wgpu::BindGroupLayout,
    pipeline: wgpu::RenderPipeline,
    params: wgpu::Buffer,
    params_group: wgpu::BindGroup,
    vertices: wgpu::Buffer,
    indices: wgpu::Buffer,
    proxy_size: Vec3,
}

impl std::fmt::Debug for RenderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderState").field("proxy_size", &self.proxy_size).finish()
    }
}

/// Field consumer drawing the field with a raymarching shader
#[derive(Debug)]
pub struct FieldRaymarcher {
    gpu: Arc<GpuContext>,
    visuals: RaymarchVisuals,
    color_format: wgpu::TextureFormat,
    depth_format: Option<wgpu::TextureFormat>,
    field: FieldBindings,
    state: Option<RenderState>,
    enabled: bool,
}

impl FieldRaymarcher {
    /// Raymarcher drawing into targets of `color_format`
    pub fn new(gpu: Arc<GpuContext>, color_format: wgpu::TextureFormat, visuals: RaymarchVisuals) -> Self {
        FieldRaymarcher {
            gpu,
            visuals,
            color_format,
            depth_format: None,
            field: FieldBindings::default(),
            state: None,
            enabled: false,
        }
    }

    /// Also write proxy depth into a depth attachment of `format`
    pub fn with_depth_format(mut self, format: wgpu::TextureFormat) -> Self {
        self.depth_format = Some(format);
        self.state = None;
        self
    }

    /// Whether the field is non-empty and will be drawn
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Current visuals
    pub fn visuals(&self) -> &RaymarchVisuals {
        &self.visuals
    }

    /// Replace the visuals; the proxy is resized on the next prepare
    pub fn set_visuals(&mut self, visuals: RaymarchVisuals) {
        self.visuals = visuals;
    }

    /// Node records the field currently has
    pub fn node_count(&self) -> usize {
        self.field.node_count()
    }

    fn build_state(&self) -> Result<RenderState> {
        let device = self.gpu.device();
        let shader = create_shader(device, RAYMARCH_WGSL, "raymarch")?;

        let field_layout = FieldBindings::layout(device, wgpu::ShaderStages::FRAGMENT);
        let params_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("raymarch params"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("raymarch"),
            bind_group_layouts: &[&field_layout, &params_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("raymarch"),
            layout: Some(&layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<[f32; 3]>() as u64,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &[wgpu::VertexAttribute {
                        offset: 0,
                        shader_location: 0,
                        format: wgpu::VertexFormat::Float32x3,
                    }],
                }],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: self.color_format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                // back faces stay visible with the camera inside the proxy
                cull_mode: Some(wgpu::Face::Front),
                unclipped_depth: false,
                polygon_mode: wgpu::PolygonMode::Fill,
                conservative: false,
            },
            depth_stencil: self.depth_format.map(|format| wgpu::DepthStencilState {
                format,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::LessEqual,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let params = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("raymarch params"),
            size: std::mem::size_of::<GpuRaymarchParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let params_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("raymarch params"),
            layout: &params_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: params.as_entire_binding(),
            }],
        });

        let corners = cube_vertices(self.visuals.size).map(|v| v.to_array());
        let vertices = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("raymarch proxy vertices"),
            contents: bytemuck::cast_slice(&corners),
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        });
        let indices = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("raymarch proxy indices"),
            contents: bytemuck::cast_slice(&CUBE_INDICES),
            usage: wgpu::BufferUsages::INDEX,
        });

        tracing::debug!(format = ?self.color_format, "raymarch pipeline built");
        Ok(RenderState {
            field_layout,
            pipeline,
            params,
            params_group,
            vertices,
            indices,
            proxy_size: self.visuals.size,
        })
    }

    /// Upload this frame's parameters, building the pipeline on first use.
    ///
    /// Returns whether a draw will be recorded by [`FieldRaymarcher::draw`].
    pub fn prepare(&mut self, camera: &RaymarchCamera, model: Mat4) -> Result<bool> {
        if !self.enabled {
            return Ok(false);
        }
        if self.state.is_none() {
            self.state = Some(self.build_state()?);
        }
        let Some(state) = self.state.as_mut() else {
            return Ok(false);
        };

        let queue = self.gpu.queue();
        if state.proxy_size != self.visuals.size {
            let corners = cube_vertices(self.visuals.size).map(|v| v.to_array());
            queue.write_buffer(&state.vertices, 0, bytemuck::cast_slice(&corners));
            state.proxy_size = self.visuals.size;
        }

        let params = GpuRaymarchParams {
            view_proj: camera.view_proj.to_cols_array_2d(),
            model: model.to_cols_array_2d(),
            camera_position: camera.position.extend(1.0).to_array(),
            light_direction: self.visuals.light_direction.extend(0.0).to_array(),
            diffuse_colour: self.visuals.diffuse_colour.extend(1.0).to_array(),
            ambient_colour: self.visuals.ambient_colour.extend(1.0).to_array(),
            max_iterations: self.visuals.max_iterations,
            surface_distance: self.visuals.surface_distance,
            max_distance: self.visuals.max_distance,
            gloss_power: self.visuals.gloss_power,
            gloss_multiplier: self.visuals.gloss_multiplier,
            _pad: [0.0; 3],
        };
        queue.write_buffer(&state.params, 0, bytemuck::bytes_of(&params));

        Ok(self
            .field
            .bind_group(&self.gpu, &state.field_layout, EMPTY_FIELD_DISTANCE)
            .is_some())
    }

    /// Record the proxy draw into `pass`; does nothing until prepared
    pub fn draw(&self, pass: &mut wgpu::RenderPass<'_>) {
        if !self.enabled {
            return;
        }
        let (Some(state), Some(field)) = (self.state.as_ref(), self.field.current()) else {
            return;
        };
        pass.set_pipeline(&state.pipeline);
        pass.set_bind_group(0, field, &[]);
        pass.set_bind_group(1, &state.params_group, &[]);
        pass.set_vertex_buffer(0, state.vertices.slice(..));
        pass.set_index_buffer(state.indices.slice(..), wgpu::IndexFormat::Uint16);
        pass.draw_indexed(0..CUBE_INDICES.len() as u32, 0, 0..1);
    }
}

impl FieldConsumer for FieldRaymarcher {
    fn on_field_became_empty(&mut self) {
        self.enabled = false;
    }

    fn on_field_became_non_empty(&mut self) {
        self.enabled = true;
    }

    fn on_node_or_material_buffer_changed(&mut self, nodes: &BufferHandle, materials: &BufferHandle, count: usize) {
        self.field.set_nodes(nodes, materials, count);
    }

    fn on_settings_buffer_changed(&mut self, settings: &BufferHandle) {
        self.field.set_settings(settings);
    }

    fn on_mesh_samples_changed(&mut self, samples: Option<&BufferHandle>, _uvs: Option<&BufferHandle>) {
        self.field.set_samples(samples);
    }

    // the shader reads the buffers directly
    fn run_per_tick_update(&mut self, _frame: &FieldFrame) {}

    fn release(&mut self) {
        self.state = None;
        self.field.clear();
        self.enabled = false;
    }
}
