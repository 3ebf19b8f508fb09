//! GPU isosurface pipeline
//!
//! Seven compute stages from `shaders/isosurface.wgsl`. Stages whose
//! workload is only known after an earlier stage ran are dispatched
//! indirectly: the counter buffer is copied into a dedicated indirect buffer
//! between passes, so no dispatch reads a buffer it also writes.
//!
//! ```text
//! reset counters (queue write)
//! pass A: map_grid, generate_vertices          ceil(n/4)^3
//! copy counters -> indirect
//! pass B: number_vertices, generate_triangles  indirect[VERTEX_DIV64]
//! copy counters -> indirect
//! pass C: build_index_buffer                   indirect[TRIANGLE_DIV64]
//! copy counters -> indirect
//! pass D: merge_intermediate                   indirect[INTERMEDIATE_DIV64]
//!         finalize                             1
//! ```

use bytemuck::{Pod, Zeroable};

use super::mesh::{ExtractedMesh, ExtractionCounts, GpuOutputVertex};
use super::settings::{EdgeIntersection, ExtractionType, ExtractorSettings};
use crate::error::Result;
use crate::gpu::{bgl_entry, create_pipeline, create_shader, workgroups, GpuContext, PendingRead, ReadState};
use crate::gpu::{FieldBindings, STORAGE_RW, UNIFORM};
use crate::shaders::{ISOSURFACE_ENTRY_POINTS, ISOSURFACE_WGSL};

/// Counter slots, each followed by two 1s so a slot doubles as dispatch args
pub const COUNTER_VERTEX: usize = 0;
/// Triangle counter
pub const COUNTER_TRIANGLE: usize = 3;
/// Vertex count / 64, rounded up
pub const COUNTER_VERTEX_DIV64: usize = 6;
/// Triangle count / 64, rounded up
pub const COUNTER_TRIANGLE_DIV64: usize = 9;
/// Intermediate vertex counter
pub const COUNTER_INTERMEDIATE: usize = 12;
/// Intermediate count / 64, rounded up
pub const COUNTER_INTERMEDIATE_DIV64: usize = 15;
/// Number of u32 in the counter buffer
pub const COUNTER_LEN: usize = 18;

/// Counter buffer contents before every extraction
pub const COUNTER_RESET: [u32; COUNTER_LEN] = [0, 1, 1, 0, 1, 1, 0, 1, 1, 0, 1, 1, 0, 1, 1, 0, 1, 1];

/// `draw_indexed_indirect` args when nothing has been extracted
pub const PROCEDURAL_ARGS_RESET: [u32; 5] = [0, 1, 0, 0, 0];

/// Triangles per cell at most (three quads)
const MAX_TRIANGLES_PER_CELL: u64 = 6;
/// Output vertices per grid point
const OUTPUT_VERTICES_PER_POINT: u64 = 3;

/// Extraction uniform (160 bytes)
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct GpuExtractParams {
    /// Grid-local to world
    pub grid_transform: [[f32; 4]; 4],
    /// World to mesh space
    pub mesh_transform: [[f32; 4]; 4],
    /// Points per side
    pub points_per_side: u32,
    /// Padding
    pub _pad: u32,
    /// Distance between grid points
    pub cell_size: f32,
    /// Cosine of the max angle tolerance
    pub max_angle_cos: f32,
    /// Epsilon of vertex normals
    pub visual_normal_smoothing: f32,
    /// Dual contouring descent steps
    pub gradient_descent_iterations: u32,
    /// Bisection steps
    pub binary_search_iterations: u32,
    /// Bit 0: dual contouring, bit 1: bisected edges
    pub flags: u32,
}

impl GpuExtractParams {
    /// Uniform values for `settings`
    pub fn new(settings: &ExtractorSettings) -> Self {
        let algorithm = &settings.algorithm;
        let mut flags = 0;
        if algorithm.extraction_type == ExtractionType::DualContouring {
            flags |= 1;
        }
        if algorithm.edge_intersection == EdgeIntersection::BinarySearch {
            flags |= 2;
        }
        GpuExtractParams {
            grid_transform: settings.grid_transform.to_cols_array_2d(),
            mesh_transform: settings.mesh_transform.to_cols_array_2d(),
            points_per_side: settings.voxel.samples_per_side,
            _pad: 0,
            cell_size: settings.voxel.cell_size,
            max_angle_cos: algorithm.max_angle_cosine(),
            visual_normal_smoothing: algorithm.visual_normal_smoothing,
            gradient_descent_iterations: algorithm.gradient_descent_iterations,
            binary_search_iterations: algorithm.binary_search_iterations,
            flags,
        }
    }
}

/// Final counts read from the counter buffer
pub fn counts_from_counters(counters: &[u32]) -> ExtractionCounts {
    let at = |i: usize| counters.get(i).copied().unwrap_or(0);
    ExtractionCounts {
        vertices: at(COUNTER_VERTEX),
        triangles: at(COUNTER_TRIANGLE),
        intermediate: at(COUNTER_INTERMEDIATE),
    }
}

/// Group 1 bindings used by each stage, in `ISOSURFACE_ENTRY_POINTS` order
const STAGE_BINDINGS: [&[u32]; 7] = [
    &[0, 1],
    &[0, 1, 2, 3, 4, 5],
    &[0, 2, 3, 4, 5, 7],
    &[0, 1, 2, 4, 5, 6],
    &[0, 5, 6, 7, 8, 9],
    &[5, 7, 8],
    &[5, 6, 8, 10],
];

struct Stage {
    layout: wgpu::BindGroupLayout,
    pipeline: wgpu::ComputePipeline,
}

/// Compiled stages; created once per extractor
pub(crate) struct ExtractionPipeline {
    field_layout: wgpu::BindGroupLayout,
    stages: Vec<Stage>,
}

impl std::fmt::Debug for ExtractionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractionPipeline")
            .field("stages", &self.stages.len())
            .finish()
    }
}

impl ExtractionPipeline {
    pub(crate) fn new(ctx: &GpuContext) -> Result<Self> {
        let device = ctx.device();
        let shader = create_shader(device, ISOSURFACE_WGSL, "isosurface")?;
        let field_layout = FieldBindings::layout(device, wgpu::ShaderStages::COMPUTE);

        let stages = ISOSURFACE_ENTRY_POINTS
            .iter()
            .zip(STAGE_BINDINGS)
            .map(|(&entry, bindings)| {
                let entries: Vec<_> = bindings
                    .iter()
                    .map(|&b| bgl_entry(b, if b == 0 { UNIFORM } else { STORAGE_RW }))
                    .collect();
                let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some(entry),
                    entries: &entries,
                });
                let pipeline = create_pipeline(device, &[&field_layout, &layout], &shader, entry, entry);
                Stage { layout, pipeline }
            })
            .collect();

        tracing::debug!("isosurface pipeline compiled");
        Ok(ExtractionPipeline { field_layout, stages })
    }

    pub(crate) fn field_layout(&self) -> &wgpu::BindGroupLayout {
        &self.field_layout
    }
}

/// Working buffers for one grid resolution
pub(crate) struct ExtractionBuffers {
    points_per_side: u32,
    params: wgpu::Buffer,
    /// Indexed by group 1 binding
    storage: Vec<wgpu::Buffer>,
    indirect: wgpu::Buffer,
    bind_groups: Vec<wgpu::BindGroup>,
}

impl std::fmt::Debug for ExtractionBuffers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractionBuffers")
            .field("points_per_side", &self.points_per_side)
            .finish()
    }
}

const BINDING_COUNTERS: usize = 5;
const BINDING_OUT_VERTICES: usize = 7;
const BINDING_OUT_INDICES: usize = 9;
const BINDING_DRAW_ARGS: usize = 10;

impl ExtractionBuffers {
    /// Allocate every buffer for `points_per_side`; intermediate buffers
    /// hold one element per grid point.
    pub(crate) fn new(ctx: &GpuContext, pipeline: &ExtractionPipeline, points_per_side: u32) -> Self {
        let device = ctx.device();
        let n3 = u64::from(points_per_side).pow(3);
        let out_vertex_size = std::mem::size_of::<GpuOutputVertex>() as u64;
        let storage_usage = wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST;

        let sizes: [(&str, u64, wgpu::BufferUsages); 10] = [
            ("iso grid", n3 * 4, storage_usage),
            ("iso cell vertex", n3 * 4, storage_usage),
            ("iso cell data", n3 * 32, storage_usage),
            ("iso active cells", n3 * 4, storage_usage),
            ("iso counters", (COUNTER_LEN * 4) as u64, storage_usage),
            ("iso triangles", n3 * MAX_TRIANGLES_PER_CELL * 16, storage_usage),
            (
                "iso vertices",
                n3 * OUTPUT_VERTICES_PER_POINT * out_vertex_size,
                storage_usage | wgpu::BufferUsages::VERTEX,
            ),
            ("iso intermediate", n3 * out_vertex_size, storage_usage),
            (
                "iso indices",
                n3 * MAX_TRIANGLES_PER_CELL * 3 * 4,
                storage_usage | wgpu::BufferUsages::INDEX,
            ),
            ("iso draw args", 5 * 4, storage_usage | wgpu::BufferUsages::INDIRECT),
        ];
        let storage: Vec<wgpu::Buffer> = sizes
            .iter()
            .map(|&(label, size, usage)| {
                device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some(label),
                    size,
                    usage,
                    mapped_at_creation: false,
                })
            })
            .collect();
        ctx.queue()
            .write_buffer(&storage[BINDING_DRAW_ARGS - 1], 0, bytemuck::cast_slice(&PROCEDURAL_ARGS_RESET));

        let params = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("iso params"),
            size: std::mem::size_of::<GpuExtractParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let indirect = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("iso indirect"),
            size: (COUNTER_LEN * 4) as u64,
            usage: wgpu::BufferUsages::INDIRECT | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_groups = pipeline
            .stages
            .iter()
            .zip(STAGE_BINDINGS)
            .map(|(stage, bindings)| {
                let entries: Vec<wgpu::BindGroupEntry> = bindings
                    .iter()
                    .map(|&b| wgpu::BindGroupEntry {
                        binding: b,
                        resource: if b == 0 {
                            params.as_entire_binding()
                        } else {
                            storage[b as usize - 1].as_entire_binding()
                        },
                    })
                    .collect();
                device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("iso stage"),
                    layout: &stage.layout,
                    entries: &entries,
                })
            })
            .collect();

        tracing::debug!(points_per_side, "isosurface buffers allocated");
        ExtractionBuffers {
            points_per_side,
            params,
            storage,
            indirect,
            bind_groups,
        }
    }

    pub(crate) fn points_per_side(&self) -> u32 {
        self.points_per_side
    }

    fn buffer(&self, binding: usize) -> &wgpu::Buffer {
        &self.storage[binding - 1]
    }

    /// Output vertex buffer (procedural mode)
    pub(crate) fn vertices(&self) -> &wgpu::Buffer {
        self.buffer(BINDING_OUT_VERTICES)
    }

    /// Output index buffer (procedural mode)
    pub(crate) fn indices(&self) -> &wgpu::Buffer {
        self.buffer(BINDING_OUT_INDICES)
    }

    /// `draw_indexed_indirect` arguments (procedural mode)
    pub(crate) fn draw_args(&self) -> &wgpu::Buffer {
        self.buffer(BINDING_DRAW_ARGS)
    }

    /// Record and submit every stage
    pub(crate) fn dispatch(
        &self,
        ctx: &GpuContext,
        pipeline: &ExtractionPipeline,
        field: &wgpu::BindGroup,
        settings: &ExtractorSettings,
    ) {
        let queue = ctx.queue();
        queue.write_buffer(&self.params, 0, bytemuck::bytes_of(&GpuExtractParams::new(settings)));
        queue.write_buffer(self.buffer(BINDING_COUNTERS), 0, bytemuck::cast_slice(&COUNTER_RESET));

        let mut encoder = ctx.device().create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("isosurface extraction"),
        });

        let grid_groups = workgroups(self.points_per_side, 4);
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("iso map + vertices"),
                timestamp_writes: None,
            });
            for stage in 0..2 {
                self.bind_stage(&mut pass, pipeline, field, stage);
                pass.dispatch_workgroups(grid_groups, grid_groups, grid_groups);
            }
        }

        let counters_size = (COUNTER_LEN * 4) as u64;
        let indirect_passes: [(&[usize], usize, &str); 3] = [
            (&[2, 3], COUNTER_VERTEX_DIV64, "iso number + triangles"),
            (&[4], COUNTER_TRIANGLE_DIV64, "iso index buffer"),
            (&[5], COUNTER_INTERMEDIATE_DIV64, "iso merge"),
        ];
        for (stages, slot, label) in indirect_passes {
            encoder.copy_buffer_to_buffer(self.buffer(BINDING_COUNTERS), 0, &self.indirect, 0, counters_size);
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(label),
                timestamp_writes: None,
            });
            for &stage in stages {
                self.bind_stage(&mut pass, pipeline, field, stage);
                pass.dispatch_workgroups_indirect(&self.indirect, (slot * 4) as u64);
            }
            if slot == COUNTER_INTERMEDIATE_DIV64 {
                self.bind_stage(&mut pass, pipeline, field, 6);
                pass.dispatch_workgroups(1, 1, 1);
            }
        }

        queue.submit(Some(encoder.finish()));
    }

    fn bind_stage(
        &self,
        pass: &mut wgpu::ComputePass<'_>,
        pipeline: &ExtractionPipeline,
        field: &wgpu::BindGroup,
        stage: usize,
    ) {
        pass.set_pipeline(&pipeline.stages[stage].pipeline);
        pass.set_bind_group(0, field, &[]);
        pass.set_bind_group(1, &self.bind_groups[stage], &[]);
    }

    /// Start reading the counter buffer back
    pub(crate) fn read_counts(&self, ctx: &GpuContext) -> PendingRead {
        let size = (COUNTER_LEN * 4) as u64;
        let staging = staging_buffer(ctx, "iso counts staging", size);
        let mut encoder = ctx.device().create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("iso counts readback"),
        });
        encoder.copy_buffer_to_buffer(self.buffer(BINDING_COUNTERS), 0, &staging, 0, size);
        ctx.queue().submit(Some(encoder.finish()));
        PendingRead::begin(staging)
    }

    /// Start reading vertices and indices back; `None` for an empty mesh
    pub(crate) fn read_mesh(&self, ctx: &GpuContext, counts: ExtractionCounts) -> Option<MeshRead> {
        if counts.triangles == 0 {
            return None;
        }
        let vertex_bytes = u64::from(counts.total_vertices()) * std::mem::size_of::<GpuOutputVertex>() as u64;
        let index_bytes = u64::from(counts.triangles) * 3 * 4;
        let vertex_staging = staging_buffer(ctx, "iso vertex staging", vertex_bytes);
        let index_staging = staging_buffer(ctx, "iso index staging", index_bytes);

        let mut encoder = ctx.device().create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("iso mesh readback"),
        });
        encoder.copy_buffer_to_buffer(self.vertices(), 0, &vertex_staging, 0, vertex_bytes);
        encoder.copy_buffer_to_buffer(self.indices(), 0, &index_staging, 0, index_bytes);
        ctx.queue().submit(Some(encoder.finish()));

        Some(MeshRead {
            counts,
            vertices: PendingRead::begin(vertex_staging),
            indices: PendingRead::begin(index_staging),
            ready_vertices: None,
            ready_indices: None,
        })
    }
}

fn staging_buffer(ctx: &GpuContext, label: &str, size: u64) -> wgpu::Buffer {
    ctx.device().create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

/// Vertex and index maps in flight
#[derive(Debug)]
pub(crate) struct MeshRead {
    pub(crate) counts: ExtractionCounts,
    vertices: PendingRead,
    indices: PendingRead,
    ready_vertices: Option<Vec<GpuOutputVertex>>,
    ready_indices: Option<Vec<u32>>,
}

/// Poll one half of a readback unless it already landed in `slot`
fn poll_half<T>(slot: &mut Option<Vec<T>>, poll: impl FnOnce() -> ReadState<T>) -> Result<()> {
    if slot.is_none() {
        match poll() {
            ReadState::Ready(data) => *slot = Some(data),
            ReadState::Failed(e) => return Err(e),
            ReadState::Pending => {}
        }
    }
    Ok(())
}

impl MeshRead {
    /// Non-blocking step; `Ok(None)` until both halves have landed.
    ///
    /// A half that lands early is held here so the other keeps polling on
    /// later ticks.
    pub(crate) fn poll(&mut self) -> Result<Option<ExtractedMesh>> {
        let total = self.counts.total_vertices() as usize;
        let index_count = self.counts.triangles as usize * 3;
        let vertices = &mut self.vertices;
        poll_half(&mut self.ready_vertices, || vertices.poll::<GpuOutputVertex>(total))?;
        let indices = &mut self.indices;
        poll_half(&mut self.ready_indices, || indices.poll::<u32>(index_count))?;

        match (self.ready_vertices.take(), self.ready_indices.take()) {
            (Some(v), Some(i)) => Ok(Some(ExtractedMesh::from_gpu(&v, i))),
            (v, i) => {
                self.ready_vertices = v;
                self.ready_indices = i;
                Ok(None)
            }
        }
    }

    /// Block until both maps resolve
    pub(crate) fn wait(self, device: &wgpu::Device) -> Result<ExtractedMesh> {
        let total = self.counts.total_vertices() as usize;
        let vertices: Vec<GpuOutputVertex> = self.vertices.wait(device, total)?;
        let indices: Vec<u32> = self.indices.wait(device, self.counts.triangles as usize * 3)?;
        Ok(ExtractedMesh::from_gpu(&vertices, indices))
    }
}
