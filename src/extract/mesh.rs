use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};

/// Interleaved output vertex, as written by the GPU pipeline (48 bytes)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GpuOutputVertex {
    /// Position, w unused
    pub position: [f32; 4],
    /// Normal, w unused
    pub normal: [f32; 4],
    /// RGBA colour
    pub colour: [f32; 4],
}

/// Counter values of one extraction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractionCounts {
    /// Vertices generated from active cells
    pub vertices: u32,
    /// Triangles emitted
    pub triangles: u32,
    /// Extra vertices spawned at sharp corners
    pub intermediate: u32,
}

impl ExtractionCounts {
    /// Vertices in the final mesh
    pub fn total_vertices(&self) -> u32 {
        self.vertices + self.intermediate
    }
}

/// Extracted triangle mesh
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedMesh {
    /// Vertex positions
    pub positions: Vec<Vec3>,
    /// Vertex normals
    pub normals: Vec<Vec3>,
    /// Vertex colours
    pub colours: Vec<Vec4>,
    /// Triangle list
    pub indices: Vec<u32>,
}

impl ExtractedMesh {
    /// Number of vertices
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Number of triangles
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Whether the mesh has no triangles
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Axis-aligned bounds, `None` when there are no vertices
    pub fn bounds(&self) -> Option<(Vec3, Vec3)> {
        let first = *self.positions.first()?;
        Some(
            self.positions
                .iter()
                .fold((first, first), |(lo, hi), &p| (lo.min(p), hi.max(p))),
        )
    }

    pub(crate) fn from_gpu(vertices: &[GpuOutputVertex], indices: Vec<u32>) -> Self {
        let mut mesh = ExtractedMesh {
            positions: Vec::with_capacity(vertices.len()),
            normals: Vec::with_capacity(vertices.len()),
            colours: Vec::with_capacity(vertices.len()),
            indices,
        };
        for v in vertices {
            mesh.positions.push(Vec4::from_array(v.position).truncate());
            mesh.normals.push(Vec4::from_array(v.normal).truncate());
            mesh.colours.push(Vec4::from_array(v.colour));
        }
        mesh
    }
}

/// Receiver of extracted meshes (renderer, collider, exporter)
pub trait MeshSink: Send {
    /// Replace the current mesh
    fn install(&mut self, mesh: &ExtractedMesh);

    /// Show or hide the current mesh. Disabled when the surface is empty.
    fn set_enabled(&mut self, enabled: bool);
}

/// Sink that keeps the last installed mesh
#[derive(Debug, Default)]
pub struct MeshSlot {
    mesh: Option<ExtractedMesh>,
    enabled: bool,
    installs: usize,
}

impl MeshSlot {
    /// Last installed mesh
    pub fn mesh(&self) -> Option<&ExtractedMesh> {
        self.mesh.as_ref()
    }

    /// Take the last installed mesh
    pub fn take(&mut self) -> Option<ExtractedMesh> {
        self.mesh.take()
    }

    /// Whether the mesh is shown
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Number of installs so far
    pub fn installs(&self) -> usize {
        self.installs
    }
}

impl MeshSink for MeshSlot {
    fn install(&mut self, mesh: &ExtractedMesh) {
        self.mesh = Some(mesh.clone());
        self.installs += 1;
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }
}
