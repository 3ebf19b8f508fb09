//! CPU reference extractor
//!
//! Runs the same stages as the GPU pipeline over a Mapper snapshot:
//! map, vertex generation, triangle generation, index buffer with
//! intermediate vertices, merge. Used on hosts without a GPU, by the CLI and
//! as the reference the GPU output is checked against.
//!
//! # Features
//! - **Z-slice parallel map**: the grid is sampled with rayon, one slice per task
//! - **Surface nets / dual contouring** with interpolated or bisected edges
//! - **Sharp corners**: corners whose vertex normal deviates from the face
//!   normal past the angle tolerance get their own vertex

use glam::{Mat4, Vec3, Vec4};
use rayon::prelude::*;

use super::mesh::{ExtractedMesh, ExtractionCounts};
use super::settings::{EdgeIntersection, ExtractionType, ExtractorSettings, VoxelSettings};
use crate::mapper::MapperSnapshot;

/// Corner offsets of a cell, bit 0 = x, bit 1 = y, bit 2 = z
const CORNERS: [(u32, u32, u32); 8] = [
    (0, 0, 0),
    (1, 0, 0),
    (0, 1, 0),
    (1, 1, 0),
    (0, 0, 1),
    (1, 0, 1),
    (0, 1, 1),
    (1, 1, 1),
];

/// The 12 cell edges as corner index pairs
const EDGES: [(usize, usize); 12] = [
    (0, 1),
    (2, 3),
    (4, 5),
    (6, 7),
    (0, 2),
    (1, 3),
    (4, 6),
    (5, 7),
    (0, 4),
    (1, 5),
    (2, 6),
    (3, 7),
];

/// Generated vertex before numbering
#[derive(Debug, Clone, Copy)]
struct CellVertex {
    world: Vec3,
    normal: Vec3,
}

/// Sampled grid and the placement it was sampled with
struct SampledGrid<'a> {
    snapshot: &'a MapperSnapshot,
    voxel: VoxelSettings,
    grid_transform: Mat4,
    samples: Vec<f32>,
}

impl SampledGrid<'_> {
    #[inline]
    fn world(&self, x: u32, y: u32, z: u32) -> Vec3 {
        self.grid_transform
            .transform_point3(self.voxel.cell_coordinate_to_vertex(x, y, z))
    }

    #[inline]
    fn sample(&self, x: u32, y: u32, z: u32) -> f32 {
        self.samples[self.voxel.cell_coordinate_to_index(x, y, z)]
    }
}

/// Stage 1: distance at every grid point
fn map(snapshot: &MapperSnapshot, settings: &ExtractorSettings) -> Vec<f32> {
    let voxel = settings.voxel;
    let n = voxel.samples_per_side;
    let slice = (n * n) as usize;
    let mut samples = vec![0.0f32; voxel.total_samples()];

    samples
        .par_chunks_mut(slice)
        .enumerate()
        .for_each(|(z, chunk)| {
            let z = z as u32;
            let mut i = 0;
            for y in 0..n {
                for x in 0..n {
                    let p = settings
                        .grid_transform
                        .transform_point3(voxel.cell_coordinate_to_vertex(x, y, z));
                    chunk[i] = snapshot.distance(p);
                    i += 1;
                }
            }
        });
    samples
}

/// Crossing point on the edge between two grid points of opposite sign
fn edge_crossing(grid: &SampledGrid<'_>, a: Vec3, da: f32, b: Vec3, db: f32, settings: &ExtractorSettings) -> Vec3 {
    match settings.algorithm.edge_intersection {
        EdgeIntersection::Interpolate => {
            let t = da / (da - db);
            a.lerp(b, t)
        }
        EdgeIntersection::BinarySearch => {
            let (mut lo, mut hi) = (a, b);
            let inside_lo = da < 0.0;
            for _ in 0..settings.algorithm.binary_search_iterations {
                let mid = (lo + hi) * 0.5;
                if (grid.snapshot.distance(mid) < 0.0) == inside_lo {
                    lo = mid;
                } else {
                    hi = mid;
                }
            }
            (lo + hi) * 0.5
        }
    }
}

/// Stage 2: one vertex per cell whose corners straddle the surface
fn cell_vertex(grid: &SampledGrid<'_>, x: u32, y: u32, z: u32, settings: &ExtractorSettings) -> Option<CellVertex> {
    let mut corner_pos = [Vec3::ZERO; 8];
    let mut corner_d = [0.0f32; 8];
    let mut mask = 0u8;
    for (i, &(cx, cy, cz)) in CORNERS.iter().enumerate() {
        corner_pos[i] = grid.world(x + cx, y + cy, z + cz);
        corner_d[i] = grid.sample(x + cx, y + cy, z + cz);
        if corner_d[i] < 0.0 {
            mask |= 1 << i;
        }
    }
    if mask == 0 || mask == 0xff {
        return None;
    }

    let mut sum = Vec3::ZERO;
    let mut crossings = 0;
    for &(i, j) in &EDGES {
        let (di, dj) = (corner_d[i], corner_d[j]);
        if (di < 0.0) != (dj < 0.0) {
            sum += edge_crossing(grid, corner_pos[i], di, corner_pos[j], dj, settings);
            crossings += 1;
        }
    }
    let mut world = sum / crossings as f32;

    if settings.algorithm.extraction_type == ExtractionType::DualContouring {
        let to_local = grid.grid_transform.inverse();
        let lo = grid.voxel.cell_coordinate_to_vertex(x, y, z);
        let hi = grid.voxel.cell_coordinate_to_vertex(x + 1, y + 1, z + 1);
        for _ in 0..settings.algorithm.gradient_descent_iterations {
            let d = grid.snapshot.distance(world);
            let n = grid.snapshot.normal(world);
            let local = to_local.transform_point3(world - n * d).clamp(lo, hi);
            world = grid.grid_transform.transform_point3(local);
        }
    }

    let normal = grid
        .snapshot
        .gradient(world, settings.algorithm.visual_normal_smoothing)
        .normalize_or_zero();
    Some(CellVertex { world, normal })
}

/// Stage 3: one quad per sign-changing grid edge, from the four cells around it
fn triangles(grid: &SampledGrid<'_>, cell_ids: &[i32]) -> Vec<[u32; 3]> {
    let voxel = grid.voxel;
    let cells = voxel.cell_count();
    let cell_index = |x: u32, y: u32, z: u32| -> i32 { cell_ids[voxel.cell_coordinate_to_index(x, y, z)] };

    let mut out = Vec::new();
    for z in 0..cells {
        for y in 0..cells {
            for x in 0..cells {
                let v0 = cell_index(x, y, z);
                if v0 < 0 {
                    continue;
                }
                let d0 = grid.sample(x, y, z);
                // (axis end point, the two other axes with b x c = axis)
                let axes = [
                    ((x + 1, y, z), (0, 1, 0), (0, 0, 1)),
                    ((x, y + 1, z), (0, 0, 1), (1, 0, 0)),
                    ((x, y, z + 1), (1, 0, 0), (0, 1, 0)),
                ];
                for ((ex, ey, ez), b, c) in axes {
                    let d1 = grid.sample(ex, ey, ez);
                    if (d0 < 0.0) == (d1 < 0.0) {
                        continue;
                    }
                    if x < b.0 + c.0 || y < b.1 + c.1 || z < b.2 + c.2 {
                        continue;
                    }
                    let v1 = cell_index(x - b.0, y - b.1, z - b.2);
                    let v2 = cell_index(x - b.0 - c.0, y - b.1 - c.1, z - b.2 - c.2);
                    let v3 = cell_index(x - c.0, y - c.1, z - c.2);
                    if v1 < 0 || v2 < 0 || v3 < 0 {
                        continue;
                    }
                    let (v0, v1, v2, v3) = (v0 as u32, v1 as u32, v2 as u32, v3 as u32);
                    if d0 < 0.0 {
                        out.push([v0, v1, v2]);
                        out.push([v0, v2, v3]);
                    } else {
                        out.push([v0, v2, v1]);
                        out.push([v0, v3, v2]);
                    }
                }
            }
        }
    }
    out
}

/// Extract the zero isosurface of `snapshot` on the configured grid.
///
/// Output positions and normals are in mesh space (`mesh_transform` applied).
pub fn extract_mesh(snapshot: &MapperSnapshot, settings: &ExtractorSettings) -> (ExtractedMesh, ExtractionCounts) {
    let _span = tracing::debug_span!("cpu_extract", samples_per_side = settings.voxel.samples_per_side).entered();
    let voxel = settings.voxel;
    if voxel.samples_per_side < 2 {
        return (ExtractedMesh::default(), ExtractionCounts::default());
    }

    let grid = SampledGrid {
        snapshot,
        voxel,
        grid_transform: settings.grid_transform,
        samples: map(snapshot, settings),
    };

    // Cells are addressed with grid point indices, so the id table is total_samples long
    let cells = voxel.cell_count();
    let per_cell: Vec<Option<CellVertex>> = (0..voxel.total_samples())
        .into_par_iter()
        .map(|i| {
            let (x, y, z) = voxel.index_to_cell_coordinate(i);
            if x >= cells || y >= cells || z >= cells {
                return None;
            }
            cell_vertex(&grid, x, y, z, settings)
        })
        .collect();

    let mut cell_ids = vec![-1i32; per_cell.len()];
    let mut vertices = Vec::new();
    for (i, v) in per_cell.into_iter().enumerate() {
        if let Some(v) = v {
            cell_ids[i] = vertices.len() as i32;
            vertices.push(v);
        }
    }

    let tris = triangles(&grid, &cell_ids);

    let max_angle_cos = settings.algorithm.max_angle_cosine();
    let mut intermediate: Vec<CellVertex> = Vec::new();
    let mut indices = Vec::with_capacity(tris.len() * 3);
    for tri in &tris {
        let p = tri.map(|i| vertices[i as usize].world);
        let face = (p[1] - p[0]).cross(p[2] - p[0]).normalize_or_zero();
        for &vi in tri {
            let v = vertices[vi as usize];
            if face != Vec3::ZERO && v.normal.dot(face) < max_angle_cos {
                indices.push((vertices.len() + intermediate.len()) as u32);
                intermediate.push(CellVertex {
                    world: v.world,
                    normal: face,
                });
            } else {
                indices.push(vi);
            }
        }
    }

    let counts = ExtractionCounts {
        vertices: vertices.len() as u32,
        triangles: tris.len() as u32,
        intermediate: intermediate.len() as u32,
    };

    let mesh_transform = settings.mesh_transform;
    let all: Vec<CellVertex> = vertices.into_iter().chain(intermediate).collect();
    let colours: Vec<Vec4> = all
        .par_iter()
        .map(|v| snapshot.colour(v.world).extend(1.0))
        .collect();

    let mesh = ExtractedMesh {
        positions: all.iter().map(|v| mesh_transform.transform_point3(v.world)).collect(),
        normals: all
            .iter()
            .map(|v| mesh_transform.transform_vector3(v.normal).normalize_or_zero())
            .collect(),
        colours,
        indices,
    };

    tracing::debug!(
        vertices = counts.vertices,
        intermediate = counts.intermediate,
        triangles = counts.triangles,
        "cpu extraction done"
    );
    (mesh, counts)
}
