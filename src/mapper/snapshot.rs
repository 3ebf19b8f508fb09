//! Immutable field snapshot evaluated by the Mapper
//!
//! Built from the same node/material records the group uploads to the GPU,
//! so CPU queries replay exactly the combination the shader performs.

use std::sync::Arc;

use glam::{Mat4, Vec3, Vec4};

use super::MapperConfig;
use crate::asset::SampleGrid;
use crate::operations::{
    elongate, intersect_blend_weight, smooth_intersect, smooth_subtract, smooth_union,
    subtract_blend_weight, union_blend_weight,
};
use crate::primitives::eval_primitive;
use crate::types::{
    GpuMaterialRecord, GpuNodeRecord, GpuSettingsRecord, COMBINE_SUBTRACT, COMBINE_UNION,
    NODE_TYPE_ELONGATE, NODE_TYPE_MESH, NODE_TYPE_TEXTURE,
};

/// Gradient step used to push mesh distances past the sampled box
pub const MESH_GRADIENT_EPSILON: f32 = 0.75;
/// Inset of the sampled box used when extending mesh distances outside it
pub const MESH_BOUNDS_PUSH: f32 = 0.04;

/// Node record with its matrices expanded for evaluation
#[derive(Debug, Clone)]
struct EvalNode {
    node_type: i32,
    data: Vec4,
    field_to_local: Mat4,
    local_to_field: Mat4,
    combine: i32,
    flip: f32,
    smoothing: f32,
    min_bounds: Vec3,
    max_bounds: Vec3,
    size: usize,
    sample_start: usize,
    colour: Vec3,
    material_smoothing: f32,
}

impl EvalNode {
    fn from_record(record: &GpuNodeRecord, material: Option<&GpuMaterialRecord>) -> Self {
        let field_to_local = Mat4::from_cols_array_2d(&record.transform);
        EvalNode {
            node_type: record.node_type,
            data: Vec4::from_array(record.data),
            field_to_local,
            local_to_field: field_to_local.inverse(),
            combine: record.combine_type,
            flip: record.flip,
            smoothing: record.smoothing,
            min_bounds: Vec4::from_array(record.min_bounds).truncate(),
            max_bounds: Vec4::from_array(record.max_bounds).truncate(),
            size: record.size.max(0) as usize,
            sample_start: record.sample_start.max(0) as usize,
            colour: material.map_or(Vec3::ONE, |m| Vec3::from_array(m.colour)),
            material_smoothing: material.map_or(0.0, |m| m.material_smoothing),
        }
    }
}

/// Immutable copy of a group's field, published atomically on every rebuild
#[derive(Debug, Clone)]
pub struct MapperSnapshot {
    version: u64,
    nodes: Vec<EvalNode>,
    samples: Arc<Vec<f32>>,
    settings: GpuSettingsRecord,
    config: MapperConfig,
}

impl MapperSnapshot {
    /// Snapshot of an empty field
    pub fn empty(config: MapperConfig) -> Self {
        MapperSnapshot {
            version: 0,
            nodes: Vec::new(),
            samples: Arc::new(Vec::new()),
            settings: GpuSettingsRecord {
                normal_smoothing: crate::group::DEFAULT_NORMAL_SMOOTHING,
                thickness_max_distance: 0.0,
                thickness_falloff: 0.0,
                _pad: 0.0,
            },
            config,
        }
    }

    /// Build a snapshot from GPU records.
    ///
    /// `materials[i]` belongs to `nodes[i]`; `samples` is the shared mesh
    /// sample array the mesh records point into.
    pub fn from_records(
        version: u64,
        nodes: &[GpuNodeRecord],
        materials: &[GpuMaterialRecord],
        samples: Arc<Vec<f32>>,
        settings: GpuSettingsRecord,
        config: MapperConfig,
    ) -> Self {
        let nodes = nodes
            .iter()
            .enumerate()
            .map(|(i, r)| EvalNode::from_record(r, materials.get(i)))
            .collect();
        MapperSnapshot {
            version,
            nodes,
            samples,
            settings,
            config,
        }
    }

    /// Same field with a different configuration
    pub(crate) fn with_config(&self, config: MapperConfig) -> Self {
        MapperSnapshot {
            config,
            ..self.clone()
        }
    }

    /// Rebuild counter of the publishing group
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Number of nodes (including operations)
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the field has no nodes
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Group settings captured with the snapshot
    pub fn settings(&self) -> &GpuSettingsRecord {
        &self.settings
    }

    /// Query configuration
    pub fn config(&self) -> &MapperConfig {
        &self.config
    }

    fn grid(&self, node: &EvalNode) -> SampleGrid<'_> {
        SampleGrid {
            samples: &self.samples,
            start: node.sample_start,
            size: node.size,
            min_bounds: node.min_bounds,
            max_bounds: node.max_bounds,
        }
    }

    /// Distance of a mesh node: the trilinear sample inside the box, extended
    /// outside it by the offset to the box plus a step down the gradient.
    fn mesh_distance(&self, node: &EvalNode, p: Vec3) -> f32 {
        let grid = self.grid(node);
        let local = node.field_to_local.transform_point3(p);
        let sample = grid.sample(local);

        let push = Vec3::splat(MESH_BOUNDS_PUSH);
        let closest = local.clamp(node.min_bounds + push, node.max_bounds - push);

        let e = MESH_GRADIENT_EPSILON;
        let gradient = TETRAHEDRON.iter().fold(Vec3::ZERO, |acc, &k| {
            acc + k * grid.sample_inset(closest + k * e, MESH_BOUNDS_PUSH)
        });

        let in_bounds = -normalize_or_zero(gradient) * sample;
        let to_bounds = closest - local;
        (to_bounds + in_bounds).length() * sign(sample) * node.flip
    }

    #[inline]
    fn node_distance(&self, node: &EvalNode, p: Vec3) -> f32 {
        if node.node_type == NODE_TYPE_MESH {
            self.mesh_distance(node, p)
        } else {
            let local = node.field_to_local.transform_point3(p);
            eval_primitive(node.node_type, node.data, local) * node.flip
        }
    }

    /// Signed distance of the combined field.
    ///
    /// Walks the nodes in order: operations warp the query point for every
    /// later node, other nodes fold into the running distance with their
    /// combine policy. An empty field returns the configured sentinel.
    pub fn distance(&self, point: Vec3) -> f32 {
        let mut p = point;
        let mut min_dist = self.config.sentinel;

        for node in &self.nodes {
            match node.node_type {
                NODE_TYPE_ELONGATE => {
                    p = elongate(p, &node.field_to_local, &node.local_to_field, node.data.truncate());
                }
                NODE_TYPE_TEXTURE => {}
                _ => {
                    let d = self.node_distance(node, p);
                    min_dist = combine(node.combine, min_dist, d, node.smoothing);
                }
            }
        }

        min_dist
    }

    /// Albedo at `point`, blended across nodes with the same weights as the
    /// distance combination.
    pub fn colour(&self, point: Vec3) -> Vec3 {
        let mut p = point;
        let mut min_dist = self.config.sentinel;
        let mut colour = Vec3::ZERO;

        for node in &self.nodes {
            match node.node_type {
                NODE_TYPE_ELONGATE => {
                    p = elongate(p, &node.field_to_local, &node.local_to_field, node.data.truncate());
                }
                NODE_TYPE_TEXTURE => {}
                _ => {
                    let d = self.node_distance(node, p);
                    let k = node.smoothing.max(node.material_smoothing);
                    let w = match node.combine {
                        COMBINE_UNION => union_blend_weight(min_dist, d, k),
                        COMBINE_SUBTRACT => subtract_blend_weight(min_dist, d, k),
                        _ => intersect_blend_weight(min_dist, d, k),
                    };
                    colour = colour.lerp(node.colour, w);
                    min_dist = combine(node.combine, min_dist, d, node.smoothing);
                }
            }
        }

        colour
    }
}

/// Fold a node distance into the running distance
#[inline(always)]
pub(crate) fn combine(combine_type: i32, running: f32, d: f32, k: f32) -> f32 {
    match combine_type {
        COMBINE_UNION => smooth_union(running, d, k),
        COMBINE_SUBTRACT => smooth_subtract(d, running, k),
        _ => smooth_intersect(d, running, k),
    }
}

/// Tetrahedron directions used by the 4-sample gradient estimate
pub(crate) const TETRAHEDRON: [Vec3; 4] = [
    Vec3::new(1.0, -1.0, -1.0),
    Vec3::new(-1.0, -1.0, 1.0),
    Vec3::new(-1.0, 1.0, -1.0),
    Vec3::new(1.0, 1.0, 1.0),
];

#[inline(always)]
pub(crate) fn normalize_or_zero(v: Vec3) -> Vec3 {
    let len_sq = v.length_squared();
    if len_sq > 1e-20 {
        v / len_sq.sqrt()
    } else {
        Vec3::ZERO
    }
}

/// Sign with `sign(0) == 1`
#[inline(always)]
fn sign(x: f32) -> f32 {
    if x >= 0.0 {
        1.0
    } else {
        -1.0
    }
}
