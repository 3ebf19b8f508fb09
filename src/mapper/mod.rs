//! CPU-side queries against a group's field
//!
//! The Mapper evaluates the same node list the GPU consumers see. Every
//! rebuild of the owning group publishes a fresh immutable
//! [`MapperSnapshot`]; readers clone the current `Arc` and query it without
//! holding any lock, so queries from worker threads never observe a
//! half-updated node list.
//!
//! # Features
//! - **Distance / colour**: exact replay of the shader's combination walk
//! - **Gradient / normal**: tetrahedral 4-sample estimate
//! - **Raymarch**: sphere tracing with hit point, normal and step count
//! - **Overlaps**: sphere test and approximate box test
//! - **Batch**: parallel distance evaluation with rayon

mod query;
mod snapshot;

pub use query::FieldHit;
pub use snapshot::{MapperSnapshot, MESH_BOUNDS_PUSH, MESH_GRADIENT_EPSILON};

use std::sync::{Arc, PoisonError, RwLock};

use glam::Vec3;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Distance reported by an empty field
pub const EMPTY_FIELD_DISTANCE: f32 = 10_000_000.0;

/// Query configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapperConfig {
    /// Maximum sphere-tracing steps
    pub max_iterations: u32,
    /// Distance below which a ray counts as a hit
    pub surface_distance: f32,
    /// Default ray length for [`Mapper::raymarch`]
    pub max_distance: f32,
    /// Lower bound on the gradient epsilon
    pub min_normal_epsilon: f32,
    /// Distance of an empty field
    pub sentinel: f32,
}

impl Default for MapperConfig {
    fn default() -> Self {
        MapperConfig {
            max_iterations: 256,
            surface_distance: 0.001,
            max_distance: 350.0,
            min_normal_epsilon: 0.002,
            sentinel: EMPTY_FIELD_DISTANCE,
        }
    }
}

impl MapperConfig {
    /// Tighter hit threshold and more steps
    pub fn high_quality() -> Self {
        MapperConfig {
            max_iterations: 512,
            surface_distance: 0.0001,
            ..Default::default()
        }
    }

    /// Coarse preview settings
    pub fn fast() -> Self {
        MapperConfig {
            max_iterations: 96,
            surface_distance: 0.005,
            max_distance: 100.0,
            ..Default::default()
        }
    }
}

/// Cloneable query handle of one group
///
/// All clones observe the same published snapshot.
#[derive(Debug, Clone)]
pub struct Mapper {
    current: Arc<RwLock<Arc<MapperSnapshot>>>,
}

impl Mapper {
    /// Mapper over an empty field
    pub fn new(config: MapperConfig) -> Self {
        Mapper {
            current: Arc::new(RwLock::new(Arc::new(MapperSnapshot::empty(config)))),
        }
    }

    /// Current snapshot. Hold on to it to run many queries against one
    /// consistent version of the field.
    pub fn snapshot(&self) -> Arc<MapperSnapshot> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Replace the published snapshot
    pub(crate) fn publish(&self, snapshot: MapperSnapshot) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(snapshot);
    }

    /// Current configuration
    pub fn config(&self) -> MapperConfig {
        *self.snapshot().config()
    }

    /// Change the query configuration; takes effect immediately
    pub fn set_config(&self, config: MapperConfig) {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        *current = Arc::new(current.with_config(config));
    }

    /// Version of the published snapshot
    pub fn version(&self) -> u64 {
        self.snapshot().version()
    }

    /// Signed distance at `point`
    pub fn distance(&self, point: Vec3) -> f32 {
        self.snapshot().distance(point)
    }

    /// Blended albedo at `point`
    pub fn colour(&self, point: Vec3) -> Vec3 {
        self.snapshot().colour(point)
    }

    /// Gradient estimate at `point`
    pub fn gradient(&self, point: Vec3, epsilon: f32) -> Vec3 {
        self.snapshot().gradient(point, epsilon)
    }

    /// Unit normal at `point`
    pub fn normal(&self, point: Vec3) -> Vec3 {
        self.snapshot().normal(point)
    }

    /// Sphere-trace with the configured default ray length
    pub fn raymarch(&self, origin: Vec3, direction: Vec3) -> Option<FieldHit> {
        let snapshot = self.snapshot();
        let max = snapshot.config().max_distance;
        snapshot.raymarch(origin, direction, max)
    }

    /// Sphere-trace up to `max_distance`
    pub fn raymarch_with_limit(&self, origin: Vec3, direction: Vec3, max_distance: f32) -> Option<FieldHit> {
        self.snapshot().raymarch(origin, direction, max_distance)
    }

    /// Single projection step towards the surface
    pub fn nearest_surface_point(&self, point: Vec3) -> Vec3 {
        self.snapshot().nearest_surface_point(point)
    }

    /// Sphere overlap test
    pub fn overlap_sphere(&self, centre: Vec3, radius: f32) -> bool {
        self.snapshot().overlap_sphere(centre, radius)
    }

    /// Approximate box overlap test
    pub fn overlap_box(&self, centre: Vec3, half_extents: Vec3) -> bool {
        self.snapshot().overlap_box(centre, half_extents)
    }

    /// Distances at many points, evaluated in parallel against one snapshot
    pub fn distance_batch(&self, points: &[Vec3]) -> Vec<f32> {
        let snapshot = self.snapshot();
        points.par_iter().map(|&p| snapshot.distance(p)).collect()
    }
}

impl Default for Mapper {
    fn default() -> Self {
        Self::new(MapperConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::MeshAsset;
    use crate::material::FieldMaterial;
    use crate::types::{FieldNode, GpuSettingsRecord, MeshOffsets};
    use glam::Mat4;

    fn settings() -> GpuSettingsRecord {
        GpuSettingsRecord {
            normal_smoothing: 0.015,
            thickness_max_distance: 0.0,
            thickness_falloff: 0.0,
            _pad: 0.0,
        }
    }

    fn mapper_of(nodes: &[FieldNode]) -> Mapper {
        let (records, materials): (Vec<_>, Vec<_>) = nodes
            .iter()
            .filter_map(|n| n.to_records(&Mat4::IDENTITY, None))
            .unzip();
        let mapper = Mapper::default();
        mapper.publish(MapperSnapshot::from_records(
            1,
            &records,
            &materials,
            Arc::new(Vec::new()),
            settings(),
            MapperConfig::default(),
        ));
        mapper
    }

    #[test]
    fn test_empty_field_returns_sentinel() {
        let mapper = Mapper::default();
        assert_eq!(mapper.distance(Vec3::ZERO), EMPTY_FIELD_DISTANCE);
        assert_eq!(mapper.normal(Vec3::ZERO), Vec3::ZERO);
        assert!(mapper.raymarch(Vec3::ZERO, Vec3::X).is_none());
        assert!(!mapper.overlap_sphere(Vec3::ZERO, 2.0 * EMPTY_FIELD_DISTANCE));
        assert!(!mapper.overlap_box(Vec3::ZERO, Vec3::splat(EMPTY_FIELD_DISTANCE)));
    }

    #[test]
    fn test_single_sphere_distance() {
        let mapper = mapper_of(&[FieldNode::sphere(1.0)]);
        assert!((mapper.distance(Vec3::new(2.0, 0.0, 0.0)) - 1.0).abs() < 1e-4);
        assert!((mapper.distance(Vec3::ZERO) + 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_translated_sphere() {
        let mapper = mapper_of(&[FieldNode::sphere(0.5).translate(3.0, 0.0, 0.0)]);
        assert!((mapper.distance(Vec3::new(3.0, 0.0, 0.0)) + 0.5).abs() < 1e-4);
        assert!((mapper.distance(Vec3::ZERO) - 2.5).abs() < 1e-4);
    }

    #[test]
    fn test_subtract_carves_hole() {
        let mapper = mapper_of(&[
            FieldNode::cuboid(1.0, 1.0, 1.0),
            FieldNode::sphere(0.5).subtract(),
        ]);
        assert!(mapper.distance(Vec3::ZERO) > 0.0);
        assert!(mapper.distance(Vec3::new(0.8, 0.0, 0.0)) < 0.0);
    }

    #[test]
    fn test_intersect_keeps_overlap() {
        let mapper = mapper_of(&[
            FieldNode::sphere(1.0),
            FieldNode::sphere(1.0).translate(1.0, 0.0, 0.0).intersect(),
        ]);
        assert!(mapper.distance(Vec3::new(0.5, 0.0, 0.0)) < 0.0);
        assert!(mapper.distance(Vec3::new(-0.8, 0.0, 0.0)) > 0.0);
    }

    #[test]
    fn test_elongate_applies_to_later_nodes() {
        let mapper = mapper_of(&[
            FieldNode::elongate(Vec3::new(2.0, 0.0, 0.0)),
            FieldNode::sphere(1.0),
        ]);
        assert!(mapper.distance(Vec3::new(2.5, 0.0, 0.0)) < 0.0);
        assert!((mapper.distance(Vec3::new(4.0, 0.0, 0.0)) - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_texture_nodes_do_not_contribute() {
        let mapper = mapper_of(&[FieldNode::texture(3), FieldNode::sphere(1.0)]);
        assert!((mapper.distance(Vec3::new(2.0, 0.0, 0.0)) - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_gradient_has_unit_length_on_sphere() {
        let mapper = mapper_of(&[FieldNode::sphere(1.0)]);
        let g = mapper.gradient(Vec3::new(0.0, 2.0, 0.0), 0.01);
        assert!((g.length() - 1.0).abs() < 0.01);
        assert!(g.y > 0.99);
    }

    #[test]
    fn test_raymarch_hits_sphere_front() {
        let mapper = mapper_of(&[FieldNode::sphere(1.0)]);
        let hit = mapper.raymarch(Vec3::new(0.0, 0.0, -5.0), Vec3::Z).unwrap();
        assert!((hit.point.z + 1.0).abs() < 0.01);
        assert!((hit.distance - 4.0).abs() < 0.01);
        assert!(hit.normal.z < -0.99);
        assert!(hit.steps >= 1);
    }

    #[test]
    fn test_raymarch_misses_and_respects_limit() {
        let mapper = mapper_of(&[FieldNode::sphere(1.0)]);
        assert!(mapper.raymarch(Vec3::new(0.0, 5.0, -5.0), Vec3::Z).is_none());
        assert!(mapper
            .raymarch_with_limit(Vec3::new(0.0, 0.0, -5.0), Vec3::Z, 2.0)
            .is_none());
        assert!(mapper.raymarch(Vec3::ZERO, Vec3::ZERO).is_none());
    }

    #[test]
    fn test_nearest_point_on_sphere() {
        let mapper = mapper_of(&[FieldNode::sphere(1.0)]);
        let p = mapper.nearest_surface_point(Vec3::new(3.0, 0.0, 0.0));
        assert!((p - Vec3::X).length() < 0.01);
    }

    #[test]
    fn test_overlap_sphere_and_box() {
        let mapper = mapper_of(&[FieldNode::sphere(1.0)]);
        assert!(mapper.overlap_sphere(Vec3::new(1.5, 0.0, 0.0), 0.6));
        assert!(!mapper.overlap_sphere(Vec3::new(3.0, 0.0, 0.0), 0.5));
        assert!(mapper.overlap_box(Vec3::new(1.2, 0.0, 0.0), Vec3::splat(0.3)));
        assert!(mapper.overlap_box(Vec3::ZERO, Vec3::splat(0.1)));
        assert!(!mapper.overlap_box(Vec3::new(4.0, 0.0, 0.0), Vec3::splat(0.5)));
    }

    #[test]
    fn test_colour_blends_towards_nearest_node() {
        let red = FieldMaterial::colour(1.0, 0.0, 0.0);
        let blue = FieldMaterial::colour(0.0, 0.0, 1.0);
        let mapper = mapper_of(&[
            FieldNode::sphere(1.0).with_material(red),
            FieldNode::sphere(1.0).translate(4.0, 0.0, 0.0).with_material(blue),
        ]);
        let left = mapper.colour(Vec3::new(-1.0, 0.0, 0.0));
        let right = mapper.colour(Vec3::new(5.0, 0.0, 0.0));
        assert!(left.x > 0.99 && left.z < 0.01);
        assert!(right.z > 0.99 && right.x < 0.01);
    }

    #[test]
    fn test_mesh_node_matches_sampled_sphere() {
        let asset = Arc::new(
            MeshAsset::from_fn("ball", 32, Vec3::splat(-2.0), Vec3::splat(2.0), |p| p.length() - 1.0).unwrap(),
        );
        let node = FieldNode::mesh_asset(asset.clone());
        let offsets = MeshOffsets {
            sample_start: 0,
            uv_start: -1,
        };
        let (record, material) = node.to_records(&Mat4::IDENTITY, Some(offsets)).unwrap();
        let snapshot = MapperSnapshot::from_records(
            1,
            &[record],
            &[material],
            Arc::new(asset.samples().to_vec()),
            settings(),
            MapperConfig::default(),
        );
        assert!((snapshot.distance(Vec3::new(1.5, 0.0, 0.0)) - 0.5).abs() < 0.05);
        assert!((snapshot.distance(Vec3::new(0.3, 0.0, 0.0)) + 0.7).abs() < 0.05);
        // Outside the sampled box the distance keeps growing
        let far = snapshot.distance(Vec3::new(5.0, 0.0, 0.0));
        assert!(far > 3.0 && far < 5.0);
    }

    #[test]
    fn test_batch_matches_scalar() {
        let mapper = mapper_of(&[FieldNode::torus(1.0, 0.25)]);
        let points: Vec<Vec3> = (0..64).map(|i| Vec3::new(i as f32 * 0.1, 0.2, -0.3)).collect();
        let batch = mapper.distance_batch(&points);
        for (p, d) in points.iter().zip(&batch) {
            assert_eq!(*d, mapper.distance(*p));
        }
    }

    #[test]
    fn test_set_config_keeps_field() {
        let mapper = mapper_of(&[FieldNode::sphere(1.0)]);
        mapper.set_config(MapperConfig::fast());
        assert_eq!(mapper.config(), MapperConfig::fast());
        assert!((mapper.distance(Vec3::new(2.0, 0.0, 0.0)) - 1.0).abs() < 1e-4);
    }
}
