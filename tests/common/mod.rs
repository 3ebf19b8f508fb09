//! Common test helpers for isofield integration tests

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use isofield::prelude::*;

pub use glam::{Mat4, Vec3};

// ============================================================================
// Standard nodes and assets
// ============================================================================

/// Voxelised sphere of radius `radius` in a cube of half size `radius + 0.5`
pub fn ball_asset(name: &str, size: usize, radius: f32) -> Arc<MeshAsset> {
    let half = Vec3::splat(radius + 0.5);
    Arc::new(MeshAsset::from_fn(name, size, -half, half, |p| p.length() - radius).unwrap())
}

/// Sphere with a smoothly subtracted box, the usual CSG probe
pub fn carved_sphere() -> Vec<FieldNode> {
    vec![
        FieldNode::sphere(1.0),
        FieldNode::cuboid(0.4, 0.4, 2.0).subtract().with_smoothing(0.1),
    ]
}

// ============================================================================
// Groups
// ============================================================================

/// Group on a CPU-only store with `nodes` registered and one tick run.
///
/// The handles keep the nodes alive.
pub fn group_with(store: &FieldStore, nodes: Vec<FieldNode>) -> (Group, Vec<NodeHandle>) {
    let mut group = store.create_group(GroupSettings::default());
    let handles: Vec<NodeHandle> = nodes.into_iter().map(NodeHandle::new).collect();
    for h in &handles {
        group.register(h);
    }
    group.per_tick_update();
    (group, handles)
}

/// Extractor settings covering [-1.5, 1.5]³ coarsely
pub fn small_extractor_settings() -> ExtractorSettings {
    let mut settings = ExtractorSettings::default();
    settings.voxel.samples_per_side = 16;
    settings.voxel.cell_size = 0.2;
    settings
}

/// CPU extractor wrapped as a group consumer
pub fn cpu_extractor(settings: ExtractorSettings) -> Arc<Mutex<IsosurfaceExtractor>> {
    Arc::new(Mutex::new(IsosurfaceExtractor::new(settings, MeshSlot::default())))
}

// ============================================================================
// Standard test points
// ============================================================================

/// Canonical probe points around a unit sphere
pub fn test_points() -> Vec<Vec3> {
    vec![
        Vec3::ZERO,
        Vec3::new(1.0, 0.0, 0.0),
        Vec3::new(0.0, 1.0, 0.0),
        Vec3::new(0.0, 0.0, 1.0),
        Vec3::new(0.577, 0.577, 0.577),
        Vec3::new(2.0, 0.0, 0.0),
        Vec3::new(0.0, -1.5, 0.0),
        Vec3::new(0.3, 0.3, 0.3),
    ]
}

// ============================================================================
// Assertion helpers
// ============================================================================

/// Assert two f32 values are close within tolerance
pub fn assert_close(a: f32, b: f32, tol: f32, msg: &str) {
    assert!(
        (a - b).abs() < tol,
        "{}: {} vs {} (diff={}, tol={})",
        msg,
        a,
        b,
        (a - b).abs(),
        tol
    );
}

/// Assert every vertex of `mesh` is within `tol` of the field's surface
pub fn assert_on_surface(mesh: &ExtractedMesh, mapper: &Mapper, tol: f32) {
    for p in &mesh.positions {
        let d = mapper.distance(*p);
        assert!(d.abs() < tol, "vertex {:?} is {} from the surface", p, d);
    }
}
