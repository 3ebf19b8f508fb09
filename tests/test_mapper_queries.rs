//! Integration tests: Mapper queries
//!
//! Verifies distance, gradient, raymarch and overlap queries against analytic
//! expectations, and that snapshots stay consistent across rebuilds.

mod common;

use common::*;
use isofield::prelude::*;

// ============================================================================
// Distance
// ============================================================================

#[test]
fn sphere_distance_matches_analytic() {
    let store = FieldStore::new();
    let (group, _n) = group_with(&store, vec![FieldNode::sphere(1.0)]);
    let mapper = group.mapper();
    for p in test_points() {
        assert_close(mapper.distance(p), p.length() - 1.0, 1e-5, "sphere distance");
    }
}

#[test]
fn carved_sphere_is_hollow_along_z() {
    let store = FieldStore::new();
    let (group, _n) = group_with(&store, carved_sphere());
    let mapper = group.mapper();
    assert!(mapper.distance(Vec3::ZERO) > 0.0);
    assert!(mapper.distance(Vec3::new(0.0, 0.0, 0.9)) > 0.0);
    assert!(mapper.distance(Vec3::new(0.7, 0.0, 0.0)) < 0.0);
}

#[test]
fn smooth_union_bulges_between_spheres() {
    let store = FieldStore::new();
    let nodes = |k: f32| {
        vec![
            FieldNode::sphere(0.5).translate(-0.6, 0.0, 0.0),
            FieldNode::sphere(0.5).translate(0.6, 0.0, 0.0).with_smoothing(k),
        ]
    };
    let (hard, _h) = group_with(&store, nodes(0.0));
    let (soft, _s) = group_with(&store, nodes(0.4));
    let probe = Vec3::new(0.0, 0.3, 0.0);
    assert!(soft.mapper().distance(probe) < hard.mapper().distance(probe));
}

#[test]
fn batch_matches_single_queries() {
    let store = FieldStore::new();
    let (group, _n) = group_with(&store, carved_sphere());
    let mapper = group.mapper();
    let points = test_points();
    let batch = mapper.distance_batch(&points);
    for (p, d) in points.iter().zip(batch) {
        assert_eq!(d, mapper.distance(*p));
    }
}

// ============================================================================
// Gradient, raymarch, overlaps
// ============================================================================

#[test]
fn normals_point_away_from_sphere_centre() {
    let store = FieldStore::new();
    let (group, _n) = group_with(&store, vec![FieldNode::sphere(1.0).translate(1.0, 2.0, 0.0)]);
    let mapper = group.mapper();
    let centre = Vec3::new(1.0, 2.0, 0.0);
    for dir in [Vec3::X, Vec3::NEG_Y, Vec3::new(1.0, 1.0, 1.0).normalize()] {
        let n = mapper.normal(centre + dir);
        assert!(n.dot(dir) > 0.99, "normal {:?} for {:?}", n, dir);
    }
}

#[test]
fn raymarch_reports_first_hit() {
    let store = FieldStore::new();
    let (group, _n) = group_with(&store, vec![FieldNode::cuboid(0.5, 0.5, 0.5)]);
    let mapper = group.mapper();

    let hit = mapper.raymarch(Vec3::new(-3.0, 0.0, 0.0), Vec3::X).expect("should hit the box");
    assert_close(hit.point.x, -0.5, 0.01, "hit x");
    assert_close(hit.distance, 2.5, 0.01, "hit distance");
    assert!(hit.normal.dot(Vec3::NEG_X) > 0.9);

    assert!(mapper.raymarch(Vec3::new(-3.0, 2.0, 0.0), Vec3::X).is_none());
    assert!(mapper.raymarch_with_limit(Vec3::new(-3.0, 0.0, 0.0), Vec3::X, 1.0).is_none());
}

#[test]
fn nearest_point_lands_on_sphere() {
    let store = FieldStore::new();
    let (group, _n) = group_with(&store, vec![FieldNode::sphere(1.0)]);
    let p = group.mapper().nearest_surface_point(Vec3::new(0.0, 3.0, 0.0));
    assert!((p - Vec3::Y).length() < 1e-3, "nearest {:?}", p);
}

#[test]
fn overlap_queries() {
    let store = FieldStore::new();
    let (group, _n) = group_with(&store, vec![FieldNode::sphere(1.0)]);
    let mapper = group.mapper();
    assert!(mapper.overlap_sphere(Vec3::new(1.4, 0.0, 0.0), 0.5));
    assert!(!mapper.overlap_sphere(Vec3::new(2.0, 0.0, 0.0), 0.5));
    assert!(mapper.overlap_box(Vec3::ZERO, Vec3::splat(0.2)));
    assert!(!mapper.overlap_box(Vec3::new(3.0, 0.0, 0.0), Vec3::splat(0.2)));
}

#[test]
fn empty_group_reports_sentinel_and_no_overlaps() {
    let store = FieldStore::new();
    let (mut group, _n) = group_with(&store, vec![]);
    let sentinel = isofield::mapper::EMPTY_FIELD_DISTANCE;

    let check = |mapper: &Mapper| {
        for p in test_points() {
            assert!(mapper.distance(p) >= sentinel);
        }
        assert!(!mapper.overlap_sphere(Vec3::ZERO, 2.0 * sentinel));
        assert!(!mapper.overlap_box(Vec3::ZERO, Vec3::splat(sentinel)));
        assert!(!mapper.overlap_box(Vec3::new(0.5, 0.0, 0.0), Vec3::splat(1.0)));
    };
    check(&group.mapper());

    // a group emptied by deregistration behaves the same
    let node = NodeHandle::new(FieldNode::sphere(1.0));
    group.register(&node);
    group.per_tick_update();
    assert!(group.mapper().overlap_sphere(Vec3::ZERO, 0.1));
    group.deregister(&node);
    group.per_tick_update();
    check(&group.mapper());
}

// ============================================================================
// Snapshots
// ============================================================================

#[test]
fn old_snapshot_survives_rebuild() {
    let store = FieldStore::new();
    let (mut group, nodes) = group_with(&store, vec![FieldNode::sphere(1.0)]);
    let before = group.mapper().snapshot();

    nodes[0].set_transform(Mat4::from_translation(Vec3::new(5.0, 0.0, 0.0)));
    group.per_tick_update();

    assert_close(before.distance(Vec3::ZERO), -1.0, 1e-5, "old snapshot");
    assert_close(group.mapper().distance(Vec3::ZERO), 4.0, 1e-5, "new snapshot");
    assert!(group.mapper().snapshot().version() > before.version());
}

#[test]
fn mapper_is_queried_from_worker_threads() {
    let store = FieldStore::new();
    let (group, _n) = group_with(&store, vec![FieldNode::sphere(1.0)]);
    let mapper = group.mapper();
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let mapper = mapper.clone();
            std::thread::spawn(move || mapper.distance(Vec3::new(i as f32, 0.0, 0.0)))
        })
        .collect();
    for (i, h) in handles.into_iter().enumerate() {
        assert_close(h.join().unwrap(), i as f32 - 1.0, 1e-5, "threaded distance");
    }
}
