//! Integration tests: groups sharing one mesh sample store
//!
//! Verifies reference counting across groups, sample repacking when assets
//! come and go, and that every group's field follows its own node list.

mod common;

use common::*;
use isofield::prelude::*;
use isofield::store::read_store;

// ============================================================================
// Reference counting
// ============================================================================

#[test]
fn asset_shared_by_two_groups_is_packed_once() {
    let store = FieldStore::new();
    let asset = ball_asset("ball", 16, 0.8);
    let (a, _na) = group_with(&store, vec![FieldNode::mesh_asset(asset.clone())]);
    let (b, _nb) = group_with(&store, vec![FieldNode::mesh_asset(asset.clone()).translate(3.0, 0.0, 0.0)]);

    let shared = store.store();
    let s = read_store(&shared);
    assert_eq!(s.ref_count(asset.id()), 2);
    assert_eq!(s.asset_count(), 1);
    assert_eq!(s.samples().len(), asset.total_size());
    drop(s);

    // off-centre: the mesh gradient vanishes at the ball's exact centre
    assert!(a.mapper().distance(Vec3::new(0.3, 0.0, 0.0)) < 0.0);
    assert!(b.mapper().distance(Vec3::new(3.3, 0.0, 0.0)) < 0.0);
    assert!(b.mapper().distance(Vec3::new(0.3, 0.0, 0.0)) > 0.0);
}

#[test]
fn releasing_one_group_keeps_the_other_groups_samples() {
    let store = FieldStore::new();
    let asset = ball_asset("ball", 12, 0.8);
    let (a, _na) = group_with(&store, vec![FieldNode::mesh_asset(asset.clone())]);
    let (mut b, _nb) = group_with(&store, vec![FieldNode::mesh_asset(asset.clone())]);

    drop(a);
    assert_eq!(read_store(&store.store()).ref_count(asset.id()), 1);

    b.per_tick_update();
    assert!(b.mapper().distance(Vec3::new(0.3, 0.0, 0.0)) < 0.0);

    b.release();
    assert!(!read_store(&store.store()).contains(asset.id()));
}

#[test]
fn removing_first_asset_repacks_offsets_for_the_rest() {
    let store = FieldStore::new();
    let first = ball_asset("first", 8, 0.5);
    let second = ball_asset("second", 10, 0.9);

    let mut group = store.create_group(GroupSettings::default());
    let n1 = NodeHandle::new(FieldNode::mesh_asset(first.clone()).translate(-3.0, 0.0, 0.0));
    let n2 = NodeHandle::new(FieldNode::mesh_asset(second.clone()).translate(3.0, 0.0, 0.0));
    group.register(&n1);
    group.register(&n2);
    group.per_tick_update();
    let before = group.mapper().distance(Vec3::new(3.3, 0.0, 0.0));

    group.deregister(&n1);
    group.per_tick_update();

    let shared = store.store();
    let s = read_store(&shared);
    assert!(!s.contains(first.id()));
    assert_eq!(s.offsets(second.id()).map(|o| o.sample_start), Some(0));
    drop(s);

    // same field at the second asset despite the new offset
    assert_close(group.mapper().distance(Vec3::new(3.3, 0.0, 0.0)), before, 1e-5, "repacked distance");
}

// ============================================================================
// Field contents
// ============================================================================

#[test]
fn mesh_node_approximates_analytic_sphere() {
    let store = FieldStore::new();
    let asset = ball_asset("ball", 24, 1.0);
    let (mesh_group, _m) = group_with(&store, vec![FieldNode::mesh_asset(asset)]);
    let (sphere_group, _s) = group_with(&store, vec![FieldNode::sphere(1.0)]);

    for p in [Vec3::new(0.3, 0.2, 0.0), Vec3::new(0.5, 0.0, 0.0), Vec3::new(0.0, 0.9, 0.3), Vec3::new(0.0, 0.0, 1.2)] {
        let mesh = mesh_group.mapper().distance(p);
        let exact = sphere_group.mapper().distance(p);
        assert_close(mesh, exact, 0.1, "mesh vs sphere");
    }
}

#[test]
fn settings_change_rebuilds_without_node_changes() {
    let store = FieldStore::new();
    let (mut group, _n) = group_with(&store, vec![FieldNode::sphere(1.0)]);
    let version = group.version();

    let mut settings = *group.settings();
    settings.normal_smoothing = 0.05;
    group.set_settings(settings);
    let report = group.per_tick_update();

    assert!(report.rebuilt);
    assert!(group.version() > version);
    assert_eq!(group.mapper().snapshot().settings().normal_smoothing, 0.05);
}

#[test]
fn material_edit_changes_colour() {
    let store = FieldStore::new();
    let (mut group, nodes) = group_with(&store, vec![FieldNode::sphere(1.0)]);
    nodes[0].edit(|n| n.material = FieldMaterial::colour(0.0, 1.0, 0.0));
    group.per_tick_update();
    let c = group.mapper().colour(Vec3::new(1.0, 0.0, 0.0));
    assert!((c - Vec3::new(0.0, 1.0, 0.0)).length() < 1e-4, "colour {:?}", c);
}

#[test]
fn shutdown_after_release_leaves_store_empty() {
    let store = FieldStore::new();
    let asset = ball_asset("ball", 8, 0.5);
    let (mut group, _n) = group_with(&store, vec![FieldNode::mesh_asset(asset), FieldNode::sphere(1.0)]);
    group.release();
    store.shutdown();
    let shared = store.store();
    let s = read_store(&shared);
    assert_eq!(s.asset_count(), 0);
    assert!(s.samples().is_empty());
    drop(s);
    assert_eq!(group.mapper().distance(Vec3::ZERO), isofield::mapper::EMPTY_FIELD_DISTANCE);
}
