//! Integration tests: isosurface extraction without a GPU
//!
//! Runs the extractor as a group consumer, the chunk grid and the OBJ export
//! against fields with known surfaces.

mod common;

use common::*;
use glam::IVec3;
use isofield::extract::extract_mesh;
use isofield::io::write_obj;
use isofield::prelude::*;

/// Result of one extraction; holds the group so its mapper stays populated
struct Extraction {
    mesh: ExtractedMesh,
    counts: ExtractionCounts,
    group: Group,
    _nodes: Vec<NodeHandle>,
}

impl Extraction {
    fn mapper(&self) -> Mapper {
        self.group.mapper()
    }
}

fn extract_through_group(nodes: Vec<FieldNode>, settings: ExtractorSettings) -> Extraction {
    let store = FieldStore::new();
    let mut group = store.create_group(GroupSettings::default());
    let extractor = cpu_extractor(settings);
    group.add_consumer(extractor.clone());

    let handles: Vec<NodeHandle> = nodes.into_iter().map(NodeHandle::new).collect();
    for h in &handles {
        group.register(h);
    }
    group.per_tick_update();

    let (mesh, counts) = {
        let mut guard = extractor.lock().unwrap();
        let counts = guard.last_counts().expect("extraction ran");
        (guard.sink_mut().take().expect("mesh installed"), counts)
    };
    Extraction {
        mesh,
        counts,
        group,
        _nodes: handles,
    }
}

// ============================================================================
// Surface quality
// ============================================================================

#[test]
fn surface_nets_sphere_vertices_on_surface() {
    let ex = extract_through_group(vec![FieldNode::sphere(1.0)], small_extractor_settings());
    assert_eq!(ex.counts.triangles as usize, ex.mesh.triangle_count());
    assert_eq!(ex.counts.total_vertices() as usize, ex.mesh.vertex_count());
    assert_on_surface(&ex.mesh, &ex.mapper(), 0.05);

    let (min, max) = ex.mesh.bounds().unwrap();
    assert!((min + Vec3::ONE).abs().max_element() < 0.1, "min {:?}", min);
    assert!((max - Vec3::ONE).abs().max_element() < 0.1, "max {:?}", max);
}

#[test]
fn carved_sphere_has_more_triangles_than_sphere() {
    let sphere = extract_through_group(vec![FieldNode::sphere(1.0)], small_extractor_settings());
    let carved = extract_through_group(carved_sphere(), small_extractor_settings());
    assert!(carved.mesh.triangle_count() > sphere.mesh.triangle_count());
    assert_on_surface(&carved.mesh, &carved.mapper(), 0.15);
}

#[test]
fn dual_contouring_keeps_surface_nets_topology() {
    let nodes = || vec![FieldNode::cuboid(0.75, 0.75, 0.75)];
    let mut sn = small_extractor_settings();
    sn.algorithm.max_angle_tolerance_degrees = 180.0;
    let mut dc = sn;
    dc.algorithm.extraction_type = ExtractionType::DualContouring;
    dc.algorithm.gradient_descent_iterations = 4;

    let sn = extract_through_group(nodes(), sn);
    let dc = extract_through_group(nodes(), dc);

    assert_eq!(dc.mesh.triangle_count(), sn.mesh.triangle_count());
    assert_eq!(dc.mesh.vertex_count(), sn.mesh.vertex_count());
    assert_on_surface(&dc.mesh, &dc.mapper(), 0.1);
}

#[test]
fn narrow_angle_tolerance_adds_intermediate_vertices() {
    let nodes = || vec![FieldNode::cuboid(0.75, 0.75, 0.75)];
    let mut shared = small_extractor_settings();
    shared.algorithm.max_angle_tolerance_degrees = 180.0;
    let mut split = shared;
    split.algorithm.max_angle_tolerance_degrees = 10.0;

    let shared_counts = extract_through_group(nodes(), shared).counts;
    let split_counts = extract_through_group(nodes(), split).counts;
    assert_eq!(shared_counts.triangles, split_counts.triangles);
    assert!(split_counts.total_vertices() > shared_counts.total_vertices());
}

#[test]
fn colours_follow_materials() {
    let nodes = vec![
        FieldNode::sphere(0.6).translate(-0.7, 0.0, 0.0).with_material(FieldMaterial::colour(1.0, 0.0, 0.0)),
        FieldNode::sphere(0.6).translate(0.7, 0.0, 0.0).with_material(FieldMaterial::colour(0.0, 0.0, 1.0)),
    ];
    let mesh = extract_through_group(nodes, small_extractor_settings()).mesh;
    for (p, c) in mesh.positions.iter().zip(&mesh.colours) {
        if p.x < -1.0 {
            assert!(c.x > 0.9 && c.z < 0.1, "left colour {:?}", c);
        } else if p.x > 1.0 {
            assert!(c.z > 0.9 && c.x < 0.1, "right colour {:?}", c);
        }
    }
}

#[test]
fn group_extraction_matches_direct_snapshot_extraction() {
    let settings = small_extractor_settings();
    let ex = extract_through_group(carved_sphere(), settings);
    let (direct, direct_counts) = extract_mesh(&ex.mapper().snapshot(), &settings);
    assert_eq!(ex.counts, direct_counts);
    assert_eq!(ex.mesh, direct);
}

// ============================================================================
// Chunks and export
// ============================================================================

#[test]
fn chunk_grid_covers_a_large_sphere() {
    let store = FieldStore::new();
    let (group, _n) = group_with(&store, vec![FieldNode::sphere(3.0)]);

    let mut settings = small_extractor_settings();
    settings.voxel.samples_per_side = 12;
    settings.voxel.cell_size = 0.3;
    let mut grid = ChunkGrid::new(settings);
    for z in -1..=1 {
        for y in -1..=1 {
            for x in -1..=1 {
                grid.add(IVec3::new(x, y, z)).unwrap();
            }
        }
    }
    assert_eq!(grid.unoccupied_axis().len(), 6 * 9);

    let counts = grid.extract_all(&group.mapper().snapshot());
    let merged = grid.merged_mesh();
    assert_eq!(merged.triangle_count(), counts.triangles as usize);
    // the centre chunk lies entirely inside the sphere
    assert!(grid.get(IVec3::ZERO).unwrap().mesh().is_none());
    assert_on_surface(&merged, &group.mapper(), 0.05);
}

#[test]
fn obj_export_of_extracted_mesh() {
    let mesh = extract_through_group(vec![FieldNode::torus(1.0, 0.3)], small_extractor_settings()).mesh;
    let mut out = Vec::new();
    write_obj(&mut out, &mesh, &ObjConfig::default()).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert_eq!(text.lines().filter(|l| l.starts_with("v ")).count(), mesh.vertex_count());
    assert_eq!(text.lines().filter(|l| l.starts_with("f ")).count(), mesh.triangle_count());
}

#[test]
fn scene_file_drives_extraction() {
    let scene = SceneDescription::from_json(
        r#"{
            "extractor": { "voxel": { "samples_per_side": 16, "cell_size": 0.2 } },
            "nodes": [
                { "kind": { "primitive": { "Cylinder": { "radius": 0.8, "half_height": 1.0 } } } },
                { "kind": { "primitive": { "Sphere": { "radius": 0.5 } } }, "combine": "Subtract",
                  "translation": [0.0, 1.0, 0.0] }
            ]
        }"#,
    )
    .unwrap();
    let ex = extract_through_group(scene.build_nodes().unwrap(), scene.extractor);
    assert!(ex.mesh.triangle_count() > 0);
    assert!(ex.mapper().distance(Vec3::new(0.0, 0.9, 0.0)) > 0.0);
}
