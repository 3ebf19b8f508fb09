//! JSON scene descriptions
//!
//! A scene lists mesh assets, nodes and the settings of a group and its
//! consumers. Every section is optional; missing fields take their defaults.
//!
//! ```json
//! {
//!   "nodes": [
//!     { "kind": { "primitive": { "Sphere": { "radius": 1.0 } } } },
//!     { "kind": { "primitive": { "Cuboid": { "half_extents": [0.5, 0.5, 0.5], "roundness": 0.0 } } },
//!       "combine": "Subtract", "smoothing": 0.1, "translation": [0.8, 0.0, 0.0] }
//!   ]
//! }
//! ```

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::sync::Arc;

use glam::{EulerRot, Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::asset::MeshAsset;
use crate::error::Result;
use crate::extract::ExtractorSettings;
use crate::group::GroupSettings;
use crate::material::FieldMaterial;
use crate::render::RaymarchVisuals;
use crate::types::{
    CombineType, FieldNode, FieldOperation, MeshReference, NodeKind, PrimitiveShape, TextureReference,
};

/// Baked mesh asset embedded in a scene
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshAssetDescription {
    /// Name nodes refer to it by
    pub name: String,
    /// Samples per side
    pub size: usize,
    /// Lower corner of the sampled volume
    pub min_bounds: Vec3,
    /// Upper corner of the sampled volume
    pub max_bounds: Vec3,
    /// Padding baked around the mesh
    #[serde(default)]
    pub padding: f32,
    /// `size³` signed distances, x fastest
    pub samples: Vec<f32>,
    /// Optional `size³` packed UVs
    #[serde(default)]
    pub packed_uvs: Option<Vec<f32>>,
}

impl MeshAssetDescription {
    /// Validate and build the asset
    pub fn build(&self) -> Result<MeshAsset> {
        MeshAsset::new(
            self.name.clone(),
            self.size,
            self.min_bounds,
            self.max_bounds,
            self.padding,
            self.samples.clone(),
            self.packed_uvs.clone(),
        )
    }
}

/// Variant of a described node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKindDescription {
    /// Analytic shape
    Primitive(PrimitiveShape),
    /// Mesh asset by name
    Mesh(String),
    /// Deformation of later nodes
    Operation(FieldOperation),
    /// Volumetric texture handle
    Texture(TextureReference),
}

/// One node of a scene
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDescription {
    /// Variant data
    pub kind: NodeKindDescription,
    /// Combine policy
    #[serde(default)]
    pub combine: CombineType,
    /// Smoothing factor
    #[serde(default)]
    pub smoothing: f32,
    /// Invert inside and outside
    #[serde(default)]
    pub flip: bool,
    /// Position in field space
    #[serde(default)]
    pub translation: Vec3,
    /// XYZ Euler rotation in degrees
    #[serde(default)]
    pub rotation_degrees: Vec3,
    /// Surface material
    #[serde(default)]
    pub material: FieldMaterial,
    /// Combination order
    #[serde(default)]
    pub order: i32,
}

impl NodeDescription {
    /// Local-to-field pose
    pub fn transform(&self) -> Mat4 {
        let r = self.rotation_degrees * (std::f32::consts::PI / 180.0);
        Mat4::from_rotation_translation(Quat::from_euler(EulerRot::XYZ, r.x, r.y, r.z), self.translation)
    }
}

/// Complete scene: assets, nodes and settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneDescription {
    /// Group settings
    pub group: GroupSettings,
    /// Isosurface extractor settings
    pub extractor: ExtractorSettings,
    /// Raymarcher settings
    pub raymarch: RaymarchVisuals,
    /// Embedded mesh assets
    pub meshes: Vec<MeshAssetDescription>,
    /// Nodes in registration order
    pub nodes: Vec<NodeDescription>,
}

impl SceneDescription {
    /// Parse a scene from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a scene from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    /// Save the scene as pretty JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// Validate every setting and build the nodes.
    ///
    /// Mesh nodes naming an asset the scene does not embed become unloaded
    /// references and contribute nothing.
    pub fn build_nodes(&self) -> Result<Vec<FieldNode>> {
        self.group.validate()?;
        self.extractor.validate()?;

        let mut assets: HashMap<&str, Arc<MeshAsset>> = HashMap::new();
        for mesh in &self.meshes {
            assets.insert(mesh.name.as_str(), Arc::new(mesh.build()?));
        }

        let nodes = self
            .nodes
            .iter()
            .map(|desc| {
                let kind = match &desc.kind {
                    NodeKindDescription::Primitive(shape) => NodeKind::Primitive(*shape),
                    NodeKindDescription::Operation(op) => NodeKind::Operation(*op),
                    NodeKindDescription::Texture(texture) => NodeKind::Texture(*texture),
                    NodeKindDescription::Mesh(name) => match assets.get(name.as_str()) {
                        Some(asset) => NodeKind::Mesh(MeshReference::new(Arc::clone(asset))),
                        None => {
                            tracing::warn!(asset = %name, "scene references an unknown mesh asset");
                            NodeKind::Mesh(MeshReference::unloaded())
                        }
                    },
                };
                let mut node = FieldNode::new(kind)
                    .with_combine(desc.combine)
                    .with_smoothing(desc.smoothing)
                    .with_material(desc.material.clone())
                    .with_order(desc.order)
                    .with_transform(desc.transform());
                node.flip = desc.flip;
                node
            })
            .collect();
        Ok(nodes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENE: &str = r#"{
        "extractor": { "voxel": { "samples_per_side": 16, "cell_size": 0.2 } },
        "meshes": [{
            "name": "cube",
            "size": 2,
            "min_bounds": [-1.0, -1.0, -1.0],
            "max_bounds": [1.0, 1.0, 1.0],
            "samples": [-1, -1, -1, -1, -1, -1, -1, -1]
        }],
        "nodes": [
            { "kind": { "primitive": { "Sphere": { "radius": 1.0 } } } },
            { "kind": { "mesh": "cube" }, "combine": "Intersect", "translation": [0.5, 0.0, 0.0] },
            { "kind": { "mesh": "missing" }, "flip": true, "order": 3 }
        ]
    }"#;

    #[test]
    fn test_parse_and_build() {
        let scene = SceneDescription::from_json(SCENE).unwrap();
        assert_eq!(scene.extractor.voxel.samples_per_side, 16);
        assert_eq!(scene.group, GroupSettings::default());

        let nodes = scene.build_nodes().unwrap();
        assert_eq!(nodes.len(), 3);
        assert!(matches!(nodes[0].kind, NodeKind::Primitive(PrimitiveShape::Sphere { radius }) if radius == 1.0));
        assert_eq!(nodes[1].combine, CombineType::Intersect);
        assert_eq!(nodes[1].position(), Vec3::new(0.5, 0.0, 0.0));
        assert!(nodes[1].mesh_asset_id().is_some());
        assert!(nodes[2].mesh_asset_id().is_none());
        assert!(nodes[2].flip);
        assert_eq!(nodes[2].order, 3);
    }

    #[test]
    fn test_invalid_asset_rejected() {
        let json = r#"{ "meshes": [{ "name": "bad", "size": 3, "min_bounds": [0,0,0],
                        "max_bounds": [1,1,1], "samples": [0.0] }] }"#;
        let scene = SceneDescription::from_json(json).unwrap();
        assert!(scene.build_nodes().is_err());
    }

    #[test]
    fn test_rotation_in_degrees() {
        let desc = NodeDescription {
            kind: NodeKindDescription::Primitive(PrimitiveShape::Sphere { radius: 1.0 }),
            combine: CombineType::Union,
            smoothing: 0.0,
            flip: false,
            translation: Vec3::ZERO,
            rotation_degrees: Vec3::new(0.0, 0.0, 90.0),
            material: FieldMaterial::default(),
            order: 0,
        };
        let x = desc.transform().transform_vector3(Vec3::X);
        assert!((x - Vec3::Y).length() < 1e-6);
    }

    #[test]
    fn test_save_and_load() {
        let scene = SceneDescription::from_json(SCENE).unwrap();
        let path = std::env::temp_dir().join(format!("isofield_scene_{}.json", std::process::id()));
        scene.save(&path).unwrap();
        let loaded = SceneDescription::load(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(loaded, scene);
    }
}
