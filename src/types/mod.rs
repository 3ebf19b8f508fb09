//! Field node model
//!
//! A field is an ordered list of nodes. Each node is one of:
//! - **Primitive**: analytic shape with a 4-float parameter vector
//! - **Mesh reference**: voxel grid of a shared [`MeshAsset`]
//! - **Operation**: deformation of the query point for every later node
//! - **Texture reference**: volumetric texture handle (not evaluated yet)
//!
//! Every node carries a combine policy, a smoothing factor, a flip sign, a
//! local-to-field pose and a material. [`FieldNode::to_records`] flattens a
//! node into the GPU records shared by the shader and the Mapper.

mod constructors;
mod handle;
mod operations;
mod records;
mod transforms;

use std::sync::Arc;

use glam::{Mat4, Vec3, Vec4};
use serde::{Deserialize, Serialize};

use crate::asset::{MeshAsset, MeshAssetId};
use crate::material::FieldMaterial;
use crate::operations::clamp_smoothing;
use crate::primitives::eval_primitive;

pub use handle::{NodeHandle, NodeId};
pub(crate) use handle::WeakNode;
pub use records::{
    GpuMaterialRecord, GpuNodeRecord, GpuSettingsRecord, COMBINE_INTERSECT, COMBINE_SUBTRACT,
    COMBINE_UNION, NODE_TYPE_ELONGATE, NODE_TYPE_MESH, NODE_TYPE_PRIMITIVE_BASE,
    NODE_TYPE_TEXTURE,
};

/// How a node folds into the running distance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CombineType {
    /// Smooth union
    #[default]
    Union,
    /// Smooth subtraction of this node from everything before it
    Subtract,
    /// Smooth intersection with everything before it
    Intersect,
}

impl CombineType {
    /// GPU tag
    pub fn tag(self) -> i32 {
        match self {
            CombineType::Union => COMBINE_UNION,
            CombineType::Subtract => COMBINE_SUBTRACT,
            CombineType::Intersect => COMBINE_INTERSECT,
        }
    }
}

/// Analytic primitive shapes
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PrimitiveShape {
    /// Sphere
    Sphere {
        /// Radius
        radius: f32,
    },
    /// Torus in the XZ plane
    Torus {
        /// Ring radius
        major_radius: f32,
        /// Tube radius
        minor_radius: f32,
    },
    /// Box, inflated by `roundness`
    Cuboid {
        /// Half extents
        half_extents: Vec3,
        /// Rounding added around the box
        roundness: f32,
    },
    /// Box edges only
    BoxFrame {
        /// Half extents
        half_extents: Vec3,
        /// Edge thickness
        thickness: f32,
    },
    /// Capped cylinder along Y
    Cylinder {
        /// Radius
        radius: f32,
        /// Half height
        half_height: f32,
    },
}

impl PrimitiveShape {
    /// Index of the shape; the GPU tag is `index + 1`
    pub fn index(&self) -> i32 {
        match self {
            PrimitiveShape::Sphere { .. } => 0,
            PrimitiveShape::Torus { .. } => 1,
            PrimitiveShape::Cuboid { .. } => 2,
            PrimitiveShape::BoxFrame { .. } => 3,
            PrimitiveShape::Cylinder { .. } => 4,
        }
    }

    /// GPU type tag
    pub fn type_tag(&self) -> i32 {
        NODE_TYPE_PRIMITIVE_BASE + self.index()
    }

    /// Packed 4-float parameter vector
    pub fn data(&self) -> Vec4 {
        match *self {
            PrimitiveShape::Sphere { radius } => Vec4::new(radius, 0.0, 0.0, 0.0),
            PrimitiveShape::Torus {
                major_radius,
                minor_radius,
            } => Vec4::new(major_radius, minor_radius, 0.0, 0.0),
            PrimitiveShape::Cuboid {
                half_extents,
                roundness,
            } => half_extents.extend(roundness),
            PrimitiveShape::BoxFrame {
                half_extents,
                thickness,
            } => half_extents.extend(thickness),
            PrimitiveShape::Cylinder {
                radius,
                half_height,
            } => Vec4::new(radius, half_height, 0.0, 0.0),
        }
    }

    /// Signed distance in the shape's local frame
    pub fn distance(&self, local: Vec3) -> f32 {
        eval_primitive(self.type_tag(), self.data(), local)
    }
}

/// Deformations applied by operation nodes
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FieldOperation {
    /// Stretch later nodes by `half_extents` along the node's local axes
    Elongate {
        /// Elongation half extent per axis
        half_extents: Vec3,
    },
}

impl FieldOperation {
    /// GPU type tag
    pub fn type_tag(&self) -> i32 {
        match self {
            FieldOperation::Elongate { .. } => NODE_TYPE_ELONGATE,
        }
    }

    /// Packed 4-float parameter vector
    pub fn data(&self) -> Vec4 {
        match *self {
            FieldOperation::Elongate { half_extents } => half_extents.extend(0.0),
        }
    }
}

/// Reference to a shared mesh asset
///
/// An unloaded reference (no asset) is accepted everywhere and contributes
/// nothing to the field.
#[derive(Debug, Clone, Default)]
pub struct MeshReference {
    asset: Option<Arc<MeshAsset>>,
}

impl MeshReference {
    /// Reference a loaded asset
    pub fn new(asset: Arc<MeshAsset>) -> Self {
        MeshReference { asset: Some(asset) }
    }

    /// Reference whose asset is not loaded
    pub fn unloaded() -> Self {
        MeshReference { asset: None }
    }

    /// The asset, when loaded
    pub fn asset(&self) -> Option<&Arc<MeshAsset>> {
        self.asset.as_ref()
    }
}

/// Handle to a volumetric texture (placeholder node)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TextureReference {
    /// Renderer-side texture handle
    pub handle: u32,
}

/// Variant data of a field node
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// Analytic shape
    Primitive(PrimitiveShape),
    /// Voxelised mesh
    Mesh(MeshReference),
    /// Query-point deformation
    Operation(FieldOperation),
    /// Volumetric texture
    Texture(TextureReference),
}

/// Mesh asset offsets resolved by the sample store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshOffsets {
    /// First sample in the shared sample array
    pub sample_start: i32,
    /// First UV in the shared UV array, or -1
    pub uv_start: i32,
}

/// One node of a field
#[derive(Debug, Clone)]
pub struct FieldNode {
    /// Variant data
    pub kind: NodeKind,
    /// Combine policy
    pub combine: CombineType,
    /// Smoothing factor, clamped to the strict minimum when flattened
    pub smoothing: f32,
    /// Invert inside and outside
    pub flip: bool,
    /// Local-to-field pose
    pub transform: Mat4,
    /// Material
    pub material: FieldMaterial,
    /// Position in the combination order (ties keep registration order)
    pub order: i32,
}

impl FieldNode {
    /// Node with default policy: union, smoothing 0, identity pose
    pub fn new(kind: NodeKind) -> Self {
        FieldNode {
            kind,
            combine: CombineType::Union,
            smoothing: 0.0,
            flip: false,
            transform: Mat4::IDENTITY,
            material: FieldMaterial::default(),
            order: 0,
        }
    }

    /// Asset id of a mesh node with a loaded asset
    pub fn mesh_asset_id(&self) -> Option<MeshAssetId> {
        match &self.kind {
            NodeKind::Mesh(mesh) => mesh.asset().map(|a| a.id()),
            _ => None,
        }
    }

    /// Mesh node whose asset is missing
    pub fn is_unloaded_mesh(&self) -> bool {
        matches!(&self.kind, NodeKind::Mesh(mesh) if mesh.asset().is_none())
    }

    /// Whether the node warps later nodes instead of contributing distance
    pub fn is_operation(&self) -> bool {
        matches!(self.kind, NodeKind::Operation(_))
    }

    /// Flatten into GPU records.
    ///
    /// `world_to_field` is the owning group's inverse placement; the stored
    /// transform maps world-space queries into the node's local frame.
    /// Mesh nodes need their store offsets; returns `None` for mesh nodes
    /// without an asset or without offsets.
    pub fn to_records(
        &self,
        world_to_field: &Mat4,
        offsets: Option<MeshOffsets>,
    ) -> Option<(GpuNodeRecord, GpuMaterialRecord)> {
        let field_to_local = self.transform.inverse() * *world_to_field;
        let mut record = GpuNodeRecord {
            data: [0.0; 4],
            transform: field_to_local.to_cols_array_2d(),
            min_bounds: [0.0; 4],
            max_bounds: [0.0; 4],
            node_type: 0,
            combine_type: self.combine.tag(),
            flip: if self.flip { -1.0 } else { 1.0 },
            smoothing: clamp_smoothing(self.smoothing),
            size: 0,
            sample_start: -1,
            uv_start: -1,
            _pad: 0,
        };

        match &self.kind {
            NodeKind::Primitive(shape) => {
                record.node_type = shape.type_tag();
                record.data = shape.data().to_array();
            }
            NodeKind::Operation(op) => {
                record.node_type = op.type_tag();
                record.data = op.data().to_array();
            }
            NodeKind::Mesh(mesh) => {
                let asset = mesh.asset()?;
                let offsets = offsets?;
                record.node_type = NODE_TYPE_MESH;
                record.min_bounds = asset.min_bounds().extend(0.0).to_array();
                record.max_bounds = asset.max_bounds().extend(0.0).to_array();
                record.size = asset.size() as i32;
                record.sample_start = offsets.sample_start;
                record.uv_start = offsets.uv_start;
            }
            NodeKind::Texture(texture) => {
                record.node_type = NODE_TYPE_TEXTURE;
                record.data = [texture.handle as f32, 0.0, 0.0, 0.0];
            }
        }

        Some((record, self.material.to_record()))
    }
}
