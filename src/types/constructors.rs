//! Constructors for FieldNode

use std::sync::Arc;

use glam::Vec3;

use super::{FieldNode, FieldOperation, MeshReference, NodeKind, PrimitiveShape, TextureReference};
use crate::asset::MeshAsset;

impl FieldNode {
    // === Primitives ===

    /// Sphere of the given radius
    #[must_use]
    #[inline]
    pub fn sphere(radius: f32) -> Self {
        FieldNode::new(NodeKind::Primitive(PrimitiveShape::Sphere { radius }))
    }

    /// Torus in the XZ plane
    #[must_use]
    #[inline]
    pub fn torus(major_radius: f32, minor_radius: f32) -> Self {
        FieldNode::new(NodeKind::Primitive(PrimitiveShape::Torus {
            major_radius,
            minor_radius,
        }))
    }

    /// Sharp-edged box with the given half extents
    #[must_use]
    #[inline]
    pub fn cuboid(hx: f32, hy: f32, hz: f32) -> Self {
        Self::rounded_cuboid(Vec3::new(hx, hy, hz), 0.0)
    }

    /// Box inflated by `roundness`
    #[must_use]
    #[inline]
    pub fn rounded_cuboid(half_extents: Vec3, roundness: f32) -> Self {
        FieldNode::new(NodeKind::Primitive(PrimitiveShape::Cuboid {
            half_extents,
            roundness,
        }))
    }

    /// Box frame with the given edge thickness
    #[must_use]
    #[inline]
    pub fn box_frame(half_extents: Vec3, thickness: f32) -> Self {
        FieldNode::new(NodeKind::Primitive(PrimitiveShape::BoxFrame {
            half_extents,
            thickness,
        }))
    }

    /// Capped cylinder along Y
    #[must_use]
    #[inline]
    pub fn cylinder(radius: f32, half_height: f32) -> Self {
        FieldNode::new(NodeKind::Primitive(PrimitiveShape::Cylinder {
            radius,
            half_height,
        }))
    }

    // === Other variants ===

    /// Mesh-reference node
    #[must_use]
    pub fn mesh(reference: MeshReference) -> Self {
        FieldNode::new(NodeKind::Mesh(reference))
    }

    /// Mesh-reference node for a loaded asset
    #[must_use]
    pub fn mesh_asset(asset: Arc<MeshAsset>) -> Self {
        Self::mesh(MeshReference::new(asset))
    }

    /// Elongate operation node
    #[must_use]
    pub fn elongate(half_extents: Vec3) -> Self {
        FieldNode::new(NodeKind::Operation(FieldOperation::Elongate { half_extents }))
    }

    /// Texture-reference node
    #[must_use]
    pub fn texture(handle: u32) -> Self {
        FieldNode::new(NodeKind::Texture(TextureReference { handle }))
    }
}
