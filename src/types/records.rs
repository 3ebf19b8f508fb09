//! GPU record layouts
//!
//! `#[repr(C)]` mirrors of the WGSL structs in `shaders/field.wgsl`. The
//! layouts follow WGSL storage rules (vec4/mat4 aligned to 16 bytes) and are
//! pinned by size tests; any change here must be made in the shader too.

use bytemuck::{Pod, Zeroable};

/// Node type tag of a mesh-reference node
pub const NODE_TYPE_MESH: i32 = 0;
/// Node type tag of the first primitive shape (sphere); other shapes follow
pub const NODE_TYPE_PRIMITIVE_BASE: i32 = 1;
/// Node type tag of an elongate operation
pub const NODE_TYPE_ELONGATE: i32 = -1;
/// Node type tag of a texture-reference node (evaluates to nothing)
pub const NODE_TYPE_TEXTURE: i32 = 64;

/// Combine tag: smooth union
pub const COMBINE_UNION: i32 = 0;
/// Combine tag: smooth subtraction
pub const COMBINE_SUBTRACT: i32 = 1;
/// Combine tag: smooth intersection
pub const COMBINE_INTERSECT: i32 = 2;

/// One node of the aggregated field, as seen by the GPU and the Mapper
///
/// | offset | field |
/// |--------|-------|
/// | 0   | `data` (shape / operation parameters) |
/// | 16  | `transform` (field-to-local, column major) |
/// | 80  | `min_bounds` (mesh only, w unused) |
/// | 96  | `max_bounds` (mesh only, w unused) |
/// | 112 | `node_type`, `combine_type`, `flip`, `smoothing` |
/// | 128 | `size`, `sample_start`, `uv_start`, padding |
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct GpuNodeRecord {
    /// 4-float parameter vector
    pub data: [f32; 4],
    /// Field-to-local transform, column major
    pub transform: [[f32; 4]; 4],
    /// Mesh sample box minimum
    pub min_bounds: [f32; 4],
    /// Mesh sample box maximum
    pub max_bounds: [f32; 4],
    /// Node type tag
    pub node_type: i32,
    /// Combine tag
    pub combine_type: i32,
    /// +1 or -1
    pub flip: f32,
    /// Smoothing, already clamped to the minimum
    pub smoothing: f32,
    /// Mesh points per side
    pub size: i32,
    /// Offset of the mesh's samples in the shared sample array
    pub sample_start: i32,
    /// Offset of the mesh's UVs, or -1 without UVs
    pub uv_start: i32,
    /// Padding to 16 bytes
    pub _pad: i32,
}

impl GpuNodeRecord {
    /// Whether this record is an operation that warps the query point
    #[inline]
    pub fn is_operation(&self) -> bool {
        self.node_type < 0
    }

    /// Whether this record is a mesh reference
    #[inline]
    pub fn is_mesh(&self) -> bool {
        self.node_type == NODE_TYPE_MESH
    }
}

/// Material of one node
///
/// | offset | field |
/// |--------|-------|
/// | 0  | `colour`, `material_type` |
/// | 16 | `emission`, `texture_index` |
/// | 32 | `subsurface_colour`, `subsurface_power` |
/// | 48 | `metallic`, `smoothness`, `thickness`, `material_smoothing` |
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct GpuMaterialRecord {
    /// RGB albedo
    pub colour: [f32; 3],
    /// 0 = colour, 1 = texture
    pub material_type: i32,
    /// RGB emission
    pub emission: [f32; 3],
    /// Texture slot (texture materials only)
    pub texture_index: i32,
    /// RGB subsurface colour
    pub subsurface_colour: [f32; 3],
    /// Subsurface power
    pub subsurface_power: f32,
    /// Metallic
    pub metallic: f32,
    /// Smoothness
    pub smoothness: f32,
    /// Thickness
    pub thickness: f32,
    /// Extra blend width for colour blending
    pub material_smoothing: f32,
}

/// Group-wide settings uniform
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct GpuSettingsRecord {
    /// Epsilon of the field gradient used for shading normals
    pub normal_smoothing: f32,
    /// Maximum distance sampled by thickness estimation
    pub thickness_max_distance: f32,
    /// Thickness falloff exponent
    pub thickness_falloff: f32,
    /// Padding to 16 bytes
    pub _pad: f32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{align_of, size_of};

    #[test]
    fn test_node_record_size() {
        assert_eq!(size_of::<GpuNodeRecord>(), 144);
        assert_eq!(size_of::<GpuNodeRecord>() % 16, 0);
        assert_eq!(align_of::<GpuNodeRecord>(), 4);
    }

    #[test]
    fn test_material_record_size() {
        assert_eq!(size_of::<GpuMaterialRecord>(), 64);
    }

    #[test]
    fn test_settings_record_size() {
        assert_eq!(size_of::<GpuSettingsRecord>(), 16);
    }

    #[test]
    fn test_node_record_field_offsets() {
        let r = GpuNodeRecord::zeroed();
        let base = &r as *const _ as usize;
        assert_eq!(&r.transform as *const _ as usize - base, 16);
        assert_eq!(&r.min_bounds as *const _ as usize - base, 80);
        assert_eq!(&r.node_type as *const _ as usize - base, 112);
        assert_eq!(&r.size as *const _ as usize - base, 128);
    }

    #[test]
    fn test_operation_tags() {
        let mut r = GpuNodeRecord::zeroed();
        r.node_type = NODE_TYPE_ELONGATE;
        assert!(r.is_operation());
        r.node_type = NODE_TYPE_MESH;
        assert!(r.is_mesh() && !r.is_operation());
        r.node_type = NODE_TYPE_TEXTURE;
        assert!(!r.is_mesh() && !r.is_operation());
    }
}
