//! Elongate warp
//!
//! Stretches every node evaluated after the operation node by removing the
//! part of the query offset that lies inside a box of the given half-extent.
//! The clamp happens in the operation node's local frame.

use glam::{Mat4, Vec3};

/// Warp a field-space point through an elongate operation.
///
/// # Arguments
/// * `point` - Field-space query point
/// * `field_to_local` - The operation node's field-to-local transform
/// * `local_to_field` - Inverse of `field_to_local`
/// * `half_extents` - Elongation half-extent per axis (negative values act as zero)
#[inline(always)]
pub fn elongate(point: Vec3, field_to_local: &Mat4, local_to_field: &Mat4, half_extents: Vec3) -> Vec3 {
    let h = half_extents.max(Vec3::ZERO);
    let local = field_to_local.transform_point3(point);
    let warped = local - local.clamp(-h, h);
    local_to_field.transform_point3(warped)
}
