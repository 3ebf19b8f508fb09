//! Cuboid primitive
//!
//! Parameter vector: `xyz` = half extents, `w` = rounding. The rounding is
//! added on top of the box, so a rounded cuboid grows by `w` in every direction.

use glam::Vec3;

/// Signed distance to an axis-aligned box centred at the node origin
#[inline(always)]
pub fn sdf_box3d(point: Vec3, half_extents: Vec3) -> f32 {
    let q = point.abs() - half_extents;
    q.max(Vec3::ZERO).length() + q.x.max(q.y.max(q.z)).min(0.0)
}

/// Signed distance to a box inflated by `rounding`
#[inline(always)]
pub fn sdf_rounded_box3d(point: Vec3, half_extents: Vec3, rounding: f32) -> f32 {
    sdf_box3d(point, half_extents) - rounding
}
