//! Sphere primitive
//!
//! Parameter vector: `x` = radius.

use glam::Vec3;

/// Signed distance to a sphere centred at the node origin
#[inline(always)]
pub fn sdf_sphere(point: Vec3, radius: f32) -> f32 {
    point.length() - radius
}
