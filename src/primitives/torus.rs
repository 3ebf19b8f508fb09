//! Torus primitive lying in the node's XZ plane
//!
//! Parameter vector: `x` = major radius, `y` = tube radius.

use glam::{Vec2, Vec3};

/// Signed distance to a torus centred at the node origin
#[inline(always)]
pub fn sdf_torus(point: Vec3, major_radius: f32, minor_radius: f32) -> f32 {
    let q = Vec2::new(Vec2::new(point.x, point.z).length() - major_radius, point.y);
    q.length() - minor_radius
}
