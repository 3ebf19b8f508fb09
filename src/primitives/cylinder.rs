//! Capped cylinder primitive along the node's Y axis
//!
//! Parameter vector: `x` = radius, `y` = half height.

use glam::{Vec2, Vec3};

/// Signed distance to a capped vertical cylinder centred at the node origin
#[inline(always)]
pub fn sdf_cylinder(point: Vec3, radius: f32, half_height: f32) -> f32 {
    let d = Vec2::new(
        Vec2::new(point.x, point.z).length() - radius,
        point.y.abs() - half_height,
    );
    d.x.max(d.y).min(0.0) + d.max(Vec2::ZERO).length()
}
