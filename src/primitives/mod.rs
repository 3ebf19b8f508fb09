//! Primitive SDF shapes
//!
//! Shapes are evaluated in the node's local frame. `eval_primitive`
//! dispatches on the GPU type tag so the Mapper and the shader agree on the
//! parameter packing.

mod box3d;
mod box_frame;
mod cylinder;
mod sphere;
mod torus;

pub use box3d::{sdf_box3d, sdf_rounded_box3d};
pub use box_frame::sdf_box_frame;
pub use cylinder::sdf_cylinder;
pub use sphere::sdf_sphere;
pub use torus::sdf_torus;

use glam::{Vec3, Vec4};

/// Evaluate a primitive by type tag (1 = sphere .. 5 = cylinder).
///
/// Unknown tags evaluate to `f32::MAX` so they never win a union.
#[inline]
pub fn eval_primitive(type_tag: i32, data: Vec4, local: Vec3) -> f32 {
    match type_tag {
        1 => sdf_sphere(local, data.x),
        2 => sdf_torus(local, data.x, data.y),
        3 => sdf_rounded_box3d(local, data.truncate(), data.w),
        4 => sdf_box_frame(local, data.truncate(), data.w),
        5 => sdf_cylinder(local, data.x, data.y),
        _ => f32::MAX,
    }
}
