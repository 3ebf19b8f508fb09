//! Box frame primitive (edges of a box only)
//!
//! Parameter vector: `xyz` = half extents, `w` = edge thickness.

use glam::Vec3;

/// Signed distance to a box frame centred at the node origin
#[inline(always)]
pub fn sdf_box_frame(point: Vec3, half_extents: Vec3, edge: f32) -> f32 {
    let p = point.abs() - half_extents;
    let q = (p + edge).abs() - edge;

    let arm = |a: Vec3| a.max(Vec3::ZERO).length() + a.x.max(a.y.max(a.z)).min(0.0);

    arm(Vec3::new(p.x, q.y, q.z))
        .min(arm(Vec3::new(q.x, p.y, q.z)))
        .min(arm(Vec3::new(q.x, q.y, p.z)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_is_hollow() {
        assert!(sdf_box_frame(Vec3::ZERO, Vec3::ONE, 0.1) > 0.0);
    }

    #[test]
    fn test_frame_edge_inside() {
        let d = sdf_box_frame(Vec3::new(0.0, 0.95, 0.95), Vec3::ONE, 0.1);
        assert!(d <= 0.0, "got {d}");
    }

    #[test]
    fn test_frame_mirror_symmetric() {
        let b = Vec3::new(1.0, 0.8, 0.6);
        let d1 = sdf_box_frame(Vec3::new(0.5, 0.3, 0.2), b, 0.1);
        let d2 = sdf_box_frame(Vec3::new(-0.5, -0.3, 0.2), b, 0.1);
        assert!((d1 - d2).abs() < 1e-6);
    }
}
