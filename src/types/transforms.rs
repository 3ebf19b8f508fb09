//! Pose builders for FieldNode
//!
//! Poses are rigid (translation and rotation). Scaling the pose would scale
//! distances too, so it is not offered here.

use glam::{Mat4, Quat, Vec3};

use super::FieldNode;

impl FieldNode {
    /// Move the node
    #[must_use]
    #[inline]
    pub fn translate(mut self, x: f32, y: f32, z: f32) -> Self {
        self.transform = Mat4::from_translation(Vec3::new(x, y, z)) * self.transform;
        self
    }

    /// Rotate the node about its current position's origin
    #[must_use]
    #[inline]
    pub fn rotate(mut self, rotation: Quat) -> Self {
        self.transform = Mat4::from_quat(rotation) * self.transform;
        self
    }

    /// Replace the pose
    #[must_use]
    #[inline]
    pub fn with_transform(mut self, transform: Mat4) -> Self {
        self.transform = transform;
        self
    }

    /// Node position in field space
    pub fn position(&self) -> Vec3 {
        self.transform.w_axis.truncate()
    }
}
