//! Combine-policy builders for FieldNode

use super::{CombineType, FieldNode};
use crate::material::FieldMaterial;

impl FieldNode {
    /// Set the combine policy
    #[must_use]
    #[inline]
    pub fn with_combine(mut self, combine: CombineType) -> Self {
        self.combine = combine;
        self
    }

    /// Smooth union with the nodes before it
    #[must_use]
    #[inline]
    pub fn union(self) -> Self {
        self.with_combine(CombineType::Union)
    }

    /// Carve this node out of the nodes before it
    #[must_use]
    #[inline]
    pub fn subtract(self) -> Self {
        self.with_combine(CombineType::Subtract)
    }

    /// Keep only the overlap with the nodes before it
    #[must_use]
    #[inline]
    pub fn intersect(self) -> Self {
        self.with_combine(CombineType::Intersect)
    }

    /// Set the blend width
    #[must_use]
    #[inline]
    pub fn with_smoothing(mut self, smoothing: f32) -> Self {
        self.smoothing = smoothing;
        self
    }

    /// Invert inside and outside
    #[must_use]
    #[inline]
    pub fn flipped(mut self) -> Self {
        self.flip = !self.flip;
        self
    }

    /// Set the material
    #[must_use]
    #[inline]
    pub fn with_material(mut self, material: FieldMaterial) -> Self {
        self.material = material;
        self
    }

    /// Set the combination order
    #[must_use]
    #[inline]
    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }
}
