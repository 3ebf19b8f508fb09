//! Derived queries: gradient, normal, sphere tracing, nearest point, overlaps
//!
//! All of these are built on [`MapperSnapshot::distance`] and never mutate
//! the snapshot, so they are safe to run from any thread.

use glam::Vec3;

use super::snapshot::{normalize_or_zero, TETRAHEDRON};
use super::MapperSnapshot;

/// A ray that reached the surface
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldHit {
    /// Hit position
    pub point: Vec3,
    /// Surface normal at the hit
    pub normal: Vec3,
    /// Distance travelled along the ray
    pub distance: f32,
    /// Sphere-tracing steps taken
    pub steps: u32,
}

impl MapperSnapshot {
    /// Tetrahedral 4-sample gradient estimate.
    ///
    /// `epsilon` is floored at the configured CPU minimum. The result is
    /// scaled by `1 / (4 epsilon)` so an exact distance field yields a unit
    /// gradient.
    pub fn gradient(&self, point: Vec3, epsilon: f32) -> Vec3 {
        let e = epsilon.max(self.config().min_normal_epsilon);
        let g = TETRAHEDRON
            .iter()
            .fold(Vec3::ZERO, |acc, &k| acc + k * self.distance(point + k * e));
        g / (4.0 * e)
    }

    /// Unit surface normal, using the group's normal smoothing as epsilon.
    ///
    /// Returns zero where the field is flat (for example an empty field).
    pub fn normal(&self, point: Vec3) -> Vec3 {
        normalize_or_zero(self.gradient(point, self.settings().normal_smoothing))
    }

    /// Sphere-trace from `origin` along `direction`.
    ///
    /// Stops with a hit once the distance drops below the configured surface
    /// distance, or with a miss once the travelled distance exceeds
    /// `max_distance` or the step budget runs out.
    pub fn raymarch(&self, origin: Vec3, direction: Vec3, max_distance: f32) -> Option<FieldHit> {
        let dir = normalize_or_zero(direction);
        if dir == Vec3::ZERO {
            return None;
        }
        let cfg = self.config();

        let mut t = 0.0;
        for step in 0..cfg.max_iterations {
            let d = self.distance(origin + dir * t);
            if d < cfg.surface_distance {
                let point = origin + dir * t;
                return Some(FieldHit {
                    point,
                    normal: self.normal(point),
                    distance: t,
                    steps: step + 1,
                });
            }
            t += d;
            if t > max_distance {
                return None;
            }
        }
        None
    }

    /// One projection step towards the surface: `p - distance(p) * normal(p)`.
    ///
    /// Exact for a single sphere; approximate for curved or blended fields,
    /// since the step is not iterated.
    pub fn nearest_surface_point(&self, point: Vec3) -> Vec3 {
        point - self.distance(point) * self.normal(point)
    }

    /// Whether the sphere touches or contains surface or solid; never for an
    /// empty field
    pub fn overlap_sphere(&self, centre: Vec3, radius: f32) -> bool {
        !self.is_empty() && self.distance(centre) <= radius
    }

    /// Approximate box overlap.
    ///
    /// Fails fast with the bounding-sphere test, then accepts when the centre
    /// or a corner is inside the field, or when the nearest surface point of
    /// one of them falls inside the box.
    pub fn overlap_box(&self, centre: Vec3, half_extents: Vec3) -> bool {
        if self.is_empty() {
            return false;
        }
        let half = half_extents.abs();
        if !self.overlap_sphere(centre, half.length()) {
            return false;
        }

        let probes = std::iter::once(centre).chain((0..8).map(|i| {
            let s = Vec3::new(
                if i & 1 == 0 { -1.0 } else { 1.0 },
                if i & 2 == 0 { -1.0 } else { 1.0 },
                if i & 4 == 0 { -1.0 } else { 1.0 },
            );
            centre + half * s
        }));

        let tolerance = Vec3::splat(1e-4);
        for probe in probes {
            if self.distance(probe) <= 0.0 {
                return true;
            }
            let nearest = self.nearest_surface_point(probe);
            if ((nearest - centre).abs() - half).cmple(tolerance).all() {
                return true;
            }
        }
        false
    }
}
