//! Voxelised mesh assets
//!
//! A `MeshAsset` is a cubic grid of signed distance samples baked from a
//! source mesh (baking itself happens outside this crate), plus optional
//! packed UVs. Mesh-reference nodes point at a shared asset; the samples are
//! deduplicated by the [`MeshSampleStore`](crate::store::MeshSampleStore).
//!
//! # Layout
//! Samples are stored x-fastest: `index = x + y * size + z * size * size`,
//! covering `[min_bounds, max_bounds]` with `size` points per side.

use std::sync::atomic::{AtomicU64, Ordering};

use glam::{UVec3, Vec3};

use crate::error::{FieldError, Result};

static NEXT_ASSET_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a mesh asset, unique per process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshAssetId(u64);

impl MeshAssetId {
    fn next() -> Self {
        MeshAssetId(NEXT_ASSET_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw id value
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Signed distance samples of a mesh on a regular cubic grid
#[derive(Debug, Clone)]
pub struct MeshAsset {
    id: MeshAssetId,
    name: String,
    size: usize,
    padding: f32,
    min_bounds: Vec3,
    max_bounds: Vec3,
    samples: Vec<f32>,
    packed_uvs: Option<Vec<f32>>,
}

impl MeshAsset {
    /// Build an asset from baked samples.
    ///
    /// Fails when `size < 2`, when the bounds are empty, or when the sample
    /// (and UV, if present) arrays do not hold `size³` entries.
    pub fn new(
        name: impl Into<String>,
        size: usize,
        min_bounds: Vec3,
        max_bounds: Vec3,
        padding: f32,
        samples: Vec<f32>,
        packed_uvs: Option<Vec<f32>>,
    ) -> Result<Self> {
        let name = name.into();
        let invalid = |reason: String| FieldError::InvalidAsset {
            name: name.clone(),
            reason,
        };

        if size < 2 {
            return Err(invalid(format!("grid size {size} is below 2")));
        }
        if !(max_bounds.cmpgt(min_bounds).all()) {
            return Err(invalid(format!(
                "empty bounds {min_bounds:?}..{max_bounds:?}"
            )));
        }
        let expected = size * size * size;
        if samples.len() != expected {
            return Err(invalid(format!(
                "expected {expected} samples, got {}",
                samples.len()
            )));
        }
        if let Some(uvs) = &packed_uvs {
            if uvs.len() != expected {
                return Err(invalid(format!(
                    "expected {expected} packed UVs, got {}",
                    uvs.len()
                )));
            }
        }
        Ok(MeshAsset {
            id: MeshAssetId::next(),
            name,
            size,
            padding,
            min_bounds,
            max_bounds,
            samples,
            packed_uvs,
        })
    }

    /// Bake an asset by sampling `f` at every grid point.
    ///
    /// Handy for procedural assets and tests; real mesh voxelisation lives in
    /// the asset import layer.
    pub fn from_fn(
        name: impl Into<String>,
        size: usize,
        min_bounds: Vec3,
        max_bounds: Vec3,
        f: impl Fn(Vec3) -> f32,
    ) -> Result<Self> {
        let size_f = size.saturating_sub(1).max(1) as f32;
        let mut samples = Vec::with_capacity(size * size * size);
        for z in 0..size {
            for y in 0..size {
                for x in 0..size {
                    let t = Vec3::new(x as f32, y as f32, z as f32) / size_f;
                    samples.push(f(min_bounds + (max_bounds - min_bounds) * t));
                }
            }
        }
        Self::new(name, size, min_bounds, max_bounds, 0.0, samples, None)
    }

    /// Asset identity
    #[inline]
    pub fn id(&self) -> MeshAssetId {
        self.id
    }

    /// Asset name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Points per side of the sample grid
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Cells per side (`size - 1`)
    #[inline]
    pub fn cells_per_side(&self) -> usize {
        self.size - 1
    }

    /// Total number of samples (`size³`)
    #[inline]
    pub fn total_size(&self) -> usize {
        self.size * self.size * self.size
    }

    /// Padding baked around the source mesh
    pub fn padding(&self) -> f32 {
        self.padding
    }

    /// Minimum corner of the sampled box
    #[inline]
    pub fn min_bounds(&self) -> Vec3 {
        self.min_bounds
    }

    /// Maximum corner of the sampled box
    #[inline]
    pub fn max_bounds(&self) -> Vec3 {
        self.max_bounds
    }

    /// Centre of the sampled box
    pub fn centre(&self) -> Vec3 {
        (self.min_bounds + self.max_bounds) * 0.5
    }

    /// Whether the asset carries packed UVs
    pub fn has_uvs(&self) -> bool {
        self.packed_uvs.is_some()
    }

    /// Raw samples
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Raw packed UVs, if any
    pub fn packed_uvs(&self) -> Option<&[f32]> {
        self.packed_uvs.as_deref()
    }

    /// Sample at an integer grid coordinate
    pub fn signed_distance(&self, x: usize, y: usize, z: usize) -> f32 {
        self.samples[self.cell_coordinate_to_index(x, y, z)]
    }

    /// Clamp a point into the sampled box shrunk by `bounds_offset`
    pub fn clamp_to_volume(&self, p: Vec3, bounds_offset: f32) -> Vec3 {
        p.clamp(
            self.min_bounds + Vec3::splat(bounds_offset),
            self.max_bounds - Vec3::splat(bounds_offset),
        )
    }

    /// Clamp into the sampled box and map to the unit cube
    pub fn clamp_and_normalize(&self, p: Vec3, bounds_offset: f32) -> Vec3 {
        clamp_and_normalize(p, self.min_bounds, self.max_bounds, bounds_offset)
    }

    /// Trilinearly interpolated sample at `p` (clamped into the box)
    pub fn sample(&self, p: Vec3) -> f32 {
        let grid = SampleGrid {
            samples: &self.samples,
            start: 0,
            size: self.size,
            min_bounds: self.min_bounds,
            max_bounds: self.max_bounds,
        };
        grid.sample(p)
    }

    /// Position of grid point `(x, y, z)` inside the sampled box
    pub fn cell_coordinate_to_vertex(&self, x: usize, y: usize, z: usize) -> Vec3 {
        let t = Vec3::new(x as f32, y as f32, z as f32) / self.cells_per_side() as f32;
        self.min_bounds + (self.max_bounds - self.min_bounds) * t
    }

    /// Position of the grid point at flat `index`
    pub fn index_to_vertex(&self, index: usize) -> Vec3 {
        let c = self.index_to_cell_coordinate(index);
        self.cell_coordinate_to_vertex(c.x as usize, c.y as usize, c.z as usize)
    }

    /// Flat index to grid coordinate
    pub fn index_to_cell_coordinate(&self, index: usize) -> UVec3 {
        let s = self.size;
        UVec3::new((index % s) as u32, ((index / s) % s) as u32, (index / (s * s)) as u32)
    }

    /// Grid coordinate to flat index
    #[inline]
    pub fn cell_coordinate_to_index(&self, x: usize, y: usize, z: usize) -> usize {
        x + y * self.size + z * self.size * self.size
    }
}

/// Clamp `p` into `[min + offset, max - offset]` and map to the unit cube
#[inline]
pub fn clamp_and_normalize(p: Vec3, min_bounds: Vec3, max_bounds: Vec3, bounds_offset: f32) -> Vec3 {
    let offset = Vec3::splat(bounds_offset);
    let clamped = p.clamp(min_bounds + offset, max_bounds - offset);
    (clamped - min_bounds) / (max_bounds - min_bounds)
}

/// View of one asset's samples inside a (possibly concatenated) sample array
#[derive(Debug, Clone, Copy)]
pub struct SampleGrid<'a> {
    /// Sample array, possibly shared with other assets
    pub samples: &'a [f32],
    /// Offset of this asset's first sample
    pub start: usize,
    /// Points per side
    pub size: usize,
    /// Minimum corner
    pub min_bounds: Vec3,
    /// Maximum corner
    pub max_bounds: Vec3,
}

impl SampleGrid<'_> {
    #[inline(always)]
    fn at(&self, x: usize, y: usize, z: usize) -> f32 {
        let i = self.start + x + y * self.size + z * self.size * self.size;
        self.samples.get(i).copied().unwrap_or(0.0)
    }

    /// Trilinear interpolation of the 8 samples around `p`.
    ///
    /// The point is clamped into the box first, so queries outside the box
    /// return the value on its boundary.
    #[inline]
    pub fn sample(&self, p: Vec3) -> f32 {
        self.sample_inset(p, 0.0)
    }

    /// Like [`sample`](Self::sample), clamping into the box shrunk by `bounds_offset`
    pub fn sample_inset(&self, p: Vec3, bounds_offset: f32) -> f32 {
        let cells = self.size.saturating_sub(1).max(1);
        let scaled = clamp_and_normalize(p, self.min_bounds, self.max_bounds, bounds_offset) * cells as f32;
        let max_cell = (cells - 1) as f32;
        let base = scaled.floor().min(Vec3::splat(max_cell)).max(Vec3::ZERO);
        let t = scaled - base;
        let (x, y, z) = (base.x as usize, base.y as usize, base.z as usize);

        let a = self.at(x, y, z);
        let b = self.at(x + 1, y, z);
        let c = self.at(x, y + 1, z);
        let d = self.at(x + 1, y + 1, z);
        let e = self.at(x, y, z + 1);
        let f = self.at(x + 1, y, z + 1);
        let g = self.at(x, y + 1, z + 1);
        let h = self.at(x + 1, y + 1, z + 1);

        let ab = a + (b - a) * t.x;
        let cd = c + (d - c) * t.x;
        let ef = e + (f - e) * t.x;
        let gh = g + (h - g) * t.x;

        let abcd = ab + (cd - ab) * t.y;
        let efgh = ef + (gh - ef) * t.y;

        abcd + (efgh - abcd) * t.z
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear_asset() -> MeshAsset {
        // f(p) = p.x + 2 p.y - p.z is reproduced exactly by trilinear sampling
        MeshAsset::from_fn("linear", 5, Vec3::splat(-1.0), Vec3::splat(1.0), |p| {
            p.x + 2.0 * p.y - p.z
        })
        .unwrap()
    }

    #[test]
    fn test_rejects_wrong_sample_count() {
        let err = MeshAsset::new("bad", 3, Vec3::ZERO, Vec3::ONE, 0.0, vec![0.0; 26], None);
        assert!(matches!(err, Err(FieldError::InvalidAsset { .. })));
    }

    #[test]
    fn test_rejects_empty_bounds() {
        let err = MeshAsset::new("flat", 2, Vec3::ZERO, Vec3::new(1.0, 0.0, 1.0), 0.0, vec![0.0; 8], None);
        assert!(err.is_err());
    }

    #[test]
    fn test_uv_length_checked() {
        let a = MeshAsset::new("uv", 2, Vec3::ZERO, Vec3::ONE, 0.0, vec![0.0; 8], Some(Vec::new()));
        assert!(a.is_err());
        let a = MeshAsset::new("uv", 2, Vec3::ZERO, Vec3::ONE, 0.0, vec![0.0; 8], Some(vec![1.0; 8])).unwrap();
        assert!(a.has_uvs());
    }

    #[test]
    fn test_unique_ids() {
        assert_ne!(linear_asset().id(), linear_asset().id());
    }

    #[test]
    fn test_trilinear_reproduces_linear_field() {
        let a = linear_asset();
        for p in [
            Vec3::new(0.13, -0.4, 0.77),
            Vec3::new(-0.9, 0.9, -0.1),
            Vec3::ZERO,
            Vec3::ONE,
            Vec3::splat(-1.0),
        ] {
            let expected = p.x + 2.0 * p.y - p.z;
            assert!((a.sample(p) - expected).abs() < 1e-4, "p={p:?}");
        }
    }

    #[test]
    fn test_sample_clamps_outside_box() {
        let a = linear_asset();
        let inside = a.sample(Vec3::new(1.0, 0.0, 0.0));
        let outside = a.sample(Vec3::new(4.0, 0.0, 0.0));
        assert!((inside - outside).abs() < 1e-6);
    }

    #[test]
    fn test_index_round_trip() {
        let a = linear_asset();
        let i = a.cell_coordinate_to_index(1, 3, 4);
        assert_eq!(a.index_to_cell_coordinate(i), UVec3::new(1, 3, 4));
        assert_eq!(a.index_to_vertex(i), a.cell_coordinate_to_vertex(1, 3, 4));
        assert_eq!(a.cell_coordinate_to_vertex(4, 4, 4), Vec3::ONE);
    }

    #[test]
    fn test_grid_offset_into_shared_array() {
        let a = linear_asset();
        let mut shared = vec![99.0; 10];
        shared.extend_from_slice(a.samples());
        let grid = SampleGrid {
            samples: &shared,
            start: 10,
            size: a.size(),
            min_bounds: a.min_bounds(),
            max_bounds: a.max_bounds(),
        };
        let p = Vec3::new(0.2, 0.3, -0.6);
        assert!((grid.sample(p) - a.sample(p)).abs() < 1e-6);
    }
}
