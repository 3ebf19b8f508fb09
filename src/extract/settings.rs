//! Extraction settings
//!
//! Three groups of settings, split by what a change invalidates:
//! - [`MainSettings`]: output mode and scheduling, no GPU buffers touched
//! - [`VoxelSettings`]: grid resolution, reallocates every intermediate buffer
//! - [`AlgorithmSettings`]: uniform values only

use std::path::Path;

use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

use crate::error::{FieldError, Result};

/// Where the extracted surface goes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputMode {
    /// Read vertices and indices back into an [`ExtractedMesh`](super::ExtractedMesh)
    #[default]
    Mesh,
    /// Keep everything on the GPU for an indirect draw
    Procedural,
}

/// Isosurface algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExtractionType {
    /// Vertex at the mean of the cell's edge crossings
    #[default]
    SurfaceNets,
    /// Vertex refined by gradient descent towards the surface
    DualContouring,
}

impl ExtractionType {
    /// Tag sent to the shader
    pub fn tag(self) -> u32 {
        match self {
            ExtractionType::SurfaceNets => 0,
            ExtractionType::DualContouring => 1,
        }
    }
}

/// How edge crossings are located
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EdgeIntersection {
    /// Linear interpolation of the two corner samples
    #[default]
    Interpolate,
    /// Bisection on the field itself
    BinarySearch,
}

impl EdgeIntersection {
    /// Tag sent to the shader
    pub fn tag(self) -> u32 {
        match self {
            EdgeIntersection::Interpolate => 0,
            EdgeIntersection::BinarySearch => 1,
        }
    }
}

/// Output and scheduling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MainSettings {
    /// Extract whenever the field changes
    pub auto_update: bool,
    /// Mesh readback or procedural draw
    pub output_mode: OutputMode,
    /// Poll the readback over several ticks instead of blocking
    pub is_asynchronous: bool,
}

impl Default for MainSettings {
    fn default() -> Self {
        MainSettings {
            auto_update: true,
            output_mode: OutputMode::Mesh,
            is_asynchronous: false,
        }
    }
}

/// Sampling grid
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoxelSettings {
    /// Grid points along each axis
    pub samples_per_side: u32,
    /// Distance between neighbouring grid points
    pub cell_size: f32,
}

impl Default for VoxelSettings {
    fn default() -> Self {
        VoxelSettings {
            samples_per_side: 50,
            cell_size: 0.2,
        }
    }
}

impl VoxelSettings {
    /// Cells along each axis
    pub fn cell_count(&self) -> u32 {
        self.samples_per_side.saturating_sub(1)
    }

    /// Grid points in the whole volume
    pub fn total_samples(&self) -> usize {
        let n = self.samples_per_side as usize;
        n * n * n
    }

    /// Half size of the sampled volume
    pub fn extents(&self) -> Vec3 {
        Vec3::splat(self.cell_count() as f32 * 0.5 * self.cell_size)
    }

    /// Full size of the sampled volume
    pub fn volume_size(&self) -> Vec3 {
        self.extents() * 2.0
    }

    /// Distance between the centres of adjacent chunks
    pub fn offset_distance(&self) -> f32 {
        self.cell_count() as f32 * self.cell_size
    }

    /// Grid-local position of grid point `(x, y, z)`; the grid is centred
    /// on the origin
    #[inline]
    pub fn cell_coordinate_to_vertex(&self, x: u32, y: u32, z: u32) -> Vec3 {
        let bound = self.extents().x;
        Vec3::new(x as f32, y as f32, z as f32) * self.cell_size - Vec3::splat(bound)
    }

    /// Linear index of grid point `(x, y, z)`
    #[inline]
    pub fn cell_coordinate_to_index(&self, x: u32, y: u32, z: u32) -> usize {
        let n = self.samples_per_side as usize;
        x as usize + y as usize * n + z as usize * n * n
    }

    /// Grid point of a linear index
    #[inline]
    pub fn index_to_cell_coordinate(&self, index: usize) -> (u32, u32, u32) {
        let n = self.samples_per_side as usize;
        let z = index / (n * n);
        let rem = index - z * n * n;
        ((rem % n) as u32, (rem / n) as u32, z as u32)
    }

    /// Reject grids with fewer than two points per side or a non-positive cell
    pub fn validate(&self) -> Result<()> {
        if self.samples_per_side < 2 {
            return Err(FieldError::InvalidSettings(format!(
                "samples_per_side must be at least 2, got {}",
                self.samples_per_side
            )));
        }
        if !(self.cell_size > 0.0) || !self.cell_size.is_finite() {
            return Err(FieldError::InvalidSettings(format!(
                "cell_size must be positive, got {}",
                self.cell_size
            )));
        }
        Ok(())
    }
}

/// Algorithm parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlgorithmSettings {
    /// Surface nets or dual contouring
    pub extraction_type: ExtractionType,
    /// Interpolation or bisection of edge crossings
    pub edge_intersection: EdgeIntersection,
    /// Bisection steps per edge
    pub binary_search_iterations: u32,
    /// Descent steps per dual-contouring vertex
    pub gradient_descent_iterations: u32,
    /// Corners whose vertex normal deviates more than this from the face
    /// normal get their own vertex
    pub max_angle_tolerance_degrees: f32,
    /// Epsilon of the normal estimate stored on vertices
    pub visual_normal_smoothing: f32,
}

impl Default for AlgorithmSettings {
    fn default() -> Self {
        AlgorithmSettings {
            extraction_type: ExtractionType::SurfaceNets,
            edge_intersection: EdgeIntersection::Interpolate,
            binary_search_iterations: 5,
            gradient_descent_iterations: 10,
            max_angle_tolerance_degrees: 20.0,
            visual_normal_smoothing: 1e-5,
        }
    }
}

impl AlgorithmSettings {
    /// Cosine of the angle tolerance
    pub fn max_angle_cosine(&self) -> f32 {
        self.max_angle_tolerance_degrees.to_radians().cos()
    }

    /// Reject out-of-range values
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=180.0).contains(&self.max_angle_tolerance_degrees) {
            return Err(FieldError::InvalidSettings(format!(
                "max_angle_tolerance_degrees must be within 0..=180, got {}",
                self.max_angle_tolerance_degrees
            )));
        }
        if !(self.visual_normal_smoothing > 0.0) {
            return Err(FieldError::InvalidSettings(format!(
                "visual_normal_smoothing must be positive, got {}",
                self.visual_normal_smoothing
            )));
        }
        Ok(())
    }
}

/// Everything an extractor needs besides the field
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorSettings {
    /// Output and scheduling
    pub main: MainSettings,
    /// Sampling grid
    pub voxel: VoxelSettings,
    /// Algorithm parameters
    pub algorithm: AlgorithmSettings,
    /// Grid-local to world placement of the sampling grid
    pub grid_transform: Mat4,
    /// World to output-mesh space
    pub mesh_transform: Mat4,
}

impl Default for ExtractorSettings {
    fn default() -> Self {
        ExtractorSettings {
            main: MainSettings::default(),
            voxel: VoxelSettings::default(),
            algorithm: AlgorithmSettings::default(),
            grid_transform: Mat4::IDENTITY,
            mesh_transform: Mat4::IDENTITY,
        }
    }
}

impl ExtractorSettings {
    /// Fine grid with dual contouring and bisected edges
    pub fn high_quality() -> Self {
        ExtractorSettings {
            voxel: VoxelSettings {
                samples_per_side: 96,
                cell_size: 0.1,
            },
            algorithm: AlgorithmSettings {
                extraction_type: ExtractionType::DualContouring,
                edge_intersection: EdgeIntersection::BinarySearch,
                binary_search_iterations: 8,
                gradient_descent_iterations: 16,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Coarse preview grid
    pub fn fast() -> Self {
        ExtractorSettings {
            voxel: VoxelSettings {
                samples_per_side: 24,
                cell_size: 0.4,
            },
            ..Default::default()
        }
    }

    /// Validate every section
    pub fn validate(&self) -> Result<()> {
        self.voxel.validate()?;
        self.algorithm.validate()
    }

    /// Parse and validate JSON settings
    pub fn from_json(json: &str) -> Result<Self> {
        let settings: ExtractorSettings = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load and validate a JSON settings file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_voxel_derived_values() {
        let v = VoxelSettings {
            samples_per_side: 11,
            cell_size: 0.5,
        };
        assert_eq!(v.cell_count(), 10);
        assert_eq!(v.total_samples(), 1331);
        assert_eq!(v.extents(), Vec3::splat(2.5));
        assert_eq!(v.offset_distance(), 5.0);
        assert_eq!(v.cell_coordinate_to_vertex(0, 0, 0), Vec3::splat(-2.5));
        assert_eq!(v.cell_coordinate_to_vertex(10, 5, 10), Vec3::new(2.5, 0.0, 2.5));
    }

    #[test]
    fn test_index_round_trip() {
        let v = VoxelSettings::default();
        let i = v.cell_coordinate_to_index(3, 7, 11);
        assert_eq!(v.index_to_cell_coordinate(i), (3, 7, 11));
    }

    #[test]
    fn test_validation() {
        assert!(ExtractorSettings::default().validate().is_ok());
        let mut s = ExtractorSettings::default();
        s.voxel.samples_per_side = 1;
        assert!(s.validate().is_err());
        s = ExtractorSettings::default();
        s.voxel.cell_size = 0.0;
        assert!(s.validate().is_err());
        s = ExtractorSettings::default();
        s.algorithm.max_angle_tolerance_degrees = 270.0;
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_angle_cosine() {
        let a = AlgorithmSettings {
            max_angle_tolerance_degrees: 60.0,
            ..Default::default()
        };
        assert!((a.max_angle_cosine() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let s = ExtractorSettings::from_json(r#"{"voxel": {"samples_per_side": 16}, "main": {"output_mode": "Procedural"}}"#)
            .unwrap();
        assert_eq!(s.voxel.samples_per_side, 16);
        assert_eq!(s.voxel.cell_size, 0.2);
        assert_eq!(s.main.output_mode, OutputMode::Procedural);
        assert!(s.main.auto_update);
        assert!(ExtractorSettings::from_json(r#"{"voxel": {"samples_per_side": 0}}"#).is_err());
    }
}
