//! Node materials
//!
//! Every field node carries one `FieldMaterial`. The isosurface extractor
//! blends material colours along the same combination walk as the distance,
//! and the raymarcher shades with the full record.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::types::GpuMaterialRecord;

/// How the surface colour is sourced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MaterialType {
    /// Flat colour
    #[default]
    Colour,
    /// Texture slot lookup (resolved by the renderer)
    Texture,
}

impl MaterialType {
    fn tag(self) -> i32 {
        match self {
            MaterialType::Colour => 0,
            MaterialType::Texture => 1,
        }
    }
}

/// Surface material of a field node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldMaterial {
    /// Colour source
    pub material_type: MaterialType,
    /// Texture slot for `MaterialType::Texture`
    pub texture_index: i32,
    /// Albedo
    pub colour: Vec3,
    /// Emission
    pub emission: Vec3,
    /// Metallic [0, 1]
    pub metallic: f32,
    /// Smoothness [0, 1]
    pub smoothness: f32,
    /// Thickness used by subsurface approximation
    pub thickness: f32,
    /// Subsurface colour
    pub subsurface_colour: Vec3,
    /// Subsurface power
    pub subsurface_power: f32,
    /// Extra blend width when colours of neighbouring nodes mix
    pub material_smoothing: f32,
}

impl Default for FieldMaterial {
    fn default() -> Self {
        FieldMaterial {
            material_type: MaterialType::Colour,
            texture_index: 0,
            colour: Vec3::ONE,
            emission: Vec3::ZERO,
            metallic: 0.0,
            smoothness: 0.5,
            thickness: 0.0,
            subsurface_colour: Vec3::ONE,
            subsurface_power: 1.0,
            material_smoothing: 0.0,
        }
    }
}

impl FieldMaterial {
    /// Flat-colour material
    pub fn colour(r: f32, g: f32, b: f32) -> Self {
        FieldMaterial {
            colour: Vec3::new(r, g, b),
            ..Default::default()
        }
    }

    /// Metal preset
    pub fn metal(r: f32, g: f32, b: f32, smoothness: f32) -> Self {
        FieldMaterial {
            colour: Vec3::new(r, g, b),
            metallic: 1.0,
            smoothness: smoothness.clamp(0.0, 1.0),
            ..Default::default()
        }
    }

    /// Emissive preset
    pub fn emissive(r: f32, g: f32, b: f32, strength: f32) -> Self {
        FieldMaterial {
            colour: Vec3::new(r, g, b),
            emission: Vec3::new(r, g, b) * strength,
            ..Default::default()
        }
    }

    /// Texture-backed material reading slot `index`
    pub fn textured(index: i32) -> Self {
        FieldMaterial {
            material_type: MaterialType::Texture,
            texture_index: index,
            ..Default::default()
        }
    }

    /// Set emission
    pub fn with_emission(mut self, emission: Vec3) -> Self {
        self.emission = emission;
        self
    }

    /// Set metallic
    pub fn with_metallic(mut self, metallic: f32) -> Self {
        self.metallic = metallic.clamp(0.0, 1.0);
        self
    }

    /// Set smoothness
    pub fn with_smoothness(mut self, smoothness: f32) -> Self {
        self.smoothness = smoothness.clamp(0.0, 1.0);
        self
    }

    /// Set subsurface colour and power
    pub fn with_subsurface(mut self, colour: Vec3, power: f32, thickness: f32) -> Self {
        self.subsurface_colour = colour;
        self.subsurface_power = power;
        self.thickness = thickness;
        self
    }

    /// Set colour blend width
    pub fn with_material_smoothing(mut self, smoothing: f32) -> Self {
        self.material_smoothing = smoothing.max(0.0);
        self
    }

    /// GPU record for this material
    pub fn to_record(&self) -> GpuMaterialRecord {
        GpuMaterialRecord {
            colour: self.colour.to_array(),
            material_type: self.material_type.tag(),
            emission: self.emission.to_array(),
            texture_index: self.texture_index,
            subsurface_colour: self.subsurface_colour.to_array(),
            subsurface_power: self.subsurface_power,
            metallic: self.metallic,
            smoothness: self.smoothness,
            thickness: self.thickness,
            material_smoothing: self.material_smoothing,
        }
    }
}
