use serde::{Deserialize, Serialize};

use crate::error::{FieldError, Result};
use crate::mapper::MapperConfig;
use crate::types::GpuSettingsRecord;

/// Default epsilon of the normal estimate
pub const DEFAULT_NORMAL_SMOOTHING: f32 = 0.015;

/// Per-group field settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupSettings {
    /// Epsilon used for normals, on the GPU and in the Mapper
    pub normal_smoothing: f32,
    /// Maximum probe distance of the thickness estimate
    pub thickness_max_distance: f32,
    /// Falloff of the thickness estimate
    pub thickness_falloff: f32,
    /// Mapper query configuration
    pub mapper: MapperConfig,
}

impl Default for GroupSettings {
    fn default() -> Self {
        GroupSettings {
            normal_smoothing: DEFAULT_NORMAL_SMOOTHING,
            thickness_max_distance: 0.0,
            thickness_falloff: 0.0,
            mapper: MapperConfig::default(),
        }
    }
}

impl GroupSettings {
    /// Reject negative or non-finite values
    pub fn validate(&self) -> Result<()> {
        let values = [
            ("normal_smoothing", self.normal_smoothing),
            ("thickness_max_distance", self.thickness_max_distance),
            ("thickness_falloff", self.thickness_falloff),
        ];
        for (name, value) in values {
            if !value.is_finite() || value < 0.0 {
                return Err(FieldError::InvalidSettings(format!("{name} must be finite and >= 0, got {value}")));
            }
        }
        Ok(())
    }

    /// GPU settings record
    pub fn to_record(&self) -> GpuSettingsRecord {
        GpuSettingsRecord {
            normal_smoothing: self.normal_smoothing,
            thickness_max_distance: self.thickness_max_distance,
            thickness_falloff: self.thickness_falloff,
            _pad: 0.0,
        }
    }
}
