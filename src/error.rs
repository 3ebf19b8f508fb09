//! Error types for field construction, GPU setup and I/O

use thiserror::Error;

/// Errors raised by fallible isofield operations
///
/// Per-tick paths do not return these: a missing asset is skipped and a
/// failed readback is logged, keeping the previous mesh.
#[derive(Error, Debug)]
pub enum FieldError {
    /// No compatible GPU adapter was found
    #[error("Failed to create GPU adapter")]
    NoAdapter,

    /// Device request failed
    #[error("Failed to create GPU device: {0}")]
    DeviceCreation(String),

    /// WGSL module or pipeline creation failed
    #[error("Shader compilation error: {0}")]
    ShaderCompilation(String),

    /// Mapping a staging buffer for readback failed
    #[error("Buffer mapping error: {0}")]
    BufferMapping(String),

    /// Mesh asset data is inconsistent with its declared grid
    #[error("Invalid mesh asset '{name}': {reason}")]
    InvalidAsset {
        /// Asset name
        name: String,
        /// What is wrong with it
        reason: String,
    },

    /// Settings rejected by validation
    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    /// A chunk already occupies the coordinate
    #[error("Chunk grid already contains a chunk at {0}")]
    ChunkOccupied(glam::IVec3),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialisation error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, FieldError>;
