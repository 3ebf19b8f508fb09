//! Direct field rendering
//!
//! # Features
//! - **FieldRaymarcher**: group consumer sphere-tracing the field on the GPU
//!   from a bounding cube proxy, sharing the field bind group layout with the
//!   isosurface extractor

mod raymarcher;

pub use raymarcher::{
    cube_vertices, FieldRaymarcher, GpuRaymarchParams, RaymarchCamera, RaymarchVisuals, CUBE_INDICES,
};
