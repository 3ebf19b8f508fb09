//! # isofield
//!
//! Signed distance fields assembled from ordered nodes, queried on the CPU
//! and turned into meshes on the GPU.
//!
//! ## Features
//!
//! - **Nodes**: analytic primitives, voxelised mesh assets, elongate
//!   operations and texture placeholders, each with a combine policy,
//!   smoothing, flip and material
//! - **Groups**: per-tick dirty tracking, record flattening and buffer
//!   publishing to any number of consumers
//! - **Shared mesh store**: reference-counted mesh samples packed once for
//!   every group
//! - **Mapper**: CPU distance, colour, gradient, raymarch and overlap queries
//!   that match the GPU evaluation
//! - **Isosurface extraction**: surface nets or dual contouring in wgpu
//!   compute, with a CPU reference path and aligned chunk grids
//! - **Raymarching**: direct field rendering through a cube proxy
//! - **File I/O**: OBJ export and JSON scenes
//!
//! ## Example
//!
//! ```rust
//! use isofield::prelude::*;
//! use std::sync::{Arc, Mutex};
//!
//! let store = FieldStore::new();
//! let mut group = store.create_group(GroupSettings::default());
//!
//! let mut settings = ExtractorSettings::default();
//! settings.voxel.samples_per_side = 16;
//! settings.voxel.cell_size = 0.2;
//! let extractor = Arc::new(Mutex::new(IsosurfaceExtractor::new(settings, MeshSlot::default())));
//! group.add_consumer(extractor.clone());
//!
//! let sphere = NodeHandle::new(FieldNode::sphere(1.0));
//! let hole = NodeHandle::new(FieldNode::cuboid(0.4, 0.4, 2.0).subtract().with_smoothing(0.1));
//! group.register(&sphere);
//! group.register(&hole);
//! group.per_tick_update();
//!
//! let mapper = group.mapper();
//! assert!(mapper.distance(glam::Vec3::ZERO) > 0.0);
//! assert!(extractor.lock().unwrap().sink().mesh().is_some());
//! ```

#![warn(missing_docs)]

pub mod asset;
pub mod error;
pub mod extract;
pub mod gpu;
pub mod group;
pub mod io;
pub mod mapper;
pub mod material;
pub mod operations;
pub mod primitives;
pub mod render;
pub mod shaders;
pub mod store;
pub mod types;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude - commonly used types
pub mod prelude {
    pub use crate::asset::{MeshAsset, MeshAssetId};
    pub use crate::error::{FieldError, Result};
    pub use crate::extract::{
        AlgorithmSettings, ChunkGrid, EdgeIntersection, ExtractedMesh, ExtractionCounts, ExtractionType,
        ExtractorSettings, IsosurfaceExtractor, MainSettings, MeshSink, MeshSlot, OutputMode, VoxelSettings,
    };
    pub use crate::gpu::GpuContext;
    pub use crate::group::{ConsumerHandle, FieldConsumer, FieldFrame, Group, GroupSettings};
    pub use crate::io::{export_obj, ObjConfig, SceneDescription};
    pub use crate::mapper::{FieldHit, Mapper, MapperConfig, MapperSnapshot};
    pub use crate::material::{FieldMaterial, MaterialType};
    pub use crate::render::{FieldRaymarcher, RaymarchCamera, RaymarchVisuals};
    pub use crate::store::{FieldStore, MeshSampleStore};
    pub use crate::types::{CombineType, FieldNode, MeshReference, NodeHandle, PrimitiveShape};
}
