//! File I/O
//!
//! # Features
//! - **OBJ export**: extracted meshes with normals and vertex colours
//! - **Scene JSON**: nodes, embedded mesh assets and every settings block,
//!   streamed through `serde_json::to_writer`/`from_reader`

pub mod obj;
pub mod scene;

pub use obj::{export_obj, write_obj, ObjConfig};
pub use scene::{MeshAssetDescription, NodeDescription, NodeKindDescription, SceneDescription};
