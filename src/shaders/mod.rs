//! Embedded WGSL sources
//!
//! `field.wgsl` holds the record structs, the group 0 bindings and the field
//! evaluation shared by every consumer; each consumer shader is appended to it.

/// Field evaluation library on its own
pub const FIELD_WGSL: &str = include_str!("field.wgsl");

/// Isosurface extraction compute stages
pub const ISOSURFACE_WGSL: &str = concat!(include_str!("field.wgsl"), "\n", include_str!("isosurface.wgsl"));

/// Raymarch render pipeline
pub const RAYMARCH_WGSL: &str = concat!(include_str!("field.wgsl"), "\n", include_str!("raymarch.wgsl"));

/// Compute entry points of [`ISOSURFACE_WGSL`], in dispatch order
pub const ISOSURFACE_ENTRY_POINTS: [&str; 7] = [
    "map_grid",
    "generate_vertices",
    "number_vertices",
    "generate_triangles",
    "build_index_buffer",
    "merge_intermediate",
    "finalize",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sources_share_field_library() {
        assert!(ISOSURFACE_WGSL.starts_with(FIELD_WGSL));
        assert!(RAYMARCH_WGSL.starts_with(FIELD_WGSL));
        assert!(FIELD_WGSL.contains("fn map_field"));
    }

    #[test]
    fn test_entry_points_present() {
        for entry in ISOSURFACE_ENTRY_POINTS {
            assert!(ISOSURFACE_WGSL.contains(&format!("fn {entry}(")), "missing {entry}");
        }
        assert!(RAYMARCH_WGSL.contains("fn vs_main("));
        assert!(RAYMARCH_WGSL.contains("fn fs_main("));
    }

    #[test]
    fn test_record_tags_match_rust() {
        use crate::types::{NODE_TYPE_ELONGATE, NODE_TYPE_TEXTURE};
        assert!(FIELD_WGSL.contains(&format!("NODE_TYPE_ELONGATE: i32 = {NODE_TYPE_ELONGATE};")));
        assert!(FIELD_WGSL.contains(&format!("NODE_TYPE_TEXTURE: i32 = {NODE_TYPE_TEXTURE};")));
    }
}
