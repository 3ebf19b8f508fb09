//! Field combination and deformation operators
//!
//! - `smooth`: smooth union / subtract / intersect used by the combination walk
//! - `elongate`: the elongate warp applied by operation nodes

mod elongate;
mod smooth;

pub use elongate::elongate;
pub use smooth::{
    clamp_smoothing, intersect_blend_weight, smooth_intersect, smooth_subtract, smooth_union,
    subtract_blend_weight, union_blend_weight, MIN_SMOOTHING,
};
