//! Smooth combination operators for field nodes
//!
//! Polynomial smooth-min family used to fold each node's local distance into
//! the running field distance. The GPU map pass implements the same formulas
//! in `shaders/field.wgsl`.
//!
//! # Operand order
//! - `smooth_union(a, b, k)` is symmetric.
//! - `smooth_subtract(d1, d2, k)` carves `d1` out of `d2`.
//! - `smooth_intersect(d1, d2, k)` keeps the overlap of `d1` and `d2`.
//!
//! Subtract and intersect are not commutative; callers pass the node distance
//! first and the running distance second.

/// Smallest smoothing factor accepted by the smooth operators.
///
/// Applied when node records are built and again inside every operator so a
/// zero `k` never reaches a division.
pub const MIN_SMOOTHING: f32 = 0.00001;

/// Clamp a smoothing factor to the strict positive minimum.
#[inline(always)]
pub fn clamp_smoothing(k: f32) -> f32 {
    k.max(MIN_SMOOTHING)
}

#[inline(always)]
fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Polynomial smooth union.
///
/// `min(a, b) - h²k/4` with `h = max(k - |a - b|, 0) / k`. Never goes below
/// `min(a, b) - k/4`.
#[inline(always)]
pub fn smooth_union(a: f32, b: f32, k: f32) -> f32 {
    let k = clamp_smoothing(k);
    let h = (k - (a - b).abs()).max(0.0) / k;
    a.min(b) - h * h * k * 0.25
}

/// Smooth subtraction of `d1` from `d2`.
#[inline(always)]
pub fn smooth_subtract(d1: f32, d2: f32, k: f32) -> f32 {
    let k = clamp_smoothing(k);
    let h = (0.5 - 0.5 * (d2 + d1) / k).clamp(0.0, 1.0);
    lerp(d2, -d1, h) + k * h * (1.0 - h)
}

/// Smooth intersection of `d1` and `d2`.
#[inline(always)]
pub fn smooth_intersect(d1: f32, d2: f32, k: f32) -> f32 {
    let k = clamp_smoothing(k);
    let h = (0.5 - 0.5 * (d2 - d1) / k).clamp(0.0, 1.0);
    lerp(d2, d1, h) + k * h * (1.0 - h)
}

/// Blend weight of the incoming node for a smooth union.
///
/// Matches the `h` used by IQ's material-blending smooth min: 0 keeps the
/// running value, 1 takes the node.
#[inline(always)]
pub fn union_blend_weight(running: f32, node: f32, k: f32) -> f32 {
    let k = clamp_smoothing(k);
    (0.5 + 0.5 * (running - node) / k).clamp(0.0, 1.0)
}

/// Blend weight of the incoming node for a smooth subtraction.
#[inline(always)]
pub fn subtract_blend_weight(running: f32, node: f32, k: f32) -> f32 {
    let k = clamp_smoothing(k);
    (0.5 - 0.5 * (running + node) / k).clamp(0.0, 1.0)
}

/// Blend weight of the incoming node for a smooth intersection.
#[inline(always)]
pub fn intersect_blend_weight(running: f32, node: f32, k: f32) -> f32 {
    let k = clamp_smoothing(k);
    (0.5 - 0.5 * (running - node) / k).clamp(0.0, 1.0)
}
