//! Segmentation visualization palette.

use glam::{Vec3, Vec4};

pub const PALETTE_SIZE: usize = 60;

#[rustfmt::skip]
const PALETTE: [[f32; 3]; PALETTE_SIZE] = [
    [0.8, 0.4, 0.4],   [0.8, 0.32, 0.32], [0.8, 0.24, 0.24], [0.8, 0.52, 0.4],  [0.8, 0.46, 0.32],
    [0.8, 0.41, 0.24], [0.8, 0.64, 0.4],  [0.8, 0.61, 0.32], [0.8, 0.58, 0.24], [0.8, 0.76, 0.4],
    [0.8, 0.75, 0.32], [0.8, 0.74, 0.24], [0.72, 0.8, 0.4],  [0.7, 0.8, 0.32],  [0.69, 0.8, 0.24],
    [0.6, 0.8, 0.4],   [0.56, 0.8, 0.32], [0.52, 0.8, 0.24], [0.48, 0.8, 0.4],  [0.42, 0.8, 0.32],
    [0.35, 0.8, 0.24], [0.4, 0.8, 0.44],  [0.32, 0.8, 0.37], [0.24, 0.8, 0.3],  [0.4, 0.8, 0.56],
    [0.32, 0.8, 0.51], [0.24, 0.8, 0.46], [0.4, 0.8, 0.68],  [0.32, 0.8, 0.66], [0.24, 0.8, 0.63],
    [0.4, 0.8, 0.8],   [0.32, 0.8, 0.8],  [0.24, 0.8, 0.8],  [0.4, 0.68, 0.8],  [0.32, 0.66, 0.8],
    [0.24, 0.63, 0.8], [0.4, 0.56, 0.8],  [0.32, 0.51, 0.8], [0.24, 0.46, 0.8], [0.4, 0.44, 0.8],
    [0.32, 0.37, 0.8], [0.24, 0.3, 0.8],  [0.48, 0.4, 0.8],  [0.42, 0.32, 0.8], [0.35, 0.24, 0.8],
    [0.6, 0.4, 0.8],   [0.56, 0.32, 0.8], [0.52, 0.24, 0.8], [0.72, 0.4, 0.8],  [0.7, 0.32, 0.8],
    [0.69, 0.24, 0.8], [0.8, 0.4, 0.76],  [0.8, 0.32, 0.75], [0.8, 0.24, 0.74], [0.8, 0.4, 0.64],
    [0.8, 0.32, 0.61], [0.8, 0.24, 0.58], [0.8, 0.4, 0.52],  [0.8, 0.32, 0.46], [0.8, 0.24, 0.41],
];

/// Palette color for a segment id, wrapping every [`PALETTE_SIZE`] ids.
#[inline]
#[must_use]
pub fn segment_color(segment_id: u32) -> Vec3 {
    Vec3::from_array(PALETTE[segment_id as usize % PALETTE_SIZE])
}

/// [`segment_color`] with alpha one, as written to the GBuffer.
#[inline]
#[must_use]
pub fn segment_color_rgba(segment_id: u32) -> Vec4 {
    segment_color(segment_id).extend(1.0)
}
