//! Light sources recorded by a [`Scene`](super::Scene).
//!
//! Lights are plain data. The lighting and transparency passes upload every
//! point and directional light with its index baked into the uniform name
//! (`pointLights[2].position`). Directional light 0 doubles as the shadow
//! casting light.

use glam::Vec3;

/// An omnidirectional light at a world position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointLight {
    pub position: Vec3,
    pub emission: Vec3,
}

impl PointLight {
    #[must_use]
    pub fn new(position: Vec3, emission: Vec3) -> Self {
        Self { position, emission }
    }
}

/// A light infinitely far away, shining along `direction` (world space).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalLight {
    pub direction: Vec3,
    pub emission: Vec3,
}

impl DirectionalLight {
    #[must_use]
    pub fn new(direction: Vec3, emission: Vec3) -> Self {
        Self {
            direction,
            emission,
        }
    }
}

/// A one-sided area light spanned by `v1` and `v2` from `corner`.
///
/// Only stored by the scene; the rasterized pipeline does not shade with it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParallelogramLight {
    pub corner: Vec3,
    pub v1: Vec3,
    pub v2: Vec3,
    pub normal: Vec3,
    pub emission: Vec3,
}

impl ParallelogramLight {
    /// Creates an area light; the normal is `normalize(v1 × v2)`.
    #[must_use]
    pub fn new(corner: Vec3, v1: Vec3, v2: Vec3, emission: Vec3) -> Self {
        Self {
            corner,
            v1,
            v2,
            normal: v1.cross(v2).normalize_or_zero(),
            emission,
        }
    }

    /// Surface area of the parallelogram.
    #[inline]
    #[must_use]
    pub fn area(&self) -> f32 {
        self.v1.cross(self.v2).length()
    }
}
