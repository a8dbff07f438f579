use std::sync::Arc;

use glam::Vec4;

use super::texture::Texture;

/// Physically based material parameters shared between objects.
///
/// `kd` is the diffuse color including alpha; `ks` is the specular
/// reflectance scalar. A material without a diffuse map whose alpha is
/// below one makes its objects transparent.
#[derive(Debug, Clone)]
pub struct PbrMaterial {
    pub name: String,
    pub kd: Vec4,
    pub ks: f32,
    pub roughness: f32,
    pub metallic: f32,
    pub kd_map: Option<Arc<Texture>>,
    pub ks_map: Option<Arc<Texture>>,
    pub height_map: Option<Arc<Texture>>,
    pub normal_map: Option<Arc<Texture>>,
    /// Routes objects through the forward transparency pass regardless of alpha.
    pub force_transparency: bool,
}

impl PbrMaterial {
    #[must_use]
    pub fn new() -> Self {
        Self {
            name: String::new(),
            kd: Vec4::new(0.0, 0.0, 0.0, 1.0),
            ks: 0.0,
            roughness: 0.85,
            metallic: 0.0,
            kd_map: None,
            ks_map: None,
            height_map: None,
            normal_map: None,
            force_transparency: false,
        }
    }

    /// A named material with the given diffuse color.
    #[must_use]
    pub fn with_diffuse(name: impl Into<String>, kd: Vec4) -> Self {
        Self {
            name: name.into(),
            kd,
            ..Self::new()
        }
    }

    #[inline]
    #[must_use]
    pub fn has_kd_map(&self) -> bool {
        self.kd_map.is_some()
    }
}

impl Default for PbrMaterial {
    fn default() -> Self {
        Self::new()
    }
}
