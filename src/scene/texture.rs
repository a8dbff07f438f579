//! Host-side images referenced by materials and the environment map.
//!
//! Material maps are stored bottom-up (row 0 is `v = 0`), the way a GL
//! upload of a vertically flipped image would lay them out. Cube map faces
//! keep the file's top-down row order, which is what cube map addressing
//! expects.

use std::path::Path;

use glam::{Vec2, Vec3, Vec4};

use crate::errors::{LumenError, Result};

// ============================================================================
// 2D Texture
// ============================================================================

/// An RGBA float image sampled by material uniforms.
#[derive(Debug, Clone, PartialEq)]
pub struct Texture {
    pub name: String,
    width: u32,
    height: u32,
    texels: Vec<Vec4>,
}

impl Texture {
    /// Wraps already-decoded texels (bottom-up rows).
    pub fn from_texels(
        name: impl Into<String>,
        width: u32,
        height: u32,
        texels: Vec<Vec4>,
    ) -> Result<Self> {
        let expected = (width * height) as usize;
        if texels.len() != expected || expected == 0 {
            return Err(LumenError::TextureMismatch {
                expected,
                actual: texels.len(),
            });
        }
        Ok(Self {
            name: name.into(),
            width,
            height,
            texels,
        })
    }

    /// Converts 8-bit RGBA data in top-down row order.
    pub fn from_rgba8(name: impl Into<String>, width: u32, height: u32, data: &[u8]) -> Result<Self> {
        let expected = (width * height * 4) as usize;
        if data.len() != expected {
            return Err(LumenError::TextureMismatch {
                expected,
                actual: data.len(),
            });
        }
        let mut texels = Vec::with_capacity((width * height) as usize);
        for row in (0..height as usize).rev() {
            let start = row * width as usize * 4;
            for px in data[start..start + width as usize * 4].chunks_exact(4) {
                texels.push(Vec4::new(
                    f32::from(px[0]) / 255.0,
                    f32::from(px[1]) / 255.0,
                    f32::from(px[2]) / 255.0,
                    f32::from(px[3]) / 255.0,
                ));
            }
        }
        Self::from_texels(name, width, height, texels)
    }

    /// A 1×1 texture of a single color.
    #[must_use]
    pub fn solid(name: impl Into<String>, color: Vec4) -> Self {
        Self {
            name: name.into(),
            width: 1,
            height: 1,
            texels: vec![color],
        }
    }

    /// Decodes an image file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let image = image::open(path)?.into_rgba8();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::from_rgba8(name, image.width(), image.height(), image.as_raw())
    }

    #[inline]
    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Texels in storage order, bottom row first.
    #[inline]
    #[must_use]
    pub fn texels(&self) -> &[Vec4] {
        &self.texels
    }

    /// Nearest-neighbor lookup with repeat wrapping.
    #[must_use]
    pub fn sample(&self, uv: Vec2) -> Vec4 {
        let x = wrap_index(uv.x, self.width);
        let y = wrap_index(uv.y, self.height);
        self.texels[y * self.width as usize + x]
    }
}

fn wrap_index(coord: f32, size: u32) -> usize {
    let t = coord - coord.floor();
    ((t * size as f32) as usize).min(size as usize - 1)
}

// ============================================================================
// Cube Map
// ============================================================================

/// Face order: +X, -X, +Y, -Y, +Z, -Z.
#[derive(Debug, Clone, PartialEq)]
pub struct CubeMap {
    faces: [Texture; 6],
}

impl CubeMap {
    /// Builds a cube map from six equally sized faces in +X, -X, +Y, -Y, +Z, -Z
    /// order. Faces are top-down.
    pub fn from_faces(faces: [Texture; 6]) -> Result<Self> {
        let (w, h) = (faces[0].width, faces[0].height);
        if faces.iter().any(|f| f.width != w || f.height != h) {
            return Err(LumenError::CubeMap(
                "all six faces must share one size".to_string(),
            ));
        }
        Ok(Self { faces })
    }

    /// Loads the six faces of a skybox.
    ///
    /// `right`/`left` map to ±X, `top`/`bottom` to ±Y and `back`/`front`
    /// to ±Z.
    pub fn load(
        front: impl AsRef<Path>,
        back: impl AsRef<Path>,
        top: impl AsRef<Path>,
        bottom: impl AsRef<Path>,
        left: impl AsRef<Path>,
        right: impl AsRef<Path>,
    ) -> Result<Self> {
        let face = |path: &Path| -> Result<Texture> {
            let image = image::open(path)?.into_rgba8();
            let texels = image
                .pixels()
                .map(|p| Vec4::from_array(p.0.map(|c| f32::from(c) / 255.0)))
                .collect();
            Texture::from_texels(
                path.to_string_lossy(),
                image.width(),
                image.height(),
                texels,
            )
        };
        Self::from_faces([
            face(right.as_ref())?,
            face(left.as_ref())?,
            face(top.as_ref())?,
            face(bottom.as_ref())?,
            face(back.as_ref())?,
            face(front.as_ref())?,
        ])
    }

    #[must_use]
    pub fn face(&self, index: usize) -> &Texture {
        &self.faces[index]
    }

    /// Samples the face hit by `direction` (nearest).
    #[must_use]
    pub fn sample(&self, direction: Vec3) -> Vec4 {
        let a = direction.abs();
        let (face, sc, tc, ma) = if a.x >= a.y && a.x >= a.z {
            if direction.x >= 0.0 {
                (0, -direction.z, -direction.y, a.x)
            } else {
                (1, direction.z, -direction.y, a.x)
            }
        } else if a.y >= a.z {
            if direction.y >= 0.0 {
                (2, direction.x, direction.z, a.y)
            } else {
                (3, direction.x, -direction.z, a.y)
            }
        } else if direction.z >= 0.0 {
            (4, direction.x, -direction.y, a.z)
        } else {
            (5, -direction.x, -direction.y, a.z)
        };
        if ma <= 0.0 {
            return Vec4::ZERO;
        }
        let tex = &self.faces[face];
        let s = ((sc / ma + 1.0) * 0.5).clamp(0.0, 1.0);
        let t = ((tc / ma + 1.0) * 0.5).clamp(0.0, 1.0);
        let x = ((s * tex.width as f32) as usize).min(tex.width as usize - 1);
        let y = ((t * tex.height as f32) as usize).min(tex.height as usize - 1);
        tex.texels[y * tex.width as usize + x]
    }
}
