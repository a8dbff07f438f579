//! Texel storage for the software device.
//!
//! Rows are stored bottom-up: texel `(x, y)` with `y = 0` is the first row,
//! matching GL window coordinates.

use glam::{IVec4, Vec2, Vec4};
use half::f16;

use crate::renderer::core::{TextureDescriptor, TextureFormat, WrapMode};

#[derive(Debug, Clone, Default)]
pub(crate) enum Texels {
    /// Taken out while the texture is a draw target.
    #[default]
    Detached,
    Half(Vec<f16>),
    Float(Vec<f32>),
    Int(Vec<i32>),
}

#[derive(Debug, Clone)]
pub(crate) struct TextureStorage {
    pub desc: TextureDescriptor,
    pub texels: Texels,
}

impl TextureStorage {
    pub fn new(desc: TextureDescriptor) -> Self {
        let len = desc.texel_count() * desc.format.channels();
        let texels = match desc.format {
            TextureFormat::Rgba16Float => Texels::Half(vec![f16::ZERO; len]),
            TextureFormat::Rgba32Float | TextureFormat::R32Float => Texels::Float(vec![0.0; len]),
            TextureFormat::Depth32Float => Texels::Float(vec![1.0; len]),
            TextureFormat::R32Sint => Texels::Int(vec![0; len]),
        };
        Self { desc, texels }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.desc.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.desc.height
    }

    #[inline]
    fn index(&self, x: u32, y: u32) -> usize {
        (y as usize * self.desc.width as usize + x as usize) * self.desc.format.channels()
    }

    /// Float view of a texel. Single-channel formats return `(r, 0, 0, 1)`;
    /// integer texels are converted.
    pub fn fetch(&self, x: u32, y: u32) -> Vec4 {
        let i = self.index(x, y);
        match &self.texels {
            Texels::Detached => Vec4::ZERO,
            Texels::Half(v) => Vec4::new(
                v[i].to_f32(),
                v[i + 1].to_f32(),
                v[i + 2].to_f32(),
                v[i + 3].to_f32(),
            ),
            Texels::Float(v) if self.desc.format.channels() == 4 => {
                Vec4::new(v[i], v[i + 1], v[i + 2], v[i + 3])
            }
            Texels::Float(v) => Vec4::new(v[i], 0.0, 0.0, 1.0),
            Texels::Int(v) => Vec4::new(v[i] as f32, 0.0, 0.0, 1.0),
        }
    }

    pub fn fetch_int(&self, x: u32, y: u32) -> i32 {
        let i = self.index(x, y);
        match &self.texels {
            Texels::Int(v) => v[i],
            _ => self.fetch(x, y).x as i32,
        }
    }

    /// Nearest-texel sample at normalized coordinates.
    pub fn sample(&self, uv: Vec2) -> Vec4 {
        let (w, h) = (self.desc.width, self.desc.height);
        if w == 0 || h == 0 {
            return Vec4::ZERO;
        }
        let wrap = |t: f32, n: u32| -> u32 {
            let texel = (t * n as f32).floor() as i64;
            match self.desc.wrap {
                WrapMode::ClampToEdge => texel.clamp(0, i64::from(n) - 1) as u32,
                WrapMode::Repeat => texel.rem_euclid(i64::from(n)) as u32,
            }
        };
        self.fetch(wrap(uv.x, w), wrap(uv.y, h))
    }

    pub fn store(&mut self, x: u32, y: u32, value: Vec4) {
        let i = self.index(x, y);
        let channels = self.desc.format.channels();
        match &mut self.texels {
            Texels::Detached | Texels::Int(_) => {}
            Texels::Half(v) => {
                for (c, f) in value.to_array().into_iter().enumerate() {
                    v[i + c] = f16::from_f32(f);
                }
            }
            Texels::Float(v) if channels == 4 => v[i..i + 4].copy_from_slice(&value.to_array()),
            Texels::Float(v) => v[i] = value.x,
        }
    }

    pub fn store_int(&mut self, x: u32, y: u32, value: IVec4) {
        let i = self.index(x, y);
        if let Texels::Int(v) = &mut self.texels {
            v[i] = value.x;
        }
    }

    pub fn clear(&mut self, color: Vec4) {
        let channels = self.desc.format.channels();
        let depth = self.desc.format.is_depth();
        match &mut self.texels {
            Texels::Detached => {}
            Texels::Half(v) => {
                let c = color.to_array().map(f16::from_f32);
                for texel in v.chunks_exact_mut(4) {
                    texel.copy_from_slice(&c);
                }
            }
            Texels::Float(v) if depth => v.fill(1.0),
            Texels::Float(v) if channels == 4 => {
                let c = color.to_array();
                for texel in v.chunks_exact_mut(4) {
                    texel.copy_from_slice(&c);
                }
            }
            Texels::Float(v) => v.fill(color.x),
            Texels::Int(v) => v.fill(0),
        }
    }

    pub fn write_f32(&mut self, data: &[f32]) {
        match &mut self.texels {
            Texels::Half(v) => {
                for (dst, src) in v.iter_mut().zip(data) {
                    *dst = f16::from_f32(*src);
                }
            }
            Texels::Float(v) => v.copy_from_slice(data),
            Texels::Int(v) => {
                for (dst, src) in v.iter_mut().zip(data) {
                    *dst = *src as i32;
                }
            }
            Texels::Detached => {}
        }
    }

    pub fn read_f32(&self) -> Vec<f32> {
        match &self.texels {
            Texels::Detached => Vec::new(),
            Texels::Half(v) => v.iter().map(|h| h.to_f32()).collect(),
            Texels::Float(v) => v.clone(),
            Texels::Int(v) => v.iter().map(|&i| i as f32).collect(),
        }
    }

    pub fn read_i32(&self) -> Vec<i32> {
        match &self.texels {
            Texels::Int(v) => v.clone(),
            other => {
                let floats = match other {
                    Texels::Half(v) => v.iter().map(|h| h.to_f32()).collect(),
                    Texels::Float(v) => v.clone(),
                    _ => Vec::new(),
                };
                floats.into_iter().map(|f| f as i32).collect()
            }
        }
    }
}

/// A draw target detached from the texture table for the duration of a draw.
#[derive(Debug)]
pub(crate) struct Surface {
    pub storage: TextureStorage,
}

impl Surface {
    #[inline]
    pub fn is_integer(&self) -> bool {
        self.storage.desc.format.is_integer()
    }

    /// Reads the stored depth at `(x, y)`.
    #[inline]
    pub fn depth(&self, x: u32, y: u32) -> f32 {
        self.storage.fetch(x, y).x
    }
}

pub(crate) type TextureTable = slotmap::SlotMap<crate::renderer::core::TextureId, TextureStorage>;
