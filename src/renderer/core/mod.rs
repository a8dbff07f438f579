//! Graphics device abstraction
//!
//! Everything the pipeline needs from a GPU goes through [`GraphicsDevice`]:
//! - Textures and framebuffers, addressed by slotmap handles
//! - Programs compiled from a vertex/fragment source pair
//! - Name-addressed uniforms, where writes to undeclared names are no-ops
//! - Fixed-function raster state, clears, mesh draws and blits
//! - Synchronous readback
//!
//! The trait is object safe; the renderer owns a `Box<dyn GraphicsDevice>`.
//! [`gpu::WgpuDevice`] renders offscreen through wgpu. [`software::SoftwareDevice`]
//! evaluates the same programs on the CPU and backs the test suite.
//!
//! Programs are WGSL. Vertex modules bind at `@group(0)`, fragment modules
//! at `@group(1)`; see [`reflect`] for how uniform names are resolved.

pub mod gpu;
pub(crate) mod reflect;
pub mod software;

use std::sync::Arc;

use bitflags::bitflags;
use glam::{Mat4, Vec3, Vec4};
use slotmap::new_key_type;

use crate::errors::Result;
use crate::scene::mesh::Mesh;
use crate::scene::texture::{CubeMap, Texture};

pub use gpu::WgpuDevice;
pub use software::SoftwareDevice;

new_key_type! {
    pub struct TextureId;
    pub struct FramebufferId;
    pub struct ProgramId;
}

// ============================================================================
// Textures
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Rgba16Float,
    Rgba32Float,
    R32Float,
    R32Sint,
    Depth32Float,
}

impl TextureFormat {
    #[inline]
    #[must_use]
    pub fn channels(self) -> usize {
        match self {
            Self::Rgba16Float | Self::Rgba32Float => 4,
            Self::R32Float | Self::R32Sint | Self::Depth32Float => 1,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_depth(self) -> bool {
        matches!(self, Self::Depth32Float)
    }

    #[inline]
    #[must_use]
    pub fn is_integer(self) -> bool {
        matches!(self, Self::R32Sint)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WrapMode {
    #[default]
    ClampToEdge,
    Repeat,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureDescriptor {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub wrap: WrapMode,
}

impl TextureDescriptor {
    #[must_use]
    pub fn new(label: impl Into<String>, width: u32, height: u32, format: TextureFormat) -> Self {
        Self {
            label: label.into(),
            width,
            height,
            format,
            wrap: WrapMode::ClampToEdge,
        }
    }

    #[must_use]
    pub fn with_wrap(mut self, wrap: WrapMode) -> Self {
        self.wrap = wrap;
        self
    }

    #[inline]
    #[must_use]
    pub fn texel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

// ============================================================================
// Raster State
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendMode {
    /// `SRC_ALPHA, ONE_MINUS_SRC_ALPHA`
    Alpha,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RasterState {
    /// Less-than depth test against the bound depth attachment.
    pub depth_test: bool,
    pub depth_write: bool,
    pub blend: Option<BlendMode>,
    pub cull_back: bool,
}

impl RasterState {
    /// Depth test and write, no blending.
    pub const OPAQUE: Self = Self {
        depth_test: true,
        depth_write: true,
        blend: None,
        cull_back: false,
    };

    /// Depth test without write, alpha blended.
    pub const TRANSPARENT: Self = Self {
        depth_test: true,
        depth_write: false,
        blend: Some(BlendMode::Alpha),
        cull_back: false,
    };

    /// No depth at all, used by fullscreen passes.
    pub const SCREEN: Self = Self {
        depth_test: false,
        depth_write: false,
        blend: None,
        cull_back: false,
    };
}

impl Default for RasterState {
    fn default() -> Self {
        Self::SCREEN
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ClearFlags: u8 {
        const COLOR = 1 << 0;
        const DEPTH = 1 << 1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Viewport {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
        }
    }
}

// ============================================================================
// Uniforms
// ============================================================================

#[derive(Debug, Clone)]
pub enum UniformValue {
    Int(i32),
    Bool(bool),
    Float(f32),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat4(Mat4),
    /// A device texture.
    Sampler(TextureId),
    /// A host-side material image.
    Image(Arc<Texture>),
    CubeMap(Arc<CubeMap>),
}

impl From<i32> for UniformValue {
    fn from(v: i32) -> Self {
        Self::Int(v)
    }
}

impl From<bool> for UniformValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<f32> for UniformValue {
    fn from(v: f32) -> Self {
        Self::Float(v)
    }
}

impl From<Vec3> for UniformValue {
    fn from(v: Vec3) -> Self {
        Self::Vec3(v)
    }
}

impl From<Vec4> for UniformValue {
    fn from(v: Vec4) -> Self {
        Self::Vec4(v)
    }
}

impl From<Mat4> for UniformValue {
    fn from(v: Mat4) -> Self {
        Self::Mat4(v)
    }
}

impl From<TextureId> for UniformValue {
    fn from(v: TextureId) -> Self {
        Self::Sampler(v)
    }
}

// ============================================================================
// Device
// ============================================================================

/// Live object counts, for leak checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceStats {
    pub textures: usize,
    pub framebuffers: usize,
    pub programs: usize,
}

/// Immediate-mode graphics context.
///
/// Calls act on bound state the way a GL context does: `bind_framebuffer`,
/// `set_viewport`, `set_raster_state` and `use_program` stay in effect
/// until changed. Invalid handles are ignored with a warning.
pub trait GraphicsDevice {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    // === Textures ===
    fn create_texture(&mut self, desc: &TextureDescriptor) -> TextureId;
    /// Uploads single-precision texel data, `channels()` floats per texel.
    fn write_texture(&mut self, texture: TextureId, data: &[f32]) -> Result<()>;
    fn destroy_texture(&mut self, texture: TextureId);
    fn texture_descriptor(&self, texture: TextureId) -> Option<TextureDescriptor>;

    // === Framebuffers ===
    fn create_framebuffer(&mut self, label: &str) -> FramebufferId;
    fn destroy_framebuffer(&mut self, framebuffer: FramebufferId);
    /// Replaces the color attachment list; location `i` writes `textures[i]`.
    fn set_color_attachments(&mut self, framebuffer: FramebufferId, textures: &[TextureId]);
    fn set_depth_attachment(&mut self, framebuffer: FramebufferId, texture: Option<TextureId>);

    // === State ===
    /// `None` binds the default framebuffer.
    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>);
    fn bound_framebuffer(&self) -> Option<FramebufferId>;
    fn set_viewport(&mut self, viewport: Viewport);
    fn set_raster_state(&mut self, state: RasterState);
    /// Clears the bound framebuffer. Float color attachments take `color`,
    /// integer ones take zero, depth takes one.
    fn clear(&mut self, flags: ClearFlags, color: Vec4);

    // === Programs ===
    fn compile_program(&mut self, label: &str, vertex: &str, fragment: &str) -> Result<ProgramId>;
    fn delete_program(&mut self, program: ProgramId);
    fn use_program(&mut self, program: Option<ProgramId>);
    /// Sets a uniform on the current program. Returns `false` when the
    /// program declares no such uniform; nothing is written then.
    fn set_uniform(&mut self, name: &str, value: UniformValue) -> bool;

    // === Drawing ===
    fn draw_mesh(&mut self, mesh: &Mesh);
    /// Copies color attachment 0 of `source` into `target` (or the default
    /// framebuffer), scaling to `width × height`.
    fn blit(&mut self, source: FramebufferId, target: Option<FramebufferId>, width: u32, height: u32);

    // === Readback ===
    /// Texel data in storage order, `channels()` floats per texel.
    fn read_texture_f32(&self, texture: TextureId) -> Result<Vec<f32>>;
    fn read_texture_i32(&self, texture: TextureId) -> Result<Vec<i32>>;
    /// Reads one texel of a color attachment. `None` when out of range.
    fn read_pixel_i32(&self, framebuffer: FramebufferId, attachment: usize, x: u32, y: u32) -> Option<i32>;
    /// RGBA contents of the default framebuffer, with its size.
    fn read_default_framebuffer(&self) -> (u32, u32, Vec<f32>);

    fn stats(&self) -> DeviceStats;
}
