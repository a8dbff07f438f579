//! CPU implementation of [`GraphicsDevice`].
//!
//! Deterministic and headless: every call executes immediately on the
//! calling thread. Programs run one of the built-in kernels (see
//! [`kernels`]); everything else (attachments, depth/blend state, clears,
//! blits, readback) behaves like the GL subset the pipeline uses.

mod kernels;
mod program;
mod raster;
mod storage;

use glam::Vec4;
use slotmap::SlotMap;
use smallvec::SmallVec;

use self::kernels::Kernel;
use self::program::{Program, VertexStage};
use self::raster::{DrawTarget, MAX_COLOR_ATTACHMENTS, VertexTransform};
use self::storage::{Surface, TextureStorage, TextureTable};
use super::{
    ClearFlags, DeviceStats, FramebufferId, GraphicsDevice, ProgramId, RasterState, TextureDescriptor, TextureFormat,
    TextureId, UniformValue, Viewport,
};
use crate::errors::{LumenError, Result};
use crate::scene::mesh::Mesh;

#[derive(Debug, Default)]
struct Framebuffer {
    label: String,
    colors: SmallVec<[TextureId; MAX_COLOR_ATTACHMENTS]>,
    depth: Option<TextureId>,
}

/// Headless software rasterizer.
pub struct SoftwareDevice {
    textures: TextureTable,
    framebuffers: SlotMap<FramebufferId, Framebuffer>,
    programs: SlotMap<ProgramId, Program>,

    bound: Option<FramebufferId>,
    viewport: Viewport,
    raster: RasterState,
    current_program: Option<ProgramId>,

    /// Backing store of the default framebuffer, resized by blits into it.
    default_surface: TextureStorage,
}

impl Default for SoftwareDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl SoftwareDevice {
    #[must_use]
    pub fn new() -> Self {
        Self {
            textures: SlotMap::with_key(),
            framebuffers: SlotMap::with_key(),
            programs: SlotMap::with_key(),
            bound: None,
            viewport: Viewport::default(),
            raster: RasterState::default(),
            current_program: None,
            default_surface: Self::default_storage(0, 0),
        }
    }

    fn default_storage(width: u32, height: u32) -> TextureStorage {
        TextureStorage::new(TextureDescriptor::new(
            "default framebuffer",
            width,
            height,
            TextureFormat::Rgba32Float,
        ))
    }

    /// Size of the default framebuffer.
    #[must_use]
    pub fn default_framebuffer_size(&self) -> (u32, u32) {
        (self.default_surface.width(), self.default_surface.height())
    }

    fn detach(&mut self, id: TextureId) -> Option<Surface> {
        let texture = self.textures.get_mut(id)?;
        Some(Surface {
            storage: TextureStorage {
                desc: texture.desc.clone(),
                texels: std::mem::take(&mut texture.texels),
            },
        })
    }

    fn reattach(&mut self, id: TextureId, surface: Surface) {
        if let Some(texture) = self.textures.get_mut(id)
            && matches!(texture.texels, storage::Texels::Detached)
        {
            texture.texels = surface.storage.texels;
        }
    }

    /// Color attachment 0 of `framebuffer`, or the default surface.
    fn color0(&self, framebuffer: Option<FramebufferId>) -> Option<&TextureStorage> {
        match framebuffer {
            None => Some(&self.default_surface),
            Some(f) => {
                let id = *self.framebuffers.get(f)?.colors.first()?;
                self.textures.get(id)
            }
        }
    }
}

fn vertex_transform(program: &Program) -> VertexTransform {
    match program.kernel.vertex_stage() {
        VertexStage::Camera => {
            let model = program.mat4("gbufferModelMatrix");
            let view = program.mat4("gbufferViewMatrix");
            let proj = program.mat4("gbufferProjectionMatrix");
            VertexTransform::Object {
                clip_from_object: proj * view * model,
                view_from_object: view * model,
            }
        }
        VertexStage::LightSpace => {
            let model = program.mat4("gbufferModelMatrix");
            VertexTransform::Object {
                clip_from_object: program.mat4("lightSpaceMatrix") * model,
                view_from_object: model,
            }
        }
        VertexStage::Fullscreen => VertexTransform::Fullscreen,
    }
}

impl GraphicsDevice for SoftwareDevice {
    fn name(&self) -> &str {
        "software"
    }

    // ========================================================================
    // Textures
    // ========================================================================

    fn create_texture(&mut self, desc: &TextureDescriptor) -> TextureId {
        log::trace!("create texture '{}' {}x{} {:?}", desc.label, desc.width, desc.height, desc.format);
        self.textures.insert(TextureStorage::new(desc.clone()))
    }

    fn write_texture(&mut self, texture: TextureId, data: &[f32]) -> Result<()> {
        let storage = self
            .textures
            .get_mut(texture)
            .ok_or(LumenError::InvalidHandle("texture"))?;
        let expected = storage.desc.texel_count() * storage.desc.format.channels();
        if data.len() != expected {
            return Err(LumenError::TextureMismatch {
                expected,
                actual: data.len(),
            });
        }
        storage.write_f32(data);
        Ok(())
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        if self.textures.remove(texture).is_none() {
            log::warn!("SoftwareDevice: destroy of unknown texture ignored");
        }
    }

    fn texture_descriptor(&self, texture: TextureId) -> Option<TextureDescriptor> {
        self.textures.get(texture).map(|t| t.desc.clone())
    }

    // ========================================================================
    // Framebuffers
    // ========================================================================

    fn create_framebuffer(&mut self, label: &str) -> FramebufferId {
        self.framebuffers.insert(Framebuffer {
            label: label.to_string(),
            ..Framebuffer::default()
        })
    }

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferId) {
        if self.bound == Some(framebuffer) {
            self.bound = None;
        }
        self.framebuffers.remove(framebuffer);
    }

    fn set_color_attachments(&mut self, framebuffer: FramebufferId, textures: &[TextureId]) {
        let Some(fbo) = self.framebuffers.get_mut(framebuffer) else {
            log::warn!("SoftwareDevice: color attachments on unknown framebuffer ignored");
            return;
        };
        if textures.len() > MAX_COLOR_ATTACHMENTS {
            log::warn!(
                "SoftwareDevice: '{}' has {} color attachments, keeping {MAX_COLOR_ATTACHMENTS}",
                fbo.label,
                textures.len()
            );
        }
        fbo.colors = textures.iter().take(MAX_COLOR_ATTACHMENTS).copied().collect();
    }

    fn set_depth_attachment(&mut self, framebuffer: FramebufferId, texture: Option<TextureId>) {
        if let Some(fbo) = self.framebuffers.get_mut(framebuffer) {
            fbo.depth = texture;
        }
    }

    // ========================================================================
    // State
    // ========================================================================

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>) {
        self.bound = framebuffer.filter(|f| self.framebuffers.contains_key(*f));
    }

    fn bound_framebuffer(&self) -> Option<FramebufferId> {
        self.bound
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    fn set_raster_state(&mut self, state: RasterState) {
        self.raster = state;
    }

    fn clear(&mut self, flags: ClearFlags, color: Vec4) {
        let Some(f) = self.bound else {
            if flags.contains(ClearFlags::COLOR) {
                self.default_surface.clear(color);
            }
            return;
        };
        let Some(fbo) = self.framebuffers.get(f) else {
            return;
        };
        if flags.contains(ClearFlags::COLOR) {
            for id in &fbo.colors {
                if let Some(t) = self.textures.get_mut(*id) {
                    t.clear(color);
                }
            }
        }
        if flags.contains(ClearFlags::DEPTH)
            && let Some(t) = fbo.depth.and_then(|id| self.textures.get_mut(id))
        {
            t.clear(Vec4::ONE);
        }
    }

    // ========================================================================
    // Programs
    // ========================================================================

    fn compile_program(&mut self, label: &str, vertex: &str, fragment: &str) -> Result<ProgramId> {
        let program = Program::compile(label, vertex, fragment)?;
        log::debug!("compiled program '{label}' ({:?} kernel)", program.kernel);
        Ok(self.programs.insert(program))
    }

    fn delete_program(&mut self, program: ProgramId) {
        if self.current_program == Some(program) {
            self.current_program = None;
        }
        self.programs.remove(program);
    }

    fn use_program(&mut self, program: Option<ProgramId>) {
        self.current_program = program.filter(|p| self.programs.contains_key(*p));
    }

    fn set_uniform(&mut self, name: &str, value: UniformValue) -> bool {
        self.current_program
            .and_then(|p| self.programs.get_mut(p))
            .is_some_and(|p| p.set(name, value))
    }

    // ========================================================================
    // Drawing
    // ========================================================================

    fn draw_mesh(&mut self, mesh: &Mesh) {
        let Some(pid) = self.current_program else {
            log::warn!("SoftwareDevice: draw without a program ignored");
            return;
        };

        let (color_ids, depth_id): (SmallVec<[Option<TextureId>; MAX_COLOR_ATTACHMENTS]>, _) = match self.bound {
            Some(f) => match self.framebuffers.get(f) {
                Some(fbo) => (fbo.colors.iter().copied().map(Some).collect(), fbo.depth),
                None => return,
            },
            None => (smallvec::smallvec![None], None),
        };

        let mut colors: SmallVec<[Option<Surface>; MAX_COLOR_ATTACHMENTS]> = color_ids
            .iter()
            .map(|id| match id {
                Some(id) => self.detach(*id),
                None => Some(Surface {
                    storage: std::mem::replace(&mut self.default_surface, Self::default_storage(0, 0)),
                }),
            })
            .collect();
        let mut depth = depth_id.and_then(|id| self.detach(id));

        if let Some(program) = self.programs.get(pid) {
            let vertices = vertex_transform(program).run(mesh);
            let kernel = Kernel::prepare(program, &self.textures);
            let mut target = DrawTarget {
                colors: &mut colors,
                depth: depth.as_mut(),
                viewport: self.viewport,
                state: self.raster,
            };
            raster::draw_triangles(&vertices, mesh.indices(), &mut target, |f| kernel.shade(f));
        }

        for (id, surface) in color_ids.iter().zip(colors) {
            let Some(surface) = surface else {
                continue;
            };
            match id {
                Some(id) => self.reattach(*id, surface),
                None => self.default_surface = surface.storage,
            }
        }
        if let (Some(id), Some(surface)) = (depth_id, depth) {
            self.reattach(id, surface);
        }
    }

    fn blit(&mut self, source: FramebufferId, target: Option<FramebufferId>, width: u32, height: u32) {
        let Some(src) = self.color0(Some(source)) else {
            log::warn!("SoftwareDevice: blit from a framebuffer without color attachment ignored");
            return;
        };
        let (sw, sh) = (src.width(), src.height());
        if sw == 0 || sh == 0 || width == 0 || height == 0 {
            return;
        }
        let mut texels = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                let sx = (u64::from(x) * u64::from(sw) / u64::from(width)) as u32;
                let sy = (u64::from(y) * u64::from(sh) / u64::from(height)) as u32;
                texels.push(src.fetch(sx, sy));
            }
        }

        let dst = match target {
            None => {
                if self.default_framebuffer_size() != (width, height) {
                    self.default_surface = Self::default_storage(width, height);
                }
                &mut self.default_surface
            }
            Some(f) => {
                let Some(id) = self.framebuffers.get(f).and_then(|fbo| fbo.colors.first().copied()) else {
                    return;
                };
                let Some(t) = self.textures.get_mut(id) else {
                    return;
                };
                t
            }
        };
        let (dw, dh) = (dst.width().min(width), dst.height().min(height));
        for y in 0..dh {
            for x in 0..dw {
                dst.store(x, y, texels[(y * width + x) as usize]);
            }
        }
    }

    // ========================================================================
    // Readback
    // ========================================================================

    fn read_texture_f32(&self, texture: TextureId) -> Result<Vec<f32>> {
        self.textures
            .get(texture)
            .map(TextureStorage::read_f32)
            .ok_or(LumenError::InvalidHandle("texture"))
    }

    fn read_texture_i32(&self, texture: TextureId) -> Result<Vec<i32>> {
        self.textures
            .get(texture)
            .map(TextureStorage::read_i32)
            .ok_or(LumenError::InvalidHandle("texture"))
    }

    fn read_pixel_i32(&self, framebuffer: FramebufferId, attachment: usize, x: u32, y: u32) -> Option<i32> {
        let id = *self.framebuffers.get(framebuffer)?.colors.get(attachment)?;
        let texture = self.textures.get(id)?;
        (x < texture.width() && y < texture.height()).then(|| texture.fetch_int(x, y))
    }

    fn read_default_framebuffer(&self) -> (u32, u32, Vec<f32>) {
        let (w, h) = self.default_framebuffer_size();
        (w, h, self.default_surface.read_f32())
    }

    fn stats(&self) -> DeviceStats {
        DeviceStats {
            textures: self.textures.len(),
            framebuffers: self.framebuffers.len(),
            programs: self.programs.len(),
        }
    }
}
