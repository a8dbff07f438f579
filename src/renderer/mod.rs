//! Deferred Renderer
//!
//! [`Renderer`] owns the graphics device, every size-dependent texture and
//! one framebuffer per pass. It sequences the passes each frame:
//!
//! ```text
//! shadow → gbuffer → (ao) → lighting → transparency → (axis) → composite → (display)
//! ```
//!
//! Passes in parentheses are optional and follow [`RendererSettings`].
//!
//! # Lifecycle
//!
//! ```text
//!  Uninitialized ──init()──► Ready ──toggle / resize──► Reconfiguring ──► Ready
//!        ▲                     │
//!        └───────exit()────────┘
//! ```
//!
//! Resizing and toggling an optional pass destroy and recreate every texture
//! of the [`TextureSet`], then rebind each pass's attachments in pipeline
//! order. Both are meant for editor-time use, never per frame.
//!
//! # Example
//!
//! ```rust,ignore
//! use lumen::{Camera, Object, Renderer, Scene};
//!
//! let mut renderer = Renderer::software(512, 512);
//! renderer.load_shaders("shaders")?;
//! renderer.init()?;
//!
//! let mut scene = Scene::new();
//! scene.add_object(Object::cube());
//! renderer.render_scene(&mut scene, &Camera::perspective());
//! let ids = renderer.get_segmentation()?;
//! ```

pub mod core;
pub mod export;
pub mod graph;
pub mod palette;
pub mod picking;
pub mod settings;
pub mod textures;

use std::path::{Path, PathBuf};

use rustc_hash::FxHashMap;

use self::core::{FramebufferId, GraphicsDevice, ProgramId, SoftwareDevice, TextureDescriptor, TextureId, WgpuDevice};
use self::graph::pass::read_shader_source;
use self::graph::{
    AoPass, AxisPass, CompositePass, FrameContext, GBufferPass, LightingPass, RenderPass, ShadowFrame, ShadowPass,
    TransparencyPass,
};
use self::settings::{RendererSettings, ShadowSettings};
use self::textures::{FboSlot, FboTable, TextureSet, create_random_texture};
use crate::errors::{LumenError, Result};
use crate::scene::camera::CameraSpec;
use crate::scene::scene::Scene;

/// Execution order of the pass graph.
pub const PASS_ORDER: [FboSlot; 8] = [
    FboSlot::Shadow,
    FboSlot::GBuffer,
    FboSlot::Ao,
    FboSlot::Lighting,
    FboSlot::Transparency,
    FboSlot::Axis,
    FboSlot::Composite,
    FboSlot::Display,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RendererState {
    Uninitialized,
    Ready,
    /// Textures are being rebuilt; rendering is refused.
    Reconfiguring,
}

/// Vertex/fragment source files of one pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderPaths {
    pub vertex: PathBuf,
    pub fragment: PathBuf,
}

/// Standard shader file stem per pass, as laid out in `shaders/`.
fn standard_shader(slot: FboSlot) -> Option<&'static str> {
    Some(match slot {
        FboSlot::Shadow => "shadow",
        FboSlot::GBuffer => "gbuffer",
        FboSlot::Ao => "ao",
        FboSlot::Lighting => "deferred",
        FboSlot::Transparency => "transparency",
        FboSlot::Axis => "axis",
        FboSlot::Composite => "composite",
        FboSlot::Display => "display",
        FboSlot::Copy => return None,
    })
}

// ============================================================================
// Pass Set
// ============================================================================

#[derive(Debug)]
struct PassSet {
    shadow: Option<ShadowPass>,
    gbuffer: GBufferPass,
    ao: Option<AoPass>,
    lighting: LightingPass,
    transparency: TransparencyPass,
    axis: Option<AxisPass>,
    composite: CompositePass,
    display: Option<CompositePass>,
}

impl PassSet {
    fn new() -> Self {
        Self {
            shadow: None,
            gbuffer: GBufferPass::new(),
            ao: None,
            lighting: LightingPass::new(),
            transparency: TransparencyPass::new(),
            axis: None,
            composite: CompositePass::new("CompositePass"),
            display: None,
        }
    }

    fn get(&self, slot: FboSlot) -> Option<&dyn RenderPass> {
        match slot {
            FboSlot::Shadow => self.shadow.as_ref().map(|p| p as &dyn RenderPass),
            FboSlot::GBuffer => Some(&self.gbuffer),
            FboSlot::Ao => self.ao.as_ref().map(|p| p as &dyn RenderPass),
            FboSlot::Lighting => Some(&self.lighting),
            FboSlot::Transparency => Some(&self.transparency),
            FboSlot::Axis => self.axis.as_ref().map(|p| p as &dyn RenderPass),
            FboSlot::Composite => Some(&self.composite),
            FboSlot::Display => self.display.as_ref().map(|p| p as &dyn RenderPass),
            FboSlot::Copy => None,
        }
    }

    fn get_mut(&mut self, slot: FboSlot) -> Option<&mut dyn RenderPass> {
        match slot {
            FboSlot::Shadow => self.shadow.as_mut().map(|p| p as &mut dyn RenderPass),
            FboSlot::GBuffer => Some(&mut self.gbuffer),
            FboSlot::Ao => self.ao.as_mut().map(|p| p as &mut dyn RenderPass),
            FboSlot::Lighting => Some(&mut self.lighting),
            FboSlot::Transparency => Some(&mut self.transparency),
            FboSlot::Axis => self.axis.as_mut().map(|p| p as &mut dyn RenderPass),
            FboSlot::Composite => Some(&mut self.composite),
            FboSlot::Display => self.display.as_mut().map(|p| p as &mut dyn RenderPass),
            FboSlot::Copy => None,
        }
    }

    fn is_optional(slot: FboSlot) -> bool {
        matches!(slot, FboSlot::Shadow | FboSlot::Ao | FboSlot::Axis | FboSlot::Display)
    }

    /// Creates an optional pass; returns `false` if it already existed.
    fn create(&mut self, slot: FboSlot) -> bool {
        fn put<T>(pass: &mut Option<T>, make: impl FnOnce() -> T) -> bool {
            let created = pass.is_none();
            pass.get_or_insert_with(make);
            created
        }
        match slot {
            FboSlot::Shadow => put(&mut self.shadow, ShadowPass::new),
            FboSlot::Ao => put(&mut self.ao, AoPass::new),
            FboSlot::Axis => put(&mut self.axis, AxisPass::new),
            FboSlot::Display => put(&mut self.display, || CompositePass::new("DisplayPass")),
            _ => false,
        }
    }

    /// Drops an optional pass, releasing its program.
    fn remove(&mut self, slot: FboSlot, device: &mut dyn GraphicsDevice) {
        if let Some(pass) = self.get_mut(slot) {
            pass.release(device);
        }
        match slot {
            FboSlot::Shadow => self.shadow = None,
            FboSlot::Ao => self.ao = None,
            FboSlot::Axis => self.axis = None,
            FboSlot::Display => self.display = None,
            _ => {}
        }
    }
}

// ============================================================================
// Renderer
// ============================================================================

pub struct Renderer {
    device: Box<dyn GraphicsDevice>,
    settings: RendererSettings,
    state: RendererState,

    // === Size ===
    width: u32,
    height: u32,
    pixel_width: u32,
    pixel_height: u32,

    // === GPU Resources ===
    fbos: Option<FboTable>,
    textures: Option<TextureSet>,
    /// Survives resizes and toggles; recreated only by `init`.
    randomtex: Option<TextureId>,
    picking_fbo: Option<FramebufferId>,

    // === Passes & Programs ===
    passes: PassSet,
    shader_paths: FxHashMap<FboSlot, ShaderPaths>,
    /// Per-object programs from `compile_program`, released on `exit`.
    object_programs: Vec<ProgramId>,
}

fn pixel_size(width: u32, height: u32, scaling: f32) -> (u32, u32) {
    let scale = |v: u32| ((v as f32 * scaling).round() as u32).max(1);
    (scale(width), scale(height))
}

impl Renderer {
    /// Creates an uninitialized renderer of logical size `width × height`.
    #[must_use]
    pub fn new(device: Box<dyn GraphicsDevice>, width: u32, height: u32) -> Self {
        Self::with_settings(device, width, height, RendererSettings::default())
    }

    #[must_use]
    pub fn with_settings(device: Box<dyn GraphicsDevice>, width: u32, height: u32, settings: RendererSettings) -> Self {
        let (width, height) = (width.max(1), height.max(1));
        let (pixel_width, pixel_height) = pixel_size(width, height, settings.scaling);
        Self {
            device,
            settings,
            state: RendererState::Uninitialized,
            width,
            height,
            pixel_width,
            pixel_height,
            fbos: None,
            textures: None,
            randomtex: None,
            picking_fbo: None,
            passes: PassSet::new(),
            shader_paths: FxHashMap::default(),
            object_programs: Vec::new(),
        }
    }

    /// A renderer on a headless [`WgpuDevice`].
    pub fn wgpu(width: u32, height: u32) -> Result<Self> {
        Ok(Self::new(Box::new(WgpuDevice::new_headless()?), width, height))
    }

    /// A renderer on the CPU [`SoftwareDevice`].
    #[must_use]
    pub fn software(width: u32, height: u32) -> Self {
        Self::new(Box::new(SoftwareDevice::new()), width, height)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Allocates framebuffers, textures and passes and compiles every
    /// recorded shader. Optional passes follow the current settings.
    pub fn init(&mut self) -> Result<()> {
        if self.state != RendererState::Uninitialized {
            log::warn!("Renderer::init called twice; ignored");
            return Ok(());
        }

        self.randomtex = Some(create_random_texture(self.device.as_mut())?);
        self.fbos = Some(FboTable::create(self.device.as_mut()));

        if let Some(dir) = self.settings.shader_dir.clone() {
            // Records only: compilation happens per pass below.
            self.load_shaders(&dir)?;
        }

        self.sync_optional_passes();
        for slot in PASS_ORDER {
            self.prepare_pass(slot);
        }
        self.rebuild_textures();
        if self.settings.picking {
            self.create_picking_fbo();
        }

        self.state = RendererState::Ready;
        log::info!(
            "Renderer initialized on '{}' device: {}x{} ({}x{} pixels)",
            self.device.name(),
            self.width,
            self.height,
            self.pixel_width,
            self.pixel_height
        );
        Ok(())
    }

    /// Releases every texture, framebuffer and program. Recorded shader
    /// paths and settings are kept for a later `init`.
    pub fn exit(&mut self) {
        if self.state == RendererState::Uninitialized {
            return;
        }
        let device = self.device.as_mut();
        for slot in PASS_ORDER {
            if let Some(pass) = self.passes.get_mut(slot) {
                pass.release(device);
            }
        }
        for program in self.object_programs.drain(..) {
            device.delete_program(program);
        }
        if let Some(set) = self.textures.take() {
            set.destroy(device);
        }
        if let Some(random) = self.randomtex.take() {
            device.destroy_texture(random);
        }
        if let Some(fbo) = self.picking_fbo.take() {
            device.destroy_framebuffer(fbo);
        }
        if let Some(fbos) = self.fbos.take() {
            fbos.destroy(device);
        }
        device.bind_framebuffer(None);
        self.state = RendererState::Uninitialized;
        log::info!("Renderer released");
    }

    /// Sets the logical size and rebuilds every texture at
    /// `width × scaling` by `height × scaling`.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width.max(1);
        self.height = height.max(1);
        (self.pixel_width, self.pixel_height) = pixel_size(self.width, self.height, self.settings.scaling);

        match self.state {
            RendererState::Uninitialized => return,
            RendererState::Reconfiguring => {
                log::error!("Renderer::resize during reconfiguration ignored");
                return;
            }
            RendererState::Ready => {}
        }

        self.state = RendererState::Reconfiguring;
        self.rebuild_textures();
        self.state = RendererState::Ready;
        log::info!(
            "Renderer resized to {}x{} ({}x{} pixels)",
            self.width,
            self.height,
            self.pixel_width,
            self.pixel_height
        );
    }

    /// Tears down and rebuilds all textures, creating or dropping optional
    /// passes to match the settings. A no-op before `init`.
    pub fn reconfigure(&mut self) {
        if self.state != RendererState::Ready {
            return;
        }
        self.state = RendererState::Reconfiguring;
        log::info!("Renderer reconfiguring");
        for slot in self.sync_optional_passes() {
            self.prepare_pass(slot);
        }
        self.rebuild_textures();
        self.state = RendererState::Ready;
    }

    /// Creates or drops optional passes per settings. Returns created slots.
    fn sync_optional_passes(&mut self) -> Vec<FboSlot> {
        let wanted = [
            (FboSlot::Shadow, self.settings.shadow.enabled),
            (FboSlot::Ao, self.settings.ao),
            (FboSlot::Axis, self.settings.axis.enabled),
            (FboSlot::Display, self.settings.display),
        ];
        let mut created = Vec::new();
        for (slot, enabled) in wanted {
            if enabled {
                if self.passes.create(slot) {
                    created.push(slot);
                }
            } else if self.passes.get(slot).is_some() {
                self.passes.remove(slot, self.device.as_mut());
                log::debug!("{slot:?} pass dropped");
            }
        }
        created
    }

    /// `init` + `set_fbo`, then compiles the recorded shader if the pass
    /// has no program yet.
    fn prepare_pass(&mut self, slot: FboSlot) {
        let Some(fbo) = self.fbos.as_ref().map(|f| f.get(slot)) else {
            return;
        };
        let device = self.device.as_mut();
        let Some(pass) = self.passes.get_mut(slot) else {
            return;
        };
        pass.init(device);
        pass.set_fbo(fbo);
        if pass.core().has_program() {
            return;
        }
        if let Some(paths) = self.shader_paths.get(&slot) {
            // Failures are logged by the pass; it stays without a program.
            let _ = pass.set_shader(device, &paths.vertex, &paths.fragment);
        }
    }

    fn rebuild_textures(&mut self) {
        if let Some(old) = self.textures.take() {
            old.destroy(self.device.as_mut());
        }
        let set = TextureSet::create(self.device.as_mut(), self.pixel_width, self.pixel_height, &self.settings);
        self.bind_attachments(&set);
        self.textures = Some(set);
    }

    /// Rebinds every attachment in pipeline order. Needed even for
    /// unchanged textures since attachments are framebuffer-local state.
    fn bind_attachments(&mut self, set: &TextureSet) {
        let Some(random) = self.randomtex else {
            return;
        };
        let device = self.device.as_mut();
        let passes = &mut self.passes;
        let (w, h) = (self.pixel_width, self.pixel_height);
        let map_size = self.settings.shadow.map_size;
        let shadow = set.shadowtex.map(|t| (t, map_size));
        let gbuffer_inputs = set.colortex;

        if let (Some(pass), Some(shadowtex)) = (passes.shadow.as_mut(), set.shadowtex) {
            pass.set_depth_attachment(device, shadowtex, map_size);
            log::debug!("ShadowPass bound ({map_size}x{map_size})");
        }

        passes.gbuffer.core_mut().set_size(w, h);
        passes.gbuffer.set_attachments(
            device,
            &[
                set.colortex[0],
                set.colortex[1],
                set.colortex[2],
                set.segtex[0],
                set.segtex[1],
                set.segtex[2],
                set.usertex0,
            ],
            set.depthtex,
        );

        let ao = match (passes.ao.as_mut(), set.aotex) {
            (Some(pass), Some(aotex)) => {
                pass.core_mut().set_size(w, h);
                pass.set_attachments(device, aotex, &gbuffer_inputs, set.depthtex, random);
                Some(aotex)
            }
            _ => None,
        };

        passes.lighting.core_mut().set_size(w, h);
        passes.lighting.set_attachments(device, set.lightingtex, &gbuffer_inputs, set.depthtex, random);
        passes.lighting.set_ao_texture(ao);
        passes.lighting.set_shadow_texture(shadow);

        passes.transparency.core_mut().set_size(w, h);
        passes.transparency.set_attachments(
            device,
            &[set.lightingtex, set.segtex[0], set.segtex[1], set.segtex[2]],
            set.depthtex,
            random,
        );
        passes.transparency.set_shadow_texture(shadow);

        if let Some(pass) = passes.axis.as_mut() {
            pass.core_mut().set_size(w, h);
            pass.set_attachments(device, &[set.lightingtex, set.segtex[1]], set.depthtex);
        }

        let composite_inputs = |first: TextureId| {
            [
                first,
                set.colortex[0],
                set.colortex[1],
                set.colortex[2],
                set.segtex[2],
                set.usertex0,
            ]
        };
        passes.composite.core_mut().set_size(w, h);
        passes
            .composite
            .set_attachments(device, set.lightingtex2, &composite_inputs(set.lightingtex), set.depthtex);

        if let Some(pass) = passes.display.as_mut() {
            pass.core_mut().set_size(w, h);
            pass.set_attachments(device, set.outputtex, &composite_inputs(set.lightingtex2), set.depthtex);
        }

        if let Some(fbo) = self.picking_fbo {
            device.set_color_attachments(fbo, &[set.segtex[0], set.segtex[1]]);
        }
        log::debug!("pass attachments rebound at {w}x{h}");
    }

    // ========================================================================
    // Feature Toggles
    // ========================================================================

    pub fn enable_shadow_pass(&mut self, enabled: bool, map_size: u32, frustum_size: f32) {
        self.settings.shadow = ShadowSettings {
            enabled,
            map_size: map_size.max(1),
            frustum_size,
        };
        self.reconfigure();
    }

    pub fn enable_ao_pass(&mut self, enabled: bool) {
        self.settings.ao = enabled;
        self.reconfigure();
    }

    pub fn enable_axis_pass(&mut self, enabled: bool) {
        self.settings.axis.enabled = enabled;
        self.reconfigure();
    }

    pub fn enable_display_pass(&mut self, enabled: bool) {
        self.settings.display = enabled;
        self.reconfigure();
    }

    /// Draws the unit gizmo at the origin (needs the axis pass).
    pub fn enable_global_axes(&mut self, enabled: bool) {
        self.settings.axis.global_axes = enabled;
    }

    pub fn set_object_id_for_axis(&mut self, id: i32) {
        self.settings.axis.object_id = id;
    }

    pub fn enable_segmentation(&mut self, enabled: bool) {
        self.settings.segmentation = enabled;
    }

    /// Keeps or clears the GBuffer depth between frames.
    pub fn set_gbuffer_clear_depth(&mut self, clear: bool) {
        self.passes.gbuffer.clear_depth = clear;
    }

    // ========================================================================
    // Shaders
    // ========================================================================

    /// Records the shader of `slot` and compiles it when the pass exists.
    /// Before `init` the path is only recorded.
    fn set_shader(&mut self, slot: FboSlot, vs: &Path, fs: &Path) -> Result<()> {
        let paths = ShaderPaths {
            vertex: vs.to_path_buf(),
            fragment: fs.to_path_buf(),
        };
        self.shader_paths.insert(slot, paths);
        if self.state == RendererState::Uninitialized {
            return Ok(());
        }
        match self.passes.get_mut(slot) {
            Some(pass) => pass.set_shader(self.device.as_mut(), vs, fs),
            None => Ok(()),
        }
    }

    pub fn set_shadow_shader(&mut self, vs: impl AsRef<Path>, fs: impl AsRef<Path>) -> Result<()> {
        self.set_shader(FboSlot::Shadow, vs.as_ref(), fs.as_ref())
    }

    pub fn set_gbuffer_shader(&mut self, vs: impl AsRef<Path>, fs: impl AsRef<Path>) -> Result<()> {
        self.set_shader(FboSlot::GBuffer, vs.as_ref(), fs.as_ref())
    }

    pub fn set_ao_shader(&mut self, vs: impl AsRef<Path>, fs: impl AsRef<Path>) -> Result<()> {
        self.set_shader(FboSlot::Ao, vs.as_ref(), fs.as_ref())
    }

    /// The deferred lighting shader.
    pub fn set_lighting_shader(&mut self, vs: impl AsRef<Path>, fs: impl AsRef<Path>) -> Result<()> {
        self.set_shader(FboSlot::Lighting, vs.as_ref(), fs.as_ref())
    }

    pub fn set_transparency_shader(&mut self, vs: impl AsRef<Path>, fs: impl AsRef<Path>) -> Result<()> {
        self.set_shader(FboSlot::Transparency, vs.as_ref(), fs.as_ref())
    }

    pub fn set_axis_shader(&mut self, vs: impl AsRef<Path>, fs: impl AsRef<Path>) -> Result<()> {
        self.set_shader(FboSlot::Axis, vs.as_ref(), fs.as_ref())
    }

    pub fn set_composite_shader(&mut self, vs: impl AsRef<Path>, fs: impl AsRef<Path>) -> Result<()> {
        self.set_shader(FboSlot::Composite, vs.as_ref(), fs.as_ref())
    }

    pub fn set_display_shader(&mut self, vs: impl AsRef<Path>, fs: impl AsRef<Path>) -> Result<()> {
        self.set_shader(FboSlot::Display, vs.as_ref(), fs.as_ref())
    }

    /// Sets every pass's shader from `dir` (`gbuffer.vert.wgsl`/`gbuffer.frag.wgsl`,
    /// `deferred.vert.wgsl`/`deferred.frag.wgsl`, ...). Every pass is attempted; the
    /// first failure is returned.
    pub fn load_shaders(&mut self, dir: impl AsRef<Path>) -> Result<()> {
        let dir = dir.as_ref();
        let mut first_error = None;
        for slot in PASS_ORDER {
            let Some(stem) = standard_shader(slot) else {
                continue;
            };
            let vs = dir.join(format!("{stem}.vert.wgsl"));
            let fs = dir.join(format!("{stem}.frag.wgsl"));
            if let Err(e) = self.set_shader(slot, &vs, &fs) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Compiles a program for per-object use (`Object::shader`). It is
    /// released by `exit`.
    pub fn compile_program(&mut self, vs: impl AsRef<Path>, fs: impl AsRef<Path>) -> Result<ProgramId> {
        let (vs, fs) = (vs.as_ref(), fs.as_ref());
        let label = fs.display().to_string();
        let compiled = read_shader_source(vs).and_then(|vs_src| {
            let fs_src = read_shader_source(fs)?;
            self.device.compile_program(&label, &vs_src, &fs_src)
        });
        match compiled {
            Ok(program) => {
                self.object_programs.push(program);
                Ok(program)
            }
            Err(e) => {
                log::error!("{e}");
                Err(e)
            }
        }
    }

    /// Hot reloading is not supported.
    pub fn reload_shaders(&mut self) {
        log::warn!("Renderer::reload_shaders is not implemented");
    }

    /// Recorded shader paths of a pass.
    #[must_use]
    pub fn shader_paths(&self, slot: FboSlot) -> Option<&ShaderPaths> {
        self.shader_paths.get(&slot)
    }

    // ========================================================================
    // Frame
    // ========================================================================

    /// Flattens `scene` and runs the pass graph. Finishes with the default
    /// framebuffer bound.
    ///
    /// Refused (logged, no-op) before `init`, while reconfiguring, and when
    /// a mandatory pass has no program. Optional passes without a program
    /// are skipped.
    pub fn render_scene(&mut self, scene: &mut Scene, camera: &dyn CameraSpec) {
        if let Err(e) = self.check_renderable() {
            log::error!("render_scene: {e}");
            return;
        }

        scene.prepare_objects();

        let shadow = self
            .passes
            .shadow
            .as_ref()
            .and(scene.directional_lights().first())
            .map(|light| ShadowFrame::compute(camera, light, self.settings.shadow.frustum_size));

        let frame = FrameContext {
            scene: &*scene,
            camera,
            settings: &self.settings,
            shadow: shadow.as_ref(),
        };
        let device = self.device.as_mut();
        for slot in PASS_ORDER {
            let Some(pass) = self.passes.get(slot) else {
                continue;
            };
            if !pass.core().has_program() {
                log::warn!("{}: no program, skipping", pass.name());
                continue;
            }
            pass.render(device, &frame);
        }
        device.use_program(None);
        device.bind_framebuffer(None);
    }

    fn check_renderable(&self) -> Result<()> {
        match self.state {
            RendererState::Uninitialized => return Err(LumenError::NotInitialized),
            RendererState::Reconfiguring => return Err(LumenError::Reconfiguring),
            RendererState::Ready => {}
        }
        for slot in PASS_ORDER {
            if PassSet::is_optional(slot) {
                continue;
            }
            if let Some(pass) = self.passes.get(slot)
                && !pass.core().has_program()
            {
                return Err(LumenError::MissingShader(pass.name()));
            }
        }
        Ok(())
    }

    // ========================================================================
    // Display
    // ========================================================================

    /// Shows the final image: the display pass output when that pass is
    /// enabled and has a program, the composite output otherwise.
    pub fn display(&mut self, target: Option<FramebufferId>) {
        let display_ran = self.display_pass_ran();
        self.display_texture("display", target, |set| {
            if display_ran { set.outputtex } else { set.lightingtex2 }
        });
    }

    /// Whether `outputtex` holds this frame's image. A display pass
    /// without a program is skipped and leaves it uncleared.
    fn display_pass_ran(&self) -> bool {
        self.passes.display.as_ref().is_some_and(|pass| pass.core().has_program())
    }

    pub fn display_lighting(&mut self, target: Option<FramebufferId>) {
        self.display_texture("display_lighting", target, |set| set.lightingtex);
    }

    pub fn display_segmentation(&mut self, target: Option<FramebufferId>) {
        self.display_texture("display_segmentation", target, |set| set.segtex[2]);
    }

    pub fn display_user_texture(&mut self, target: Option<FramebufferId>) {
        self.display_texture("display_user_texture", target, |set| set.usertex0);
    }

    /// Blits one texture through the copy framebuffer into `target` (the
    /// default framebuffer when `None`) at the logical size.
    fn display_texture(
        &mut self,
        what: &str,
        target: Option<FramebufferId>,
        pick: impl FnOnce(&TextureSet) -> TextureId,
    ) {
        let (Some(set), Some(fbos)) = (self.textures.as_ref(), self.fbos.as_ref()) else {
            log::error!("{what}: {}", LumenError::NotInitialized);
            return;
        };
        let texture = pick(set);
        let copy = fbos.get(FboSlot::Copy);
        let device = self.device.as_mut();
        device.set_color_attachments(copy, &[texture]);
        device.set_depth_attachment(copy, None);
        device.blit(copy, target, self.width, self.height);
        device.bind_framebuffer(None);
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Name and descriptor of every live size-dependent texture.
    #[must_use]
    pub fn textures(&self) -> Vec<(&'static str, TextureDescriptor)> {
        let Some(set) = &self.textures else {
            return Vec::new();
        };
        set.entries()
            .into_iter()
            .filter_map(|(name, id)| self.device.texture_descriptor(id).map(|d| (name, d)))
            .collect()
    }

    #[inline]
    #[must_use]
    pub fn texture_set(&self) -> Option<&TextureSet> {
        self.textures.as_ref()
    }

    #[inline]
    #[must_use]
    pub fn device(&self) -> &dyn GraphicsDevice {
        self.device.as_ref()
    }

    #[inline]
    pub fn device_mut(&mut self) -> &mut dyn GraphicsDevice {
        self.device.as_mut()
    }

    #[inline]
    #[must_use]
    pub fn state(&self) -> RendererState {
        self.state
    }

    #[inline]
    #[must_use]
    pub fn settings(&self) -> &RendererSettings {
        &self.settings
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

    #[inline]
    #[must_use]
    pub fn pixel_width(&self) -> u32 {
        self.pixel_width
    }

    #[inline]
    #[must_use]
    pub fn pixel_height(&self) -> u32 {
        self.pixel_height
    }

    /// Whether an optional pass currently exists.
    #[must_use]
    pub fn has_pass(&self, slot: FboSlot) -> bool {
        self.passes.get(slot).is_some()
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        self.exit();
    }
}
