//! Render pass contract
//!
//! Every pass owns a shader program and draws into a framebuffer handed out
//! by the renderer. What differs between passes is captured by
//! [`PassCapabilities`]; the shared bookkeeping (program, framebuffer, target
//! size, fullscreen quad) lives in [`PassCore`].
//!
//! # Lifecycle
//! 1. `init()`: allocates pass-local constants; idempotent
//! 2. `set_fbo()`: receives the renderer-owned framebuffer
//! 3. `set_shader()`: compiles a program, replacing the previous one
//! 4. attachment setters: called on every resize/reconfigure
//! 5. `render()`: once per frame

use std::path::Path;

use bitflags::bitflags;
use glam::{Mat4, Vec4};

use super::shadow_utils::ShadowFrame;
use crate::errors::{LumenError, Result};
use crate::renderer::core::{
    ClearFlags, FramebufferId, GraphicsDevice, ProgramId, RasterState, TextureId, UniformValue, Viewport,
};
use crate::renderer::palette::segment_color_rgba;
use crate::renderer::settings::RendererSettings;
use crate::scene::camera::CameraSpec;
use crate::scene::mesh::Mesh;
use crate::scene::object::Object;
use crate::scene::scene::Scene;

bitflags! {
    /// Static properties of a pass, used instead of per-pass special cases.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PassCapabilities: u8 {
        /// Binds a depth attachment and depth-tests against it.
        const DEPTH_ATTACHMENT = 1 << 0;
        /// One fullscreen-quad draw.
        const SCREEN_SPACE = 1 << 1;
        const CLEARS_COLOR = 1 << 2;
        const CLEARS_DEPTH = 1 << 3;
    }
}

/// Read-only inputs of one frame.
pub struct FrameContext<'a> {
    pub scene: &'a Scene,
    pub camera: &'a dyn CameraSpec,
    pub settings: &'a RendererSettings,
    /// Light frame of directional light 0, when the scene has one.
    pub shadow: Option<&'a ShadowFrame>,
}

// ============================================================================
// Pass Core
// ============================================================================

/// State every pass carries.
#[derive(Debug, Default)]
pub struct PassCore {
    pub fbo: Option<FramebufferId>,
    pub program: Option<ProgramId>,
    pub width: u32,
    pub height: u32,
    /// Fullscreen quad for screen-space passes, created by `init`.
    pub quad: Option<Mesh>,
    pub initialized: bool,
}

impl PassCore {
    /// Reads and compiles `vs`/`fs`. On failure the previous program stays
    /// in place and the error is logged and returned.
    pub fn set_shader(&mut self, device: &mut dyn GraphicsDevice, pass: &str, vs: &Path, fs: &Path) -> Result<()> {
        let compiled = read_shader_source(vs).and_then(|vs_src| {
            let fs_src = read_shader_source(fs)?;
            let label = fs.file_name().map_or_else(|| pass.to_string(), |n| n.to_string_lossy().into_owned());
            device.compile_program(&label, &vs_src, &fs_src)
        });

        match compiled {
            Ok(program) => {
                if let Some(old) = self.program.replace(program) {
                    device.delete_program(old);
                }
                log::debug!("{pass}: program compiled from {}", fs.display());
                Ok(())
            }
            Err(e) => {
                log::error!("{pass}: {e}");
                Err(e)
            }
        }
    }

    #[inline]
    #[must_use]
    pub fn has_program(&self) -> bool {
        self.program.is_some()
    }

    pub fn set_size(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    /// Binds the framebuffer, viewport, raster state and program, then
    /// clears what `caps` asks for. Returns `false` when the pass cannot run.
    pub fn begin(&self, device: &mut dyn GraphicsDevice, caps: PassCapabilities, state: RasterState) -> bool {
        let (Some(fbo), Some(program)) = (self.fbo, self.program) else {
            return false;
        };
        device.bind_framebuffer(Some(fbo));
        device.set_viewport(Viewport::new(self.width, self.height));
        device.set_raster_state(state);

        let mut clear = ClearFlags::empty();
        if caps.contains(PassCapabilities::CLEARS_COLOR) {
            clear |= ClearFlags::COLOR;
        }
        if caps.contains(PassCapabilities::CLEARS_DEPTH) {
            clear |= ClearFlags::DEPTH;
        }
        if !clear.is_empty() {
            device.clear(clear, Vec4::ZERO);
        }
        device.use_program(Some(program));
        true
    }

    pub fn release(&mut self, device: &mut dyn GraphicsDevice) {
        if let Some(program) = self.program.take() {
            device.delete_program(program);
        }
        self.fbo = None;
        self.initialized = false;
    }
}

/// Reads a shader file, mapping I/O failures to [`LumenError::ShaderSource`].
pub(crate) fn read_shader_source(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|source| LumenError::ShaderSource {
        path: path.to_path_buf(),
        source,
    })
}

// ============================================================================
// RenderPass
// ============================================================================

pub trait RenderPass {
    /// Name used in logs, e.g. `"GBufferPass"`.
    fn name(&self) -> &'static str;

    fn capabilities(&self) -> PassCapabilities;

    fn core(&self) -> &PassCore;

    fn core_mut(&mut self) -> &mut PassCore;

    fn init(&mut self, _device: &mut dyn GraphicsDevice) {
        let screen = self.capabilities().contains(PassCapabilities::SCREEN_SPACE);
        let core = self.core_mut();
        if screen && core.quad.is_none() {
            core.quad = Some(Mesh::fullscreen_quad());
        }
        core.initialized = true;
    }

    fn set_shader(&mut self, device: &mut dyn GraphicsDevice, vs: &Path, fs: &Path) -> Result<()> {
        let name = self.name();
        self.core_mut().set_shader(device, name, vs, fs)
    }

    fn set_fbo(&mut self, fbo: FramebufferId) {
        self.core_mut().fbo = Some(fbo);
    }

    fn render(&self, device: &mut dyn GraphicsDevice, frame: &FrameContext<'_>);

    fn release(&mut self, device: &mut dyn GraphicsDevice) {
        self.core_mut().release(device);
    }
}

// ============================================================================
// Shared Uniform Helpers
// ============================================================================

/// View/projection matrices (and inverses), environment view, position and
/// clip planes.
pub fn set_camera_uniforms(device: &mut dyn GraphicsDevice, camera: &dyn CameraSpec) {
    let view = camera.view_matrix();
    let proj = camera.projection_matrix();
    let env = camera.environment_view_matrix();
    device.set_uniform("gbufferViewMatrix", view.into());
    device.set_uniform("gbufferViewMatrixInverse", view.inverse().into());
    device.set_uniform("gbufferProjectionMatrix", proj.into());
    device.set_uniform("gbufferProjectionMatrixInverse", proj.inverse().into());
    device.set_uniform("environmentViewMatrix", env.into());
    device.set_uniform("environmentViewMatrixInverse", env.inverse().into());
    device.set_uniform("cameraPosition", camera.position().into());
    device.set_uniform("near", camera.near().into());
    device.set_uniform("far", camera.far().into());
}

/// Every point and directional light, indexed into the shader's arrays.
/// Lights beyond the declared array length resolve to nothing.
pub fn set_light_uniforms(device: &mut dyn GraphicsDevice, scene: &Scene) {
    device.set_uniform("ambientLight", scene.ambient_light().into());
    for (i, light) in scene.point_lights().iter().enumerate() {
        device.set_uniform(&format!("pointLights[{i}].position"), light.position.into());
        device.set_uniform(&format!("pointLights[{i}].emission"), light.emission.into());
    }
    for (i, light) in scene.directional_lights().iter().enumerate() {
        device.set_uniform(&format!("directionalLights[{i}].direction"), light.direction.into());
        device.set_uniform(&format!("directionalLights[{i}].emission"), light.emission.into());
    }
}

/// Shadow lookup inputs for the lighting and transparency passes.
pub fn set_shadow_uniforms(
    device: &mut dyn GraphicsDevice,
    frame: Option<&ShadowFrame>,
    shadowtex: Option<(TextureId, u32)>,
) {
    match (frame, shadowtex) {
        (Some(frame), Some((tex, size))) => {
            device.set_uniform("shadowtex", tex.into());
            device.set_uniform("shadowtexSize", (size as i32).into());
            device.set_uniform("cameraToShadowMatrix", frame.camera_to_light.into());
            device.set_uniform("shadowProjectionMatrix", frame.projection.into());
            device.set_uniform("shadowLightEnabled", true.into());
        }
        _ => {
            device.set_uniform("shadowLightEnabled", false.into());
        }
    }
    if let Some(frame) = frame {
        device.set_uniform("shadowLightDirection", frame.direction.into());
        device.set_uniform("shadowLightEmission", frame.emission.into());
    }
}

/// Random noise texture and the current target size.
pub fn set_random_uniforms(device: &mut dyn GraphicsDevice, random: Option<(TextureId, u32)>, core: &PassCore) {
    if let Some((tex, size)) = random {
        device.set_uniform("randomtex", tex.into());
        device.set_uniform("randomtexWidth", (size as i32).into());
        device.set_uniform("randomtexHeight", (size as i32).into());
    }
    device.set_uniform("viewWidth", (core.width as i32).into());
    device.set_uniform("viewHeight", (core.height as i32).into());
}

/// Binds `textures` as `colortex0..N` and `depth` as `depthtex0`.
pub fn set_input_uniforms(device: &mut dyn GraphicsDevice, textures: &[TextureId], depth: Option<TextureId>) {
    for (n, tex) in textures.iter().enumerate() {
        device.set_uniform(&format!("colortex{n}"), (*tex).into());
    }
    if let Some(depth) = depth {
        device.set_uniform("depthtex0", depth.into());
    }
}

/// Model matrices, material, user data and opacity of one object.
pub fn set_object_uniforms(device: &mut dyn GraphicsDevice, object: &Object) {
    let model: Mat4 = object.global_model_matrix();
    device.set_uniform("gbufferModelMatrix", model.into());
    device.set_uniform("gbufferModelMatrixInverse", model.inverse().into());

    let m = &object.material;
    device.set_uniform("material.kd", m.kd.into());
    device.set_uniform("material.ks", m.ks.into());
    device.set_uniform("material.roughness", m.roughness.into());
    device.set_uniform("material.metallic", m.metallic.into());
    for (name, map) in [
        ("kd_map", &m.kd_map),
        ("ks_map", &m.ks_map),
        ("height_map", &m.height_map),
        ("normal_map", &m.normal_map),
    ] {
        if let Some(texture) = map {
            device.set_uniform(&format!("material.{name}"), UniformValue::Image(texture.clone()));
        }
        device.set_uniform(&format!("material.has_{name}"), map.is_some().into());
    }

    device.set_uniform("user_data", Mat4::from_cols_array(object.user_data()).into());
    device.set_uniform("opacity", object.visibility.into());
}

/// Segment id, object id and palette color of one object.
pub fn set_segmentation_uniforms(device: &mut dyn GraphicsDevice, object: &Object) {
    device.set_uniform("segmentation", (object.segment_id() as i32).into());
    device.set_uniform("segmentation2", (object.obj_id() as i32).into());
    device.set_uniform("segmentation_color", segment_color_rgba(object.segment_id()).into());
}

/// Zero ids and a transparent color, for frames rendered with
/// segmentation off. Program uniforms persist across frames, so the last
/// object's ids would otherwise keep being written.
pub fn clear_segmentation_uniforms(device: &mut dyn GraphicsDevice) {
    device.set_uniform("segmentation", 0_i32.into());
    device.set_uniform("segmentation2", 0_i32.into());
    device.set_uniform("segmentation_color", Vec4::ZERO.into());
}
