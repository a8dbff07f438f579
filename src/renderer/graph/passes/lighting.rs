//! Deferred Lighting Pass
//!
//! One fullscreen draw that shades the GBuffer into `lightingtex`, the
//! buffer every later pass reads and rewrites.
//!
//! Inputs:
//! - `colortex0..2` and `depthtex0`
//! - `shadowtex`, when shadows are enabled and a directional light exists
//! - `aotex`, when AO is enabled
//! - `randomtex`
//! - `skybox`, the scene environment map (background pixels stay black
//!   without one)
//!
//! Lights are written as `pointLights[i].*` and `directionalLights[i].*`
//! for every light of the scene. Indices past the shader's declared array
//! length do not resolve and are dropped by the device.

use smallvec::SmallVec;

use crate::renderer::core::{GraphicsDevice, RasterState, TextureId, UniformValue};
use crate::renderer::graph::pass::{
    FrameContext, PassCapabilities, PassCore, RenderPass, set_camera_uniforms, set_input_uniforms,
    set_light_uniforms, set_random_uniforms, set_shadow_uniforms,
};
use crate::renderer::textures::RANDOM_TEXTURE_SIZE;

#[derive(Debug, Default)]
pub struct LightingPass {
    core: PassCore,

    // === Inputs ===
    colortex: SmallVec<[TextureId; 3]>,
    depthtex: Option<TextureId>,
    randomtex: Option<TextureId>,
    aotex: Option<TextureId>,
    /// Shadow map with its side length.
    shadowtex: Option<(TextureId, u32)>,
}

impl LightingPass {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_attachments(
        &mut self,
        device: &mut dyn GraphicsDevice,
        lightingtex: TextureId,
        colortex: &[TextureId],
        depthtex: TextureId,
        randomtex: TextureId,
    ) {
        self.colortex = colortex.iter().copied().collect();
        self.depthtex = Some(depthtex);
        self.randomtex = Some(randomtex);
        if let Some(fbo) = self.core.fbo {
            device.set_color_attachments(fbo, &[lightingtex]);
            device.set_depth_attachment(fbo, None);
        }
    }

    pub fn set_ao_texture(&mut self, aotex: Option<TextureId>) {
        self.aotex = aotex;
    }

    pub fn set_shadow_texture(&mut self, shadowtex: Option<(TextureId, u32)>) {
        self.shadowtex = shadowtex;
    }
}

impl RenderPass for LightingPass {
    fn name(&self) -> &'static str {
        "LightingPass"
    }

    fn capabilities(&self) -> PassCapabilities {
        PassCapabilities::SCREEN_SPACE | PassCapabilities::CLEARS_COLOR
    }

    fn core(&self) -> &PassCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut PassCore {
        &mut self.core
    }

    fn render(&self, device: &mut dyn GraphicsDevice, frame: &FrameContext<'_>) {
        let Some(quad) = &self.core.quad else {
            return;
        };
        if !self.core.begin(device, self.capabilities(), RasterState::SCREEN) {
            return;
        }

        set_camera_uniforms(device, frame.camera);
        set_light_uniforms(device, frame.scene);
        set_input_uniforms(device, &self.colortex, self.depthtex);
        set_random_uniforms(device, self.randomtex.map(|t| (t, RANDOM_TEXTURE_SIZE)), &self.core);
        set_shadow_uniforms(device, frame.shadow, self.shadowtex);

        device.set_uniform("aoEnabled", self.aotex.is_some().into());
        if let Some(aotex) = self.aotex {
            device.set_uniform("aotex", aotex.into());
        }
        if let Some(skybox) = frame.scene.environment_map() {
            device.set_uniform("skybox", UniformValue::CubeMap(skybox.clone()));
        }

        device.draw_mesh(quad);
    }
}
