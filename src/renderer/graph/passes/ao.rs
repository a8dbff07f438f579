//! Screen Space Ambient Occlusion Pass
//!
//! One fullscreen draw. Reads GBuffer depth and normals plus the persistent
//! 256×256 noise texture and writes a single-channel occlusion factor to
//! `aotex`. The lighting pass multiplies ambient light by it while AO is
//! enabled.
//!
//! ```text
//! depthtex  ──┐
//! colortex1 ──┼──► AoPass ──► aotex ──► LightingPass
//! randomtex ──┘
//! ```

use smallvec::SmallVec;

use crate::renderer::core::{GraphicsDevice, RasterState, TextureId};
use crate::renderer::graph::pass::{
    FrameContext, PassCapabilities, PassCore, RenderPass, set_camera_uniforms, set_input_uniforms,
    set_random_uniforms,
};
use crate::renderer::textures::RANDOM_TEXTURE_SIZE;

#[derive(Debug, Default)]
pub struct AoPass {
    core: PassCore,

    // === Inputs ===
    colortex: SmallVec<[TextureId; 3]>,
    depthtex: Option<TextureId>,
    randomtex: Option<TextureId>,
}

impl AoPass {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_attachments(
        &mut self,
        device: &mut dyn GraphicsDevice,
        aotex: TextureId,
        colortex: &[TextureId],
        depthtex: TextureId,
        randomtex: TextureId,
    ) {
        self.colortex = colortex.iter().copied().collect();
        self.depthtex = Some(depthtex);
        self.randomtex = Some(randomtex);
        if let Some(fbo) = self.core.fbo {
            device.set_color_attachments(fbo, &[aotex]);
            device.set_depth_attachment(fbo, None);
        }
    }
}

impl RenderPass for AoPass {
    fn name(&self) -> &'static str {
        "AOPass"
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
        set_input_uniforms(device, &self.colortex, self.depthtex);
        set_random_uniforms(device, self.randomtex.map(|t| (t, RANDOM_TEXTURE_SIZE)), &self.core);
        device.draw_mesh(quad);
    }
}
