//! Directional Shadow Pass
//!
//! Renders the depth of every opaque object from directional light 0 into a
//! square `shadowtex`. Transparent objects never cast shadows.
//!
//! The light frame comes from [`ShadowFrame`](crate::renderer::graph::ShadowFrame)
//! and is re-centered on the camera each frame. Without a directional light
//! the pass is skipped and the lighting pass sees shadows disabled.

use crate::renderer::core::{GraphicsDevice, RasterState, TextureId};
use crate::renderer::graph::pass::{FrameContext, PassCapabilities, PassCore, RenderPass};

#[derive(Debug, Default)]
pub struct ShadowPass {
    core: PassCore,
}

impl ShadowPass {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `shadowtex` the depth attachment; the viewport follows its size.
    pub fn set_depth_attachment(&mut self, device: &mut dyn GraphicsDevice, shadowtex: TextureId, map_size: u32) {
        self.core.set_size(map_size, map_size);
        let Some(fbo) = self.core.fbo else {
            return;
        };
        device.set_color_attachments(fbo, &[]);
        device.set_depth_attachment(fbo, Some(shadowtex));
    }
}

impl RenderPass for ShadowPass {
    fn name(&self) -> &'static str {
        "ShadowPass"
    }

    fn capabilities(&self) -> PassCapabilities {
        PassCapabilities::DEPTH_ATTACHMENT | PassCapabilities::CLEARS_DEPTH
    }

    fn core(&self) -> &PassCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut PassCore {
        &mut self.core
    }

    fn render(&self, device: &mut dyn GraphicsDevice, frame: &FrameContext<'_>) {
        let Some(shadow) = frame.shadow else {
            return;
        };
        if !self.core.begin(device, self.capabilities(), RasterState::OPAQUE) {
            return;
        }

        device.set_uniform("lightSpaceMatrix", shadow.light_space.into());
        for key in frame.scene.opaque_objects() {
            let Some(object) = frame.scene.object(*key) else {
                continue;
            };
            let Some(mesh) = object.mesh() else {
                continue;
            };
            device.set_uniform("gbufferModelMatrix", object.global_model_matrix().into());
            device.draw_mesh(mesh);
        }
    }
}
