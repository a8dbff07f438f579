//! Forward Transparency Pass
//!
//! Shades the transparent list directly into `lightingtex` with
//! `SRC_ALPHA, ONE_MINUS_SRC_ALPHA` blending. Objects are drawn in
//! flattening order; there is no distance sort, so overlapping transparent
//! objects blend in scene-graph order.
//!
//! Depth is tested against the GBuffer depth but never written: opaque
//! geometry hides transparent geometry, transparent geometry hides nothing.

use crate::renderer::core::{GraphicsDevice, RasterState, TextureId};
use crate::renderer::graph::pass::{
    FrameContext, PassCapabilities, PassCore, RenderPass, clear_segmentation_uniforms, set_camera_uniforms,
    set_light_uniforms, set_object_uniforms, set_random_uniforms, set_segmentation_uniforms, set_shadow_uniforms,
};
use crate::renderer::textures::RANDOM_TEXTURE_SIZE;

#[derive(Debug, Default)]
pub struct TransparencyPass {
    core: PassCore,
    randomtex: Option<TextureId>,
    shadowtex: Option<(TextureId, u32)>,
}

impl TransparencyPass {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `colors` is `[lightingtex, segtex0, segtex1, segtex2]`.
    pub fn set_attachments(
        &mut self,
        device: &mut dyn GraphicsDevice,
        colors: &[TextureId],
        depth: TextureId,
        randomtex: TextureId,
    ) {
        self.randomtex = Some(randomtex);
        if let Some(fbo) = self.core.fbo {
            device.set_color_attachments(fbo, colors);
            device.set_depth_attachment(fbo, Some(depth));
        }
    }

    pub fn set_shadow_texture(&mut self, shadowtex: Option<(TextureId, u32)>) {
        self.shadowtex = shadowtex;
    }
}

impl RenderPass for TransparencyPass {
    fn name(&self) -> &'static str {
        "TransparencyPass"
    }

    fn capabilities(&self) -> PassCapabilities {
        PassCapabilities::DEPTH_ATTACHMENT
    }

    fn core(&self) -> &PassCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut PassCore {
        &mut self.core
    }

    fn render(&self, device: &mut dyn GraphicsDevice, frame: &FrameContext<'_>) {
        let transparent = frame.scene.transparent_objects();
        if transparent.is_empty() {
            return;
        }
        if !self.core.begin(device, self.capabilities(), RasterState::TRANSPARENT) {
            return;
        }

        set_camera_uniforms(device, frame.camera);
        set_light_uniforms(device, frame.scene);
        set_random_uniforms(device, self.randomtex.map(|t| (t, RANDOM_TEXTURE_SIZE)), &self.core);
        set_shadow_uniforms(device, frame.shadow, self.shadowtex);
        if !frame.settings.segmentation {
            clear_segmentation_uniforms(device);
        }

        for key in transparent {
            let Some(object) = frame.scene.object(*key) else {
                continue;
            };
            let Some(mesh) = object.mesh() else {
                continue;
            };
            set_object_uniforms(device, object);
            if frame.settings.segmentation {
                set_segmentation_uniforms(device, object);
            }
            device.draw_mesh(mesh);
        }
    }
}
