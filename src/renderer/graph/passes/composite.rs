//! Composite / Display Pass
//!
//! A fullscreen shader over N input textures. The same type serves as the
//! composite pass and the display pass; what it computes is decided by its
//! fragment shader alone (lighting, albedo, normal, depth or segmentation
//! visualization, tone mapping), with no other state change.
//!
//! Inputs are bound as `colortex0..N-1` in the order given, plus the scene
//! depth as `depthtex0`.

use smallvec::SmallVec;

use crate::renderer::core::{GraphicsDevice, RasterState, TextureId};
use crate::renderer::graph::pass::{
    FrameContext, PassCapabilities, PassCore, RenderPass, set_camera_uniforms, set_input_uniforms,
};

#[derive(Debug)]
pub struct CompositePass {
    name: &'static str,
    core: PassCore,
    inputs: SmallVec<[TextureId; 8]>,
    depthtex: Option<TextureId>,
}

impl CompositePass {
    /// `name` labels the instance in logs (`"CompositePass"`, `"DisplayPass"`).
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            core: PassCore::default(),
            inputs: SmallVec::new(),
            depthtex: None,
        }
    }

    pub fn set_attachments(
        &mut self,
        device: &mut dyn GraphicsDevice,
        output: TextureId,
        inputs: &[TextureId],
        depthtex: TextureId,
    ) {
        self.inputs = inputs.iter().copied().collect();
        self.depthtex = Some(depthtex);
        if let Some(fbo) = self.core.fbo {
            device.set_color_attachments(fbo, &[output]);
            device.set_depth_attachment(fbo, None);
        }
    }
}

impl RenderPass for CompositePass {
    fn name(&self) -> &'static str {
        self.name
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
        set_input_uniforms(device, &self.inputs, self.depthtex);
        device.draw_mesh(quad);
    }
}
