//! Geometry (GBuffer) Pass
//!
//! Rasterizes the opaque list into seven color attachments plus depth:
//!
//! ```text
//! location 0  colortex0  albedo
//! location 1  colortex1  view-space normal · 0.5 + 0.5
//! location 2  colortex2  roughness, metallic, specular
//! location 3  segtex0    segment id        (R32I)
//! location 4  segtex1    object id         (R32I)
//! location 5  segtex2    palette color
//! location 6  usertex0   user data, first column
//! depth       depthtex
//! ```
//!
//! An object may carry its own program; it is used in place of the pass
//! program and receives the camera uniforms again.

use crate::renderer::core::{GraphicsDevice, ProgramId, RasterState, TextureId};
use crate::renderer::graph::pass::{
    FrameContext, PassCapabilities, PassCore, RenderPass, clear_segmentation_uniforms, set_camera_uniforms,
    set_object_uniforms, set_segmentation_uniforms,
};

#[derive(Debug)]
pub struct GBufferPass {
    core: PassCore,
    /// Clear depth before drawing. Turn off to accumulate geometry from
    /// several passes into one depth target.
    pub clear_depth: bool,
}

impl Default for GBufferPass {
    fn default() -> Self {
        Self {
            core: PassCore::default(),
            clear_depth: true,
        }
    }
}

impl GBufferPass {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_attachments(&mut self, device: &mut dyn GraphicsDevice, colors: &[TextureId], depth: TextureId) {
        let Some(fbo) = self.core.fbo else {
            return;
        };
        device.set_color_attachments(fbo, colors);
        device.set_depth_attachment(fbo, Some(depth));
    }
}

impl RenderPass for GBufferPass {
    fn name(&self) -> &'static str {
        "GBufferPass"
    }

    fn capabilities(&self) -> PassCapabilities {
        let mut caps = PassCapabilities::DEPTH_ATTACHMENT | PassCapabilities::CLEARS_COLOR;
        if self.clear_depth {
            caps |= PassCapabilities::CLEARS_DEPTH;
        }
        caps
    }

    fn core(&self) -> &PassCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut PassCore {
        &mut self.core
    }

    fn render(&self, device: &mut dyn GraphicsDevice, frame: &FrameContext<'_>) {
        let Some(default_program) = self.core.program else {
            return;
        };
        if !self.core.begin(device, self.capabilities(), RasterState::OPAQUE) {
            return;
        }
        set_camera_uniforms(device, frame.camera);
        if !frame.settings.segmentation {
            clear_segmentation_uniforms(device);
        }

        let mut current: ProgramId = default_program;
        for key in frame.scene.opaque_objects() {
            let Some(object) = frame.scene.object(*key) else {
                continue;
            };
            let Some(mesh) = object.mesh() else {
                continue;
            };

            let program = object.shader.unwrap_or(default_program);
            if program != current {
                device.use_program(Some(program));
                set_camera_uniforms(device, frame.camera);
                if !frame.settings.segmentation {
                    clear_segmentation_uniforms(device);
                }
                current = program;
            }

            set_object_uniforms(device, object);
            if frame.settings.segmentation {
                set_segmentation_uniforms(device, object);
            }
            device.draw_mesh(mesh);
        }
    }
}
