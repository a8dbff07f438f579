//! Axis Gizmo Pass
//!
//! Draws red/green/blue bars for the X/Y/Z axes into `lightingtex`,
//! depth-tested against the GBuffer depth so scene geometry hides them.
//!
//! - The global gizmo sits at the world origin: bars of length 1 and
//!   thickness 0.01.
//! - Every [`Scene::add_axes`](crate::scene::Scene::add_axes) placement gets
//!   a gizmo of length 0.1 and thickness 0.005.
//!
//! Gizmo pixels also write the configured axis object id to `segtex1`, so
//! picking can tell them apart.

use glam::{Mat4, Vec3, Vec4};

use crate::renderer::core::{GraphicsDevice, RasterState, TextureId};
use crate::renderer::graph::pass::{FrameContext, PassCapabilities, PassCore, RenderPass, set_camera_uniforms};
use crate::scene::mesh::Mesh;
use crate::scene::scene::AxesPlacement;

const GLOBAL_LENGTH: f32 = 1.0;
const GLOBAL_THICKNESS: f32 = 0.01;
const LOCAL_LENGTH: f32 = 0.1;
const LOCAL_THICKNESS: f32 = 0.005;

const AXES: [(Vec3, Vec4); 3] = [
    (Vec3::X, Vec4::new(1.0, 0.0, 0.0, 1.0)),
    (Vec3::Y, Vec4::new(0.0, 1.0, 0.0, 1.0)),
    (Vec3::Z, Vec4::new(0.0, 0.0, 1.0, 1.0)),
];

#[derive(Debug, Default)]
pub struct AxisPass {
    core: PassCore,
    cube: Option<Mesh>,
}

impl AxisPass {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `colors` is `[lightingtex, segtex1]`.
    pub fn set_attachments(&mut self, device: &mut dyn GraphicsDevice, colors: &[TextureId], depth: TextureId) {
        if let Some(fbo) = self.core.fbo {
            device.set_color_attachments(fbo, colors);
            device.set_depth_attachment(fbo, Some(depth));
        }
    }
}

fn draw_gizmo(device: &mut dyn GraphicsDevice, cube: &Mesh, base: Mat4, length: f32, thickness: f32) {
    for (axis, color) in AXES {
        // Cube spans [-1, 1]: offsetting by `length` puts one end on the origin.
        let size = Vec3::splat(thickness) + axis * (length - thickness);
        let model = base * Mat4::from_translation(axis * length) * Mat4::from_scale(size);
        device.set_uniform("gbufferModelMatrix", model.into());
        device.set_uniform("color", color.into());
        device.draw_mesh(cube);
    }
}

/// `toMat4(rotation)` with its diagonal scaled and `position` as translation.
fn placement_matrix(p: &AxesPlacement) -> Mat4 {
    let mut m = Mat4::from_quat(p.rotation);
    m.x_axis.x *= p.scale.x;
    m.y_axis.y *= p.scale.y;
    m.z_axis.z *= p.scale.z;
    m.w_axis = p.position.extend(1.0);
    m
}

impl RenderPass for AxisPass {
    fn name(&self) -> &'static str {
        "AxisPass"
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

    fn init(&mut self, _device: &mut dyn GraphicsDevice) {
        if self.cube.is_none() {
            self.cube = Some(Mesh::cube());
        }
        self.core.initialized = true;
    }

    fn render(&self, device: &mut dyn GraphicsDevice, frame: &FrameContext<'_>) {
        let Some(cube) = &self.cube else {
            return;
        };
        let axis = frame.settings.axis;
        let placements = frame.scene.axes();
        if !axis.global_axes && placements.is_empty() {
            return;
        }
        if !self.core.begin(device, self.capabilities(), RasterState::OPAQUE) {
            return;
        }

        set_camera_uniforms(device, frame.camera);
        device.set_uniform("segmentation2", axis.object_id.into());

        if axis.global_axes {
            draw_gizmo(device, cube, Mat4::IDENTITY, GLOBAL_LENGTH, GLOBAL_THICKNESS);
        }
        for placement in placements {
            draw_gizmo(device, cube, placement_matrix(placement), LOCAL_LENGTH, LOCAL_THICKNESS);
        }
    }
}
