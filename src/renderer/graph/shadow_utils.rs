//! Shadow Utilities
//!
//! Pure math for the directional shadow map, shared by the shadow, lighting
//! and transparency passes.
//!
//! The light frustum is re-centered on the camera every frame: the light
//! view is a look-at from the camera origin toward the light direction
//! expressed in camera space, and the projection is a cube of half-extent
//! `frustum_size` around it. It is never fitted to scene content.

use glam::{Mat4, Vec3, Vec4Swizzles};

use crate::scene::camera::CameraSpec;
use crate::scene::light::DirectionalLight;

/// Light frame of one directional light for the current camera.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowFrame {
    /// World to camera (the camera view matrix).
    pub world_to_camera: Mat4,
    /// Camera space to light view space.
    pub camera_to_light: Mat4,
    /// Orthographic light projection.
    pub projection: Mat4,
    /// `projection · camera_to_light · world_to_camera`.
    pub light_space: Mat4,
    pub direction: Vec3,
    pub emission: Vec3,
}

impl ShadowFrame {
    #[must_use]
    pub fn compute(camera: &dyn CameraSpec, light: &DirectionalLight, frustum_size: f32) -> Self {
        let world_to_camera = camera.view_matrix();
        let camera_to_light = light_view(world_to_camera, light.direction);
        let projection = light_projection(frustum_size);
        Self {
            world_to_camera,
            camera_to_light,
            projection,
            light_space: projection * camera_to_light * world_to_camera,
            direction: light.direction,
            emission: light.emission,
        }
    }
}

/// Look-at from the camera origin along `direction` rotated into camera space.
#[must_use]
pub fn light_view(world_to_camera: Mat4, direction: Vec3) -> Mat4 {
    let dir = (world_to_camera * direction.extend(0.0)).xyz().normalize_or(Vec3::NEG_Z);
    // look_at degenerates when the direction is parallel to the up vector.
    let up = if dir.cross(Vec3::Y).length_squared() < 1e-8 { Vec3::Z } else { Vec3::Y };
    Mat4::look_at_rh(Vec3::ZERO, dir, up)
}

#[inline]
#[must_use]
pub fn light_projection(frustum_size: f32) -> Mat4 {
    let v = frustum_size;
    Mat4::orthographic_rh_gl(-v, v, -v, v, -v, v)
}

#[cfg(test)]
mod tests {
    use glam::{Quat, Vec4};

    use super::*;
    use crate::scene::camera::Camera;

    #[test]
    fn light_space_reduces_to_light_view_for_identity_camera() {
        let camera = Camera::perspective();
        let light = DirectionalLight::new(Vec3::new(0.0, -1.0, -1.0), Vec3::ONE);
        let frame = ShadowFrame::compute(&camera, &light, 10.0);

        assert_eq!(frame.world_to_camera, Mat4::IDENTITY);
        // A point along the light direction lands on the light's view axis.
        let p = frame.camera_to_light.transform_point3(light.direction.normalize() * 3.0);
        assert!(p.x.abs() < 1e-5 && p.y.abs() < 1e-5);
        assert!((p.z + 3.0).abs() < 1e-5);
    }

    #[test]
    fn frustum_follows_camera_position() {
        let light = DirectionalLight::new(Vec3::NEG_Y, Vec3::ONE);
        let mut camera = Camera::perspective();
        camera.position = Vec3::new(100.0, 0.0, 0.0);
        camera.set_rotation(Quat::IDENTITY);
        let frame = ShadowFrame::compute(&camera, &light, 10.0);

        // The camera position maps to the center of the light clip cube.
        let clip = frame.light_space * Vec4::new(100.0, 0.0, 0.0, 1.0);
        assert!(clip.xyz().length() < 1e-4);
    }

    #[test]
    fn vertical_light_uses_fallback_up() {
        let view = light_view(Mat4::IDENTITY, Vec3::NEG_Y);
        assert!(view.is_finite());
    }
}
