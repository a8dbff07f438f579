//! Cameras
//!
//! [`CameraSpec`] is what the pipeline consumes: a rigid frame plus a
//! projection. Matrices follow GL conventions (right-handed, clip z in
//! [-w, w]) so depth readbacks land in [0, 1].
//!
//! - [`Camera`]: position/rotation with a perspective or orthographic
//!   projection.
//! - [`FpsCamera`]: a perspective camera driven by yaw/pitch around a fixed
//!   forward/up frame.

use std::f32::consts::{FRAC_PI_2, PI};

use glam::{Mat3, Mat4, Quat, Vec3};

use super::transform::{quat_look_at, rigid_matrix};

/// Read-only camera interface used by every pass.
pub trait CameraSpec {
    fn position(&self) -> Vec3;
    fn rotation(&self) -> Quat;
    fn near(&self) -> f32;
    fn far(&self) -> f32;
    fn projection_matrix(&self) -> Mat4;

    /// Camera-to-world matrix.
    fn model_matrix(&self) -> Mat4 {
        rigid_matrix(self.position(), self.rotation())
    }

    /// World-to-camera matrix, `inverse(model)`.
    fn view_matrix(&self) -> Mat4 {
        self.model_matrix().inverse()
    }

    /// View matrix used for environment lookups. Defaults to the view matrix.
    fn environment_view_matrix(&self) -> Mat4 {
        self.view_matrix()
    }
}

// ============================================================================
// Camera
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    /// Vertical field of view in radians.
    Perspective { fovy: f32 },
    /// Half-height of the view volume.
    Orthographic { scaling: f32 },
}

#[derive(Debug, Clone)]
pub struct Camera {
    pub name: String,
    pub position: Vec3,
    rotation: Quat,
    pub near: f32,
    pub far: f32,
    pub aspect: f32,
    pub projection: Projection,
}

impl Camera {
    /// Perspective camera with a 35° vertical field of view.
    #[must_use]
    pub fn perspective() -> Self {
        Self::with_projection(Projection::Perspective {
            fovy: 35f32.to_radians(),
        })
    }

    #[must_use]
    pub fn orthographic(scaling: f32) -> Self {
        Self::with_projection(Projection::Orthographic { scaling })
    }

    fn with_projection(projection: Projection) -> Self {
        Self {
            name: String::new(),
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            near: 0.1,
            far: 1000.0,
            aspect: 1.0,
            projection,
        }
    }

    /// Sets the rotation; the quaternion is normalized.
    pub fn set_rotation(&mut self, rotation: Quat) {
        self.rotation = rotation.normalize();
    }

    /// Orients the camera so it looks along `direction`.
    pub fn look_at(&mut self, direction: Vec3, up: Vec3) {
        self.rotation = quat_look_at(direction, up);
    }

    /// Vertical field of view; zero for orthographic cameras.
    #[must_use]
    pub fn fovy(&self) -> f32 {
        match self.projection {
            Projection::Perspective { fovy } => fovy,
            Projection::Orthographic { .. } => 0.0,
        }
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::perspective()
    }
}

impl CameraSpec for Camera {
    fn position(&self) -> Vec3 {
        self.position
    }

    fn rotation(&self) -> Quat {
        self.rotation
    }

    fn near(&self) -> f32 {
        self.near
    }

    fn far(&self) -> f32 {
        self.far
    }

    fn projection_matrix(&self) -> Mat4 {
        match self.projection {
            Projection::Perspective { fovy } => {
                Mat4::perspective_rh_gl(fovy, self.aspect, self.near, self.far)
            }
            Projection::Orthographic { scaling } => Mat4::orthographic_rh_gl(
                -scaling * self.aspect,
                scaling * self.aspect,
                -scaling,
                scaling,
                self.near,
                self.far,
            ),
        }
    }
}

// ============================================================================
// FPS Camera
// ============================================================================

/// Pitch stays this far away from straight up/down.
const PITCH_MARGIN: f32 = 0.05;

/// A perspective camera rotated by yaw around `up` and pitch around `right`.
#[derive(Debug, Clone)]
pub struct FpsCamera {
    pub camera: Camera,
    yaw: f32,
    pitch: f32,
    forward: Vec3,
    up: Vec3,
}

impl FpsCamera {
    /// Looks down -Z with +Y up.
    #[must_use]
    pub fn new() -> Self {
        let mut cam = Self {
            camera: Camera::perspective(),
            yaw: 0.0,
            pitch: 0.0,
            forward: Vec3::NEG_Z,
            up: Vec3::Y,
        };
        cam.update();
        cam
    }

    /// Sets the reference forward direction (unit length).
    pub fn set_forward(&mut self, dir: Vec3) {
        self.forward = dir;
    }

    /// Sets the reference up direction (unit length).
    pub fn set_up(&mut self, dir: Vec3) {
        self.up = dir;
    }

    #[must_use]
    pub fn yaw(&self) -> f32 {
        self.yaw
    }

    #[must_use]
    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    /// Whether forward/up are unit length and orthogonal.
    #[must_use]
    pub fn is_sane(&self) -> bool {
        let close = |a: f32, b: f32| (a - b).abs() < 1e-4;
        close(self.forward.length(), 1.0)
            && close(self.up.length(), 1.0)
            && close(self.forward.dot(self.up), 0.0)
    }

    /// The orientation with zero yaw and pitch.
    #[must_use]
    pub fn rotation0(&self) -> Quat {
        let right = self.forward.cross(self.up);
        Quat::from_mat3(&Mat3::from_cols(right, self.up, -self.forward))
    }

    /// Recomputes the rotation from yaw, pitch and the reference frame.
    pub fn update(&mut self) {
        let right = self.forward.cross(self.up);
        let rotation = Quat::from_axis_angle(self.up, self.yaw)
            * Quat::from_axis_angle(right, self.pitch)
            * self.rotation0();
        self.camera.set_rotation(rotation);
    }

    /// Adds to yaw (wrapped into [-π, π)) and pitch (clamped short of the
    /// poles), then updates the rotation.
    pub fn rotate_yaw_pitch(&mut self, d_yaw: f32, d_pitch: f32) {
        self.yaw += d_yaw;
        self.pitch += d_pitch;
        if self.yaw >= PI {
            self.yaw -= 2.0 * PI;
        } else if self.yaw < -PI {
            self.yaw += 2.0 * PI;
        }
        self.pitch = self
            .pitch
            .clamp(-FRAC_PI_2 + PITCH_MARGIN, FRAC_PI_2 - PITCH_MARGIN);
        self.update();
    }

    /// Moves along the current view direction and its right vector.
    pub fn move_forward_right(&mut self, d_forward: f32, d_right: f32) {
        let forward_global = self.camera.rotation * Vec3::NEG_Z;
        let right_global = forward_global.cross(self.up);
        self.camera.position += d_forward * forward_global + d_right * right_global;
    }
}

impl Default for FpsCamera {
    fn default() -> Self {
        Self::new()
    }
}

impl CameraSpec for FpsCamera {
    fn position(&self) -> Vec3 {
        self.camera.position
    }

    fn rotation(&self) -> Quat {
        self.camera.rotation
    }

    fn near(&self) -> f32 {
        self.camera.near
    }

    fn far(&self) -> f32 {
        self.camera.far
    }

    fn projection_matrix(&self) -> Mat4 {
        self.camera.projection_matrix()
    }

    /// Yaw/pitch about the world axes only, so the skybox ignores the
    /// reference frame.
    fn environment_view_matrix(&self) -> Mat4 {
        let local = Quat::from_axis_angle(Vec3::Y, self.yaw) * Quat::from_axis_angle(Vec3::X, self.pitch);
        rigid_matrix(self.camera.position, local).inverse()
    }
}
