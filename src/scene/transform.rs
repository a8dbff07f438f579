//! Transform helpers shared by objects, cameras and axis gizmos.

use glam::{Mat3, Mat4, Quat, Vec3};

/// Builds a local matrix from position, rotation and scale.
///
/// Equivalent to `toMat4(rotation)` with column `i` scaled by `scale[i]`
/// and the translation column set to `position`.
#[inline]
#[must_use]
pub fn local_matrix(position: Vec3, rotation: Quat, scale: Vec3) -> Mat4 {
    Mat4::from_scale_rotation_translation(scale, rotation, position)
}

/// Rotation whose local -Z axis faces `direction`, with `up` as the
/// approximate local +Y axis.
///
/// `direction` is normalized here; `up` only needs to be non-parallel.
#[must_use]
pub fn quat_look_at(direction: Vec3, up: Vec3) -> Quat {
    let back = -direction.normalize();
    let right = up.cross(back);
    let right = right / right.length_squared().max(1e-5).sqrt();
    let true_up = back.cross(right);
    Quat::from_mat3(&Mat3::from_cols(right, true_up, back))
}

/// Rotation-and-translation matrix of a rigid frame (no scale).
#[inline]
#[must_use]
pub fn rigid_matrix(position: Vec3, rotation: Quat) -> Mat4 {
    Mat4::from_rotation_translation(rotation, position)
}
