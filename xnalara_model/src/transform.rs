//! Euler angle conventions shared by poses and bone transforms.
use std::f32::consts::TAU;

use glam::{Mat4, Vec3};

/// The rotation for XNALara Euler angles in radians.
///
/// Vertices are rotated around Z, then X, then Y.
/// This matches the order used by pose files from other XNALara based programs.
pub fn rotation_matrix(angles: Vec3) -> Mat4 {
    Mat4::from_rotation_y(angles.y) * Mat4::from_rotation_x(angles.x) * Mat4::from_rotation_z(angles.z)
}

/// Extract the Euler angles for [rotation_matrix] from the upper 3x3 of `matrix`.
///
/// The X angle is in the range `-PI/2` to `PI/2`.
/// When X is at either limit, Y and Z are not unique and the Z angle is set to `0.0`.
pub fn euler_angles(matrix: Mat4) -> Vec3 {
    let c0 = matrix.x_axis;
    let c1 = matrix.y_axis;
    let c2 = matrix.z_axis;

    let x = (-c2.y).clamp(-1.0, 1.0).asin();
    let cos_x = x.cos();
    if cos_x.abs() > 1e-6 {
        let y = (c2.x / cos_x).atan2(c2.z / cos_x);
        let z = (c0.y / cos_x).atan2(c1.y / cos_x);
        Vec3::new(x, y, z)
    } else {
        // Gimbal lock.
        let y = if x.sin() > 0.0 {
            c1.x.atan2(c1.z)
        } else {
            (-c0.z).atan2(c0.x)
        };
        Vec3::new(x, y, 0.0)
    }
}

/// Wrap each angle to the range `0.0..TAU`.
pub fn normalize_angles(angles: Vec3) -> Vec3 {
    Vec3::new(
        angles.x.rem_euclid(TAU),
        angles.y.rem_euclid(TAU),
        angles.z.rem_euclid(TAU),
    )
}
