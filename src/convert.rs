//! Conversions from the services' computer-vision conventions into engine space.
//!
//! The services report positions in millimeters with Y pointing down. The engine works in meters
//! with Y up, and its Z axis points away from the viewer while the services' SLAM matrices use
//! the opposite handedness.

use glam::{Mat4, Quat, Vec3};

const MILLIMETERS_TO_METERS: f32 = 0.001;

/// Flips Y and converts millimeters to meters.
#[inline]
pub fn cv_to_engine(v: Vec3) -> Vec3 {
    Vec3::new(v.x, -v.y, v.z) * MILLIMETERS_TO_METERS
}

/// Mirrors a rotation across the XY plane, which turns a right-handed rotation into the engine's
/// left-handed one.
#[inline]
pub fn mirror_z_rotation(q: Quat) -> Quat {
    Quat::from_xyzw(-q.x, -q.y, q.z, q.w)
}

#[inline]
pub fn mirror_z_position(v: Vec3) -> Vec3 {
    Vec3::new(v.x, v.y, -v.z)
}

/// Splits a rigid transform into rotation and translation, dropping any scale.
pub fn rotation_translation(m: Mat4) -> (Quat, Vec3) {
    let (_, rot, pos) = m.to_scale_rotation_translation();
    (rot, pos)
}

/// Converts a SLAM world-to-camera matrix into the camera's engine-space pose.
pub fn slam_camera_pose(world_to_camera: Mat4) -> (Vec3, Quat) {
    let (rot, pos) = rotation_translation(world_to_camera.inverse());
    (mirror_z_position(pos), mirror_z_rotation(rot))
}

/// Converts a SLAM plane model matrix into an engine-space pose.
pub fn slam_model_pose(model: Mat4) -> (Vec3, Quat) {
    let (rot, pos) = rotation_translation(model);
    (mirror_z_position(pos), mirror_z_rotation(rot))
}

/// Camera pose relative to a detected plane, both given as raw SLAM matrices.
pub fn slam_relative_pose(world_to_camera: Mat4, model: Mat4) -> (Vec3, Quat) {
    let camera = world_to_camera.inverse();
    let (cam_rot, cam_pos) = rotation_translation(camera);
    let (plane_rot, _) = rotation_translation(model);

    let rot = mirror_z_rotation(plane_rot).inverse() * mirror_z_rotation(cam_rot);
    let pos = model.inverse().transform_point3(cam_pos);
    (mirror_z_position(pos), rot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn cv_points() {
        let v = cv_to_engine(Vec3::new(100.0, 250.0, -40.0));
        assert_eq!(v, Vec3::new(100.0 * 0.001, -250.0 * 0.001, -40.0 * 0.001));
    }

    #[test]
    fn camera_pose_inverts_and_mirrors() {
        // camera sits at (1, 2, 3) in the SLAM world, rotated 90 degrees about Y
        let camera_to_world = Mat4::from_rotation_translation(
            Quat::from_rotation_y(FRAC_PI_2),
            Vec3::new(1.0, 2.0, 3.0),
        );
        let (pos, rot) = slam_camera_pose(camera_to_world.inverse());
        assert!(pos.abs_diff_eq(Vec3::new(1.0, 2.0, -3.0), 1e-5));

        let expected = Quat::from_rotation_y(-FRAC_PI_2);
        assert!(rot.dot(expected).abs() > 1.0 - 1e-5, "{rot:?}");
    }

    #[test]
    fn relative_to_identity_plane_is_absolute() {
        let camera_to_world = Mat4::from_rotation_translation(
            Quat::from_rotation_x(0.3),
            Vec3::new(0.5, -1.0, 2.0),
        );
        let world_to_camera = camera_to_world.inverse();
        let (abs_pos, abs_rot) = slam_camera_pose(world_to_camera);
        let (rel_pos, rel_rot) = slam_relative_pose(world_to_camera, Mat4::IDENTITY);
        assert!(abs_pos.abs_diff_eq(rel_pos, 1e-5));
        assert!(abs_rot.dot(rel_rot).abs() > 1.0 - 1e-5);
    }
}
