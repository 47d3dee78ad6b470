use super::joints::{JointName, JOINT_COUNT};
use super::HandSide;
use glam::{Quat, Vec3};

/// Hands whose wrist to middle knuckle distance is below this are treated as untracked.
pub const DEFAULT_MIN_HAND_SCALE: f32 = 1e-6;

/// Length of the wrist to middle knuckle bone in canonical units.
const CANONICAL_SCALE: f32 = 1000.0;
const ANGLE_STEP: i32 = 5;

/// A hand scaled to unit size and rotated so the palm points up the Y axis, with the index
/// knuckle on the -X side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CanonicalHand {
    pub joints: [Vec3; JOINT_COUNT],
    /// Rotations applied to reach the canonical pose, in degrees within [0, 360).
    ///
    /// Each angle is the one its own pass applied, wrapped into range. This is not an Euler
    /// decomposition: a hand pitched past 90 degrees reports a pitch above 90 here where an
    /// engine's Euler angles would fold it back and add 180 to yaw and roll instead.
    pub rotate_x: f32,
    pub rotate_y: f32,
    pub rotate_z: f32,
}

impl CanonicalHand {
    #[inline]
    pub fn joint(&self, joint: JointName) -> Vec3 {
        self.joints[joint.index()]
    }
}

/// Snaps an angle to a multiple of five degrees, truncating toward zero.
#[inline]
fn quantize(degrees: f32) -> f32 {
    ((degrees as i32) / ANGLE_STEP * ANGLE_STEP) as f32
}

/// Angle of `v` in degrees, measured as `atan2(y, x)` and turned a quarter so that a vector
/// pointing straight down reads as zero.
#[inline]
fn quarter_turned(y: f32, x: f32) -> f32 {
    y.atan2(x).to_degrees() + 90.0
}

fn rotate_all(joints: &mut [Vec3; JOINT_COUNT], rotation: Quat) {
    for joint in joints.iter_mut() {
        *joint = rotation * *joint;
    }
}

pub fn normalize(side: HandSide, joints: &[Vec3; JOINT_COUNT]) -> Option<CanonicalHand> {
    normalize_with(side, joints, DEFAULT_MIN_HAND_SCALE)
}

/// Returns `None` if the hand is smaller than `min_scale` (or not finite).
pub fn normalize_with(
    side: HandSide,
    joints: &[Vec3; JOINT_COUNT],
    min_scale: f32,
) -> Option<CanonicalHand> {
    use JointName::*;

    let scale = (joints[MMCP.index()] - joints[Wrist.index()]).length();
    if !scale.is_finite() || scale < min_scale {
        return None;
    }

    // Left hands are mirrored into the right hand convention.
    let mirror = match side {
        HandSide::Left => Vec3::new(1.0, 1.0, -1.0),
        HandSide::Right | HandSide::Unknown => Vec3::ONE,
    };
    let mut j = joints.map(|p| p * mirror / scale);

    // Roll: wrist straight below the middle knuckle.
    let pivot = j[MMCP.index()];
    let palm = j[Wrist.index()] - pivot;
    let rotate_z = quantize(-quarter_turned(palm.y, palm.x));
    let rotation = Quat::from_rotation_z(rotate_z.to_radians());
    for joint in j.iter_mut() {
        *joint = rotation * (*joint - pivot) * CANONICAL_SCALE;
    }

    // Pitch: the same bone, now in the YZ plane.
    let palm = j[Wrist.index()] - j[MMCP.index()];
    let rotate_x = quantize(quarter_turned(palm.y, palm.z));
    rotate_all(&mut j, Quat::from_rotation_x(rotate_x.to_radians()));

    // Yaw: knuckle line from pinky to index along -X.
    let knuckles = j[IMCP.index()] - j[PMCP.index()];
    let rotate_y = quantize(-quarter_turned(knuckles.x, knuckles.z));
    rotate_all(&mut j, Quat::from_rotation_y(rotate_y.to_radians()));

    Some(CanonicalHand {
        joints: j,
        rotate_x: rotate_x.rem_euclid(360.0),
        rotate_y: rotate_y.rem_euclid(360.0),
        rotate_z: rotate_z.rem_euclid(360.0),
    })
}
