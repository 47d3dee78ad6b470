//! Hand tracking results and gesture recognition.

mod gesture;
mod joints;
mod normalize;
mod stream;
mod tracker;

pub use gesture::{
    classify, classify_joints, classify_with, Conditions, Gesture, StrictType, Type,
};
pub use joints::{HandJoints, JointName, JointsError, BUFFER_LEN, JOINT_COUNT};
pub use normalize::{normalize, normalize_with, CanonicalHand, DEFAULT_MIN_HAND_SCALE};
pub use stream::{HandFrame, HandResult, HandTrackingStream, VISIBLE_STATE};
pub use tracker::{ClickDetector, HandTracker, PressState};

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum HandSide {
    #[default]
    Unknown,
    Right,
    Left,
}

impl HandSide {
    /// Prefix of this side's fields in the hand tracking layout.
    pub const fn field_prefix(self) -> Option<&'static str> {
        match self {
            Self::Left => Some("left"),
            Self::Right => Some("right"),
            Self::Unknown => None,
        }
    }
}
