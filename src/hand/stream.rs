use super::joints::HandJoints;
use super::HandSide;
use crate::memory::{DecodeError, DecodedFrame, FrameDecoder, Layout, SharedMemory};
use glam::Vec3;
use log::debug;

/// `state` value the hand tracking service reports for a hand that is in view.
pub const VISIBLE_STATE: i32 = 2;

/// One hand's slice of a hand tracking result. Positions are in engine space.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HandResult {
    pub state: i32,
    pub visible: bool,
    /// Gesture the service itself recognized: rule id, then type id.
    pub gesture_rule: i32,
    pub gesture_type: i32,
    /// Bounding boxes as x, y, w, h, score, first in the left camera image then the right.
    pub rects: [f32; 10],
    pub joints: HandJoints,
    pub mesh: Vec<Vec3>,
    pub pose: Vec<f32>,
}

impl HandResult {
    fn from_frame(frame: &DecodedFrame, prefix: &str) -> Option<Self> {
        let field = |name: &str| format!("{prefix}_{name}");

        let state = frame.i32(&field("state"))?;
        let gesture = frame.i32s(&field("gesture"))?;
        let rects = frame.f32s(&field("rect"))?.try_into().ok()?;
        let joints = HandJoints::from_points(frame.vec3s(&field("joints"))?).ok()?;

        Some(Self {
            state,
            visible: state == VISIBLE_STATE,
            gesture_rule: gesture.first().copied().unwrap_or_default(),
            gesture_type: gesture.get(1).copied().unwrap_or_default(),
            rects,
            joints,
            mesh: frame.vec3s(&field("mesh"))?.to_vec(),
            pose: frame.f32s(&field("pose"))?.to_vec(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct HandFrame {
    pub timestamp: f64,
    pub left: HandResult,
    pub right: HandResult,
}

impl HandFrame {
    pub fn hand(&self, side: HandSide) -> Option<&HandResult> {
        match side {
            HandSide::Left => Some(&self.left),
            HandSide::Right => Some(&self.right),
            HandSide::Unknown => None,
        }
    }
}

/// Polls the hand tracking service's result region.
pub struct HandTrackingStream {
    decoder: FrameDecoder,
    latest: Option<HandFrame>,
}

impl Default for HandTrackingStream {
    fn default() -> Self {
        Self::new(Layout::hand_tracking())
    }
}

impl HandTrackingStream {
    /// `layout` must carry the fields of [`Layout::hand_tracking`].
    pub fn new(layout: Layout) -> Self {
        Self {
            decoder: FrameDecoder::new(layout),
            latest: None,
        }
    }

    #[inline]
    pub fn latest(&self) -> Option<&HandFrame> {
        self.latest.as_ref()
    }

    /// Reads the region and returns the new frame, or `None` when nothing new was published.
    /// The last good frame stays available through [`latest`](Self::latest) either way.
    pub fn poll<M: SharedMemory + ?Sized>(
        &mut self,
        memory: &M,
    ) -> Result<Option<&HandFrame>, DecodeError> {
        let Some(frame) = self.decoder.decode(memory)?.updated() else {
            return Ok(None);
        };

        let (Some(left), Some(right)) = (
            HandResult::from_frame(&frame, "left"),
            HandResult::from_frame(&frame, "right"),
        ) else {
            debug!(
                "layout {:?} is missing hand fields, dropping frame",
                self.decoder.layout().name()
            );
            return Ok(None);
        };

        self.latest = Some(HandFrame {
            timestamp: frame.timestamp.unwrap_or_default(),
            left,
            right,
        });
        Ok(self.latest.as_ref())
    }
}
