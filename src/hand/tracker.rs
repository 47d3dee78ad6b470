use super::gesture::{classify_with, Gesture, StrictType, Type};
use super::joints::JointName;
use super::stream::HandResult;
use super::HandSide;
use crate::settings::HandSettings;
use glam::Vec3;
use log::trace;

/// Follows one hand across samples: whether it is in view, its gesture, and a smoothed pointer
/// origin.
#[derive(Debug, Clone)]
pub struct HandTracker {
    side: HandSide,
    allow_unknown_gesture: bool,
    min_hand_scale: f32,
    ray_smoothing: f32,

    found: bool,
    last_found: bool,
    gesture: Gesture,
    last_gesture: Gesture,
    pointer_origin: Vec3,
}

impl HandTracker {
    pub fn new(side: HandSide) -> Self {
        Self::with_settings(side, &HandSettings::default())
    }

    pub fn with_settings(side: HandSide, settings: &HandSettings) -> Self {
        Self {
            side,
            allow_unknown_gesture: settings.allow_unknown_gesture,
            min_hand_scale: settings.min_hand_scale,
            ray_smoothing: settings.ray_smoothing,
            found: false,
            last_found: false,
            gesture: Gesture::UNKNOWN,
            last_gesture: Gesture::UNKNOWN,
            pointer_origin: Vec3::ZERO,
        }
    }

    #[inline]
    pub fn side(&self) -> HandSide {
        self.side
    }

    #[inline]
    pub fn found(&self) -> bool {
        self.found
    }

    #[inline]
    pub fn gesture(&self) -> Gesture {
        self.gesture
    }

    #[inline]
    pub fn last_gesture(&self) -> Gesture {
        self.last_gesture
    }

    /// Only meaningful while [`found`](Self::found).
    #[inline]
    pub fn pointer_origin(&self) -> Vec3 {
        self.pointer_origin
    }

    pub fn on_new_sample(&mut self, result: &HandResult) {
        if self.side == HandSide::Unknown {
            return;
        }

        self.last_found = self.found;
        self.last_gesture = self.gesture;
        self.found = result.visible;

        if !self.found {
            self.gesture = Gesture::UNKNOWN;
            return;
        }

        let gesture = classify_with(self.side, &result.joints, self.min_hand_scale);
        self.gesture = if !self.allow_unknown_gesture && gesture.strict_type() == StrictType::Unknown
        {
            self.last_gesture
        } else {
            gesture
        };

        let knuckle = result.joints[JointName::IMCP];
        self.pointer_origin = if self.last_found {
            self.pointer_origin * self.ray_smoothing + knuckle * (1.0 - self.ray_smoothing)
        } else {
            knuckle
        };

        trace!(
            "{:?} hand: {:?} at {}",
            self.side,
            self.gesture.strict_type(),
            self.pointer_origin
        );
    }

    /// Whether `strict` is being held, or the strict type has not changed since the last
    /// sample.
    pub fn keeping_strict(&self, strict: StrictType) -> bool {
        strict == self.gesture.strict_type()
            || self.gesture.strict_type() == self.last_gesture.strict_type()
    }

    pub fn released_strict(&self, strict: StrictType) -> bool {
        !self.keeping_strict(strict)
    }

    /// Whether either this sample or the previous one is of category `ty`.
    pub fn keeping(&self, ty: Type) -> bool {
        self.gesture.is_type(ty) || self.last_gesture.is_type(ty)
    }

    pub fn released(&self, ty: Type) -> bool {
        !self.keeping(ty)
    }
}

impl Default for HandTracker {
    fn default() -> Self {
        Self::new(HandSide::Unknown)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PressState {
    Pressed,
    Released,
    NotChanged,
}

/// Turns a held gesture into button-like press and release edges.
#[derive(Debug, Clone, Copy)]
pub struct ClickDetector {
    ty: Type,
    held: bool,
}

impl ClickDetector {
    pub fn new(ty: Type) -> Self {
        Self { ty, held: false }
    }

    #[inline]
    pub fn is_held(&self) -> bool {
        self.held
    }

    pub fn update(&mut self, gesture: &Gesture) -> PressState {
        let held = gesture.is_type(self.ty);
        let state = match (self.held, held) {
            (false, true) => PressState::Pressed,
            (true, false) => PressState::Released,
            _ => PressState::NotChanged,
        };
        self.held = held;
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hand::gesture::tests::{fist_hand, five_hand};
    use crate::hand::HandJoints;

    fn sample(visible: bool, joints: [Vec3; 21]) -> HandResult {
        HandResult {
            visible,
            joints: HandJoints::new(joints),
            ..Default::default()
        }
    }

    #[test]
    fn lost_hand_reports_unknown() {
        let mut tracker = HandTracker::new(HandSide::Right);
        tracker.on_new_sample(&sample(true, five_hand()));
        assert!(tracker.found());
        assert_eq!(tracker.gesture().strict_type(), StrictType::Five);

        tracker.on_new_sample(&sample(false, five_hand()));
        assert!(!tracker.found());
        assert_eq!(tracker.gesture(), Gesture::UNKNOWN);
        assert_eq!(tracker.last_gesture().strict_type(), StrictType::Five);
    }

    #[test]
    fn unknown_holds_previous_gesture() {
        let degenerate = [Vec3::ZERO; 21];

        let mut tracker = HandTracker::new(HandSide::Right);
        tracker.on_new_sample(&sample(true, fist_hand()));
        tracker.on_new_sample(&sample(true, degenerate));
        assert_eq!(tracker.gesture().strict_type(), StrictType::Fist);

        let settings = HandSettings {
            allow_unknown_gesture: true,
            ..Default::default()
        };
        let mut tracker = HandTracker::with_settings(HandSide::Right, &settings);
        tracker.on_new_sample(&sample(true, fist_hand()));
        tracker.on_new_sample(&sample(true, degenerate));
        assert_eq!(tracker.gesture(), Gesture::UNKNOWN);
    }

    #[test]
    fn pointer_origin_is_smoothed() {
        let mut tracker = HandTracker::new(HandSide::Right);
        let first = five_hand();
        tracker.on_new_sample(&sample(true, first));
        let start = first[JointName::IMCP.index()];
        assert_eq!(tracker.pointer_origin(), start);

        let moved = first.map(|p| p + Vec3::X * 10.0);
        tracker.on_new_sample(&sample(true, moved));
        let expected = start * 0.9 + (start + Vec3::X * 10.0) * (1.0 - 0.9);
        assert!(tracker.pointer_origin().abs_diff_eq(expected, 1e-4));

        // reacquiring after a loss jumps straight to the knuckle
        tracker.on_new_sample(&sample(false, moved));
        tracker.on_new_sample(&sample(true, moved));
        assert_eq!(tracker.pointer_origin(), start + Vec3::X * 10.0);
    }

    #[test]
    fn keeping_and_releasing() {
        let mut tracker = HandTracker::new(HandSide::Right);
        tracker.on_new_sample(&sample(true, fist_hand()));
        tracker.on_new_sample(&sample(true, fist_hand()));
        assert!(tracker.keeping_strict(StrictType::Fist));
        assert!(tracker.keeping(Type::Fist));

        tracker.on_new_sample(&sample(true, five_hand()));
        assert!(tracker.keeping(Type::Fist));
        assert!(tracker.keeping_strict(StrictType::Five));
        assert!(tracker.released_strict(StrictType::Fist));

        tracker.on_new_sample(&sample(true, five_hand()));
        assert!(tracker.released(Type::Fist));
        assert!(!tracker.released(Type::Five));
    }

    #[test]
    fn unknown_side_ignores_samples() {
        let mut tracker = HandTracker::default();
        tracker.on_new_sample(&sample(true, five_hand()));
        assert!(!tracker.found());
        assert_eq!(tracker.gesture(), Gesture::UNKNOWN);
    }

    #[test]
    fn click_edges() {
        let fist = Gesture::from_strict(StrictType::Fist);
        let five = Gesture::from_strict(StrictType::Five);
        let pinch = Gesture::from_strict(StrictType::Pinch);

        let mut click = ClickDetector::new(Type::Fist);
        assert_eq!(click.update(&five), PressState::NotChanged);
        assert_eq!(click.update(&fist), PressState::Pressed);
        assert_eq!(click.update(&pinch), PressState::NotChanged);
        assert!(click.is_held());
        assert_eq!(click.update(&five), PressState::Released);
        assert_eq!(click.update(&Gesture::UNKNOWN), PressState::NotChanged);
    }
}
