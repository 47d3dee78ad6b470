use super::joints::{HandJoints, JointName, JOINT_COUNT};
use super::normalize::{normalize_with, CanonicalHand, DEFAULT_MIN_HAND_SCALE};
use super::HandSide;
use crate::{tracy_span, warn_once};
use glam::Vec3;

/// Distance between thumb tip and index tip, in canonical units, under which the two count as
/// touching.
const THUMB_NEAR_INDEX: f32 = 350.0;

bitflags::bitflags! {
    /// Set of geometric facts about one hand pose.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Conditions: u32 {
        const PALM_FACING_CAMERA = 1 << 0;
        const THUMB_IS_OPEN = 1 << 1;
        const INDEX_IS_OPEN = 1 << 2;
        const MIDDLE_IS_OPEN = 1 << 3;
        const RING_IS_OPEN = 1 << 4;
        const PINKY_IS_OPEN = 1 << 5;
        const THUMB_IS_CLOSE = 1 << 6;
        const INDEX_IS_CLOSE = 1 << 7;
        const MIDDLE_IS_CLOSE = 1 << 8;
        const RING_IS_CLOSE = 1 << 9;
        const PINKY_IS_CLOSE = 1 << 10;
        const PALM_IS_VERTICAL = 1 << 11;
        const PALM_IS_HORIZON = 1 << 12;
        const THUMB_IS_RIGHT = 1 << 13;
        const THUMB_IS_DOWN = 1 << 14;
        const THUMB_IS_LEFT = 1 << 15;
        const THUMB_IS_UP = 1 << 16;
        const THUMB_NEAR_INDEX = 1 << 17;
    }
}

impl Default for Conditions {
    fn default() -> Self {
        Self::empty()
    }
}

/// A named hand pose, defined by the exact conditions it requires.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum StrictType {
    #[default]
    Unknown,
    Fist,
    One,
    Two,
    Three,
    Four,
    Five,
    Pinch,
    OK1,
    OK2,
    Yeah,
    Rock,
    SpiderMan,
}

impl StrictType {
    pub const fn bits(self) -> Conditions {
        use Conditions as C;
        let (thumb, index, middle, ring, pinky) = match self {
            Self::Unknown => return C::empty(),
            Self::Pinch => return C::THUMB_NEAR_INDEX,
            Self::OK2 => {
                return C::THUMB_NEAR_INDEX
                    .union(C::MIDDLE_IS_OPEN)
                    .union(C::RING_IS_OPEN)
                    .union(C::PINKY_IS_OPEN)
            }
            Self::Fist => (false, false, false, false, false),
            Self::One => (false, true, false, false, false),
            Self::Two => (true, true, false, false, false),
            Self::Three => (true, true, true, false, false),
            Self::Four => (false, true, true, true, true),
            Self::Five => (true, true, true, true, true),
            Self::OK1 => (false, false, true, true, true),
            Self::Yeah => (false, true, true, false, false),
            Self::Rock => (true, true, false, false, true),
            Self::SpiderMan => (false, true, false, false, true),
        };

        const fn finger(open: bool, if_open: Conditions, if_close: Conditions) -> Conditions {
            if open {
                if_open
            } else {
                if_close
            }
        }

        finger(thumb, C::THUMB_IS_OPEN, C::THUMB_IS_CLOSE)
            .union(finger(index, C::INDEX_IS_OPEN, C::INDEX_IS_CLOSE))
            .union(finger(middle, C::MIDDLE_IS_OPEN, C::MIDDLE_IS_CLOSE))
            .union(finger(ring, C::RING_IS_OPEN, C::RING_IS_CLOSE))
            .union(finger(pinky, C::PINKY_IS_OPEN, C::PINKY_IS_CLOSE))
    }
}

/// First match wins.
const STRICT_RULES: [StrictType; 10] = [
    StrictType::Five,
    StrictType::Four,
    StrictType::Three,
    StrictType::Two,
    StrictType::One,
    StrictType::Yeah,
    StrictType::SpiderMan,
    StrictType::Rock,
    StrictType::OK1,
    StrictType::OK2,
];

/// A looser pose category grouping several strict types.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Type {
    #[default]
    Unknown,
    Fist,
    Two,
    Three,
    Four,
    Five,
    Pinch,
    OK,
    Yeah,
    Rock,
    SpiderMan,
}

impl Type {
    pub const fn members(self) -> &'static [StrictType] {
        use StrictType as S;
        match self {
            Self::Unknown => &[S::Unknown],
            Self::Fist => &[S::Fist, S::Pinch],
            Self::Two => &[S::Two],
            Self::Three => &[S::Three],
            Self::Four => &[S::Four],
            Self::Five => &[S::Five],
            Self::Pinch => &[S::Fist, S::Pinch, S::OK1, S::OK2],
            Self::OK => &[S::OK1, S::OK2],
            Self::Yeah => &[S::Yeah],
            Self::Rock => &[S::Rock],
            Self::SpiderMan => &[S::SpiderMan],
        }
    }
}

/// Search order of [`Gesture::loose_type`].
const LOOSE_ORDER: [Type; 10] = [
    Type::Five,
    Type::Four,
    Type::Three,
    Type::Two,
    Type::Yeah,
    Type::Rock,
    Type::SpiderMan,
    Type::OK,
    Type::Fist,
    Type::Pinch,
];

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Gesture {
    condition: Conditions,
    strict_type: StrictType,
}

impl Gesture {
    /// No hand, or nothing recognizable.
    pub const UNKNOWN: Gesture = Gesture {
        condition: Conditions::empty(),
        strict_type: StrictType::Unknown,
    };

    /// A gesture carrying exactly the conditions of `strict`.
    pub const fn from_strict(strict: StrictType) -> Self {
        Self {
            condition: strict.bits(),
            strict_type: strict,
        }
    }

    pub fn from_conditions(condition: Conditions) -> Self {
        let strict_type = STRICT_RULES
            .into_iter()
            .find(|rule| condition.contains(rule.bits()))
            .or_else(|| {
                if condition.contains(Conditions::THUMB_NEAR_INDEX) {
                    Some(StrictType::Pinch)
                } else if condition.contains(StrictType::Fist.bits()) {
                    Some(StrictType::Fist)
                } else {
                    None
                }
            })
            .unwrap_or(StrictType::Unknown);

        Self {
            condition,
            strict_type,
        }
    }

    #[inline]
    pub fn condition(&self) -> Conditions {
        self.condition
    }

    #[inline]
    pub fn strict_type(&self) -> StrictType {
        self.strict_type
    }

    /// Whether the strict type falls in the `ty` category. Membership is tested against the
    /// strict type's own conditions, not the live ones.
    pub fn is_type(&self, ty: Type) -> bool {
        if ty == Type::Unknown {
            return self.strict_type == StrictType::Unknown;
        }
        let own = self.strict_type.bits();
        ty.members().iter().any(|member| own.contains(member.bits()))
    }

    /// Whether the live conditions satisfy everything `strict` requires.
    #[inline]
    pub fn is_strict(&self, strict: StrictType) -> bool {
        self.condition.contains(strict.bits())
    }

    #[inline]
    pub fn matches(&self, conditions: Conditions) -> bool {
        self.condition.contains(conditions)
    }

    pub fn loose_type(&self) -> Type {
        LOOSE_ORDER
            .into_iter()
            .find(|ty| self.is_type(*ty))
            .unwrap_or(Type::Unknown)
    }
}

fn finger_state(hand: &CanonicalHand, pip: JointName, dip: JointName, tip: JointName) -> (bool, bool) {
    let (pip, dip, tip) = (hand.joint(pip).y, hand.joint(dip).y, hand.joint(tip).y);
    (pip < dip && dip < tip, pip > dip && dip > tip)
}

#[inline]
fn within(angle: f32, lo: f32, hi: f32) -> bool {
    lo <= angle && angle <= hi
}

impl CanonicalHand {
    pub fn conditions(&self, side: HandSide) -> Conditions {
        use JointName::*;

        let mut c = Conditions::empty();
        let rz = self.rotate_z;
        let ry = self.rotate_y;

        // Geometric facing, before the side is taken into account.
        let facing = side != HandSide::Unknown && 90.0 < ry && ry < 270.0;
        c.set(
            Conditions::PALM_FACING_CAMERA,
            match side {
                HandSide::Right => facing,
                HandSide::Left => !facing,
                HandSide::Unknown => false,
            },
        );

        let thumb_open = self.joint(TTIP).x < self.joint(TDIP).x;
        if thumb_open {
            c |= Conditions::THUMB_IS_OPEN;
            let (right, down, left, up) = if facing {
                (
                    rz >= 350.0 || rz <= 50.0,
                    within(rz, 80.0, 140.0),
                    within(rz, 170.0, 230.0),
                    within(rz, 260.0, 320.0),
                )
            } else {
                (
                    within(rz, 150.0, 210.0),
                    within(rz, 240.0, 300.0),
                    rz >= 330.0 || rz <= 30.0,
                    within(rz, 60.0, 120.0),
                )
            };
            c.set(Conditions::THUMB_IS_RIGHT, right);
            c.set(Conditions::THUMB_IS_DOWN, down);
            c.set(Conditions::THUMB_IS_LEFT, left);
            c.set(Conditions::THUMB_IS_UP, up);
        } else {
            c |= Conditions::THUMB_IS_CLOSE;
        }

        for (joints, open, close) in [
            (
                (IPIP, IDIP, ITIP),
                Conditions::INDEX_IS_OPEN,
                Conditions::INDEX_IS_CLOSE,
            ),
            (
                (MPIP, MDIP, MTIP),
                Conditions::MIDDLE_IS_OPEN,
                Conditions::MIDDLE_IS_CLOSE,
            ),
            (
                (RPIP, RDIP, RTIP),
                Conditions::RING_IS_OPEN,
                Conditions::RING_IS_CLOSE,
            ),
            (
                (PPIP, PDIP, PTIP),
                Conditions::PINKY_IS_OPEN,
                Conditions::PINKY_IS_CLOSE,
            ),
        ] {
            let (is_open, is_close) = finger_state(self, joints.0, joints.1, joints.2);
            c.set(open, is_open);
            c.set(close, is_close);
        }

        c.set(
            Conditions::PALM_IS_VERTICAL,
            rz <= 30.0 || within(rz, 150.0, 210.0) || rz >= 330.0,
        );
        c.set(
            Conditions::PALM_IS_HORIZON,
            within(rz, 60.0, 120.0) || within(rz, 240.0, 300.0),
        );
        c.set(
            Conditions::THUMB_NEAR_INDEX,
            self.joint(TTIP).distance(self.joint(ITIP)) < THUMB_NEAR_INDEX,
        );

        c
    }
}

/// Classifies 21 engine-space joints of one hand.
pub fn classify(side: HandSide, joints: &[Vec3; JOINT_COUNT]) -> Gesture {
    classify_with(side, joints, DEFAULT_MIN_HAND_SCALE)
}

pub fn classify_with(side: HandSide, joints: &[Vec3; JOINT_COUNT], min_hand_scale: f32) -> Gesture {
    tracy_span!("classify");

    match normalize_with(side, joints, min_hand_scale) {
        Some(hand) => Gesture::from_conditions(hand.conditions(side)),
        None => {
            warn_once!("hand is too small to classify, reporting an unknown gesture");
            Gesture::UNKNOWN
        }
    }
}

#[inline]
pub fn classify_joints(side: HandSide, joints: &HandJoints) -> Gesture {
    classify(side, joints)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use glam::Quat;

    fn hand(fingers: [[(f32, f32); 3]; 4], thumb_tip: (f32, f32)) -> [Vec3; JOINT_COUNT] {
        let p = |(x, y): (f32, f32)| Vec3::new(x, y, 0.0);
        let mut joints = [Vec3::ZERO; JOINT_COUNT];
        joints[JointName::Wrist.index()] = p((0.0, -100.0));
        joints[JointName::TMCP.index()] = p((-40.0, -70.0));
        joints[JointName::IMCP.index()] = p((-30.0, 0.0));
        joints[JointName::MMCP.index()] = p((0.0, 0.0));
        joints[JointName::RMCP.index()] = p((15.0, 0.0));
        joints[JointName::PMCP.index()] = p((30.0, 0.0));
        joints[JointName::TPIP.index()] = p((-60.0, -50.0));
        joints[JointName::TDIP.index()] = p((-75.0, -30.0));
        joints[JointName::TTIP.index()] = p(thumb_tip);

        let chains = [
            [JointName::IPIP, JointName::IDIP, JointName::ITIP],
            [JointName::MPIP, JointName::MDIP, JointName::MTIP],
            [JointName::RPIP, JointName::RDIP, JointName::RTIP],
            [JointName::PPIP, JointName::PDIP, JointName::PTIP],
        ];
        for (chain, finger) in chains.iter().zip(fingers) {
            for (joint, pos) in chain.iter().zip(finger) {
                joints[joint.index()] = p(pos);
            }
        }
        joints
    }

    /// An upright right hand, palm away from the viewer, every finger spread.
    pub(crate) fn five_hand() -> [Vec3; JOINT_COUNT] {
        hand(
            [
                [(-30.0, 30.0), (-30.0, 50.0), (-30.0, 70.0)],
                [(0.0, 35.0), (0.0, 60.0), (0.0, 80.0)],
                [(15.0, 30.0), (15.0, 50.0), (15.0, 65.0)],
                [(30.0, 25.0), (30.0, 40.0), (30.0, 55.0)],
            ],
            (-90.0, -10.0),
        )
    }

    /// Same hand with every finger curled down and the thumb tucked.
    pub(crate) fn fist_hand() -> [Vec3; JOINT_COUNT] {
        hand(
            [
                [(-30.0, 30.0), (-30.0, 15.0), (-30.0, 5.0)],
                [(0.0, 30.0), (0.0, 15.0), (0.0, 5.0)],
                [(15.0, 30.0), (15.0, 15.0), (15.0, 5.0)],
                [(30.0, 25.0), (30.0, 15.0), (30.0, 5.0)],
            ],
            (-50.0, -30.0),
        )
    }

    fn xorshift(state: &mut u32) -> f32 {
        *state ^= *state << 13;
        *state ^= *state >> 17;
        *state ^= *state << 5;
        (*state % 2000) as f32 / 10.0 - 100.0
    }

    fn random_hand(seed: u32) -> [Vec3; JOINT_COUNT] {
        let mut state = seed.max(1);
        let mut joints = [Vec3::ZERO; JOINT_COUNT];
        for joint in &mut joints {
            *joint = Vec3::new(
                xorshift(&mut state),
                xorshift(&mut state),
                xorshift(&mut state),
            );
        }
        joints
    }

    #[test]
    fn open_hand_is_five() {
        let gesture = classify(HandSide::Right, &five_hand());
        assert_eq!(gesture.strict_type(), StrictType::Five, "{:?}", gesture.condition());
        assert!(gesture.matches(Conditions::THUMB_IS_LEFT | Conditions::PALM_IS_VERTICAL));
        assert!(!gesture.matches(Conditions::PALM_FACING_CAMERA));
        assert!(!gesture.matches(Conditions::THUMB_NEAR_INDEX));
        assert_eq!(gesture.loose_type(), Type::Five);
    }

    #[test]
    fn curled_hand_is_fist() {
        let gesture = classify(HandSide::Right, &fist_hand());
        assert_eq!(gesture.strict_type(), StrictType::Fist, "{:?}", gesture.condition());
        assert!(gesture.is_type(Type::Fist));
        assert!(gesture.is_type(Type::Pinch));
        assert_eq!(gesture.loose_type(), Type::Fist);
    }

    #[test]
    fn classification_ignores_hand_size() {
        for hand in [five_hand(), fist_hand()] {
            let expected = classify(HandSide::Right, &hand);
            for factor in [0.5, 1.0, 2.0, 10.0] {
                let scaled = hand.map(|p| p * factor);
                assert_eq!(classify(HandSide::Right, &scaled), expected, "factor {factor}");
            }
            let moved = hand.map(|p| p + Vec3::new(5.0, -3.0, 12.0));
            assert_eq!(classify(HandSide::Right, &moved), expected);
        }
    }

    #[test]
    fn thumb_and_finger_flags_are_exclusive() {
        let fingers = [
            (Conditions::THUMB_IS_OPEN, Conditions::THUMB_IS_CLOSE),
            (Conditions::INDEX_IS_OPEN, Conditions::INDEX_IS_CLOSE),
            (Conditions::MIDDLE_IS_OPEN, Conditions::MIDDLE_IS_CLOSE),
            (Conditions::RING_IS_OPEN, Conditions::RING_IS_CLOSE),
            (Conditions::PINKY_IS_OPEN, Conditions::PINKY_IS_CLOSE),
        ];
        for seed in 1..200 {
            let joints = random_hand(seed);
            for side in [HandSide::Unknown, HandSide::Right, HandSide::Left] {
                let gesture = classify(side, &joints);
                if gesture == Gesture::UNKNOWN {
                    continue;
                }
                let c = gesture.condition();
                assert!(
                    c.contains(Conditions::THUMB_IS_OPEN) != c.contains(Conditions::THUMB_IS_CLOSE),
                    "{c:?}"
                );
                for (open, close) in fingers {
                    assert!(!c.contains(open | close), "{c:?}");
                }
                if side == HandSide::Unknown {
                    assert!(!c.contains(Conditions::PALM_FACING_CAMERA));
                }
            }
        }
    }

    #[test]
    fn first_matching_rule_wins() {
        let all_open = StrictType::Five.bits() | Conditions::THUMB_NEAR_INDEX;
        assert_eq!(Gesture::from_conditions(all_open).strict_type(), StrictType::Five);

        let fist_pinch = StrictType::Fist.bits() | Conditions::THUMB_NEAR_INDEX;
        assert_eq!(Gesture::from_conditions(fist_pinch).strict_type(), StrictType::Pinch);

        let ok = StrictType::OK1.bits() | Conditions::THUMB_NEAR_INDEX;
        assert_eq!(Gesture::from_conditions(ok).strict_type(), StrictType::OK1);

        assert_eq!(
            Gesture::from_conditions(Conditions::PALM_IS_VERTICAL).strict_type(),
            StrictType::Unknown
        );

        let strict = [
            StrictType::Fist,
            StrictType::One,
            StrictType::Two,
            StrictType::Three,
            StrictType::Four,
            StrictType::Five,
            StrictType::Pinch,
            StrictType::OK1,
            StrictType::OK2,
            StrictType::Yeah,
            StrictType::Rock,
            StrictType::SpiderMan,
        ];
        for s in strict {
            assert_eq!(Gesture::from_conditions(s.bits()), Gesture::from_strict(s));
        }
    }

    #[test]
    fn loose_types_group_strict_types() {
        let loose = |s| Gesture::from_strict(s).loose_type();
        assert_eq!(loose(StrictType::OK1), Type::OK);
        assert_eq!(loose(StrictType::OK2), Type::OK);
        assert_eq!(loose(StrictType::Pinch), Type::Fist);
        assert_eq!(loose(StrictType::One), Type::Unknown);
        assert_eq!(loose(StrictType::Rock), Type::Rock);

        let ok2 = Gesture::from_strict(StrictType::OK2);
        assert!(ok2.is_type(Type::Pinch));
        assert!(!ok2.is_type(Type::Five));
        assert!(ok2.is_strict(StrictType::Pinch));
    }

    #[test]
    fn unknown_round_trip() {
        assert!(Gesture::UNKNOWN.is_type(Type::Unknown));
        assert_eq!(Gesture::UNKNOWN.strict_type(), StrictType::Unknown);
        assert!(Gesture::UNKNOWN.condition().is_empty());
        assert_eq!(Gesture::UNKNOWN.loose_type(), Type::Unknown);
        assert_eq!(Gesture::default(), Gesture::UNKNOWN);
        assert_eq!(Gesture::from_strict(StrictType::Unknown), Gesture::UNKNOWN);
        assert!(!Gesture::from_strict(StrictType::Five).is_type(Type::Unknown));
    }

    #[test]
    fn classification_is_deterministic() {
        for seed in [3, 17, 99] {
            let joints = random_hand(seed);
            let first = classify(HandSide::Left, &joints);
            for _ in 0..5 {
                assert_eq!(classify(HandSide::Left, &joints), first);
            }
        }
    }

    #[test]
    fn left_hand_is_mirrored() {
        // turned to face the viewer
        let facing = five_hand().map(|p| Quat::from_rotation_y(182f32.to_radians()) * p);
        let right = classify(HandSide::Right, &facing);
        assert!(right.matches(Conditions::PALM_FACING_CAMERA), "{:?}", right.condition());

        let mirrored = facing.map(|p| Vec3::new(p.x, p.y, -p.z));
        let left = classify(HandSide::Left, &mirrored);
        assert!(!left.matches(Conditions::PALM_FACING_CAMERA));
        assert_eq!(
            left.condition().bits() | Conditions::PALM_FACING_CAMERA.bits(),
            right.condition().bits()
        );
    }

    #[test]
    fn degenerate_hand_is_unknown() {
        let joints = [Vec3::new(1.0, 2.0, 3.0); JOINT_COUNT];
        assert_eq!(classify(HandSide::Right, &joints), Gesture::UNKNOWN);
        assert_eq!(
            classify_with(HandSide::Right, &five_hand(), 1000.0),
            Gesture::UNKNOWN
        );
    }

    #[test]
    fn joints_wrapper_classifies() {
        let joints = HandJoints::new(five_hand());
        assert_eq!(
            classify_joints(HandSide::Right, &joints).strict_type(),
            StrictType::Five
        );
    }

    #[test]
    fn debug_lists_flag_names() {
        let c = Conditions::THUMB_IS_OPEN | Conditions::THUMB_NEAR_INDEX;
        assert_eq!(format!("{c:?}"), "Conditions(THUMB_IS_OPEN | THUMB_NEAR_INDEX)");
        assert!(Conditions::default().is_empty());
        assert_eq!(Conditions::all().bits(), (1 << 18) - 1);
    }
}
