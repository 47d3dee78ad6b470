use glam::Vec3;
use std::fmt;
use std::ops::Index;

/// Floats in a raw joint buffer.
pub const BUFFER_LEN: usize = JOINT_COUNT * 3;
pub const JOINT_COUNT: usize = 21;

/// Hand joints in buffer order. MCP, PIP and DIP are the metacarpophalangeal, proximal
/// interphalangeal and distal interphalangeal joints; TIP is the finger tip.
#[repr(usize)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum JointName {
    Wrist = 0,
    TMCP,
    IMCP,
    MMCP,
    RMCP,
    PMCP,
    TPIP,
    TDIP,
    TTIP,
    IPIP,
    IDIP,
    ITIP,
    MPIP,
    MDIP,
    MTIP,
    RPIP,
    RDIP,
    RTIP,
    PPIP,
    PDIP,
    PTIP,
}

impl JointName {
    pub const ALL: [JointName; JOINT_COUNT] = [
        Self::Wrist,
        Self::TMCP,
        Self::IMCP,
        Self::MMCP,
        Self::RMCP,
        Self::PMCP,
        Self::TPIP,
        Self::TDIP,
        Self::TTIP,
        Self::IPIP,
        Self::IDIP,
        Self::ITIP,
        Self::MPIP,
        Self::MDIP,
        Self::MTIP,
        Self::RPIP,
        Self::RDIP,
        Self::RTIP,
        Self::PPIP,
        Self::PDIP,
        Self::PTIP,
    ];

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// The joint one step closer to the wrist. Every MCP hangs off the wrist; the wrist is the
    /// root.
    pub const fn parent(self) -> Option<JointName> {
        use JointName::*;
        Some(match self {
            Wrist => return None,
            TMCP | IMCP | MMCP | RMCP | PMCP => Wrist,
            TPIP => TMCP,
            TDIP => TPIP,
            TTIP => TDIP,
            IPIP => IMCP,
            IDIP => IPIP,
            ITIP => IDIP,
            MPIP => MMCP,
            MDIP => MPIP,
            MTIP => MDIP,
            RPIP => RMCP,
            RDIP => RPIP,
            RTIP => RDIP,
            PPIP => PMCP,
            PDIP => PPIP,
            PTIP => PDIP,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JointsError {
    BufferLength(usize),
}

impl fmt::Display for JointsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BufferLength(len) => {
                write!(f, "joint buffer holds {len} floats, expected {BUFFER_LEN}")
            }
        }
    }
}

impl std::error::Error for JointsError {}

/// The 21 joint positions of one hand.
#[derive(Debug, Clone, Copy, PartialEq, derive_more::Deref)]
pub struct HandJoints([Vec3; JOINT_COUNT]);

impl Default for HandJoints {
    fn default() -> Self {
        Self([Vec3::ZERO; JOINT_COUNT])
    }
}

impl HandJoints {
    #[inline]
    pub fn new(joints: [Vec3; JOINT_COUNT]) -> Self {
        Self(joints)
    }

    /// Builds the joints from a raw x, y, z interleaved buffer.
    pub fn from_buffer(buf: &[f32]) -> Result<Self, JointsError> {
        if buf.len() != BUFFER_LEN {
            return Err(JointsError::BufferLength(buf.len()));
        }
        Ok(Self(std::array::from_fn(|i| {
            Vec3::from_slice(&buf[i * 3..i * 3 + 3])
        })))
    }

    pub fn from_points(points: &[Vec3]) -> Result<Self, JointsError> {
        let joints: [Vec3; JOINT_COUNT] = points
            .try_into()
            .map_err(|_| JointsError::BufferLength(points.len() * 3))?;
        Ok(Self(joints))
    }

    /// Writes the joints back out as an interleaved buffer.
    pub fn write_buffer(&self, out: &mut [f32]) -> Result<(), JointsError> {
        if out.len() < BUFFER_LEN {
            return Err(JointsError::BufferLength(out.len()));
        }
        for (dst, joint) in out.chunks_exact_mut(3).zip(self.0.iter()) {
            joint.write_to_slice(dst);
        }
        Ok(())
    }

    #[inline]
    pub fn to_array(&self) -> [Vec3; JOINT_COUNT] {
        self.0
    }
}

impl Index<JointName> for HandJoints {
    type Output = Vec3;

    #[inline]
    fn index(&self, joint: JointName) -> &Vec3 {
        &self.0[joint.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_must_be_63_floats() {
        assert_eq!(
            HandJoints::from_buffer(&[0.0; 60]),
            Err(JointsError::BufferLength(60))
        );
        assert!(HandJoints::from_buffer(&[0.0; 63]).is_ok());
    }

    #[test]
    fn buffer_order_matches_joint_names() {
        let buf: Vec<f32> = (0..BUFFER_LEN).map(|i| i as f32).collect();
        let joints = HandJoints::from_buffer(&buf).unwrap();
        assert_eq!(joints[JointName::Wrist], Vec3::new(0.0, 1.0, 2.0));
        assert_eq!(joints[JointName::ITIP], Vec3::new(33.0, 34.0, 35.0));
        assert_eq!(joints[JointName::PTIP], Vec3::new(60.0, 61.0, 62.0));

        let mut out = [0.0; BUFFER_LEN];
        joints.write_buffer(&mut out).unwrap();
        assert_eq!(out.as_slice(), buf.as_slice());
    }

    #[test]
    fn skeleton_is_a_tree_rooted_at_wrist() {
        for joint in JointName::ALL {
            let mut current = joint;
            let mut steps = 0;
            while let Some(parent) = current.parent() {
                assert!(parent.index() < current.index());
                current = parent;
                steps += 1;
            }
            assert_eq!(current, JointName::Wrist);
            assert!(steps <= 4);
        }
        assert_eq!(JointName::MDIP.parent(), Some(JointName::MPIP));
    }
}
