//! Camera pose and plane detection results of the SLAM service.
//!
//! Both results live in one region: the camera half first, the plane half right after it. Each
//! half has its own timestamp, so each gets its own decoder.

use crate::convert::{slam_camera_pose, slam_model_pose, slam_relative_pose};
use crate::memory::{DecodeError, DecodedFrame, FrameDecoder, Layout, SharedMemory};
use crate::settings::SlamSettings;
use glam::{Mat4, Quat, Vec3};
use log::{debug, info};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SlamState {
    Off,
    Tracking,
    RecentlyLost,
    Lost,
    DetectPlaneSuccess,
    DetectPlaneFailed,
    Other(i32),
}

impl From<i32> for SlamState {
    fn from(value: i32) -> Self {
        match value {
            1 => Self::Off,
            2 => Self::Tracking,
            3 => Self::RecentlyLost,
            4 => Self::Lost,
            233 => Self::DetectPlaneSuccess,
            1234 => Self::DetectPlaneFailed,
            other => Self::Other(other),
        }
    }
}

impl From<SlamState> for i32 {
    fn from(state: SlamState) -> Self {
        match state {
            SlamState::Off => 1,
            SlamState::Tracking => 2,
            SlamState::RecentlyLost => 3,
            SlamState::Lost => 4,
            SlamState::DetectPlaneSuccess => 233,
            SlamState::DetectPlaneFailed => 1234,
            SlamState::Other(other) => other,
        }
    }
}

/// An engine-space pose.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SlamPose {
    pub position: Vec3,
    pub rotation: Quat,
}

impl From<(Vec3, Quat)> for SlamPose {
    fn from((position, rotation): (Vec3, Quat)) -> Self {
        Self { position, rotation }
    }
}

fn read_half(frame: &DecodedFrame) -> Option<(SlamState, Mat4)> {
    Some((frame.i32("result")?.into(), frame.mat4("matrix")?))
}

pub struct SlamStream {
    camera: FrameDecoder,
    plane: FrameDecoder,
    relative_mode: bool,

    state: Option<SlamState>,
    plane_state: Option<SlamState>,
    camera_pose: Option<SlamPose>,
    plane_pose: Option<SlamPose>,
    model: Option<Mat4>,
}

impl Default for SlamStream {
    fn default() -> Self {
        Self::new(&SlamSettings::default())
    }
}

impl SlamStream {
    pub fn new(settings: &SlamSettings) -> Self {
        Self::with_layouts(Layout::slam_camera(), Layout::slam_plane(), settings)
    }

    pub fn with_layouts(camera: Layout, plane: Layout, settings: &SlamSettings) -> Self {
        Self {
            camera: FrameDecoder::new(camera),
            plane: FrameDecoder::new(plane),
            relative_mode: settings.relative_mode,
            state: None,
            plane_state: None,
            camera_pose: None,
            plane_pose: None,
            model: None,
        }
    }

    /// Last reported tracking state, `None` until the first camera result arrives.
    #[inline]
    pub fn state(&self) -> Option<SlamState> {
        self.state
    }

    #[inline]
    pub fn plane_state(&self) -> Option<SlamState> {
        self.plane_state
    }

    /// The last camera pose seen while tracking.
    #[inline]
    pub fn camera_pose(&self) -> Option<SlamPose> {
        self.camera_pose
    }

    #[inline]
    pub fn plane_pose(&self) -> Option<SlamPose> {
        self.plane_pose
    }

    #[inline]
    pub fn relative_mode(&self) -> bool {
        self.relative_mode
    }

    pub fn set_relative_mode(&mut self, relative: bool) {
        self.relative_mode = relative;
    }

    /// Reads the camera half. Returns the new camera pose, or `None` if nothing new was
    /// published or the service is not tracking.
    pub fn poll<M: SharedMemory + ?Sized>(
        &mut self,
        memory: &M,
    ) -> Result<Option<SlamPose>, DecodeError> {
        let Some(frame) = self.camera.decode(memory)?.updated() else {
            return Ok(None);
        };
        let Some((state, world_to_camera)) = read_half(&frame) else {
            return Ok(None);
        };

        if self.state != Some(state) {
            info!("SLAM state changed to {state:?}");
        }
        self.state = Some(state);
        if state != SlamState::Tracking {
            return Ok(None);
        }

        let plane_found = self.plane_state == Some(SlamState::DetectPlaneSuccess);
        let pose = match self.model {
            Some(model) if self.relative_mode && plane_found => {
                slam_relative_pose(world_to_camera, model)
            }
            _ => slam_camera_pose(world_to_camera),
        };
        self.camera_pose = Some(pose.into());
        Ok(self.camera_pose)
    }

    /// Reads the plane half, e.g. after asking the service to detect a plane. Returns the plane
    /// pose when a plane was detected.
    pub fn poll_plane<M: SharedMemory + ?Sized>(
        &mut self,
        memory: &M,
    ) -> Result<Option<SlamPose>, DecodeError> {
        let Some(frame) = self.plane.decode(memory)?.updated() else {
            return Ok(None);
        };
        let Some((state, model)) = read_half(&frame) else {
            return Ok(None);
        };

        self.plane_state = Some(state);
        if state != SlamState::DetectPlaneSuccess {
            debug!("plane detection reported {state:?}");
            return Ok(None);
        }

        self.model = Some(model);
        self.plane_pose = Some(slam_model_pose(model).into());
        Ok(self.plane_pose)
    }

    /// Uses a plane model matrix from elsewhere, e.g. one saved from an earlier session.
    pub fn set_plane_model(&mut self, model: Mat4) {
        self.plane_state = Some(SlamState::DetectPlaneSuccess);
        self.model = Some(model);
        self.plane_pose = Some(slam_model_pose(model).into());
    }
}
