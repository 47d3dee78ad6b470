//! Camera images published by the frame provider and stereo services.
//!
//! The RealSense modes publish everything in the frame provider buffer. The QVR modes publish
//! rectified images and depth in the stereo buffer and raw images in the frame provider buffer
//! of the same frame index; callers pass both regions for the index they want.

mod raster;

pub use raster::{flip_rows, nv12_to_rgb, Image, PixelFormat};

use crate::memory::{DecodeError, DecodedFrame, FrameDecoder, Layout, LayoutBuilder, SharedMemory};
use crate::settings::FrameSettings;
use crate::tracy_span;
use log::{debug, info};
use std::fmt;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum CameraMode {
    #[default]
    None,
    RsColorDepth,
    RsStereoIr,
    QvrStereoColor,
    QvrStereoTracking,
}

impl TryFrom<i32> for CameraMode {
    type Error = ();
    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => Self::None,
            1 => Self::RsColorDepth,
            2 => Self::RsStereoIr,
            3 => Self::QvrStereoColor,
            4 => Self::QvrStereoTracking,
            _ => return Err(()),
        })
    }
}

impl CameraMode {
    #[inline]
    pub fn is_qvr(self) -> bool {
        matches!(self, Self::QvrStereoColor | Self::QvrStereoTracking)
    }

    fn has_depth(self) -> bool {
        !matches!(self, Self::None | Self::RsStereoIr)
    }
}

#[derive(Debug, Clone, PartialEq, derive_more::From)]
pub enum FrameError {
    Decode(DecodeError),
    /// A parameter buffer reported a negative size.
    BadParameter(&'static str, i32),
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decode(e) => write!(f, "{e}"),
            Self::BadParameter(name, value) => write!(f, "bad frame parameter {name}: {value}"),
        }
    }
}

impl std::error::Error for FrameError {}

/// Sizes read from the parameter buffers.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct FrameParameters {
    pub width: usize,
    pub height: usize,
    /// Byte size of the first image in a frame provider buffer.
    pub bytes1: usize,
    pub bytes2: usize,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct StereoParameters {
    pub width: usize,
    pub height: usize,
    pub image_bytes: usize,
    pub depth_bytes: usize,
}

fn read_size(frame: &DecodedFrame, name: &'static str) -> Result<usize, FrameError> {
    let value = frame.i32(name).unwrap_or_default();
    usize::try_from(value).map_err(|_| FrameError::BadParameter(name, value))
}

fn read_parameters<M: SharedMemory + ?Sized>(
    mode: CameraMode,
    memory: &M,
) -> Result<FrameParameters, FrameError> {
    let Some(frame) = FrameDecoder::new(Layout::frame_parameters())
        .decode(memory)?
        .updated()
    else {
        return Ok(FrameParameters::default());
    };

    let width = read_size(&frame, "width")?;
    let height = read_size(&frame, "height")?;
    let (bytes1, bytes2) = match mode {
        CameraMode::RsColorDepth => (read_size(&frame, "bytes1")?, read_size(&frame, "bytes2")?),
        CameraMode::RsStereoIr => {
            let bytes = read_size(&frame, "bytes1")?;
            (bytes, bytes)
        }
        // QVR reports its image size one slot later
        CameraMode::QvrStereoColor | CameraMode::QvrStereoTracking => {
            let bytes = read_size(&frame, "bytes2")?;
            (bytes, bytes)
        }
        CameraMode::None => (0, 0),
    };
    Ok(FrameParameters {
        width,
        height,
        bytes1,
        bytes2,
    })
}

fn read_stereo_parameters<M: SharedMemory + ?Sized>(
    memory: &M,
) -> Result<StereoParameters, FrameError> {
    let Some(frame) = FrameDecoder::new(Layout::stereo_parameters())
        .decode(memory)?
        .updated()
    else {
        return Ok(StereoParameters::default());
    };
    Ok(StereoParameters {
        width: read_size(&frame, "width")?,
        height: read_size(&frame, "height")?,
        image_bytes: read_size(&frame, "image_bytes")?,
        depth_bytes: read_size(&frame, "depth_bytes")?,
    })
}

/// Pushes `name` when `keep` is set, otherwise leaves a hole of the same size.
fn bytes_or_skip(builder: LayoutBuilder, keep: bool, name: &str, length: usize) -> LayoutBuilder {
    if keep {
        builder.push_bytes(name, length)
    } else {
        builder.skip(length)
    }
}

fn take_bytes(frame: &mut DecodedFrame, name: &str) -> Option<Vec<u8>> {
    match frame.take(name)? {
        crate::memory::FieldValue::Bytes(bytes) => Some(bytes),
        _ => None,
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct StereoFrame {
    pub timestamp: f64,
    /// `None` when color is disabled or the buffer was too small for the reported size.
    pub left: Option<Image>,
    /// Always `None` in [`CameraMode::RsColorDepth`], which has a single color camera.
    pub right: Option<Image>,
    pub depth: Option<Image>,
}

/// How to cut images out of the buffers for the configured mode.
#[derive(Debug, Clone)]
struct Plan {
    mode: CameraMode,
    rectified: bool,
    gray: bool,
    image_size: (usize, usize),
    depth_size: (usize, usize),
    /// Timed buffer: the frame provider one for RealSense, the stereo one for QVR.
    primary: FrameDecoder,
    /// Raw frame provider images for QVR when not rectified.
    raw: Option<FrameDecoder>,
}

pub struct FrameStream {
    settings: FrameSettings,
    plan: Option<Plan>,
}

impl FrameStream {
    pub fn new(settings: &FrameSettings) -> Self {
        Self {
            settings: settings.clone(),
            plan: None,
        }
    }

    #[inline]
    pub fn mode(&self) -> CameraMode {
        self.plan.as_ref().map_or(CameraMode::None, |p| p.mode)
    }

    /// Whether images come from the stereo service's rectified output.
    #[inline]
    pub fn rectified(&self) -> bool {
        self.plan.as_ref().is_some_and(|p| p.rectified)
    }

    #[inline]
    pub fn gray(&self) -> bool {
        self.plan.as_ref().is_some_and(|p| p.gray)
    }

    /// Reads the parameter buffers and prepares the buffer tables for `mode`. The QVR modes need
    /// the stereo service's parameter buffer too.
    pub fn configure(
        &mut self,
        mode: CameraMode,
        frame_parameters: &dyn SharedMemory,
        stereo_parameters: Option<&dyn SharedMemory>,
    ) -> Result<(), FrameError> {
        self.plan = None;
        if mode == CameraMode::None {
            return Ok(());
        }

        let params = read_parameters(mode, frame_parameters)?;
        let stereo = if mode.is_qvr() {
            let memory = stereo_parameters.ok_or(DecodeError::ServiceUnavailable)?;
            Some(read_stereo_parameters(memory)?)
        } else {
            None
        };

        let s = &self.settings;
        let color = s.enable_color;
        let depth = s.enable_depth && mode.has_depth();
        let rectified = s.try_rectified && mode.is_qvr();
        let gray = match mode {
            CameraMode::RsStereoIr | CameraMode::QvrStereoTracking => true,
            CameraMode::QvrStereoColor => s.try_gray,
            _ => false,
        };

        let plan = match (mode, stereo) {
            (CameraMode::RsColorDepth, _) => {
                let layout = LayoutBuilder::new("rs_color_depth");
                let layout = bytes_or_skip(layout, color, "left", params.bytes1);
                let layout = bytes_or_skip(layout, depth, "depth", params.bytes2);
                Plan {
                    mode,
                    rectified,
                    gray,
                    image_size: (params.width, params.height),
                    depth_size: (params.width, params.height),
                    primary: FrameDecoder::new(layout.timestamp("timestamp").build()),
                    raw: None,
                }
            }
            (CameraMode::RsStereoIr, _) => {
                let layout = LayoutBuilder::new("rs_stereo_ir");
                let layout = bytes_or_skip(layout, color, "left", params.bytes1);
                let layout = bytes_or_skip(layout, color, "right", params.bytes1);
                Plan {
                    mode,
                    rectified,
                    gray,
                    image_size: (params.width, params.height),
                    depth_size: (0, 0),
                    primary: FrameDecoder::new(layout.timestamp("timestamp").build()),
                    raw: None,
                }
            }
            (_, Some(stereo)) => {
                let layout = LayoutBuilder::new("qvr_stereo");
                let layout = bytes_or_skip(layout, color && rectified, "left", stereo.image_bytes);
                let layout = bytes_or_skip(layout, color && rectified, "right", stereo.image_bytes);
                let layout = bytes_or_skip(layout, depth, "depth", stereo.depth_bytes);

                let raw = (color && !rectified).then(|| {
                    FrameDecoder::new(
                        LayoutBuilder::new("qvr_raw")
                            .push_bytes("left", params.bytes1)
                            .push_bytes("right", params.bytes1)
                            .build(),
                    )
                });
                let image_size = if rectified {
                    (stereo.width, stereo.height)
                } else {
                    (params.width, params.height)
                };
                Plan {
                    mode,
                    rectified,
                    gray,
                    image_size,
                    depth_size: (stereo.width, stereo.height),
                    primary: FrameDecoder::new(layout.timestamp("timestamp").build()),
                    raw,
                }
            }
            (CameraMode::None, _) | (_, None) => return Ok(()),
        };

        info!(
            "Camera mode {mode:?}: {}x{} images, rectified: {rectified}, gray: {gray}",
            plan.image_size.0, plan.image_size.1
        );
        self.plan = Some(plan);
        Ok(())
    }

    /// Decodes the buffers of one frame index. `frame` is the frame provider buffer; `stereo`
    /// is the stereo buffer of the same index and is required in the QVR modes. Returns `None`
    /// when unconfigured or nothing new was published.
    pub fn poll(
        &mut self,
        frame: &dyn SharedMemory,
        stereo: Option<&dyn SharedMemory>,
    ) -> Result<Option<StereoFrame>, FrameError> {
        tracy_span!("FrameStream::poll");
        let Some(plan) = self.plan.as_mut() else {
            return Ok(None);
        };

        let primary = if plan.mode.is_qvr() {
            stereo.ok_or(DecodeError::ServiceUnavailable)?
        } else {
            frame
        };
        let Some(mut decoded) = plan.primary.decode(primary)?.updated() else {
            return Ok(None);
        };

        let (width, height) = plan.image_size;
        let image_format = if plan.gray {
            PixelFormat::R8
        } else {
            PixelFormat::Rgb24
        };
        let to_image = |raw: Option<Vec<u8>>, nv12: bool| {
            let raw = raw?;
            if nv12 {
                Image::from_nv12(width, height, &raw)
            } else {
                Image::from_camera(width, height, image_format, &raw)
            }
        };

        let (left, right) = match plan.mode {
            // RealSense color arrives as packed RGB
            CameraMode::RsColorDepth => (to_image(take_bytes(&mut decoded, "left"), false), None),
            CameraMode::RsStereoIr => (
                to_image(take_bytes(&mut decoded, "left"), false),
                to_image(take_bytes(&mut decoded, "right"), false),
            ),
            _ if plan.rectified => (
                to_image(take_bytes(&mut decoded, "left"), !plan.gray),
                to_image(take_bytes(&mut decoded, "right"), !plan.gray),
            ),
            _ => match plan.raw.as_mut() {
                Some(raw) => match raw.decode(frame)?.updated() {
                    Some(mut images) => (
                        to_image(take_bytes(&mut images, "left"), !plan.gray),
                        to_image(take_bytes(&mut images, "right"), !plan.gray),
                    ),
                    None => (None, None),
                },
                None => (None, None),
            },
        };

        let (depth_width, depth_height) = plan.depth_size;
        let depth = take_bytes(&mut decoded, "depth")
            .and_then(|raw| Image::from_camera(depth_width, depth_height, PixelFormat::R16, &raw));

        let timestamp = decoded.timestamp.unwrap_or_default();
        debug!("camera frame at {timestamp}");
        Ok(Some(StereoFrame {
            timestamp,
            left,
            right,
            depth,
        }))
    }
}
