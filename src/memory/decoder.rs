use super::layout::{ElementType, Field, Layout};
use super::{ReadGuard, SharedMemory};
use crate::convert::cv_to_engine;
use crate::tracy_span;
use glam::{Mat4, Vec3};
use log::error;
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum DecodeError {
    /// The service is disconnected or handed out a null handle. Keep the previous state and
    /// try again next tick.
    ServiceUnavailable,
    /// The region is smaller than the layout says it should be. The decoder table and the
    /// native service disagree on the buffer version, so retrying will not help.
    LayoutMismatch {
        layout: String,
        required: usize,
        available: usize,
    },
}

impl DecodeError {
    #[inline]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::ServiceUnavailable)
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ServiceUnavailable => f.write_str("service unavailable"),
            Self::LayoutMismatch {
                layout,
                required,
                available,
            } => write!(
                f,
                "layout {layout:?} needs {required} bytes but the region only has {available}"
            ),
        }
    }
}

impl std::error::Error for DecodeError {}

#[derive(Debug, Clone, PartialEq)]
pub enum DecodeOutcome {
    Updated(DecodedFrame),
    /// The timestamp did not move forward since the last update.
    Stale,
}

impl DecodeOutcome {
    pub fn updated(self) -> Option<DecodedFrame> {
        match self {
            Self::Updated(frame) => Some(frame),
            Self::Stale => None,
        }
    }

    #[inline]
    pub fn is_stale(&self) -> bool {
        matches!(self, Self::Stale)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    I32s(Vec<i32>),
    F32s(Vec<f32>),
    F64s(Vec<f64>),
    Bytes(Vec<u8>),
    Vec3s(Vec<Vec3>),
    Mat4s(Vec<Mat4>),
}

macro_rules! field_accessor {
    ($name:ident, $variant:ident, $ty:ty) => {
        pub fn $name(&self, field: &str) -> Option<&[$ty]> {
            match self.values.get(field)? {
                FieldValue::$variant(v) => Some(v),
                _ => None,
            }
        }
    };
}

/// Typed contents of one successful read, with positions already in engine space.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DecodedFrame {
    pub timestamp: Option<f64>,
    values: HashMap<String, FieldValue>,
}

impl DecodedFrame {
    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.values.get(field)
    }

    /// Moves a field out of the frame, e.g. to keep an image buffer without copying it.
    pub fn take(&mut self, field: &str) -> Option<FieldValue> {
        self.values.remove(field)
    }

    field_accessor!(i32s, I32s, i32);
    field_accessor!(f32s, F32s, f32);
    field_accessor!(f64s, F64s, f64);
    field_accessor!(bytes, Bytes, u8);
    field_accessor!(vec3s, Vec3s, Vec3);
    field_accessor!(mat4s, Mat4s, Mat4);

    pub fn i32(&self, field: &str) -> Option<i32> {
        self.i32s(field)?.first().copied()
    }

    pub fn mat4(&self, field: &str) -> Option<Mat4> {
        self.mat4s(field)?.first().copied()
    }
}

/// Decodes one stream's region. Each stream gets its own decoder so each keeps an independent
/// timestamp cursor.
#[derive(Debug, Clone)]
pub struct FrameDecoder {
    layout: Layout,
    last_timestamp: Option<f64>,
}

impl FrameDecoder {
    pub fn new(layout: Layout) -> Self {
        Self {
            layout,
            last_timestamp: None,
        }
    }

    #[inline]
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    #[inline]
    pub fn last_timestamp(&self) -> Option<f64> {
        self.last_timestamp
    }

    /// Forgets the timestamp cursor, so the next read is accepted whatever its timestamp.
    pub fn reset(&mut self) {
        self.last_timestamp = None;
    }

    fn mismatch(&self, available: usize) -> DecodeError {
        let err = DecodeError::LayoutMismatch {
            layout: self.layout.name().to_owned(),
            required: self.layout.extent(),
            available,
        };
        error!("{err}");
        err
    }

    pub fn decode<M: SharedMemory + ?Sized>(
        &mut self,
        memory: &M,
    ) -> Result<DecodeOutcome, DecodeError> {
        tracy_span!("FrameDecoder::decode");

        let guard = ReadGuard::acquire(memory).ok_or(DecodeError::ServiceUnavailable)?;
        let available = guard.size();
        if available < self.layout.extent() {
            return Err(self.mismatch(available));
        }

        let timestamp_field = self.layout.timestamp_field();
        let timestamp = match timestamp_field {
            Some(field) => Some(
                guard
                    .read_f64(field.offset)
                    .ok_or_else(|| self.mismatch(available))?,
            ),
            None => None,
        };

        if let Some(ts) = timestamp {
            // NaN never compares newer, so a torn or uninitialized stamp reads as stale.
            let newer = match self.last_timestamp {
                Some(last) => ts > last,
                None => !ts.is_nan(),
            };
            if !newer {
                return Ok(DecodeOutcome::Stale);
            }
        }

        let mut values = HashMap::with_capacity(self.layout.fields().len());
        for field in self.layout.fields() {
            if timestamp_field.is_some_and(|ts| ts.name == field.name) {
                continue;
            }
            let value = read_field(&guard, field).ok_or_else(|| self.mismatch(available))?;
            values.insert(field.name.clone(), value);
        }
        drop(guard);

        for value in values.values_mut() {
            if let FieldValue::Vec3s(points) = value {
                points.iter_mut().for_each(|p| *p = cv_to_engine(*p));
            }
        }

        if timestamp.is_some() {
            self.last_timestamp = timestamp;
        }

        Ok(DecodeOutcome::Updated(DecodedFrame { timestamp, values }))
    }
}

fn read_field<M: SharedMemory + ?Sized>(guard: &ReadGuard<'_, M>, field: &Field) -> Option<FieldValue> {
    let mut raw = vec![0; field.length];
    if !guard.read(field.offset, &mut raw) {
        return None;
    }

    fn f32s(raw: &[u8]) -> impl Iterator<Item = f32> + '_ {
        raw.chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
    }

    let value = match field.element {
        ElementType::U8 => FieldValue::Bytes(raw),
        ElementType::I32 => FieldValue::I32s(
            raw.chunks_exact(4)
                .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        ),
        ElementType::F32 => FieldValue::F32s(f32s(&raw).collect()),
        ElementType::F64 => FieldValue::F64s(
            raw.chunks_exact(8)
                .map(|c| f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
                .collect(),
        ),
        ElementType::Vec3 => {
            let floats: Vec<f32> = f32s(&raw).collect();
            FieldValue::Vec3s(floats.chunks_exact(3).map(Vec3::from_slice).collect())
        }
        ElementType::Mat4 => {
            let floats: Vec<f32> = f32s(&raw).collect();
            FieldValue::Mat4s(
                floats
                    .chunks_exact(16)
                    .map(Mat4::from_cols_slice)
                    .collect(),
            )
        }
    };
    Some(value)
}
