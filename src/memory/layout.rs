use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Joint count of one hand in the hand tracking result.
pub const HAND_JOINTS: usize = 21;
/// Vertex count of one hand mesh in the hand tracking result.
pub const HAND_MESH_VERTICES: usize = 778;
/// Floats of skeletal pose per hand (16 joints, 3 components each).
pub const HAND_POSE_FLOATS: usize = 16 * 3;
/// Bounding rect floats per hand: x, y, w, h, score for the left frame, then the right frame.
pub const HAND_RECT_FLOATS: usize = 2 * 5;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    I32,
    F32,
    F64,
    U8,
    /// Three f32 in the native camera convention. Converted to engine space when decoded.
    Vec3,
    /// Sixteen f32, column-major. Passed through untouched.
    Mat4,
}

impl ElementType {
    pub const fn size(self) -> usize {
        match self {
            Self::I32 | Self::F32 => 4,
            Self::F64 => 8,
            Self::U8 => 1,
            Self::Vec3 => 12,
            Self::Mat4 => 64,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub offset: usize,
    pub length: usize,
    pub element: ElementType,
}

impl Field {
    #[inline]
    pub fn end(&self) -> usize {
        self.offset.saturating_add(self.length)
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.length / self.element.size()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutError {
    MissingTimestamp(String),
    TimestampNotF64(String),
    BadLength {
        field: String,
        length: usize,
        element: ElementType,
    },
    Duplicate(String),
    Overlap(String, String),
    /// The field ends past the addressable range.
    OutOfRange(String),
    /// A table standing in for a built-in one lacks one of its fields.
    MissingField {
        layout: String,
        field: String,
    },
}

impl fmt::Display for LayoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingTimestamp(name) => write!(f, "timestamp field {name:?} is not in the layout"),
            Self::TimestampNotF64(name) => {
                write!(f, "timestamp field {name:?} must be a single f64")
            }
            Self::BadLength {
                field,
                length,
                element,
            } => write!(
                f,
                "field {field:?} is {length} bytes, not a multiple of {element:?} ({} bytes)",
                element.size()
            ),
            Self::Duplicate(name) => write!(f, "field {name:?} appears twice"),
            Self::Overlap(a, b) => write!(f, "fields {a:?} and {b:?} overlap"),
            Self::OutOfRange(name) => write!(f, "field {name:?} ends past the addressable range"),
            Self::MissingField { layout, field } => {
                write!(f, "layout {layout:?} has no {field:?} field of the expected type")
            }
        }
    }
}

impl std::error::Error for LayoutError {}

/// Fixed field table of one shared-memory stream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "LayoutDef")]
pub struct Layout {
    name: String,
    fields: Vec<Field>,
    timestamp: Option<String>,
}

#[derive(Deserialize)]
struct LayoutDef {
    name: String,
    fields: Vec<Field>,
    #[serde(default)]
    timestamp: Option<String>,
}

impl TryFrom<LayoutDef> for Layout {
    type Error = LayoutError;

    fn try_from(def: LayoutDef) -> Result<Self, Self::Error> {
        Layout::new(def.name, def.fields, def.timestamp)
    }
}

impl Layout {
    pub fn new(
        name: impl Into<String>,
        fields: Vec<Field>,
        timestamp: Option<String>,
    ) -> Result<Self, LayoutError> {
        let layout = Self {
            name: name.into(),
            fields,
            timestamp,
        };
        layout.validate()?;
        Ok(layout)
    }

    pub fn validate(&self) -> Result<(), LayoutError> {
        let mut seen = HashSet::new();
        for field in &self.fields {
            if field.length % field.element.size() != 0 {
                return Err(LayoutError::BadLength {
                    field: field.name.clone(),
                    length: field.length,
                    element: field.element,
                });
            }
            if field.offset.checked_add(field.length).is_none() {
                return Err(LayoutError::OutOfRange(field.name.clone()));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(LayoutError::Duplicate(field.name.clone()));
            }
        }

        if let Some(name) = &self.timestamp {
            let field = self
                .field(name)
                .ok_or_else(|| LayoutError::MissingTimestamp(name.clone()))?;
            if field.element != ElementType::F64 || field.length != 8 {
                return Err(LayoutError::TimestampNotF64(name.clone()));
            }
        }

        let mut sorted: Vec<&Field> = self.fields.iter().filter(|f| f.length > 0).collect();
        sorted.sort_by_key(|f| f.offset);
        for pair in sorted.windows(2) {
            if pair[0].end() > pair[1].offset {
                return Err(LayoutError::Overlap(
                    pair[0].name.clone(),
                    pair[1].name.clone(),
                ));
            }
        }

        Ok(())
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn timestamp_field(&self) -> Option<&Field> {
        self.timestamp.as_deref().and_then(|name| self.field(name))
    }

    /// Minimum region size, in bytes, this layout needs.
    pub fn extent(&self) -> usize {
        self.fields.iter().map(Field::end).max().unwrap_or(0)
    }

    /// Result buffer of the hand tracking service.
    pub fn hand_tracking() -> Self {
        let mut builder = LayoutBuilder::new("hand_tracking").timestamp("timestamp");
        for side in ["left", "right"] {
            builder = builder
                .push(format!("{side}_state"), ElementType::I32, 1)
                .push(format!("{side}_gesture"), ElementType::I32, 2)
                .push(format!("{side}_rect"), ElementType::F32, HAND_RECT_FLOATS)
                .push(format!("{side}_joints"), ElementType::Vec3, HAND_JOINTS)
                .push(format!("{side}_mesh"), ElementType::Vec3, HAND_MESH_VERTICES)
                .push(format!("{side}_pose"), ElementType::F32, HAND_POSE_FLOATS);
        }
        builder.build()
    }

    /// Camera pose half of the SLAM result buffer.
    pub fn slam_camera() -> Self {
        LayoutBuilder::new("slam_camera")
            .push("result", ElementType::I32, 1)
            .timestamp("timestamp")
            .push("matrix", ElementType::Mat4, 1)
            .build()
    }

    /// Detected plane half of the SLAM result buffer, which follows the camera half.
    pub fn slam_plane() -> Self {
        LayoutBuilder::new("slam_plane")
            .skip(ElementType::I32.size() + ElementType::F64.size() + ElementType::Mat4.size())
            .push("result", ElementType::I32, 1)
            .timestamp("timestamp")
            .push("matrix", ElementType::Mat4, 1)
            .build()
    }

    /// Parameter buffer of the frame provider service. Which byte counts are meaningful depends
    /// on the camera mode.
    pub fn frame_parameters() -> Self {
        LayoutBuilder::new("frame_parameters")
            .push("width", ElementType::I32, 1)
            .push("height", ElementType::I32, 1)
            .push("bytes1", ElementType::I32, 1)
            .push("bytes2", ElementType::I32, 1)
            .build()
    }

    /// Parameter buffer of the stereo service.
    pub fn stereo_parameters() -> Self {
        LayoutBuilder::new("stereo_parameters")
            .push("width", ElementType::I32, 1)
            .push("height", ElementType::I32, 1)
            .skip(4)
            .push("image_bytes", ElementType::I32, 1)
            .push("depth_bytes", ElementType::I32, 1)
            .build()
    }

    /// Checks that this table can stand in for `builtin`: every field the built-in table has
    /// must be present with the same element type and count.
    pub fn check_compatible(&self, builtin: &Layout) -> Result<(), LayoutError> {
        for expected in builtin.fields() {
            let found = self.field(&expected.name).is_some_and(|f| {
                f.element == expected.element && f.length == expected.length
            });
            if !found {
                return Err(LayoutError::MissingField {
                    layout: self.name.clone(),
                    field: expected.name.clone(),
                });
            }
        }
        if builtin.timestamp.is_some() && self.timestamp != builtin.timestamp {
            return Err(LayoutError::MissingTimestamp(
                builtin.timestamp.clone().unwrap_or_default(),
            ));
        }
        Ok(())
    }

    /// Looks up a built-in table by stream name.
    pub fn builtin(name: &str) -> Option<Self> {
        match name {
            "hand_tracking" => Some(Self::hand_tracking()),
            "slam_camera" => Some(Self::slam_camera()),
            "slam_plane" => Some(Self::slam_plane()),
            "frame_parameters" => Some(Self::frame_parameters()),
            "stereo_parameters" => Some(Self::stereo_parameters()),
            _ => None,
        }
    }
}

/// Lays fields out back to back, the way the services advance their write pointer.
pub struct LayoutBuilder {
    name: String,
    fields: Vec<Field>,
    cursor: usize,
    timestamp: Option<String>,
}

impl LayoutBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            cursor: 0,
            timestamp: None,
        }
    }

    pub fn push(mut self, name: impl Into<String>, element: ElementType, count: usize) -> Self {
        let length = element.size() * count;
        self.fields.push(Field {
            name: name.into(),
            offset: self.cursor,
            length,
            element,
        });
        self.cursor += length;
        self
    }

    /// Pushes a raw byte field of `length` bytes.
    pub fn push_bytes(self, name: impl Into<String>, length: usize) -> Self {
        self.push(name, ElementType::U8, length)
    }

    /// Pushes an f64 field and marks it as the stream's timestamp.
    pub fn timestamp(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.timestamp = Some(name.clone());
        self.push(name, ElementType::F64, 1)
    }

    pub fn skip(mut self, bytes: usize) -> Self {
        self.cursor += bytes;
        self
    }

    pub fn build(self) -> Layout {
        Layout {
            name: self.name,
            fields: self.fields,
            timestamp: self.timestamp,
        }
    }
}
