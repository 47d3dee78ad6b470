use crate::hand::DEFAULT_MIN_HAND_SCALE;
use crate::memory::{Layout, LayoutError};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, derive_more::From)]
pub enum ConfigError {
    Io(std::io::Error),
    Json(serde_json::Error),
    Layout(LayoutError),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "failed to read config: {e}"),
            Self::Json(e) => write!(f, "failed to parse config: {e}"),
            Self::Layout(e) => write!(f, "bad layout override: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandSettings {
    /// Report `Unknown` gestures instead of holding the last recognized one.
    pub allow_unknown_gesture: bool,
    pub min_hand_scale: f32,
    /// Weight of the previous pointer origin when smoothing.
    pub ray_smoothing: f32,
}

impl Default for HandSettings {
    fn default() -> Self {
        Self {
            allow_unknown_gesture: false,
            min_hand_scale: DEFAULT_MIN_HAND_SCALE,
            ray_smoothing: 0.9,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlamSettings {
    /// Report the camera relative to the detected plane once there is one.
    pub relative_mode: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameSettings {
    pub try_rectified: bool,
    pub try_gray: bool,
    pub enable_color: bool,
    pub enable_depth: bool,
}

impl Default for FrameSettings {
    fn default() -> Self {
        Self {
            try_rectified: false,
            try_gray: false,
            enable_color: true,
            enable_depth: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub hand: HandSettings,
    pub slam: SlamSettings,
    pub frame: FrameSettings,
    /// Replacement tables keyed by stream name.
    pub layouts: HashMap<String, Layout>,
}

impl Settings {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let settings: Settings = serde_json::from_str(json)?;
        settings.check_layouts()?;
        Ok(settings)
    }

    /// Loads settings from `path`. A missing file gives the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let data = match std::fs::read_to_string(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No config at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };

        let settings = Self::from_json(&data)?;
        info!("Loaded config from {}", path.display());
        Ok(settings)
    }

    /// Loads from `$XRCORE_CONFIG`, falling back to `$XDG_CONFIG_HOME/xrcore/config.json`.
    pub fn load_default() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn default_path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("XRCORE_CONFIG") {
            return Some(path.into());
        }

        let config_dir = std::env::var("XDG_CONFIG_HOME")
            .or_else(|_| std::env::var("HOME").map(|h| h + "/.config"))
            .ok()?;
        Some(Path::new(&config_dir).join("xrcore").join("config.json"))
    }

    fn check_layouts(&self) -> Result<(), LayoutError> {
        for (name, layout) in &self.layouts {
            if let Some(builtin) = Layout::builtin(name) {
                layout.check_compatible(&builtin)?;
            }
        }
        Ok(())
    }

    /// The table to use for stream `name`: the configured override, else the built-in table.
    pub fn layout(&self, name: &str) -> Option<Layout> {
        self.layouts
            .get(name)
            .cloned()
            .or_else(|| Layout::builtin(name))
    }
}
