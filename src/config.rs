// SPDX-License-Identifier: GPL-3.0-only

use crate::app::frame_processor::SymbolFormat;
use crate::backends::camera::Size;
use crate::constants::DEFAULT_MIN_PHOTO_SIDE;
use crate::errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Focus behaviour requested by the user
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FocusMode {
    /// Single-shot auto focus, repeated periodically while previewing
    #[default]
    Auto,
    /// Continuous focus driven by the hardware
    Continuous,
    /// Fixed focus at infinity
    Infinity,
    /// Close-range focus
    Macro,
}

/// Camera settings, read when parameters are negotiated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub focus_mode: FocusMode,
    /// Light the torch at startup
    pub torch: bool,
    /// Negative colour effect, for light-on-dark codes
    pub invert_color: bool,
    pub barcode_scene_mode_enabled: bool,
    /// Adjust exposure compensation when the torch changes
    pub exposure_enabled: bool,
    /// Symbologies handed to the decoder
    pub decode_formats: Vec<SymbolFormat>,
    /// Smallest acceptable photo size
    pub min_photo_size: Size,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            focus_mode: FocusMode::default(),
            torch: false,
            invert_color: false,
            barcode_scene_mode_enabled: false,
            exposure_enabled: false,
            decode_formats: vec![SymbolFormat::Code128, SymbolFormat::QrCode],
            min_photo_size: Size::new(DEFAULT_MIN_PHOTO_SIDE, DEFAULT_MIN_PHOTO_SIDE),
        }
    }
}

impl Settings {
    /// The periodic auto-focus loop is wanted
    pub fn auto_focus_enabled(&self) -> bool {
        self.focus_mode == FocusMode::Auto
    }

    /// `<config dir>/scancam/settings.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("scancam").join("settings.json"))
    }

    /// Read settings from a JSON file
    ///
    /// Missing fields take their default value.
    pub fn load(path: &Path) -> AppResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("{}: {}", path.display(), e)))?;
        let settings: Settings = serde_json::from_str(&text)?;
        debug!(path = %path.display(), "Loaded settings");
        Ok(settings)
    }

    /// Read settings from `path`, or the defaults when it does not exist
    pub fn load_or_default(path: &Path) -> AppResult<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Write settings as pretty JSON, creating parent directories
    pub fn save(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        info!(path = %path.display(), "Saved settings");
        Ok(())
    }
}
