// SPDX-License-Identifier: GPL-3.0-only
// Shared types for the camera hardware boundary

//! Shared types for camera backends

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Pixel dimensions of a preview, picture, view or surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Same size with width and height swapped
    pub fn rotated(&self) -> Self {
        Self {
            width: self.height,
            height: self.width,
        }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn is_landscape(&self) -> bool {
        self.width >= self.height
    }

    /// Width divided by height (0.0 for an empty size)
    pub fn aspect_ratio(&self) -> f64 {
        if self.height == 0 {
            return 0.0;
        }
        self.width as f64 / self.height as f64
    }

    /// Scale preserving aspect ratio so both dimensions cover `into`
    ///
    /// Exactly one dimension matches `into`, the other is greater or equal.
    pub fn scale_crop(&self, into: Size) -> Size {
        let (w, h) = (self.width as u64, self.height as u64);
        let (iw, ih) = (into.width as u64, into.height as u64);
        if w == 0 || h == 0 {
            return into;
        }
        if w * ih <= iw * h {
            // Width constrained
            Size::new(into.width, (h * iw / w) as u32)
        } else {
            Size::new((w * ih / h) as u32, into.height)
        }
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Size {
    type Err = String;

    /// Parse "WIDTHxHEIGHT", e.g. "1080x1920"
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .trim()
            .split_once(['x', 'X'])
            .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{}'", s))?;
        let width = w
            .trim()
            .parse::<u32>()
            .map_err(|e| format!("invalid width '{}': {}", w, e))?;
        let height = h
            .trim()
            .parse::<u32>()
            .map_err(|e| format!("invalid height '{}': {}", h, e))?;
        Ok(Size::new(width, height))
    }
}

/// Integer rectangle with exclusive right/bottom edges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Rectangle from its origin and dimensions
    pub const fn from_origin(left: i32, top: i32, width: i32, height: i32) -> Self {
        Self::new(left, top, left + width, top + height)
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    pub fn center_x(&self) -> i32 {
        (self.left + self.right) / 2
    }

    pub fn center_y(&self) -> i32 {
        (self.top + self.bottom) / 2
    }

    pub fn is_empty(&self) -> bool {
        self.width() <= 0 || self.height() <= 0
    }

    /// Translate in place
    pub fn offset(&mut self, dx: i32, dy: i32) {
        self.left += dx;
        self.right += dx;
        self.top += dy;
        self.bottom += dy;
    }

    /// Translated copy
    pub fn offset_by(mut self, dx: i32, dy: i32) -> Self {
        self.offset(dx, dy);
        self
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{},{} - {},{}]",
            self.left, self.top, self.right, self.bottom
        )
    }
}

/// Camera mounting direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Facing {
    Front,
    #[default]
    Back,
}

impl fmt::Display for Facing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Facing::Front => write!(f, "front"),
            Facing::Back => write!(f, "back"),
        }
    }
}

/// Identity of an opened camera
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraInfo {
    /// Provider specific identifier
    pub id: String,
    pub facing: Facing,
    /// Clockwise angle (0, 90, 180 or 270) the sensor image must be rotated
    /// to appear upright on the device's natural orientation
    pub orientation: u32,
}

impl Default for CameraInfo {
    fn default() -> Self {
        Self {
            id: "0".to_string(),
            facing: Facing::Back,
            orientation: 90,
        }
    }
}

/// Focus modes a camera can be driven in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HwFocusMode {
    Auto,
    ContinuousPicture,
    ContinuousVideo,
    Infinity,
    Macro,
    /// Extended depth of field
    Edof,
    Fixed,
}

impl HwFocusMode {
    /// Modes that need explicit auto-focus calls to refocus
    pub fn needs_auto_focus_calls(&self) -> bool {
        matches!(self, HwFocusMode::Auto | HwFocusMode::Macro)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlashMode {
    Off,
    On,
    Torch,
    Auto,
    RedEye,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColorEffect {
    None,
    Negative,
    Mono,
    Sepia,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SceneMode {
    Auto,
    Barcode,
    Night,
    Action,
}

/// Preview frame byte layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PixelFormat {
    /// Semi-planar 4:2:0, full resolution Y plane followed by interleaved VU
    #[default]
    NV21,
    /// 8-bit grayscale, one byte per pixel
    Gray8,
}

impl PixelFormat {
    /// Bytes needed for a frame of `size` in this layout
    pub fn frame_len(&self, size: Size) -> usize {
        let luma = size.width as usize * size.height as usize;
        match self {
            PixelFormat::NV21 => luma + luma / 2,
            PixelFormat::Gray8 => luma,
        }
    }
}

/// Metering/focus area in the normalized [-1000, 1000] space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FocusArea {
    pub rect: Rect,
    pub weight: u32,
}

/// Snapshot of a camera's capture parameters
///
/// Read with [`CameraHardware::parameters`](super::CameraHardware::parameters),
/// modified locally and written back with
/// [`CameraHardware::set_parameters`](super::CameraHardware::set_parameters).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CameraParameters {
    pub preview_size: Option<Size>,
    pub supported_preview_sizes: Vec<Size>,
    pub picture_size: Option<Size>,
    pub supported_picture_sizes: Vec<Size>,
    pub preview_format: PixelFormat,

    pub focus_mode: Option<HwFocusMode>,
    pub supported_focus_modes: Vec<HwFocusMode>,
    pub max_num_focus_areas: u32,
    pub focus_areas: Vec<FocusArea>,

    pub flash_mode: Option<FlashMode>,
    pub supported_flash_modes: Vec<FlashMode>,

    pub color_effect: Option<ColorEffect>,
    pub supported_color_effects: Vec<ColorEffect>,

    pub scene_mode: Option<SceneMode>,
    pub supported_scene_modes: Vec<SceneMode>,

    pub exposure_compensation: i32,
    pub min_exposure_compensation: i32,
    pub max_exposure_compensation: i32,
    /// EV per compensation index
    pub exposure_compensation_step: f32,

    pub zoom_supported: bool,
    /// Zoom ratios in percent (100 = 1x), one per zoom index
    pub zoom_ratios: Vec<u32>,
    pub max_zoom: u32,
    pub zoom: u32,
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Errors raised at the camera hardware boundary
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BackendError {
    /// No camera with the requested facing, or the backend is missing
    #[error("Device not found: {0}")]
    DeviceNotFound(String),
    /// The OS refused access to the camera
    #[error("Camera permission denied")]
    PermissionDenied,
    /// The camera is held by another client
    #[error("Camera is busy")]
    Busy,
    /// The driver refused a parameter write
    #[error("Parameters rejected: {0}")]
    ParametersRejected(String),
    /// Operation not supported by this camera
    #[error("Not supported: {0}")]
    NotSupported(String),
    /// The handle was already released
    #[error("Camera released")]
    Released,
    #[error("Error: {0}")]
    Other(String),
}
