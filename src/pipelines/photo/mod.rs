// SPDX-License-Identifier: MPL-2.0

//! Still capture requests
//!
//! ```text
//! take_picture ──▶ suspend scan ──▶ hardware capture ──▶ shutter/raw/postview/jpeg
//!                                                             │
//!                                   restart preview ◀─────────┘ (if requested)
//! ```
//!
//! Every callback of a [`PictureRequest`] runs on the camera worker thread.
//! A request is consumed when it is dispatched; callbacks of a capture that
//! was cut short by closing the camera are dropped without being called.

pub mod capture;

pub use capture::PhotoCapture;

use crate::backends::camera::Rect;
use crate::errors::CaptureError;
use chrono::{DateTime, Local};

pub type ShutterCallback = Box<dyn FnOnce() + Send>;
pub type PictureDataCallback = Box<dyn FnOnce(Option<Vec<u8>>) + Send>;
pub type JpegCallback = Box<dyn FnOnce(Vec<u8>, PictureInfo) + Send>;
pub type CaptureErrorCallback = Box<dyn FnOnce(CaptureError) + Send>;

/// Orientation metadata for a captured picture
#[derive(Debug, Clone, PartialEq)]
pub struct PictureInfo {
    pub display_rotation: u32,
    pub device_rotation: u32,
    /// Clockwise rotation to apply to the JPEG so it appears upright
    pub capture_rotation: u32,
    /// Crop region in upright preview pixels, if one was active
    ///
    /// Only meaningful for images with the preview's geometry.
    pub crop_rect: Option<Rect>,
    pub captured_at: DateTime<Local>,
}

/// One-shot set of capture callbacks
///
/// # Example
///
/// ```ignore
/// session.take_picture(
///     PictureRequest::new()
///         .auto_restart_preview(true)
///         .on_jpeg(|bytes, info| save(bytes, info.capture_rotation))
///         .on_error(|e| warn!(error = %e, "Capture failed")),
/// );
/// ```
#[derive(Default)]
pub struct PictureRequest {
    pub(crate) auto_restart_preview: bool,
    pub(crate) shutter: Option<ShutterCallback>,
    pub(crate) raw: Option<PictureDataCallback>,
    pub(crate) postview: Option<PictureDataCallback>,
    pub(crate) jpeg: Option<JpegCallback>,
    pub(crate) error: Option<CaptureErrorCallback>,
}

impl PictureRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restart the preview once the JPEG has been delivered
    pub fn auto_restart_preview(mut self, enabled: bool) -> Self {
        self.auto_restart_preview = enabled;
        self
    }

    pub fn on_shutter(mut self, callback: impl FnOnce() + Send + 'static) -> Self {
        self.shutter = Some(Box::new(callback));
        self
    }

    pub fn on_raw(mut self, callback: impl FnOnce(Option<Vec<u8>>) + Send + 'static) -> Self {
        self.raw = Some(Box::new(callback));
        self
    }

    pub fn on_postview(mut self, callback: impl FnOnce(Option<Vec<u8>>) + Send + 'static) -> Self {
        self.postview = Some(Box::new(callback));
        self
    }

    pub fn on_jpeg(mut self, callback: impl FnOnce(Vec<u8>, PictureInfo) + Send + 'static) -> Self {
        self.jpeg = Some(Box::new(callback));
        self
    }

    pub fn on_error(mut self, callback: impl FnOnce(CaptureError) + Send + 'static) -> Self {
        self.error = Some(Box::new(callback));
        self
    }

    pub fn restarts_preview(&self) -> bool {
        self.auto_restart_preview
    }

    /// Report `error` and consume the request
    pub(crate) fn fail(self, error: CaptureError) {
        if let Some(callback) = self.error {
            callback(error);
        }
    }
}

impl std::fmt::Debug for PictureRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PictureRequest")
            .field("auto_restart_preview", &self.auto_restart_preview)
            .field("shutter", &self.shutter.is_some())
            .field("raw", &self.raw.is_some())
            .field("postview", &self.postview.is_some())
            .field("jpeg", &self.jpeg.is_some())
            .field("error", &self.error.is_some())
            .finish()
    }
}
