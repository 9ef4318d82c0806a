// SPDX-License-Identifier: GPL-3.0-only

//! Collaborators supplied by the UI
//!
//! The session never owns UI objects. It reaches the display surface, the
//! current display orientation and the crop overlay through these traits.
//! Calls into [`ViewHost`] come from the camera worker thread; an
//! implementation backed by a single-threaded toolkit must post them to its
//! own thread.

use crate::backends::camera::geometry::{self, PreviewTransform};
use crate::backends::camera::{Rect, Size};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, AtomicUsize, Ordering};
use tracing::trace;

/// The surface the preview is drawn on
pub trait ViewHost: Send + Sync {
    /// Ask the UI to lay the view out again; it answers with
    /// `CameraSession::on_view_sized`
    fn request_layout(&self);

    /// Scale/translate to apply to the preview surface
    fn apply_transform(&self, transform: PreviewTransform);

    /// The surface can currently receive frames
    fn is_surface_available(&self) -> bool;

    /// Free the surface; called once when the session is destroyed
    fn release_surface(&self) {}
}

/// Supplies the current crop region in view pixels
pub trait CropRegionProvider: Send + Sync {
    fn crop_rect(&self) -> Option<Rect>;
}

impl<F> CropRegionProvider for F
where
    F: Fn() -> Option<Rect> + Send + Sync,
{
    fn crop_rect(&self) -> Option<Rect> {
        self()
    }
}

/// Display and device orientation
pub trait DisplayInfo: Send + Sync {
    /// Rotation of the display content, `None` while unknown
    fn display_rotation(&self) -> Option<u32>;

    /// Physical rotation of the device
    fn device_rotation(&self) -> u32;
}

const UNKNOWN_ROTATION: i32 = -1;

/// [`DisplayInfo`] fed by orientation events
#[derive(Debug)]
pub struct DisplayOrientationTracker {
    display_rotation: AtomicI32,
    device_rotation: AtomicU32,
}

impl Default for DisplayOrientationTracker {
    fn default() -> Self {
        Self::new(Some(0))
    }
}

impl DisplayOrientationTracker {
    pub fn new(display_rotation: Option<u32>) -> Self {
        Self {
            display_rotation: AtomicI32::new(encode(display_rotation)),
            device_rotation: AtomicU32::new(0),
        }
    }

    pub fn set_display_rotation(&self, rotation: Option<u32>) {
        self.display_rotation
            .store(encode(rotation), Ordering::SeqCst);
    }

    /// Feed a raw orientation sensor angle; negative angles are ignored
    pub fn on_orientation_changed(&self, angle: i32) {
        if let Some(rotation) = geometry::device_rotation_for_angle(angle) {
            let previous = self.device_rotation.swap(rotation, Ordering::SeqCst);
            if previous != rotation {
                trace!(angle, rotation, "Device rotation changed");
            }
        }
    }
}

fn encode(rotation: Option<u32>) -> i32 {
    rotation.map(|r| (r % 360) as i32).unwrap_or(UNKNOWN_ROTATION)
}

impl DisplayInfo for DisplayOrientationTracker {
    fn display_rotation(&self) -> Option<u32> {
        let rotation = self.display_rotation.load(Ordering::SeqCst);
        (rotation != UNKNOWN_ROTATION).then_some(rotation as u32)
    }

    fn device_rotation(&self) -> u32 {
        self.device_rotation.load(Ordering::SeqCst)
    }
}

/// Headless [`ViewHost`] that records what the session asked for
#[derive(Debug, Default)]
pub struct OffscreenSurface {
    available: AtomicBool,
    released: AtomicBool,
    layout_requests: AtomicUsize,
    transform: Mutex<Option<PreviewTransform>>,
    size: Mutex<Option<Size>>,
}

impl OffscreenSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// A surface that is already available at `size`
    pub fn available(size: Size) -> Self {
        let surface = Self::new();
        surface.set_available(true);
        surface.set_size(Some(size));
        surface
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn set_size(&self, size: Option<Size>) {
        *self.size.lock().unwrap_or_else(|e| e.into_inner()) = size;
    }

    pub fn size(&self) -> Option<Size> {
        *self.size.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn layout_requests(&self) -> usize {
        self.layout_requests.load(Ordering::SeqCst)
    }

    pub fn last_transform(&self) -> Option<PreviewTransform> {
        *self.transform.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

impl ViewHost for OffscreenSurface {
    fn request_layout(&self) {
        self.layout_requests.fetch_add(1, Ordering::SeqCst);
    }

    fn apply_transform(&self, transform: PreviewTransform) {
        *self.transform.lock().unwrap_or_else(|e| e.into_inner()) = Some(transform);
    }

    fn is_surface_available(&self) -> bool {
        self.available.load(Ordering::SeqCst) && !self.released.load(Ordering::SeqCst)
    }

    fn release_surface(&self) {
        self.released.store(true, Ordering::SeqCst);
        self.available.store(false, Ordering::SeqCst);
    }
}
