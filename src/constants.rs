// SPDX-License-Identifier: GPL-3.0-only

//! Session-wide constants

use std::time::Duration;

/// Name of the thread that owns the camera handle
pub const CAMERA_WORKER_NAME: &str = "camera-worker";

/// Name of the thread that runs the barcode decoder
pub const DECODE_WORKER_NAME: &str = "barcode-decode";

/// Delay between two runs of the periodic auto-focus loop
pub const AUTO_FOCUS_INTERVAL: Duration = Duration::from_millis(2000);

/// Focus and metering area constants
///
/// Areas live in the hardware's normalized space where (-1000, -1000) is the
/// top-left and (1000, 1000) the bottom-right of the sensor field of view.
pub mod focus_area {
    /// Lower bound of the normalized coordinate space
    pub const MIN: i32 = -1000;
    /// Upper bound of the normalized coordinate space
    pub const MAX: i32 = 1000;
    /// Side length of a tap-to-focus area
    pub const SIZE: i32 = 100;
    /// Smallest side length the hardware is asked to honour
    pub const MIN_SIZE: i32 = 50;
    /// Weight given to a tap-to-focus area
    pub const WEIGHT: u32 = 1000;
}

/// Exposure compensation targets in EV
pub mod exposure {
    /// Target while the torch is lit
    pub const TORCH_ON_EV: f32 = 0.0;
    /// Target while the torch is off
    pub const TORCH_OFF_EV: f32 = 1.5;
}

/// Frames larger than this (either side) are downscaled before QR detection
pub const QR_MAX_DIMENSION: u32 = 640;

/// Default minimum photo size (width and height)
pub const DEFAULT_MIN_PHOTO_SIDE: u32 = 1080;

/// Device rotation buckets: raw sensor angle ranges mapped to a rotation
///
/// Angles outside every bucket map to 0.
pub const DEVICE_ROTATION_BUCKETS: [(std::ops::Range<i32>, u32); 3] =
    [(60..140, 270), (140..220, 180), (220..300, 90)];
