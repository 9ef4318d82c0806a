// SPDX-License-Identifier: GPL-3.0-only

//! Camera hardware abstraction
//!
//! The session never talks to a driver directly. It goes through two traits:
//!
//! ```text
//! ┌─────────────────────┐
//! │   CameraSession     │  ← public API, callable from any thread
//! └──────────┬──────────┘
//!            │ enqueue
//!            ▼
//! ┌─────────────────────┐
//! │  camera worker      │  ← single thread, owns the CameraHandle
//! └──────────┬──────────┘
//!            │
//!            ▼
//! ┌─────────────────────┐
//! │  CameraProvider     │  ← opens devices
//! │  CameraHardware     │  ← drives one opened device
//! └─────────────────────┘
//! ```
//!
//! Every `CameraHardware` method is only ever invoked from the camera worker.
//! Callbacks handed to the hardware may be invoked from any thread; they must
//! not block.

pub mod geometry;
pub mod parameters;
pub mod types;
pub mod worker;

pub use parameters::{NegotiatedParameters, NegotiationFailure, NegotiationOutcome};
pub use types::*;
pub use worker::{ErrorPolicy, Worker, WorkerHandle};

/// Receives the bytes of a single preview frame
pub type FrameCallback = Box<dyn FnOnce(Vec<u8>) + Send>;

/// Receives the outcome of an auto-focus run
pub type FocusCallback = Box<dyn FnOnce(bool) + Send>;

/// Receives optional image bytes from a capture stage
pub type PictureDataCallback = Box<dyn FnOnce(Option<Vec<u8>>) + Send>;

/// Callbacks for one still capture
///
/// The hardware invokes each callback at most once, in the order
/// shutter, raw, postview, jpeg.
pub struct CaptureCallbacks {
    pub shutter: Box<dyn FnOnce() + Send>,
    pub raw: PictureDataCallback,
    pub postview: PictureDataCallback,
    pub jpeg: Box<dyn FnOnce(Vec<u8>) + Send>,
}

impl std::fmt::Debug for CaptureCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureCallbacks").finish_non_exhaustive()
    }
}

/// Opens camera devices
pub trait CameraProvider: Send {
    /// Open the first camera with the requested facing
    ///
    /// # Returns
    /// * `Ok(CameraHandle)` - exclusive handle to the device
    /// * `Err(BackendError)` - no device, permission denied or busy
    fn open(&mut self, facing: Facing) -> BackendResult<CameraHandle>;

    /// Release a handle
    ///
    /// Dropping the handle releases the device as well; this hook exists for
    /// providers that track their handles.
    fn close(&mut self, handle: CameraHandle) {
        drop(handle);
    }
}

/// One opened camera device
pub trait CameraHardware: Send {
    // ===== Parameters =====

    /// Current parameters, or `None` when the driver exposes none
    fn parameters(&self) -> Option<CameraParameters>;

    /// Write a full parameter set
    fn set_parameters(&mut self, parameters: &CameraParameters) -> BackendResult<()>;

    /// Clockwise rotation applied to the preview output
    fn set_display_orientation(&mut self, degrees: u32) -> BackendResult<()>;

    // ===== Preview =====

    fn start_preview(&mut self) -> BackendResult<()>;

    fn stop_preview(&mut self) -> BackendResult<()>;

    /// Deliver the next preview frame to `callback`, then deregister it
    ///
    /// Passing `None` clears a pending one-shot callback. A new callback
    /// replaces the pending one.
    fn set_one_shot_frame_callback(&mut self, callback: Option<FrameCallback>);

    /// Drop every registered preview callback
    fn clear_preview_callbacks(&mut self);

    // ===== Focus =====

    fn auto_focus(&mut self, callback: FocusCallback) -> BackendResult<()>;

    fn cancel_auto_focus(&mut self) -> BackendResult<()>;

    // ===== Capture =====

    /// Take a still picture
    ///
    /// Preview stops for the duration of the capture and stays stopped until
    /// [`start_preview`](Self::start_preview) is called again.
    fn capture(&mut self, callbacks: CaptureCallbacks) -> BackendResult<()>;

    // ===== Lifecycle =====

    /// Release the device. Called exactly once, when the handle drops.
    fn release(&mut self);
}

/// Exclusive ownership of an opened camera
///
/// The device is released exactly once, when the handle is dropped.
pub struct CameraHandle {
    info: CameraInfo,
    device: Box<dyn CameraHardware>,
}

impl CameraHandle {
    pub fn new(info: CameraInfo, device: Box<dyn CameraHardware>) -> Self {
        Self { info, device }
    }

    pub fn info(&self) -> &CameraInfo {
        &self.info
    }

    pub fn id(&self) -> &str {
        &self.info.id
    }

    pub fn facing(&self) -> Facing {
        self.info.facing
    }

    /// Mounting orientation in degrees
    pub fn orientation(&self) -> u32 {
        self.info.orientation
    }

    pub fn device(&self) -> &dyn CameraHardware {
        self.device.as_ref()
    }

    pub fn device_mut(&mut self) -> &mut dyn CameraHardware {
        self.device.as_mut()
    }
}

impl Drop for CameraHandle {
    fn drop(&mut self) {
        self.device.release();
    }
}

impl std::fmt::Debug for CameraHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraHandle")
            .field("id", &self.info.id)
            .field("facing", &self.info.facing)
            .field("orientation", &self.info.orientation)
            .finish()
    }
}
