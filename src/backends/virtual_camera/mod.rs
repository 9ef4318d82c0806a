// SPDX-License-Identifier: GPL-3.0-only

//! Virtual camera backend
//!
//! A software [`CameraProvider`] that behaves like a single hardware camera.
//! It serves frames rendered from a still image, records every call it
//! receives and can be told to fail specific operations. The session tests
//! and the `simulate` command run against it.
//!
//! # Architecture
//!
//! ```text
//! VirtualCameraProvider ──open──▶ CameraHandle(VirtualCameraDevice)
//!          │                                   │
//!          └──────────── Arc<Mutex<State>> ────┘
//!                              ▲
//!                    VirtualCameraControl  ← tests and CLI
//! ```
//!
//! With [`FrameDelivery::Immediate`] one-shot frame callbacks and focus
//! callbacks fire as soon as they can. With [`FrameDelivery::Manual`] they
//! wait for [`VirtualCameraControl::deliver_frame`] and
//! [`VirtualCameraControl::complete_focus`].

pub mod file_source;

pub use file_source::{LumaImage, encode_jpeg, load_luma_frame, render_preview_frame};

use crate::backends::camera::types::{
    BackendError, BackendResult, CameraInfo, CameraParameters, ColorEffect, Facing, FlashMode,
    HwFocusMode, PixelFormat, SceneMode, Size,
};
use crate::backends::camera::{
    CameraHandle, CameraHardware, CameraProvider, CaptureCallbacks, FocusCallback, FrameCallback,
};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// When pending callbacks are answered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameDelivery {
    #[default]
    Immediate,
    Manual,
}

/// Operations recorded by the virtual camera, in call order
#[derive(Debug, Clone, PartialEq)]
pub enum CameraCall {
    Open,
    /// A one-shot preview frame was requested
    RequestFrame,
    SetParameters(CameraParameters),
    SetDisplayOrientation(u32),
    StartPreview,
    StopPreview,
    AutoFocus,
    CancelAutoFocus,
    Capture,
    Release,
}

/// Failures to inject into the next matching calls
#[derive(Debug, Default)]
struct Faults {
    open: Option<BackendError>,
    /// Number of upcoming parameter writes to reject
    reject_parameters: u32,
    start_preview: Option<BackendError>,
    auto_focus: Option<BackendError>,
    capture: Option<BackendError>,
}

struct State {
    info: CameraInfo,
    parameters: Option<CameraParameters>,
    image: LumaImage,
    delivery: FrameDelivery,
    focus_result: bool,

    open: bool,
    previewing: bool,
    display_orientation: u32,
    pending_frame: Option<FrameCallback>,
    pending_focus: Option<FocusCallback>,

    open_attempts: usize,
    opens: usize,
    closes: usize,
    frames_delivered: usize,
    calls: Vec<CameraCall>,
    faults: Faults,
}

impl State {
    fn frame(&self) -> Vec<u8> {
        let (size, format) = self
            .parameters
            .as_ref()
            .and_then(|p| p.preview_size.map(|size| (size, p.preview_format)))
            .unwrap_or((self.image.size, PixelFormat::NV21));
        render_preview_frame(&self.image, size, format)
    }

    /// Take the pending frame callback if it may fire now
    fn take_deliverable_frame(&mut self) -> Option<(FrameCallback, Vec<u8>)> {
        if !self.previewing {
            return None;
        }
        let callback = self.pending_frame.take()?;
        self.frames_delivered += 1;
        Some((callback, self.frame()))
    }
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

/// Parameters of a typical phone back camera
pub fn default_parameters() -> CameraParameters {
    CameraParameters {
        preview_size: Some(Size::new(640, 480)),
        supported_preview_sizes: vec![
            Size::new(1920, 1080),
            Size::new(1280, 720),
            Size::new(800, 600),
            Size::new(640, 480),
            Size::new(320, 240),
        ],
        picture_size: Some(Size::new(640, 480)),
        supported_picture_sizes: vec![
            Size::new(4000, 3000),
            Size::new(1920, 1080),
            Size::new(1280, 720),
            Size::new(640, 480),
        ],
        preview_format: PixelFormat::NV21,
        focus_mode: Some(HwFocusMode::Auto),
        supported_focus_modes: vec![
            HwFocusMode::Auto,
            HwFocusMode::ContinuousPicture,
            HwFocusMode::Macro,
            HwFocusMode::Infinity,
        ],
        max_num_focus_areas: 1,
        focus_areas: Vec::new(),
        flash_mode: Some(FlashMode::Off),
        supported_flash_modes: vec![FlashMode::Off, FlashMode::On, FlashMode::Torch],
        color_effect: Some(ColorEffect::None),
        supported_color_effects: vec![ColorEffect::None, ColorEffect::Negative],
        scene_mode: Some(SceneMode::Auto),
        supported_scene_modes: vec![SceneMode::Auto, SceneMode::Barcode],
        exposure_compensation: 0,
        min_exposure_compensation: -6,
        max_exposure_compensation: 6,
        exposure_compensation_step: 0.5,
        zoom_supported: true,
        zoom_ratios: vec![100, 150, 200, 300, 400],
        max_zoom: 4,
        zoom: 0,
    }
}

/// Opens the virtual camera
pub struct VirtualCameraProvider {
    state: Arc<Mutex<State>>,
}

impl Default for VirtualCameraProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualCameraProvider {
    /// A back camera mounted at 90° with [`default_parameters`]
    pub fn new() -> Self {
        Self::with_camera(CameraInfo::default(), Some(default_parameters()))
    }

    pub fn with_camera(info: CameraInfo, parameters: Option<CameraParameters>) -> Self {
        let image = LumaImage::blank(Size::new(640, 480));
        Self {
            state: Arc::new(Mutex::new(State {
                info,
                parameters,
                image,
                delivery: FrameDelivery::default(),
                focus_result: true,
                open: false,
                previewing: false,
                display_orientation: 0,
                pending_frame: None,
                pending_focus: None,
                open_attempts: 0,
                opens: 0,
                closes: 0,
                frames_delivered: 0,
                calls: Vec::new(),
                faults: Faults::default(),
            })),
        }
    }

    /// Handle for steering the camera after the provider is handed over
    pub fn control(&self) -> VirtualCameraControl {
        VirtualCameraControl {
            state: Arc::clone(&self.state),
        }
    }
}

impl CameraProvider for VirtualCameraProvider {
    fn open(&mut self, facing: Facing) -> BackendResult<CameraHandle> {
        let mut state = lock(&self.state);
        state.open_attempts += 1;
        if let Some(error) = state.faults.open.take() {
            warn!(error = %error, "Virtual camera open failed");
            return Err(error);
        }
        if state.info.facing != facing {
            return Err(BackendError::DeviceNotFound(format!("no {} camera", facing)));
        }
        if state.open {
            return Err(BackendError::Busy);
        }
        state.open = true;
        state.opens += 1;
        state.calls.push(CameraCall::Open);
        info!(camera = %state.info.id, %facing, "Virtual camera opened");

        let info = state.info.clone();
        drop(state);
        Ok(CameraHandle::new(
            info,
            Box::new(VirtualCameraDevice {
                state: Arc::clone(&self.state),
                released: false,
            }),
        ))
    }
}

/// The opened virtual camera
pub struct VirtualCameraDevice {
    state: Arc<Mutex<State>>,
    released: bool,
}

impl VirtualCameraDevice {
    fn state(&self) -> BackendResult<MutexGuard<'_, State>> {
        if self.released {
            return Err(BackendError::Released);
        }
        Ok(lock(&self.state))
    }
}

impl CameraHardware for VirtualCameraDevice {
    fn parameters(&self) -> Option<CameraParameters> {
        self.state().ok()?.parameters.clone()
    }

    fn set_parameters(&mut self, parameters: &CameraParameters) -> BackendResult<()> {
        let mut state = self.state()?;
        state.calls.push(CameraCall::SetParameters(parameters.clone()));
        if state.faults.reject_parameters > 0 {
            state.faults.reject_parameters -= 1;
            return Err(BackendError::ParametersRejected("injected".into()));
        }
        let Some(current) = state.parameters.as_ref() else {
            return Err(BackendError::NotSupported("parameters".into()));
        };
        if let Some(size) = parameters.preview_size
            && !current.supported_preview_sizes.contains(&size)
        {
            return Err(BackendError::ParametersRejected(format!(
                "unsupported preview size {}",
                size
            )));
        }
        debug!(preview = ?parameters.preview_size, "Virtual camera parameters set");
        state.parameters = Some(parameters.clone());
        Ok(())
    }

    fn set_display_orientation(&mut self, degrees: u32) -> BackendResult<()> {
        let mut state = self.state()?;
        state.calls.push(CameraCall::SetDisplayOrientation(degrees));
        state.display_orientation = degrees;
        Ok(())
    }

    fn start_preview(&mut self) -> BackendResult<()> {
        let deliverable = {
            let mut state = self.state()?;
            state.calls.push(CameraCall::StartPreview);
            if let Some(error) = state.faults.start_preview.take() {
                return Err(error);
            }
            state.previewing = true;
            match state.delivery {
                FrameDelivery::Immediate => state.take_deliverable_frame(),
                FrameDelivery::Manual => None,
            }
        };
        if let Some((callback, frame)) = deliverable {
            callback(frame);
        }
        Ok(())
    }

    fn stop_preview(&mut self) -> BackendResult<()> {
        let mut state = self.state()?;
        state.calls.push(CameraCall::StopPreview);
        state.previewing = false;
        Ok(())
    }

    fn set_one_shot_frame_callback(&mut self, callback: Option<FrameCallback>) {
        let deliverable = {
            let Ok(mut state) = self.state() else {
                return;
            };
            if callback.is_some() {
                state.calls.push(CameraCall::RequestFrame);
            }
            state.pending_frame = callback;
            match state.delivery {
                FrameDelivery::Immediate => state.take_deliverable_frame(),
                FrameDelivery::Manual => None,
            }
        };
        if let Some((callback, frame)) = deliverable {
            callback(frame);
        }
    }

    fn clear_preview_callbacks(&mut self) {
        if let Ok(mut state) = self.state() {
            state.pending_frame = None;
        }
    }

    fn auto_focus(&mut self, callback: FocusCallback) -> BackendResult<()> {
        let immediate = {
            let mut state = self.state()?;
            state.calls.push(CameraCall::AutoFocus);
            if let Some(error) = state.faults.auto_focus.take() {
                return Err(error);
            }
            match state.delivery {
                FrameDelivery::Immediate => Some(state.focus_result),
                FrameDelivery::Manual => {
                    state.pending_focus = Some(callback);
                    return Ok(());
                }
            }
        };
        if let Some(success) = immediate {
            callback(success);
        }
        Ok(())
    }

    fn cancel_auto_focus(&mut self) -> BackendResult<()> {
        let mut state = self.state()?;
        state.calls.push(CameraCall::CancelAutoFocus);
        state.pending_focus = None;
        Ok(())
    }

    fn capture(&mut self, callbacks: CaptureCallbacks) -> BackendResult<()> {
        let jpeg = {
            let mut state = self.state()?;
            state.calls.push(CameraCall::Capture);
            if let Some(error) = state.faults.capture.take() {
                return Err(error);
            }
            if !state.previewing {
                return Err(BackendError::Other("capture requires a running preview".into()));
            }
            state.previewing = false;
            state.pending_frame = None;
            encode_jpeg(&state.image)?
        };
        info!(bytes = jpeg.len(), "Virtual camera captured picture");
        (callbacks.shutter)();
        (callbacks.raw)(None);
        (callbacks.postview)(None);
        (callbacks.jpeg)(jpeg);
        Ok(())
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        let mut state = lock(&self.state);
        state.calls.push(CameraCall::Release);
        state.open = false;
        state.previewing = false;
        state.pending_frame = None;
        state.pending_focus = None;
        state.closes += 1;
        debug!("Virtual camera released");
    }
}

/// Steers and inspects the virtual camera from outside the session
#[derive(Clone)]
pub struct VirtualCameraControl {
    state: Arc<Mutex<State>>,
}

impl VirtualCameraControl {
    fn state(&self) -> MutexGuard<'_, State> {
        lock(&self.state)
    }

    pub fn set_delivery(&self, delivery: FrameDelivery) {
        self.state().delivery = delivery;
    }

    /// Serve frames rendered from `image`
    pub fn set_image(&self, image: LumaImage) {
        self.state().image = image;
    }

    /// Result reported by subsequent focus runs
    pub fn set_focus_result(&self, success: bool) {
        self.state().focus_result = success;
    }

    pub fn fail_next_open(&self, error: BackendError) {
        self.state().faults.open = Some(error);
    }

    /// Reject the next `count` parameter writes
    pub fn reject_parameters(&self, count: u32) {
        self.state().faults.reject_parameters = count;
    }

    pub fn fail_next_start_preview(&self, error: BackendError) {
        self.state().faults.start_preview = Some(error);
    }

    pub fn fail_next_auto_focus(&self, error: BackendError) {
        self.state().faults.auto_focus = Some(error);
    }

    pub fn fail_next_capture(&self, error: BackendError) {
        self.state().faults.capture = Some(error);
    }

    /// Answer the pending one-shot frame callback
    ///
    /// Returns `false` when none is pending or the preview is stopped.
    pub fn deliver_frame(&self) -> bool {
        let deliverable = self.state().take_deliverable_frame();
        match deliverable {
            Some((callback, frame)) => {
                callback(frame);
                true
            }
            None => false,
        }
    }

    /// Finish the pending focus run with `success`
    pub fn complete_focus(&self, success: bool) -> bool {
        let pending = self.state().pending_focus.take();
        match pending {
            Some(callback) => {
                callback(success);
                true
            }
            None => false,
        }
    }

    pub fn has_pending_frame(&self) -> bool {
        self.state().pending_frame.is_some()
    }

    pub fn has_pending_focus(&self) -> bool {
        self.state().pending_focus.is_some()
    }

    pub fn is_open(&self) -> bool {
        self.state().open
    }

    pub fn is_previewing(&self) -> bool {
        self.state().previewing
    }

    pub fn parameters(&self) -> Option<CameraParameters> {
        self.state().parameters.clone()
    }

    pub fn display_orientation(&self) -> u32 {
        self.state().display_orientation
    }

    /// Open calls, successful or not
    pub fn open_attempts(&self) -> usize {
        self.state().open_attempts
    }

    /// Successful opens
    pub fn open_count(&self) -> usize {
        self.state().opens
    }

    pub fn close_count(&self) -> usize {
        self.state().closes
    }

    pub fn frames_delivered(&self) -> usize {
        self.state().frames_delivered
    }

    pub fn calls(&self) -> Vec<CameraCall> {
        self.state().calls.clone()
    }

    pub fn count_calls(&self, predicate: impl Fn(&CameraCall) -> bool) -> usize {
        self.state().calls.iter().filter(|call| predicate(call)).count()
    }
}

impl std::fmt::Debug for VirtualCameraControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("VirtualCameraControl")
            .field("open", &state.open)
            .field("previewing", &state.previewing)
            .field("delivery", &state.delivery)
            .finish()
    }
}
