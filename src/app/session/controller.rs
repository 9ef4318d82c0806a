// SPDX-License-Identifier: GPL-3.0-only

//! Session state owned by the camera worker
//!
//! [`SessionCore`] holds the camera handle and everything derived from it.
//! It lives on the camera worker thread and is only touched by tasks queued
//! on that worker, so none of its fields need locking. Hardware callbacks
//! never mutate it directly: they queue a task carrying the id of the
//! request they answer, and the task drops itself when that id is stale.

use super::SessionState;
use super::autofocus::AutoFocusLoop;
use super::readiness::ReadinessGate;
use super::scan::{ScanCallback, ScanRequest};
use super::view::{CropRegionProvider, DisplayInfo, ViewHost};
use crate::app::frame_processor::{
    DecodeOutcome, DecodePipeline, DecoderFactory, LuminanceFrame,
};
use crate::backends::camera::geometry;
use crate::backends::camera::parameters::{self, NegotiationRequest};
use crate::backends::camera::{
    CameraHandle, CameraProvider, CaptureCallbacks, Facing, HwFocusMode, NegotiatedParameters,
    Rect, Size, WorkerHandle,
};
use crate::config::Settings;
use crate::errors::CaptureError;
use crate::pipelines::photo::{PhotoCapture, PictureInfo, PictureRequest};
use chrono::Local;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

/// Reply for torch, zoom and focus requests
pub type DoneCallback = Box<dyn FnOnce(bool) + Send>;

/// Collaborators handed over by the session builder
pub(crate) struct SessionParts {
    pub id: Uuid,
    pub provider: Box<dyn CameraProvider>,
    pub view: Arc<dyn ViewHost>,
    pub display: Arc<dyn DisplayInfo>,
    pub crop: Option<Arc<dyn CropRegionProvider>>,
    pub decoder_factory: Arc<dyn DecoderFactory>,
    pub settings: Settings,
    pub facing: Facing,
    pub state_tx: watch::Sender<SessionState>,
}

/// Lifetime of one preview process, from start to close
#[derive(Debug, Default)]
struct PreviewProcess {
    open_failed: bool,
}

struct ManualFocus {
    id: u64,
    previous: Option<HwFocusMode>,
    resume_loop: bool,
    done: DoneCallback,
}

pub(crate) struct SessionCore {
    id: Uuid,
    worker: WorkerHandle<SessionCore>,
    provider: Box<dyn CameraProvider>,
    view: Arc<dyn ViewHost>,
    display: Arc<dyn DisplayInfo>,
    crop: Option<Arc<dyn CropRegionProvider>>,
    decoder_factory: Arc<dyn DecoderFactory>,
    settings: Settings,
    facing: Facing,

    state: SessionState,
    state_tx: watch::Sender<SessionState>,
    process: Option<PreviewProcess>,
    camera: Option<CameraHandle>,
    negotiated: Option<NegotiatedParameters>,
    container_size: Option<Size>,
    gate: ReadinessGate,
    preview_started: bool,

    autofocus: AutoFocusLoop,
    manual_focus: Option<ManualFocus>,
    next_focus_id: u64,

    decoder: Option<DecodePipeline>,
    scan: Option<ScanRequest>,
    suspended_scan: Option<ScanRequest>,
    next_scan_id: u64,
    decode_in_flight: bool,
    rearm_pending: bool,

    capture: PhotoCapture,
}

impl SessionCore {
    pub fn new(parts: SessionParts, worker: WorkerHandle<SessionCore>) -> Self {
        Self {
            id: parts.id,
            worker,
            provider: parts.provider,
            view: parts.view,
            display: parts.display,
            crop: parts.crop,
            decoder_factory: parts.decoder_factory,
            settings: parts.settings,
            facing: parts.facing,
            state: SessionState::Idle,
            state_tx: parts.state_tx,
            process: None,
            camera: None,
            negotiated: None,
            container_size: None,
            gate: ReadinessGate::new(),
            preview_started: false,
            autofocus: AutoFocusLoop::default(),
            manual_focus: None,
            next_focus_id: 0,
            decoder: None,
            scan: None,
            suspended_scan: None,
            next_scan_id: 0,
            decode_in_flight: false,
            rearm_pending: false,
            capture: PhotoCapture::new(),
        }
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state == state {
            return;
        }
        debug!(session = %self.id, from = %self.state, to = %state, "Session state changed");
        self.state = state;
        self.state_tx.send_replace(state);
    }

    fn current_crop(&self) -> Option<Rect> {
        self.crop.as_ref().and_then(|crop| crop.crop_rect())
    }

    // Lifecycle

    /// Begin a preview process, or retry the open of one that failed
    pub fn start_process(&mut self) {
        match self.process.as_ref() {
            Some(process) if process.open_failed && self.camera.is_none() => {
                info!(session = %self.id, "Retrying camera open");
            }
            Some(_) => {
                debug!(session = %self.id, "Preview process already running");
                return;
            }
            None => {
                self.process = Some(PreviewProcess::default());
                self.set_state(SessionState::Opening);
            }
        }
        self.open_camera();
    }

    fn open_camera(&mut self) {
        if self.camera.is_some() {
            debug!(session = %self.id, "Camera already open");
            return;
        }
        match self.provider.open(self.facing) {
            Ok(handle) => {
                info!(
                    session = %self.id,
                    camera = handle.id(),
                    facing = ?handle.facing(),
                    orientation = handle.orientation(),
                    "Camera opened"
                );
                self.camera = Some(handle);
                if let Some(process) = self.process.as_mut() {
                    process.open_failed = false;
                }
                self.set_state(SessionState::AwaitingLayout);
                self.view.request_layout();
            }
            Err(e) => {
                warn!(session = %self.id, error = %e, "Failed to open camera");
                if let Some(process) = self.process.as_mut() {
                    process.open_failed = true;
                }
            }
        }
    }

    /// The UI finished a layout pass at `size`
    pub fn on_view_sized(&mut self, size: Size) {
        if size.is_empty() {
            debug!(%size, "Ignoring empty view size");
            return;
        }
        self.container_size = Some(size);
        if self.process.is_none() {
            debug!(%size, "View sized without a preview process");
            return;
        }
        if self.preview_started || self.negotiated.is_some() {
            trace!(%size, "Parameters already negotiated");
            return;
        }
        let Some(display_rotation) = self.display.display_rotation() else {
            debug!("Display rotation unknown, waiting for next layout");
            return;
        };
        let Some((facing, orientation)) = self
            .camera
            .as_ref()
            .map(|camera| (camera.facing(), camera.orientation()))
        else {
            debug!("View sized before camera opened");
            return;
        };

        let request = NegotiationRequest {
            container_size: size,
            display_rotation,
            camera_display_orientation: geometry::camera_display_orientation(
                facing,
                orientation,
                display_rotation,
            ),
            settings: self.settings.clone(),
            crop_rect: self.current_crop(),
        };
        self.set_state(SessionState::NegotiatingParameters);

        let Some(camera) = self.camera.as_mut() else {
            return;
        };
        let outcome = parameters::negotiate(camera.device_mut(), &request);
        if outcome.is_safe_only() {
            info!(session = %self.id, "Running with safe parameters only");
        }
        match outcome.into_result() {
            Ok(negotiated) => {
                let preview_size = negotiated.preview_size;
                self.negotiated = Some(negotiated);
                self.set_state(SessionState::AwaitingReadiness);
                let available = self.view.is_surface_available();
                if self.gate.set_preview_size(Some(preview_size), available) {
                    self.notify_ready();
                }
            }
            Err(e) => {
                warn!(session = %self.id, error = %e, "Parameter negotiation failed");
            }
        }
    }

    /// The surface appeared, changed size or went away
    pub fn on_surface_size(&mut self, size: Option<Size>) {
        let available = self.view.is_surface_available();
        trace!(size = ?size, available, "Surface size changed");
        if self.gate.set_surface_size(size, available) {
            self.notify_ready();
        }
    }

    fn notify_ready(&self) {
        self.worker.enqueue(|core: &mut SessionCore| {
            core.on_readiness_achieved();
            Ok(())
        });
    }

    fn on_readiness_achieved(&mut self) {
        if self.process.is_none() {
            debug!("Readiness reached without a preview process");
            return;
        }
        self.start_preview();
    }

    fn start_preview(&mut self) {
        if self.preview_started {
            debug!("Preview already started");
            return;
        }
        let Some(negotiated) = self.negotiated.as_ref() else {
            debug!("Cannot start preview before negotiation");
            return;
        };
        if !self.gate.is_ready(self.view.is_surface_available()) {
            debug!("Cannot start preview, surface not ready");
            return;
        }
        let transform = negotiated.preview_transform();
        let wants_auto_focus = negotiated.wants_auto_focus_loop();
        let formats = negotiated.settings.decode_formats.clone();
        let preview_size = negotiated.preview_size;

        let Some(camera) = self.camera.as_mut() else {
            debug!("Cannot start preview without a camera");
            return;
        };
        self.view.apply_transform(transform);
        if let Err(e) = camera.device_mut().start_preview() {
            warn!(session = %self.id, error = %e, "Failed to start preview");
            return;
        }
        self.preview_started = true;
        self.autofocus.configure(wants_auto_focus);
        self.autofocus.start(camera.device_mut(), &self.worker);

        if self.decoder.is_none() {
            self.decoder = Some(DecodePipeline::spawn(self.decoder_factory.create(&formats)));
        }
        info!(session = %self.id, preview = %preview_size, "Preview started");
        self.set_state(SessionState::Previewing);
        self.arm_scan();
    }

    /// Start the preview again after a capture
    pub fn restart_preview(&mut self) {
        if self.preview_started {
            debug!("Preview already running");
            return;
        }
        if self.negotiated.is_none() {
            debug!("Cannot restart preview before negotiation");
            return;
        }
        let Some(camera) = self.camera.as_mut() else {
            debug!("No camera to restart preview on");
            return;
        };
        if let Err(e) = camera.device_mut().start_preview() {
            warn!(session = %self.id, error = %e, "Failed to restart preview");
            return;
        }
        self.preview_started = true;
        self.autofocus.start(camera.device_mut(), &self.worker);

        if self.decoder.is_none()
            && let Some(negotiated) = self.negotiated.as_ref()
        {
            let decoder = self
                .decoder_factory
                .create(&negotiated.settings.decode_formats);
            self.decoder = Some(DecodePipeline::spawn(decoder));
        }
        if self.scan.is_none() {
            self.scan = self.suspended_scan.take();
        } else {
            self.suspended_scan = None;
        }
        info!(session = %self.id, "Preview restarted");
        self.set_state(SessionState::Previewing);
        self.arm_scan();
    }

    /// Release the camera and everything derived from it
    pub fn close_camera(&mut self) {
        self.autofocus
            .stop(self.camera.as_mut().map(|camera| camera.device_mut()));
        if let Some(mut camera) = self.camera.take() {
            let device = camera.device_mut();
            device.clear_preview_callbacks();
            if self.preview_started
                && let Err(e) = device.stop_preview()
            {
                debug!(error = %e, "Failed to stop preview while closing");
            }
            let id = camera.id().to_string();
            self.provider.close(camera);
            info!(session = %self.id, camera = %id, "Camera released");
        }
        if let Some(mut decoder) = self.decoder.take() {
            decoder.shutdown();
        }
        if self.manual_focus.take().is_some() {
            debug!("Dropping unfinished manual focus");
        }
        self.capture.cancel();
        self.process = None;
        self.negotiated = None;
        self.preview_started = false;
        self.scan = None;
        self.suspended_scan = None;
        self.decode_in_flight = false;
        self.rearm_pending = false;
        let available = self.view.is_surface_available();
        self.gate.set_preview_size(None, available);
        self.set_state(SessionState::Closed);
    }

    pub fn set_settings(&mut self, settings: Settings) {
        debug!(session = %self.id, "Settings replaced, applied at next negotiation");
        self.settings = settings;
    }

    // Scanning

    /// Register `callback` as the scan request, replacing any previous one
    pub fn scan_barcode(&mut self, callback: Arc<dyn ScanCallback>) {
        self.next_scan_id += 1;
        let request = ScanRequest::new(self.next_scan_id, callback);
        debug!(session = %self.id, scan = request.id, "Scan requested");
        self.scan = Some(request);
        self.suspended_scan = None;
        self.arm_scan();
    }

    /// Ask the hardware for the next preview frame on behalf of the scan
    fn arm_scan(&mut self) {
        let Some(id) = self.scan.as_ref().map(|request| request.id) else {
            return;
        };
        if !self.preview_started {
            trace!(scan = id, "Scan waits for preview");
            return;
        }
        if self.decode_in_flight {
            self.rearm_pending = true;
            return;
        }
        let Some(camera) = self.camera.as_mut() else {
            return;
        };
        let worker = self.worker.clone();
        camera
            .device_mut()
            .set_one_shot_frame_callback(Some(Box::new(move |data| {
                worker.enqueue(move |core: &mut SessionCore| {
                    core.on_preview_frame(id, data);
                    Ok(())
                });
            })));
    }

    fn on_preview_frame(&mut self, id: u64, data: Vec<u8>) {
        let Some(request) = self.scan.clone() else {
            trace!(scan = id, "Frame arrived without a scan request");
            return;
        };
        if request.id != id {
            trace!(scan = id, current = request.id, "Dropping frame for replaced scan");
            return;
        }
        if !self.preview_started {
            return;
        }
        let (Some(negotiated), Some(decoder)) = (self.negotiated.as_ref(), self.decoder.as_ref())
        else {
            return;
        };
        let crop = negotiated.crop_preview_rect(self.current_crop());
        let Some(frame) = LuminanceFrame::from_preview(
            &data,
            negotiated.preview_size,
            negotiated.preview_format,
            negotiated.camera_display_orientation,
            crop,
        ) else {
            debug!(scan = id, "Unusable preview frame");
            if request.callback.auto_retry() {
                self.arm_scan();
            }
            return;
        };

        let worker = self.worker.clone();
        let submitted = decoder.submit(frame, request.callback.is_multiple(), move |outcome| {
            worker.enqueue(move |core: &mut SessionCore| {
                core.on_decode_outcome(id, outcome);
                Ok(())
            });
        });
        self.decode_in_flight = submitted;
    }

    fn on_decode_outcome(&mut self, id: u64, outcome: DecodeOutcome) {
        self.decode_in_flight = false;
        let rearm = std::mem::take(&mut self.rearm_pending);

        let request = match self.scan.clone() {
            Some(request) if request.id == id => request,
            _ => {
                debug!(scan = id, "Discarding stale decode result");
                if rearm {
                    self.arm_scan();
                }
                return;
            }
        };
        match outcome {
            DecodeOutcome::Single(Some(symbol)) => {
                info!(scan = id, format = %symbol.format, "Symbol decoded");
                request.callback.on_result(symbol);
            }
            DecodeOutcome::Multiple(symbols) if !symbols.is_empty() => {
                info!(scan = id, count = symbols.len(), "Symbols decoded");
                request.callback.on_results(symbols);
            }
            _ => {
                trace!(scan = id, "No symbol in frame");
                if rearm || request.callback.auto_retry() {
                    self.arm_scan();
                }
            }
        }
    }

    // Camera controls

    pub fn set_torch(&mut self, on: bool, done: Option<DoneCallback>) {
        let result = self.apply_torch(on);
        if let Some(done) = done {
            done(result);
        }
    }

    fn apply_torch(&mut self, on: bool) -> bool {
        let (Some(camera), Some(negotiated)) = (self.camera.as_mut(), self.negotiated.as_mut())
        else {
            debug!(on, "Torch request without an open camera");
            return false;
        };
        let Some(current) = camera.device().parameters() else {
            return false;
        };
        let Some(updated) =
            parameters::torch_parameters(&current, on, negotiated.settings.exposure_enabled)
        else {
            return true;
        };

        let resume = self.autofocus.is_active();
        self.autofocus.stop(Some(camera.device_mut()));
        let result = camera.device_mut().set_parameters(&updated);
        if resume {
            self.autofocus.start(camera.device_mut(), &self.worker);
        }
        match result {
            Ok(()) => {
                negotiated.torch = on;
                info!(on, "Torch switched");
                true
            }
            Err(e) => {
                warn!(on, error = %e, "Failed to switch torch");
                false
            }
        }
    }

    pub fn set_zoom(&mut self, factor: f32, done: Option<DoneCallback>) {
        let result = match self.camera.as_mut() {
            Some(camera) if self.negotiated.is_some() => {
                match parameters::set_zoom(camera.device_mut(), factor) {
                    Ok(zoomed) => zoomed,
                    Err(e) => {
                        warn!(factor, error = %e, "Failed to set zoom");
                        false
                    }
                }
            }
            _ => {
                debug!(factor, "Zoom request without an open camera");
                false
            }
        };
        if let Some(done) = done {
            done(result);
        }
    }

    /// Focus on the view point `(x, y)`
    pub fn focus_at(&mut self, x: f32, y: f32, done: DoneCallback) {
        let Some(container) = self.container_size else {
            debug!("Focus request before layout");
            return done(false);
        };
        let (Some(camera), true) = (self.camera.as_mut(), self.preview_started) else {
            debug!("Focus request without a running preview");
            return done(false);
        };
        let Some(area) = geometry::tap_to_focus_region(x, y, container, camera.orientation())
        else {
            return done(false);
        };

        // A newer tap takes over the pending one, keeping the mode and loop
        // state from before the first tap
        let superseded = self.manual_focus.take();
        let resume_loop =
            self.autofocus.is_active() || superseded.as_ref().is_some_and(|f| f.resume_loop);
        let carried = superseded.map(|focus| {
            debug!(focus = focus.id, "Manual focus superseded");
            (focus.done)(false);
            focus.previous
        });

        self.autofocus.stop(Some(camera.device_mut()));
        let previous = match parameters::begin_manual_focus(camera.device_mut(), area) {
            Ok(previous) => carried.unwrap_or(previous),
            Err(e) => {
                warn!(error = %e, "Failed to set focus area");
                if let Some(previous) = carried
                    && let Err(e) = parameters::restore_focus_mode(camera.device_mut(), previous)
                {
                    warn!(error = %e, "Failed to restore focus mode");
                }
                if resume_loop {
                    self.autofocus.start(camera.device_mut(), &self.worker);
                }
                return done(false);
            }
        };

        self.next_focus_id += 1;
        let id = self.next_focus_id;
        debug!(focus = id, %area, "Manual focus started");
        self.manual_focus = Some(ManualFocus {
            id,
            previous,
            resume_loop,
            done,
        });
        let worker = self.worker.clone();
        let result = camera.device_mut().auto_focus(Box::new(move |success| {
            worker.enqueue(move |core: &mut SessionCore| {
                core.on_manual_focus_done(id, success);
                Ok(())
            });
        }));
        if let Err(e) = result {
            warn!(error = %e, "Manual focus run failed");
            self.on_manual_focus_done(id, false);
        }
    }

    fn on_manual_focus_done(&mut self, id: u64, success: bool) {
        let Some(focus) = self.manual_focus.take_if(|focus| focus.id == id) else {
            trace!(focus = id, "Stale manual focus completion");
            return;
        };
        debug!(focus = id, success, "Manual focus finished");
        if let Some(camera) = self.camera.as_mut() {
            if let Err(e) = parameters::restore_focus_mode(camera.device_mut(), focus.previous) {
                warn!(error = %e, "Failed to restore focus mode");
            }
            if focus.resume_loop && self.preview_started {
                self.autofocus.start(camera.device_mut(), &self.worker);
            }
        }
        (focus.done)(success);
    }

    pub(crate) fn on_auto_focus_done(&mut self, generation: u64, success: bool) {
        self.autofocus.on_done(generation, success, &self.worker);
    }

    pub(crate) fn on_auto_focus_tick(&mut self, generation: u64) {
        if let Some(camera) = self.camera.as_mut() {
            self.autofocus
                .on_tick(generation, camera.device_mut(), &self.worker);
        }
    }

    // Capture

    pub fn take_picture(&mut self, request: PictureRequest) {
        if !self.preview_started {
            debug!(state = %self.state, "Capture requested while not previewing");
            return request.fail(CaptureError::NotPreviewing);
        }
        let Some((facing, orientation)) = self
            .camera
            .as_ref()
            .map(|camera| (camera.facing(), camera.orientation()))
        else {
            return request.fail(CaptureError::NoCamera);
        };

        let fallback_rotation = self
            .negotiated
            .as_ref()
            .map(|n| n.display_rotation)
            .unwrap_or(0);
        let display_rotation = self.display.display_rotation().unwrap_or(fallback_rotation);
        let device_rotation = self.display.device_rotation();
        let crop_rect = self
            .negotiated
            .as_ref()
            .and_then(|n| n.crop_preview_rect(self.current_crop()));
        let info = PictureInfo {
            display_rotation,
            device_rotation,
            capture_rotation: geometry::capture_rotation(
                facing,
                orientation,
                display_rotation,
                device_rotation,
            ),
            crop_rect,
            captured_at: Local::now(),
        };

        // Scanning pauses for the capture and resumes with the preview
        self.preview_started = false;
        if let Some(scan) = self.scan.take() {
            self.suspended_scan = Some(scan);
        }
        self.rearm_pending = false;
        let resume_loop = self.autofocus.is_active();
        self.set_state(SessionState::Capturing);

        let id = self.capture.begin(request, info);
        let callbacks = self.capture_callbacks(id);
        let Some(camera) = self.camera.as_mut() else {
            return;
        };
        camera.device_mut().set_one_shot_frame_callback(None);
        self.autofocus.stop(Some(camera.device_mut()));
        match camera.device_mut().capture(callbacks) {
            Ok(()) => info!(session = %self.id, capture = id, "Capture started"),
            Err(e) => {
                warn!(session = %self.id, error = %e, "Capture failed to start");
                self.capture.fail(id, CaptureError::Hardware(e.to_string()));
                // The preview was never stopped; go back to scanning
                self.preview_started = true;
                if resume_loop {
                    self.autofocus.start(camera.device_mut(), &self.worker);
                }
                self.scan = self.suspended_scan.take();
                self.set_state(SessionState::Previewing);
                self.arm_scan();
            }
        }
    }

    fn capture_callbacks(&self, id: u64) -> CaptureCallbacks {
        let shutter = self.worker.clone();
        let raw = self.worker.clone();
        let postview = self.worker.clone();
        let jpeg = self.worker.clone();
        CaptureCallbacks {
            shutter: Box::new(move || {
                shutter.enqueue(move |core: &mut SessionCore| {
                    core.capture.deliver_shutter(id);
                    Ok(())
                });
            }),
            raw: Box::new(move |data| {
                raw.enqueue(move |core: &mut SessionCore| {
                    core.capture.deliver_raw(id, data);
                    Ok(())
                });
            }),
            postview: Box::new(move |data| {
                postview.enqueue(move |core: &mut SessionCore| {
                    core.capture.deliver_postview(id, data);
                    Ok(())
                });
            }),
            jpeg: Box::new(move |data| {
                jpeg.enqueue(move |core: &mut SessionCore| {
                    core.on_picture_taken(id, data);
                    Ok(())
                });
            }),
        }
    }

    /// Without auto-restart the session stays in `Capturing`, camera open and
    /// preview stopped, until `restart_preview` or close
    fn on_picture_taken(&mut self, id: u64, data: Vec<u8>) {
        if let Some(true) = self.capture.deliver_jpeg(id, data) {
            self.restart_preview();
        }
    }
}
