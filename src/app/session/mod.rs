// SPDX-License-Identifier: GPL-3.0-only

//! Camera session
//!
//! A [`CameraSession`] drives one camera from open to close:
//!
//! ```text
//! Idle ─▶ Opening ─▶ AwaitingLayout ─▶ NegotiatingParameters ─▶ AwaitingReadiness
//!                                                                      │
//!             Capturing ◀─── take_picture ─── Previewing ◀─────────────┘
//!                 │                              ▲
//!                 └──────── restart_preview ─────┘
//!
//! any state ─▶ Closed on pause/destroy, Closed ─▶ Opening on resume
//! ```
//!
//! Every public method returns immediately. The work is queued on the camera
//! worker thread, which is the only thread that touches the hardware. Replies
//! (scan results, capture callbacks, torch/zoom/focus results) are invoked on
//! that worker thread.

mod autofocus;
mod controller;
pub mod readiness;
pub mod scan;
pub mod view;

pub use controller::DoneCallback;
pub use readiness::ReadinessGate;
pub use scan::ScanCallback;
pub use view::{
    CropRegionProvider, DisplayInfo, DisplayOrientationTracker, OffscreenSurface, ViewHost,
};

use crate::app::frame_processor::{DecoderFactory, QrDecoderFactory, Symbol};
use crate::backends::camera::{CameraProvider, Facing, Size, Worker, WorkerHandle};
use crate::config::Settings;
use crate::constants::CAMERA_WORKER_NAME;
use crate::pipelines::photo::PictureRequest;
use controller::{SessionCore, SessionParts};
use scan::OneShotScan;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tracing::{debug, info};
use uuid::Uuid;

/// Where the session is in its startup sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Opening,
    AwaitingLayout,
    NegotiatingParameters,
    AwaitingReadiness,
    Previewing,
    /// A still capture is running, or finished without restarting the
    /// preview; [`CameraSession::restart_preview`] leaves it
    Capturing,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Opening => "opening",
            SessionState::AwaitingLayout => "awaiting-layout",
            SessionState::NegotiatingParameters => "negotiating",
            SessionState::AwaitingReadiness => "awaiting-readiness",
            SessionState::Previewing => "previewing",
            SessionState::Capturing => "capturing",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Host lifecycle notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Create,
    Start,
    Resume,
    Pause,
    Stop,
    Destroy,
}

/// Builder for [`CameraSession`]
pub struct CameraSessionBuilder {
    provider: Box<dyn CameraProvider>,
    view: Arc<dyn ViewHost>,
    display: Option<Arc<dyn DisplayInfo>>,
    crop: Option<Arc<dyn CropRegionProvider>>,
    decoder_factory: Option<Arc<dyn DecoderFactory>>,
    settings: Settings,
    facing: Facing,
}

impl CameraSessionBuilder {
    /// Source of display and device rotation; defaults to a tracker fixed at 0°
    pub fn display(mut self, display: Arc<dyn DisplayInfo>) -> Self {
        self.display = Some(display);
        self
    }

    pub fn crop_region(mut self, crop: Arc<dyn CropRegionProvider>) -> Self {
        self.crop = Some(crop);
        self
    }

    /// Decoder used while scanning; defaults to the QR decoder
    pub fn decoder_factory(mut self, factory: Arc<dyn DecoderFactory>) -> Self {
        self.decoder_factory = Some(factory);
        self
    }

    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn facing(mut self, facing: Facing) -> Self {
        self.facing = facing;
        self
    }

    /// Spawn the camera worker and start opening the camera
    pub fn build(self) -> CameraSession {
        let id = Uuid::new_v4();
        let (state_tx, state_rx) = watch::channel(SessionState::Idle);
        let parts = SessionParts {
            id,
            provider: self.provider,
            view: Arc::clone(&self.view),
            display: self
                .display
                .unwrap_or_else(|| Arc::new(DisplayOrientationTracker::default())),
            crop: self.crop,
            decoder_factory: self
                .decoder_factory
                .unwrap_or_else(|| Arc::new(QrDecoderFactory)),
            settings: self.settings,
            facing: self.facing,
            state_tx,
        };
        let worker = Worker::spawn_with(CAMERA_WORKER_NAME, move |handle| {
            SessionCore::new(parts, handle)
        });
        info!(session = %id, facing = ?self.facing, "Camera session created");

        let session = CameraSession {
            id,
            handle: worker.handle().clone(),
            worker: Mutex::new(worker),
            view: self.view,
            state: state_rx,
            manual_focus: AtomicBool::new(true),
            destroyed: AtomicBool::new(false),
        };
        session.create();
        session
    }
}

/// Handle to one camera preview session
pub struct CameraSession {
    id: Uuid,
    handle: WorkerHandle<SessionCore>,
    worker: Mutex<Worker<SessionCore>>,
    view: Arc<dyn ViewHost>,
    state: watch::Receiver<SessionState>,
    manual_focus: AtomicBool,
    destroyed: AtomicBool,
}

impl CameraSession {
    pub fn builder<P>(provider: P, view: Arc<dyn ViewHost>) -> CameraSessionBuilder
    where
        P: CameraProvider + 'static,
    {
        CameraSessionBuilder {
            provider: Box::new(provider),
            view,
            display: None,
            crop: None,
            decoder_factory: None,
            settings: Settings::default(),
            facing: Facing::default(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Watch state transitions
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    fn run<F>(&self, task: F) -> bool
    where
        F: FnOnce(&mut SessionCore) + Send + 'static,
    {
        self.handle.enqueue(move |core: &mut SessionCore| {
            task(core);
            Ok(())
        })
    }

    /// Wait until every request queued so far has been handled
    pub fn flush(&self, timeout: Duration) -> bool {
        self.handle.flush(timeout)
    }

    pub fn handle_lifecycle(&self, event: LifecycleEvent) {
        debug!(session = %self.id, ?event, "Lifecycle event");
        match event {
            LifecycleEvent::Create => self.create(),
            LifecycleEvent::Resume => self.resume(),
            LifecycleEvent::Pause => self.pause(),
            LifecycleEvent::Destroy => self.destroy(),
            LifecycleEvent::Start | LifecycleEvent::Stop => {}
        }
    }

    /// Open the camera and start the preview process
    ///
    /// [`CameraSessionBuilder::build`] already does this; calling it again
    /// while a process runs does nothing.
    pub fn create(&self) {
        self.run(SessionCore::start_process);
    }

    /// Start the preview process again after [`pause`](Self::pause)
    ///
    /// Also retries an open that failed.
    pub fn resume(&self) {
        self.run(SessionCore::start_process);
    }

    /// Release the camera; [`resume`](Self::resume) opens it again
    pub fn pause(&self) {
        self.run(SessionCore::close_camera);
    }

    /// Release the camera, stop the worker and free the surface
    ///
    /// Requests made afterwards are dropped.
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.run(SessionCore::close_camera);
        self.worker
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .shutdown();
        self.view.release_surface();
        info!(session = %self.id, "Camera session destroyed");
    }

    /// The UI laid the view out at `width`×`height`
    pub fn on_view_sized(&self, width: u32, height: u32) {
        let size = Size::new(width, height);
        self.run(move |core| core.on_view_sized(size));
    }

    pub fn on_surface_available(&self, width: u32, height: u32) {
        let size = Size::new(width, height);
        self.run(move |core| core.on_surface_size(Some(size)));
    }

    pub fn on_surface_size_changed(&self, width: u32, height: u32) {
        self.on_surface_available(width, height);
    }

    pub fn on_surface_destroyed(&self) {
        self.run(|core| core.on_surface_size(None));
    }

    /// Decode preview frames until `callback` receives a result
    ///
    /// Replaces any previous request; frames already in flight for it are
    /// discarded.
    pub fn scan_barcode(&self, callback: Arc<dyn ScanCallback>) {
        self.run(move |core| core.scan_barcode(callback));
    }

    /// Scan for a single symbol
    ///
    /// The receiver reports an error if the request is replaced or the
    /// camera closes first.
    pub fn scan_once(&self) -> oneshot::Receiver<Symbol> {
        let (tx, rx) = oneshot::channel();
        self.scan_barcode(Arc::new(OneShotScan::new(tx)));
        rx
    }

    pub fn take_picture(&self, request: PictureRequest) {
        self.run(move |core| core.take_picture(request));
    }

    pub fn restart_preview(&self) {
        self.run(SessionCore::restart_preview);
    }

    pub fn set_torch(&self, on: bool, done: Option<DoneCallback>) {
        self.run(move |core| core.set_torch(on, done));
    }

    pub fn set_zoom(&self, factor: f32, done: Option<DoneCallback>) {
        self.run(move |core| core.set_zoom(factor, done));
    }

    pub fn set_manual_focus_enabled(&self, enabled: bool) {
        self.manual_focus.store(enabled, Ordering::SeqCst);
    }

    pub fn is_manual_focus_enabled(&self) -> bool {
        self.manual_focus.load(Ordering::SeqCst)
    }

    /// Focus on the view point `(x, y)`; `done` receives whether focus locked
    ///
    /// A tap arriving while another is still focusing replaces it; the earlier
    /// `done` receives `false`.
    pub fn focus_at(&self, x: f32, y: f32, done: DoneCallback) {
        if !self.is_manual_focus_enabled() {
            debug!(x, y, "Manual focus disabled");
            return done(false);
        }
        self.run(move |core| core.focus_at(x, y, done));
    }

    /// Replace the settings used by the next negotiation
    pub fn set_settings(&self, settings: Settings) {
        self.run(move |core| core.set_settings(settings));
    }
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl fmt::Debug for CameraSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CameraSession")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}
