// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for the camera session against the virtual camera

use scancam::app::frame_processor::{Decoder, DecoderFactory, LuminanceFrame, Symbol, SymbolFormat};
use scancam::app::session::{CameraSessionBuilder, DisplayOrientationTracker, DoneCallback};
use scancam::backends::camera::{
    BackendError, CameraInfo, Facing, FlashMode, HwFocusMode, Size,
};
use scancam::backends::virtual_camera::{
    CameraCall, FrameDelivery, VirtualCameraControl, VirtualCameraProvider, default_parameters,
};
use scancam::errors::CaptureError;
use scancam::{
    CameraSession, LifecycleEvent, OffscreenSurface, PictureRequest, ScanCallback, SessionState,
    Settings,
};
use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const VIEW: Size = Size::new(480, 640);
const TIMEOUT: Duration = Duration::from_secs(5);

fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + TIMEOUT;
    while !condition() {
        assert!(Instant::now() < deadline, "Timed out waiting for {}", what);
        std::thread::sleep(Duration::from_millis(5));
    }
}

fn wait_for_state(session: &CameraSession, state: SessionState) {
    wait_until(&format!("state {}", state), || session.state() == state);
}

/// Decoder answering from a shared script; an exhausted script decodes nothing
#[derive(Clone, Default)]
struct Script(Arc<Mutex<VecDeque<Option<Symbol>>>>);

impl Script {
    fn push(&self, result: Option<&str>) {
        self.0
            .lock()
            .unwrap()
            .push_back(result.map(|text| Symbol::new(text, SymbolFormat::QrCode)));
    }
}

struct ScriptedDecoder(Script);

impl Decoder for ScriptedDecoder {
    fn decode(&mut self, _frame: &LuminanceFrame) -> Option<Symbol> {
        self.0.0.lock().unwrap().pop_front().flatten()
    }
}

fn scripted(script: &Script) -> Arc<dyn DecoderFactory> {
    let script = script.clone();
    Arc::new(move |_formats: &[SymbolFormat]| {
        Box::new(ScriptedDecoder(script.clone())) as Box<dyn Decoder>
    })
}

/// Decoder that waits for each result to be handed to it
struct GatedDecoder(Arc<Mutex<Receiver<Option<Symbol>>>>);

impl Decoder for GatedDecoder {
    fn decode(&mut self, _frame: &LuminanceFrame) -> Option<Symbol> {
        self.0.lock().unwrap().recv_timeout(TIMEOUT).ok().flatten()
    }
}

fn collecting_scan() -> (Arc<dyn ScanCallback>, Receiver<String>) {
    let (tx, rx) = mpsc::channel();
    let callback: Arc<dyn ScanCallback> = Arc::new(move |symbol: Symbol| {
        let _ = tx.send(symbol.text);
    });
    (callback, rx)
}

fn done_channel() -> (DoneCallback, Receiver<bool>) {
    let (tx, rx) = mpsc::channel();
    let done: DoneCallback = Box::new(move |ok| {
        let _ = tx.send(ok);
    });
    (done, rx)
}

struct Fixture {
    session: CameraSession,
    control: VirtualCameraControl,
    surface: Arc<OffscreenSurface>,
}

impl Fixture {
    fn build(
        provider: VirtualCameraProvider,
        configure: impl FnOnce(CameraSessionBuilder) -> CameraSessionBuilder,
    ) -> Self {
        let control = provider.control();
        control.set_delivery(FrameDelivery::Manual);
        let surface = Arc::new(OffscreenSurface::available(VIEW));
        let session = configure(CameraSession::builder(provider, surface.clone())).build();
        Self {
            session,
            control,
            surface,
        }
    }

    fn new() -> Self {
        Self::build(VirtualCameraProvider::new(), |b| b)
    }

    /// Deliver the layout and surface events the UI would send
    fn lay_out(&self) {
        self.session.on_view_sized(VIEW.width, VIEW.height);
        self.session.on_surface_available(VIEW.width, VIEW.height);
    }

    fn previewing(self) -> Self {
        self.lay_out();
        wait_for_state(&self.session, SessionState::Previewing);
        self
    }

    fn settle(&self) {
        for _ in 0..3 {
            assert!(self.session.flush(TIMEOUT));
        }
    }

    fn count(&self, call: CameraCall) -> usize {
        self.control.count_calls(|c| *c == call)
    }

    fn parameter_writes(&self) -> usize {
        self.control
            .count_calls(|c| matches!(c, CameraCall::SetParameters(_)))
    }
}

// ===== Startup sequence =====

#[test]
fn test_startup_reaches_previewing() {
    let fixture = Fixture::new();
    let mut states = fixture.session.subscribe_state();

    wait_for_state(&fixture.session, SessionState::AwaitingLayout);
    assert_eq!(fixture.surface.layout_requests(), 1);
    assert!(fixture.control.is_open());

    fixture.lay_out();
    wait_for_state(&fixture.session, SessionState::Previewing);
    assert!(fixture.control.is_previewing());
    assert!(fixture.surface.last_transform().is_some());
    assert!(states.has_changed().unwrap_or(false));
    assert_eq!(*states.borrow_and_update(), SessionState::Previewing);
}

#[test]
fn test_portrait_view_negotiates_rotated_preview() {
    let mut parameters = default_parameters();
    parameters.supported_preview_sizes = vec![Size::new(640, 480), Size::new(1280, 720)];
    let provider = VirtualCameraProvider::with_camera(CameraInfo::default(), Some(parameters));
    let fixture = Fixture::build(provider, |b| b);

    fixture.session.on_view_sized(1080, 1920);
    fixture.session.on_surface_available(1080, 1920);
    wait_for_state(&fixture.session, SessionState::Previewing);

    let applied = fixture.control.parameters().unwrap();
    assert_eq!(applied.preview_size, Some(Size::new(1280, 720)));
    assert_eq!(fixture.control.display_orientation(), 90);
}

#[test]
fn test_second_create_does_not_reopen() {
    let fixture = Fixture::new();
    fixture.session.create();
    fixture.session.resume();
    fixture.settle();

    assert_eq!(fixture.control.open_attempts(), 1);
    assert_eq!(fixture.session.state(), SessionState::AwaitingLayout);
}

#[test]
fn test_open_failure_is_retried_on_resume() {
    let provider = VirtualCameraProvider::new();
    provider
        .control()
        .fail_next_open(BackendError::PermissionDenied);
    let fixture = Fixture::build(provider, |b| b);
    fixture.settle();
    assert_eq!(fixture.session.state(), SessionState::Opening);
    assert!(!fixture.control.is_open());

    fixture.session.resume();
    wait_for_state(&fixture.session, SessionState::AwaitingLayout);
    assert_eq!(fixture.control.open_attempts(), 2);
    assert_eq!(fixture.control.open_count(), 1);
}

#[test]
fn test_unknown_display_rotation_waits_for_layout() {
    let display = Arc::new(DisplayOrientationTracker::new(None));
    let fixture = Fixture::build(VirtualCameraProvider::new(), |b| b.display(display.clone()));
    fixture.lay_out();
    fixture.settle();
    assert_eq!(fixture.session.state(), SessionState::AwaitingLayout);
    assert_eq!(fixture.parameter_writes(), 0);

    display.set_display_rotation(Some(0));
    fixture.session.on_view_sized(VIEW.width, VIEW.height);
    wait_for_state(&fixture.session, SessionState::Previewing);
}

#[test]
fn test_surface_unavailable_blocks_preview() {
    let fixture = Fixture::new();
    fixture.surface.set_available(false);
    fixture.lay_out();
    fixture.settle();
    assert_eq!(fixture.session.state(), SessionState::AwaitingReadiness);
    assert_eq!(fixture.count(CameraCall::StartPreview), 0);

    // Surface recreated
    fixture.surface.set_available(true);
    fixture.session.on_surface_destroyed();
    fixture
        .session
        .on_surface_available(VIEW.width, VIEW.height);
    wait_for_state(&fixture.session, SessionState::Previewing);
    assert_eq!(fixture.count(CameraCall::StartPreview), 1);
}

#[test]
fn test_safe_mode_fallback_still_previews() {
    let provider = VirtualCameraProvider::new();
    provider.control().reject_parameters(1);
    let settings = Settings {
        torch: true,
        ..Settings::default()
    };
    let fixture = Fixture::build(provider, |b| b.settings(settings)).previewing();

    assert_eq!(fixture.parameter_writes(), 2);
    let applied = fixture.control.parameters().unwrap();
    assert_eq!(applied.flash_mode, Some(FlashMode::Off));
    assert_eq!(applied.focus_mode, Some(HwFocusMode::Auto));
}

#[test]
fn test_negotiation_failure_halts_startup() {
    let provider = VirtualCameraProvider::new();
    provider.control().reject_parameters(2);
    let fixture = Fixture::build(provider, |b| b);
    fixture.lay_out();
    fixture.settle();

    assert_eq!(
        fixture.session.state(),
        SessionState::NegotiatingParameters
    );
    assert_eq!(fixture.count(CameraCall::StartPreview), 0);
}

#[test]
fn test_missing_parameters_halts_startup() {
    let provider = VirtualCameraProvider::with_camera(CameraInfo::default(), None);
    let fixture = Fixture::build(provider, |b| b);
    fixture.lay_out();
    fixture.settle();

    assert_eq!(
        fixture.session.state(),
        SessionState::NegotiatingParameters
    );
}

// ===== Lifecycle =====

#[test]
fn test_pause_and_resume() {
    let fixture = Fixture::new().previewing();

    fixture.session.handle_lifecycle(LifecycleEvent::Pause);
    wait_for_state(&fixture.session, SessionState::Closed);
    assert!(!fixture.control.is_open());
    assert_eq!(fixture.control.close_count(), 1);

    // Start and Stop are not mapped
    fixture.session.handle_lifecycle(LifecycleEvent::Start);
    fixture.session.handle_lifecycle(LifecycleEvent::Stop);
    fixture.settle();
    assert_eq!(fixture.session.state(), SessionState::Closed);

    fixture.session.handle_lifecycle(LifecycleEvent::Resume);
    wait_for_state(&fixture.session, SessionState::AwaitingLayout);
    assert_eq!(fixture.surface.layout_requests(), 2);

    fixture.session.on_view_sized(VIEW.width, VIEW.height);
    wait_for_state(&fixture.session, SessionState::Previewing);
    assert_eq!(fixture.control.open_count(), 2);
}

#[test]
fn test_destroy_rejects_later_requests() {
    let fixture = Fixture::new().previewing();
    fixture.session.destroy();

    assert!(!fixture.control.is_open());
    assert!(fixture.surface.is_released());
    assert_eq!(fixture.session.state(), SessionState::Closed);

    let calls = fixture.control.calls().len();
    let (done, rx) = done_channel();
    fixture.session.set_torch(true, Some(done));
    fixture.session.resume();
    fixture.session.take_picture(PictureRequest::new());
    assert!(!fixture.session.flush(Duration::from_millis(100)));

    assert_eq!(fixture.control.calls().len(), calls);
    assert!(rx.try_recv().is_err());
    assert_eq!(fixture.control.open_count(), 1);
}

#[test]
fn test_drop_releases_camera() {
    let fixture = Fixture::new().previewing();
    let control = fixture.control.clone();
    drop(fixture);
    assert!(!control.is_open());
    assert_eq!(control.close_count(), 1);
}

// ===== Scanning =====

#[test]
fn test_scan_retries_until_symbol() {
    let script = Script::default();
    script.push(None);
    script.push(Some("hello"));
    let fixture = Fixture::build(VirtualCameraProvider::new(), |b| {
        b.decoder_factory(scripted(&script))
    })
    .previewing();

    let (callback, results) = collecting_scan();
    fixture.session.scan_barcode(callback);
    fixture.settle();
    assert!(fixture.control.has_pending_frame());

    assert!(fixture.control.deliver_frame());
    wait_until("retry frame request", || fixture.control.has_pending_frame());
    assert!(results.try_recv().is_err());

    assert!(fixture.control.deliver_frame());
    assert_eq!(results.recv_timeout(TIMEOUT).as_deref(), Ok("hello"));

    // A found symbol does not request another frame
    fixture.settle();
    assert!(!fixture.control.has_pending_frame());
}

#[test]
fn test_scan_registered_before_preview_starts_with_it() {
    let script = Script::default();
    script.push(Some("early"));
    let fixture = Fixture::build(VirtualCameraProvider::new(), |b| {
        b.decoder_factory(scripted(&script))
    });

    let (callback, results) = collecting_scan();
    fixture.session.scan_barcode(callback);
    fixture.settle();
    assert!(!fixture.control.has_pending_frame());

    fixture.lay_out();
    wait_for_state(&fixture.session, SessionState::Previewing);
    wait_until("frame request", || fixture.control.has_pending_frame());
    assert!(fixture.control.deliver_frame());
    assert_eq!(results.recv_timeout(TIMEOUT).as_deref(), Ok("early"));
}

#[test]
fn test_superseded_scan_is_not_called() {
    let (gate, gate_rx) = mpsc::channel();
    let gate_rx = Arc::new(Mutex::new(gate_rx));
    let factory: Arc<dyn DecoderFactory> = Arc::new(move |_formats: &[SymbolFormat]| {
        Box::new(GatedDecoder(Arc::clone(&gate_rx))) as Box<dyn Decoder>
    });
    let fixture = Fixture::build(VirtualCameraProvider::new(), |b| b.decoder_factory(factory))
        .previewing();

    let (first, first_results) = collecting_scan();
    fixture.session.scan_barcode(first);
    fixture.settle();
    assert!(fixture.control.deliver_frame());
    fixture.settle();

    // Replace the request while its frame is being decoded
    let (second, second_results) = collecting_scan();
    fixture.session.scan_barcode(second);
    fixture.settle();
    gate.send(Some(Symbol::new("stale", SymbolFormat::QrCode)))
        .unwrap();

    wait_until("frame for replacement", || {
        fixture.control.has_pending_frame()
    });
    assert!(fixture.control.deliver_frame());
    gate.send(Some(Symbol::new("fresh", SymbolFormat::QrCode)))
        .unwrap();

    assert_eq!(second_results.recv_timeout(TIMEOUT).as_deref(), Ok("fresh"));
    fixture.settle();
    assert!(first_results.try_recv().is_err());
}

#[test]
fn test_scan_without_retry_goes_idle() {
    struct NoRetry(mpsc::Sender<String>);
    impl ScanCallback for NoRetry {
        fn auto_retry(&self) -> bool {
            false
        }
        fn on_result(&self, symbol: Symbol) {
            let _ = self.0.send(symbol.text);
        }
    }

    let fixture = Fixture::build(VirtualCameraProvider::new(), |b| {
        b.decoder_factory(scripted(&Script::default()))
    })
    .previewing();
    let (tx, rx) = mpsc::channel();
    fixture.session.scan_barcode(Arc::new(NoRetry(tx)));
    fixture.settle();
    assert!(fixture.control.deliver_frame());

    std::thread::sleep(Duration::from_millis(50));
    fixture.settle();
    assert!(!fixture.control.has_pending_frame());
    assert!(rx.try_recv().is_err());
}

#[test]
fn test_scan_once_closes_on_pause() {
    let fixture = Fixture::new().previewing();
    let result = fixture.session.scan_once();
    fixture.session.pause();
    fixture.settle();
    assert!(result.blocking_recv().is_err());
}

// ===== Controls =====

#[test]
fn test_torch_toggle() {
    let fixture = Fixture::new().previewing();

    let (done, rx) = done_channel();
    fixture.session.set_torch(true, Some(done));
    assert_eq!(rx.recv_timeout(TIMEOUT), Ok(true));
    assert_eq!(
        fixture.control.parameters().unwrap().flash_mode,
        Some(FlashMode::Torch)
    );

    // Already lit: success without another write
    let writes = fixture.parameter_writes();
    let (done, rx) = done_channel();
    fixture.session.set_torch(true, Some(done));
    assert_eq!(rx.recv_timeout(TIMEOUT), Ok(true));
    assert_eq!(fixture.parameter_writes(), writes);
}

#[test]
fn test_torch_without_camera_fails() {
    let provider = VirtualCameraProvider::new();
    provider.control().fail_next_open(BackendError::Busy);
    let fixture = Fixture::build(provider, |b| b);

    let (done, rx) = done_channel();
    fixture.session.set_torch(true, Some(done));
    assert_eq!(rx.recv_timeout(TIMEOUT), Ok(false));
}

#[test]
fn test_zoom_selects_ratio_index() {
    let fixture = Fixture::new().previewing();

    let (done, rx) = done_channel();
    fixture.session.set_zoom(2.0, Some(done));
    assert_eq!(rx.recv_timeout(TIMEOUT), Ok(true));
    assert_eq!(fixture.control.parameters().unwrap().zoom, 2);
}

#[test]
fn test_zoom_unsupported_fails() {
    let mut parameters = default_parameters();
    parameters.zoom_supported = false;
    let provider = VirtualCameraProvider::with_camera(CameraInfo::default(), Some(parameters));
    let fixture = Fixture::build(provider, |b| b).previewing();

    let (done, rx) = done_channel();
    fixture.session.set_zoom(2.0, Some(done));
    assert_eq!(rx.recv_timeout(TIMEOUT), Ok(false));
}

#[test]
fn test_manual_focus_restores_mode() {
    let fixture = Fixture::new().previewing();
    wait_until("auto-focus loop", || fixture.control.has_pending_focus());

    let (done, rx) = done_channel();
    fixture.session.focus_at(240.0, 320.0, done);
    fixture.settle();
    let during = fixture.control.parameters().unwrap();
    assert_eq!(during.focus_mode, Some(HwFocusMode::Macro));
    assert_eq!(during.focus_areas.len(), 1);
    assert_eq!(during.focus_areas[0].weight, 1000);

    assert!(fixture.control.complete_focus(true));
    assert_eq!(rx.recv_timeout(TIMEOUT), Ok(true));
    fixture.settle();
    assert_eq!(
        fixture.control.parameters().unwrap().focus_mode,
        Some(HwFocusMode::Auto)
    );
    // The periodic loop is running again
    assert!(fixture.control.has_pending_focus());
}

#[test]
fn test_second_tap_replaces_pending_focus() {
    let fixture = Fixture::new().previewing();
    wait_until("auto-focus loop", || fixture.control.has_pending_focus());

    let (first, first_rx) = done_channel();
    fixture.session.focus_at(240.0, 320.0, first);
    let (second, second_rx) = done_channel();
    fixture.session.focus_at(100.0, 100.0, second);
    fixture.settle();
    assert_eq!(first_rx.try_recv(), Ok(false));
    assert_eq!(
        fixture.control.parameters().unwrap().focus_mode,
        Some(HwFocusMode::Macro)
    );

    assert!(fixture.control.complete_focus(true));
    assert_eq!(second_rx.recv_timeout(TIMEOUT), Ok(true));
    fixture.settle();
    // The mode from before the first tap comes back, with the loop
    assert_eq!(
        fixture.control.parameters().unwrap().focus_mode,
        Some(HwFocusMode::Auto)
    );
    assert!(fixture.control.has_pending_focus());
}

#[test]
fn test_manual_focus_disabled() {
    let fixture = Fixture::new().previewing();
    fixture.session.set_manual_focus_enabled(false);

    let (done, rx) = done_channel();
    fixture.session.focus_at(10.0, 10.0, done);
    assert_eq!(rx.try_recv(), Ok(false));
}

#[test]
fn test_auto_focus_failure_is_contained() {
    let provider = VirtualCameraProvider::new();
    provider
        .control()
        .fail_next_auto_focus(BackendError::Other("focus motor".into()));
    let fixture = Fixture::build(provider, |b| b).previewing();

    fixture.settle();
    assert_eq!(fixture.session.state(), SessionState::Previewing);
    assert_eq!(fixture.count(CameraCall::AutoFocus), 1);
}

// ===== Capture =====

#[test]
fn test_take_picture_while_not_previewing() {
    let provider = VirtualCameraProvider::new();
    provider.control().fail_next_open(BackendError::PermissionDenied);
    let fixture = Fixture::build(provider, |b| b);

    let (tx, rx) = mpsc::channel();
    fixture
        .session
        .take_picture(PictureRequest::new().on_error(move |e| {
            let _ = tx.send(e);
        }));
    assert_eq!(rx.recv_timeout(TIMEOUT), Ok(CaptureError::NotPreviewing));
    assert_eq!(fixture.count(CameraCall::Capture), 0);
}

#[test]
fn test_take_picture_restarts_preview_and_scan() {
    let fixture = Fixture::build(VirtualCameraProvider::new(), |b| {
        b.decoder_factory(scripted(&Script::default()))
    })
    .previewing();
    let (callback, _results) = collecting_scan();
    fixture.session.scan_barcode(callback);
    fixture.settle();
    assert!(fixture.control.has_pending_frame());

    let (tx, rx) = mpsc::channel();
    let (t1, t2, t3) = (tx.clone(), tx.clone(), tx);
    fixture.session.take_picture(
        PictureRequest::new()
            .auto_restart_preview(true)
            .on_shutter(move || {
                let _ = t1.send(("shutter".to_string(), 0));
            })
            .on_postview(move |_| {
                let _ = t2.send(("postview".to_string(), 0));
            })
            .on_jpeg(move |jpeg, info| {
                assert!(!jpeg.is_empty());
                let _ = t3.send(("jpeg".to_string(), info.capture_rotation));
            }),
    );

    assert_eq!(rx.recv_timeout(TIMEOUT), Ok(("shutter".to_string(), 0)));
    assert_eq!(rx.recv_timeout(TIMEOUT), Ok(("postview".to_string(), 0)));
    assert_eq!(rx.recv_timeout(TIMEOUT), Ok(("jpeg".to_string(), 90)));

    wait_for_state(&fixture.session, SessionState::Previewing);
    fixture.settle();
    assert_eq!(fixture.count(CameraCall::StartPreview), 2);
    assert!(fixture.control.is_previewing());
    assert!(fixture.control.has_pending_frame(), "scan should resume");
}

#[test]
fn test_take_picture_without_restart_stays_capturing() {
    let fixture = Fixture::new().previewing();

    let (tx, rx) = mpsc::channel();
    fixture
        .session
        .take_picture(PictureRequest::new().on_jpeg(move |_, _| {
            let _ = tx.send(());
        }));
    assert_eq!(rx.recv_timeout(TIMEOUT), Ok(()));
    fixture.settle();
    assert_eq!(fixture.session.state(), SessionState::Capturing);

    fixture.session.restart_preview();
    wait_for_state(&fixture.session, SessionState::Previewing);
}

#[test]
fn test_capture_failure_restores_preview() {
    let fixture = Fixture::build(VirtualCameraProvider::new(), |b| {
        b.decoder_factory(scripted(&Script::default()))
    })
    .previewing();
    let (callback, _results) = collecting_scan();
    fixture.session.scan_barcode(callback);
    fixture.settle();

    fixture
        .control
        .fail_next_capture(BackendError::Other("shutter jammed".into()));
    let (tx, rx) = mpsc::channel();
    fixture
        .session
        .take_picture(PictureRequest::new().on_error(move |e| {
            let _ = tx.send(e);
        }));

    assert!(matches!(
        rx.recv_timeout(TIMEOUT),
        Ok(CaptureError::Hardware(_))
    ));
    fixture.settle();
    assert_eq!(fixture.session.state(), SessionState::Previewing);
    assert!(fixture.control.has_pending_frame());
}

#[test]
fn test_front_camera_capture_rotation() {
    let provider = VirtualCameraProvider::with_camera(
        CameraInfo {
            id: "1".into(),
            facing: Facing::Front,
            orientation: 270,
        },
        Some(default_parameters()),
    );
    let fixture = Fixture::build(provider, |b| b.facing(Facing::Front)).previewing();

    let (tx, rx) = mpsc::channel();
    fixture
        .session
        .take_picture(PictureRequest::new().on_jpeg(move |_, info| {
            let _ = tx.send(info.capture_rotation);
        }));
    // (270 + 0) % 360, no display/device correction
    assert_eq!(rx.recv_timeout(TIMEOUT), Ok(270));
}
