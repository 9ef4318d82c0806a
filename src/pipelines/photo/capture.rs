// SPDX-License-Identifier: MPL-2.0

//! Pending capture bookkeeping
//!
//! The hardware answers a capture through up to four callbacks. Each one is
//! marshalled back to the camera worker tagged with the capture id; only the
//! pending capture with a matching id is served.

use super::{PictureInfo, PictureRequest};
use crate::errors::CaptureError;
use tracing::{debug, info};

struct PendingCapture {
    id: u64,
    request: PictureRequest,
    info: PictureInfo,
}

/// Dispatches hardware capture callbacks to the pending request
#[derive(Default)]
pub struct PhotoCapture {
    next_id: u64,
    pending: Option<PendingCapture>,
}

impl PhotoCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `request` as the pending capture and return its id
    ///
    /// A capture still pending is replaced and its callbacks dropped.
    pub fn begin(&mut self, request: PictureRequest, info: PictureInfo) -> u64 {
        self.next_id += 1;
        let id = self.next_id;
        if let Some(previous) = self.pending.take() {
            debug!(id = previous.id, "Dropping unfinished capture");
        }
        self.pending = Some(PendingCapture { id, request, info });
        id
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    fn matching(&mut self, id: u64) -> Option<&mut PendingCapture> {
        match self.pending.as_mut() {
            Some(pending) if pending.id == id => Some(pending),
            _ => {
                debug!(id, "Ignoring callback for stale capture");
                None
            }
        }
    }

    pub fn deliver_shutter(&mut self, id: u64) {
        if let Some(callback) = self.matching(id).and_then(|p| p.request.shutter.take()) {
            callback();
        }
    }

    pub fn deliver_raw(&mut self, id: u64, data: Option<Vec<u8>>) {
        if let Some(callback) = self.matching(id).and_then(|p| p.request.raw.take()) {
            callback(data);
        }
    }

    pub fn deliver_postview(&mut self, id: u64, data: Option<Vec<u8>>) {
        if let Some(callback) = self.matching(id).and_then(|p| p.request.postview.take()) {
            callback(data);
        }
    }

    /// Hand the JPEG to the request and finish the capture
    ///
    /// Returns whether the preview should be restarted, or `None` when the
    /// capture is no longer pending.
    pub fn deliver_jpeg(&mut self, id: u64, data: Vec<u8>) -> Option<bool> {
        self.matching(id)?;
        let pending = self.pending.take()?;
        let restart = pending.request.auto_restart_preview;
        info!(
            id,
            bytes = data.len(),
            rotation = pending.info.capture_rotation,
            "Picture captured"
        );
        if let Some(callback) = pending.request.jpeg {
            callback(data, pending.info);
        }
        Some(restart)
    }

    /// Report `error` for the pending capture and finish it
    pub fn fail(&mut self, id: u64, error: CaptureError) {
        if self.matching(id).is_none() {
            return;
        }
        if let Some(pending) = self.pending.take() {
            pending.request.fail(error);
        }
    }

    /// Forget the pending capture without calling anything
    pub fn cancel(&mut self) {
        if let Some(pending) = self.pending.take() {
            debug!(id = pending.id, "Capture cancelled");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;
    use std::sync::{Arc, Mutex};

    fn info() -> PictureInfo {
        PictureInfo {
            display_rotation: 0,
            device_rotation: 0,
            capture_rotation: 90,
            crop_rect: None,
            captured_at: Local::now(),
        }
    }

    #[test]
    fn test_callbacks_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (l1, l2, l3) = (Arc::clone(&log), Arc::clone(&log), Arc::clone(&log));
        let request = PictureRequest::new()
            .auto_restart_preview(true)
            .on_shutter(move || l1.lock().unwrap().push("shutter".to_string()))
            .on_raw(move |data| l2.lock().unwrap().push(format!("raw {}", data.is_some())))
            .on_jpeg(move |data, info| {
                l3.lock()
                    .unwrap()
                    .push(format!("jpeg {} {}", data.len(), info.capture_rotation))
            });

        let mut capture = PhotoCapture::new();
        let id = capture.begin(request, info());
        capture.deliver_shutter(id);
        capture.deliver_raw(id, None);
        capture.deliver_postview(id, None);
        assert_eq!(capture.deliver_jpeg(id, vec![1, 2, 3]), Some(true));
        assert!(!capture.is_pending());

        assert_eq!(
            *log.lock().unwrap(),
            vec!["shutter", "raw false", "jpeg 3 90"]
        );
    }

    #[test]
    fn test_stale_id_is_ignored() {
        let called = Arc::new(Mutex::new(false));
        let c = Arc::clone(&called);
        let mut capture = PhotoCapture::new();
        let id = capture.begin(
            PictureRequest::new().on_jpeg(move |_, _| *c.lock().unwrap() = true),
            info(),
        );
        assert_eq!(capture.deliver_jpeg(id + 1, vec![]), None);
        assert!(capture.is_pending());

        capture.cancel();
        assert_eq!(capture.deliver_jpeg(id, vec![]), None);
        assert!(!*called.lock().unwrap());
    }

    #[test]
    fn test_fail_reports_error() {
        let error = Arc::new(Mutex::new(None));
        let e = Arc::clone(&error);
        let mut capture = PhotoCapture::new();
        let id = capture.begin(
            PictureRequest::new().on_error(move |err| *e.lock().unwrap() = Some(err)),
            info(),
        );
        capture.fail(id, CaptureError::Hardware("boom".into()));
        assert_eq!(
            *error.lock().unwrap(),
            Some(CaptureError::Hardware("boom".into()))
        );
        assert!(!capture.is_pending());
    }
}
