// SPDX-License-Identifier: GPL-3.0-only

//! Scan requests and result delivery

use crate::app::frame_processor::Symbol;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

/// Receives decoded symbols for a scan request
///
/// Results are delivered on the camera worker thread.
pub trait ScanCallback: Send + Sync {
    /// Decode another frame when one came back empty
    fn auto_retry(&self) -> bool {
        true
    }

    /// Ask the decoder for every symbol in a frame
    fn is_multiple(&self) -> bool {
        false
    }

    fn on_result(&self, symbol: Symbol);

    fn on_results(&self, symbols: Vec<Symbol>) {
        for symbol in symbols {
            self.on_result(symbol);
        }
    }
}

impl<F> ScanCallback for F
where
    F: Fn(Symbol) + Send + Sync,
{
    fn on_result(&self, symbol: Symbol) {
        self(symbol)
    }
}

/// The registered request; only frames and results carrying its id are used
#[derive(Clone)]
pub(crate) struct ScanRequest {
    pub id: u64,
    pub callback: Arc<dyn ScanCallback>,
}

impl ScanRequest {
    pub fn new(id: u64, callback: Arc<dyn ScanCallback>) -> Self {
        Self { id, callback }
    }
}

impl std::fmt::Debug for ScanRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanRequest")
            .field("id", &self.id)
            .field("multiple", &self.callback.is_multiple())
            .finish()
    }
}

/// Forwards the first symbol to a oneshot channel
///
/// The receiver sees a closed channel when the request is replaced or the
/// camera is closed before anything was decoded.
pub(crate) struct OneShotScan {
    sender: Mutex<Option<oneshot::Sender<Symbol>>>,
}

impl OneShotScan {
    pub fn new(sender: oneshot::Sender<Symbol>) -> Self {
        Self {
            sender: Mutex::new(Some(sender)),
        }
    }
}

impl ScanCallback for OneShotScan {
    fn on_result(&self, symbol: Symbol) {
        let sender = self.sender.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(sender) = sender {
            // Receiver may be gone already
            let _ = sender.send(symbol);
        }
    }
}
