// SPDX-License-Identifier: GPL-3.0-only

//! Periodic auto-focus loop
//!
//! While running, the loop triggers a focus run, waits for it to finish and
//! schedules the next run [`AUTO_FOCUS_INTERVAL`] later on the camera worker.
//! Every start and stop bumps a generation counter; completions and timer
//! ticks from an older generation are ignored, so a stopped loop never
//! touches the hardware again.

use super::controller::SessionCore;
use crate::backends::camera::{CameraHardware, FocusCallback, WorkerHandle};
use crate::constants::AUTO_FOCUS_INTERVAL;
use tracing::{debug, trace, warn};

#[derive(Debug)]
pub(crate) struct AutoFocusLoop {
    enabled: bool,
    stopped: bool,
    focusing: bool,
    scheduled: bool,
    generation: u64,
}

impl Default for AutoFocusLoop {
    fn default() -> Self {
        Self {
            enabled: false,
            stopped: true,
            focusing: false,
            scheduled: false,
            generation: 0,
        }
    }
}

impl AutoFocusLoop {
    /// Whether the negotiated focus mode needs explicit focus runs
    pub fn configure(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_active(&self) -> bool {
        self.enabled && !self.stopped
    }

    #[cfg(test)]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn start(&mut self, device: &mut dyn CameraHardware, worker: &WorkerHandle<SessionCore>) {
        if !self.enabled {
            return;
        }
        self.generation += 1;
        self.stopped = false;
        self.focusing = false;
        self.scheduled = false;
        debug!(generation = self.generation, "Auto-focus loop started");
        self.focus(device, worker);
    }

    pub fn stop(&mut self, device: Option<&mut dyn CameraHardware>) {
        if self.stopped {
            return;
        }
        self.generation += 1;
        self.stopped = true;
        self.scheduled = false;
        if self.enabled
            && let Some(device) = device
            && let Err(e) = device.cancel_auto_focus()
        {
            warn!(error = %e, "Failed to cancel auto-focus");
        }
        self.focusing = false;
        debug!(generation = self.generation, "Auto-focus loop stopped");
    }

    /// A focus run of `generation` finished
    pub fn on_done(&mut self, generation: u64, success: bool, worker: &WorkerHandle<SessionCore>) {
        if generation != self.generation {
            trace!(generation, current = self.generation, "Stale focus completion");
            return;
        }
        trace!(success, "Auto-focus run finished");
        self.focusing = false;
        self.schedule(worker);
    }

    /// The timer of `generation` fired
    pub fn on_tick(
        &mut self,
        generation: u64,
        device: &mut dyn CameraHardware,
        worker: &WorkerHandle<SessionCore>,
    ) {
        if generation != self.generation {
            trace!(generation, current = self.generation, "Stale focus timer");
            return;
        }
        self.scheduled = false;
        self.focus(device, worker);
    }

    fn focus(&mut self, device: &mut dyn CameraHardware, worker: &WorkerHandle<SessionCore>) {
        if self.stopped || self.focusing {
            return;
        }
        let generation = self.generation;
        let handle = worker.clone();
        let callback: FocusCallback = Box::new(move |success| {
            handle.enqueue(move |core: &mut SessionCore| {
                core.on_auto_focus_done(generation, success);
                Ok(())
            });
        });
        match device.auto_focus(callback) {
            Ok(()) => self.focusing = true,
            Err(e) => {
                // Usually means a focus run is already in flight; try later
                warn!(error = %e, "Auto-focus request failed");
                self.schedule(worker);
            }
        }
    }

    fn schedule(&mut self, worker: &WorkerHandle<SessionCore>) {
        if self.stopped || self.scheduled {
            return;
        }
        self.scheduled = true;
        let generation = self.generation;
        worker.enqueue_delayed(AUTO_FOCUS_INTERVAL, move |core: &mut SessionCore| {
            core.on_auto_focus_tick(generation);
            Ok(())
        });
    }
}
