// SPDX-License-Identifier: GPL-3.0-only

//! Preview readiness gate
//!
//! The preview may start once two facts that arrive independently are both
//! known: the negotiated preview size and the live surface size. The surface
//! must also report itself available. The gate reports only the rising edge
//! of that conjunction.

use crate::backends::camera::Size;
use tracing::trace;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadinessGate {
    preview_size: Option<Size>,
    surface_size: Option<Size>,
    ready: bool,
}

impl ReadinessGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the negotiated preview size
    ///
    /// Returns `true` exactly when this change made the gate ready.
    pub fn set_preview_size(&mut self, size: Option<Size>, surface_available: bool) -> bool {
        self.preview_size = size;
        self.evaluate(surface_available)
    }

    /// Record the live surface size
    ///
    /// Returns `true` exactly when this change made the gate ready.
    pub fn set_surface_size(&mut self, size: Option<Size>, surface_available: bool) -> bool {
        self.surface_size = size;
        self.evaluate(surface_available)
    }

    pub fn is_ready(&self, surface_available: bool) -> bool {
        self.preview_size.is_some() && self.surface_size.is_some() && surface_available
    }

    pub fn preview_size(&self) -> Option<Size> {
        self.preview_size
    }

    pub fn surface_size(&self) -> Option<Size> {
        self.surface_size
    }

    fn evaluate(&mut self, surface_available: bool) -> bool {
        let ready = self.is_ready(surface_available);
        let rising = ready && !self.ready;
        self.ready = ready;
        if !ready {
            trace!(
                preview = ?self.preview_size,
                surface = ?self.surface_size,
                surface_available,
                "Readiness gate not satisfied"
            );
        }
        rising
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PREVIEW: Size = Size::new(1280, 720);
    const SURFACE: Size = Size::new(1080, 1920);

    #[test]
    fn test_fires_once_when_both_known() {
        let mut gate = ReadinessGate::new();
        assert!(!gate.set_preview_size(Some(PREVIEW), true));
        assert!(gate.set_surface_size(Some(SURFACE), true));
        // Staying ready does not fire again
        assert!(!gate.set_surface_size(Some(Size::new(720, 1280)), true));
        assert!(!gate.set_preview_size(Some(PREVIEW), true));
    }

    #[test]
    fn test_refires_after_retraction() {
        let mut gate = ReadinessGate::new();
        gate.set_preview_size(Some(PREVIEW), true);
        assert!(gate.set_surface_size(Some(SURFACE), true));
        assert!(!gate.set_surface_size(None, false));
        assert!(gate.set_surface_size(Some(SURFACE), true));
        assert!(!gate.set_preview_size(None, true));
        assert!(gate.set_preview_size(Some(PREVIEW), true));
    }

    #[test]
    fn test_unavailable_surface_blocks() {
        let mut gate = ReadinessGate::new();
        gate.set_preview_size(Some(PREVIEW), false);
        assert!(!gate.set_surface_size(Some(SURFACE), false));
        assert!(!gate.is_ready(false));
        assert!(gate.set_surface_size(Some(SURFACE), true));
    }

    #[test]
    fn test_edges_match_for_every_sequence() {
        // Every sequence of four updates drawn from a small alphabet
        #[derive(Clone, Copy)]
        enum Op {
            Preview(Option<Size>),
            Surface(Option<Size>),
        }
        let ops = [
            Op::Preview(Some(PREVIEW)),
            Op::Preview(None),
            Op::Surface(Some(SURFACE)),
            Op::Surface(None),
        ];

        for a in ops {
            for b in ops {
                for c in ops {
                    for d in ops {
                        let mut gate = ReadinessGate::new();
                        let mut was_ready = false;
                        for op in [a, b, c, d] {
                            let fired = match op {
                                Op::Preview(s) => gate.set_preview_size(s, true),
                                Op::Surface(s) => gate.set_surface_size(s, true),
                            };
                            let now_ready = gate.is_ready(true);
                            assert_eq!(fired, now_ready && !was_ready);
                            if fired {
                                assert!(gate.preview_size().is_some());
                                assert!(gate.surface_size().is_some());
                            }
                            was_ready = now_ready;
                        }
                    }
                }
            }
        }
    }
}
