// SPDX-License-Identifier: GPL-3.0-only

//! QR code decoder
//!
//! This module implements QR code decoding using the rqrr crate.
//! Frames are downscaled for speed, grids are detected and decoded, and the
//! grid corners are reported as a normalized region of the input frame.

use super::{Decoder, DecoderFactory};
use crate::app::frame_processor::types::{FrameRegion, LuminanceFrame, Symbol, SymbolFormat};
use crate::constants::QR_MAX_DIMENSION;
use tracing::{debug, trace, warn};

/// QR code decoder
///
/// Optimized for real-time processing with frame downscaling.
pub struct QrDecoder {
    /// Maximum dimension for processing (frames are downscaled to this)
    max_dimension: u32,
    /// QR codes were among the requested formats
    enabled: bool,
}

impl Default for QrDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl QrDecoder {
    /// Create a new QR decoder with default settings
    pub fn new() -> Self {
        Self {
            max_dimension: QR_MAX_DIMENSION,
            enabled: true,
        }
    }

    /// Create a QR decoder with custom max dimension
    pub fn with_max_dimension(max_dimension: u32) -> Self {
        Self {
            max_dimension,
            enabled: true,
        }
    }

    /// Create a decoder for the requested formats
    ///
    /// Decodes nothing when QR codes are not requested.
    pub fn for_formats(formats: &[SymbolFormat]) -> Self {
        let enabled = formats.contains(&SymbolFormat::QrCode);
        if !enabled {
            warn!(?formats, "QR decoding not requested, decoder will find nothing");
        }
        Self {
            max_dimension: QR_MAX_DIMENSION,
            enabled,
        }
    }

    fn detect(&self, frame: &LuminanceFrame, limit: Option<usize>) -> Vec<Symbol> {
        if !self.enabled || frame.width == 0 || frame.height == 0 {
            return Vec::new();
        }
        let start = std::time::Instant::now();

        let (processed, scale) = frame.downscaled(self.max_dimension);
        let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(
            processed.width as usize,
            processed.height as usize,
            |x, y| processed.luma(x as u32, y as u32),
        );
        let grids = prepared.detect_grids();
        trace!(
            count = grids.len(),
            detection_ms = start.elapsed().as_millis(),
            "QR grid detection complete"
        );

        let mut symbols = Vec::new();
        for grid in grids {
            if limit.is_some_and(|limit| symbols.len() >= limit) {
                break;
            }
            let content = match grid.decode() {
                Ok((_meta, content)) => content,
                Err(e) => {
                    debug!(error = ?e, "Failed to decode QR grid");
                    continue;
                }
            };

            // Scale the grid corners back to the input frame
            let corners: Vec<(f32, f32)> = grid
                .bounds
                .iter()
                .map(|p| (p.x as f32 * scale, p.y as f32 * scale))
                .collect();
            let mut symbol = Symbol::new(content, SymbolFormat::QrCode);
            if let Some(region) = FrameRegion::from_points(&corners, frame.width, frame.height) {
                symbol = symbol.with_region(region);
            }

            debug!(
                content = %symbol.text,
                total_ms = start.elapsed().as_millis(),
                "Decoded QR code"
            );
            symbols.push(symbol);
        }
        symbols
    }
}

impl Decoder for QrDecoder {
    fn decode(&mut self, frame: &LuminanceFrame) -> Option<Symbol> {
        self.detect(frame, Some(1)).into_iter().next()
    }

    fn decode_multiple(&mut self, frame: &LuminanceFrame) -> Vec<Symbol> {
        self.detect(frame, None)
    }
}

/// Builds [`QrDecoder`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct QrDecoderFactory;

impl DecoderFactory for QrDecoderFactory {
    fn create(&self, formats: &[SymbolFormat]) -> Box<dyn Decoder> {
        Box::new(QrDecoder::for_formats(formats))
    }
}
