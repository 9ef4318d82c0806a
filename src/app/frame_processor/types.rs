// SPDX-License-Identifier: MPL-2.0

//! Core types for frame decoding
//!
//! A preview frame arrives as raw sensor bytes. It is reduced to a
//! [`LuminanceFrame`] (upright, optionally cropped) before it reaches a
//! decoder, and decoders answer with [`Symbol`]s.

use crate::backends::camera::{PixelFormat, Rect, Size};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, trace};

/// A rectangular region within a frame
///
/// Coordinates are normalized (0.0 to 1.0) relative to the frame dimensions.
/// This allows easy transformation to screen coordinates regardless of
/// the actual frame size or display scaling.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameRegion {
    /// Left edge (0.0 = left of frame, 1.0 = right of frame)
    pub x: f32,
    /// Top edge (0.0 = top of frame, 1.0 = bottom of frame)
    pub y: f32,
    /// Width as fraction of frame width
    pub width: f32,
    /// Height as fraction of frame height
    pub height: f32,
}

impl FrameRegion {
    /// Create a frame region from pixel coordinates
    pub fn from_pixels(
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        frame_width: u32,
        frame_height: u32,
    ) -> Self {
        Self {
            x: x as f32 / frame_width as f32,
            y: y as f32 / frame_height as f32,
            width: width as f32 / frame_width as f32,
            height: height as f32 / frame_height as f32,
        }
    }

    /// Bounding box of a set of corner points, clamped to the frame
    pub fn from_points(points: &[(f32, f32)], frame_width: u32, frame_height: u32) -> Option<Self> {
        if points.is_empty() || frame_width == 0 || frame_height == 0 {
            return None;
        }
        let (fw, fh) = (frame_width as f32, frame_height as f32);
        let min_x = points.iter().map(|p| p.0).fold(f32::MAX, f32::min).clamp(0.0, fw);
        let max_x = points.iter().map(|p| p.0).fold(f32::MIN, f32::max).clamp(0.0, fw);
        let min_y = points.iter().map(|p| p.1).fold(f32::MAX, f32::min).clamp(0.0, fh);
        let max_y = points.iter().map(|p| p.1).fold(f32::MIN, f32::max).clamp(0.0, fh);
        Some(Self {
            x: min_x / fw,
            y: min_y / fh,
            width: (max_x - min_x) / fw,
            height: (max_y - min_y) / fh,
        })
    }
}

/// Barcode symbologies a decoder can be asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SymbolFormat {
    Aztec,
    Codabar,
    #[serde(rename = "CODE_39")]
    Code39,
    #[serde(rename = "CODE_93")]
    Code93,
    #[serde(rename = "CODE_128")]
    Code128,
    DataMatrix,
    #[serde(rename = "EAN_8")]
    Ean8,
    #[serde(rename = "EAN_13")]
    Ean13,
    Itf,
    #[serde(rename = "PDF_417")]
    Pdf417,
    QrCode,
    UpcA,
    UpcE,
}

impl fmt::Display for SymbolFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SymbolFormat::Aztec => "AZTEC",
            SymbolFormat::Codabar => "CODABAR",
            SymbolFormat::Code39 => "CODE_39",
            SymbolFormat::Code93 => "CODE_93",
            SymbolFormat::Code128 => "CODE_128",
            SymbolFormat::DataMatrix => "DATA_MATRIX",
            SymbolFormat::Ean8 => "EAN_8",
            SymbolFormat::Ean13 => "EAN_13",
            SymbolFormat::Itf => "ITF",
            SymbolFormat::Pdf417 => "PDF_417",
            SymbolFormat::QrCode => "QR_CODE",
            SymbolFormat::UpcA => "UPC_A",
            SymbolFormat::UpcE => "UPC_E",
        };
        f.write_str(name)
    }
}

/// A decoded barcode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Symbol {
    /// Decoded payload
    pub text: String,
    pub format: SymbolFormat,
    /// Location in the decoded frame, when the decoder reports one
    pub region: Option<FrameRegion>,
}

impl Symbol {
    pub fn new(text: impl Into<String>, format: SymbolFormat) -> Self {
        Self {
            text: text.into(),
            format,
            region: None,
        }
    }

    pub fn with_region(mut self, region: FrameRegion) -> Self {
        self.region = Some(region);
        self
    }
}

/// 8-bit luminance image handed to decoders
///
/// Frames are upright: the sensor rotation has already been applied.
#[derive(Clone, PartialEq, Eq)]
pub struct LuminanceFrame {
    pub width: u32,
    pub height: u32,
    /// Row-major, one byte per pixel, no padding
    pub data: Vec<u8>,
}

impl fmt::Debug for LuminanceFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LuminanceFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("len", &self.data.len())
            .finish()
    }
}

impl LuminanceFrame {
    /// Wrap luminance bytes; `None` when `data` is too short
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        let len = width as usize * height as usize;
        if data.len() < len {
            return None;
        }
        let mut data = data;
        data.truncate(len);
        Some(Self {
            width,
            height,
            data,
        })
    }

    /// Build an upright frame from raw preview bytes
    ///
    /// Only the luminance plane is used. The frame is rotated clockwise by
    /// `rotation` degrees, then cropped to `crop` (in upright pixels, clamped
    /// to the frame). Returns `None` when the buffer is too short for `size`
    /// or the crop misses the frame entirely.
    pub fn from_preview(
        data: &[u8],
        size: Size,
        format: PixelFormat,
        rotation: u32,
        crop: Option<Rect>,
    ) -> Option<Self> {
        if data.len() < format.frame_len(size) {
            debug!(
                len = data.len(),
                expected = format.frame_len(size),
                %size,
                "Preview buffer too short"
            );
            return None;
        }
        let luma_len = size.width as usize * size.height as usize;
        let frame = Self::new(size.width, size.height, data[..luma_len].to_vec())?;
        let frame = frame.rotated(rotation);
        match crop {
            Some(crop) => frame.cropped(crop),
            None => Some(frame),
        }
    }

    /// Luminance at (x, y), 0 outside the frame
    pub fn luma(&self, x: u32, y: u32) -> u8 {
        if x >= self.width || y >= self.height {
            return 0;
        }
        self.data[y as usize * self.width as usize + x as usize]
    }

    /// Copy rotated clockwise by a multiple of 90 degrees
    pub fn rotated(self, degrees: u32) -> Self {
        let (w, h) = (self.width as usize, self.height as usize);
        match degrees % 360 {
            90 => {
                let mut out = vec![0u8; w * h];
                for y in 0..h {
                    for x in 0..w {
                        // (x, y) -> (h - 1 - y, x) in a h-wide image
                        out[x * h + (h - 1 - y)] = self.data[y * w + x];
                    }
                }
                Self {
                    width: self.height,
                    height: self.width,
                    data: out,
                }
            }
            180 => {
                let mut data = self.data;
                data.reverse();
                Self {
                    width: self.width,
                    height: self.height,
                    data,
                }
            }
            270 => {
                let mut out = vec![0u8; w * h];
                for y in 0..h {
                    for x in 0..w {
                        // (x, y) -> (y, w - 1 - x) in a h-wide image
                        out[(w - 1 - x) * h + y] = self.data[y * w + x];
                    }
                }
                Self {
                    width: self.height,
                    height: self.width,
                    data: out,
                }
            }
            _ => self,
        }
    }

    /// Sub-image inside `rect`, clamped to the frame
    pub fn cropped(self, rect: Rect) -> Option<Self> {
        let left = rect.left.clamp(0, self.width as i32) as usize;
        let right = rect.right.clamp(0, self.width as i32) as usize;
        let top = rect.top.clamp(0, self.height as i32) as usize;
        let bottom = rect.bottom.clamp(0, self.height as i32) as usize;
        if right <= left || bottom <= top {
            debug!(%rect, width = self.width, height = self.height, "Crop outside frame");
            return None;
        }
        if left == 0 && top == 0 && right == self.width as usize && bottom == self.height as usize
        {
            return Some(self);
        }

        let w = self.width as usize;
        let mut data = Vec::with_capacity((right - left) * (bottom - top));
        for y in top..bottom {
            data.extend_from_slice(&self.data[y * w + left..y * w + right]);
        }
        Some(Self {
            width: (right - left) as u32,
            height: (bottom - top) as u32,
            data,
        })
    }

    /// Downscale so neither side exceeds `max_dimension`
    ///
    /// Returns the frame to process and the factor mapping its coordinates
    /// back to this frame (1.0 when no scaling was needed).
    pub fn downscaled(&self, max_dimension: u32) -> (std::borrow::Cow<'_, Self>, f32) {
        if self.width <= max_dimension && self.height <= max_dimension {
            return (std::borrow::Cow::Borrowed(self), 1.0);
        }
        let scale = (self.width as f32 / max_dimension as f32)
            .max(self.height as f32 / max_dimension as f32);
        let dst_width = ((self.width as f32 / scale) as u32).max(1);
        let dst_height = ((self.height as f32 / scale) as u32).max(1);
        trace!(
            src_width = self.width,
            src_height = self.height,
            dst_width,
            dst_height,
            "Downscaling luminance frame"
        );
        let data = downscale_luma(self, dst_width, dst_height);
        (
            std::borrow::Cow::Owned(Self {
                width: dst_width,
                height: dst_height,
                data,
            }),
            scale,
        )
    }
}

/// Downscale a luminance frame using bilinear interpolation
fn downscale_luma(frame: &LuminanceFrame, dst_width: u32, dst_height: u32) -> Vec<u8> {
    let src_width = frame.width as usize;
    let src_height = frame.height as usize;

    let mut result = Vec::with_capacity((dst_width * dst_height) as usize);

    let x_ratio = src_width as f32 / dst_width as f32;
    let y_ratio = src_height as f32 / dst_height as f32;

    let pixel = |px: usize, py: usize| -> f32 {
        frame.data.get(py * src_width + px).copied().unwrap_or(0) as f32
    };

    for y in 0..dst_height {
        for x in 0..dst_width {
            let src_x = x as f32 * x_ratio;
            let src_y = y as f32 * y_ratio;

            let x0 = src_x as usize;
            let y0 = src_y as usize;
            let x1 = (x0 + 1).min(src_width - 1);
            let y1 = (y0 + 1).min(src_height - 1);

            let x_frac = src_x - x0 as f32;
            let y_frac = src_y - y0 as f32;

            let value = pixel(x0, y0) * (1.0 - x_frac) * (1.0 - y_frac)
                + pixel(x1, y0) * x_frac * (1.0 - y_frac)
                + pixel(x0, y1) * (1.0 - x_frac) * y_frac
                + pixel(x1, y1) * x_frac * y_frac;

            result.push(value as u8);
        }
    }

    result
}
