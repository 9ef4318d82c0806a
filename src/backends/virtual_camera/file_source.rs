// SPDX-License-Identifier: GPL-3.0-only

//! Image files as virtual camera frames
//!
//! Images are decoded with the `image` crate and kept as a luminance plane.
//! Preview frames are produced by resampling that plane to the negotiated
//! preview size and padding it with neutral chroma.

use crate::backends::camera::types::{BackendError, BackendResult, PixelFormat, Size};
use image::{GrayImage, ImageFormat};
use std::io::Cursor;
use std::path::Path;
use tracing::{debug, info};

/// An 8-bit luminance image
#[derive(Clone, PartialEq, Eq)]
pub struct LumaImage {
    pub size: Size,
    pub data: Vec<u8>,
}

impl std::fmt::Debug for LumaImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LumaImage")
            .field("size", &self.size)
            .field("bytes", &self.data.len())
            .finish()
    }
}

impl LumaImage {
    /// `None` when `data` holds fewer than `width * height` bytes
    pub fn new(size: Size, data: Vec<u8>) -> Option<Self> {
        let len = size.width as usize * size.height as usize;
        if size.is_empty() || data.len() < len {
            return None;
        }
        let mut data = data;
        data.truncate(len);
        Some(Self { size, data })
    }

    /// A uniform mid-grey image
    pub fn blank(size: Size) -> Self {
        Self {
            size,
            data: vec![0x80; size.width as usize * size.height as usize],
        }
    }
}

/// Load an image file as a luminance plane
pub fn load_luma_frame(path: &Path) -> BackendResult<LumaImage> {
    info!(path = %path.display(), "Loading image file");

    let img = image::open(path).map_err(|e| {
        BackendError::Other(format!("Failed to load image '{}': {}", path.display(), e))
    })?;

    let luma = img.to_luma8();
    let size = Size::new(luma.width(), luma.height());
    info!(%size, "Image loaded successfully");

    LumaImage::new(size, luma.into_raw())
        .ok_or_else(|| BackendError::Other(format!("Empty image '{}'", path.display())))
}

/// Resample `image` to `target` and lay it out as `format`
///
/// Nearest-neighbour sampling; NV21 chroma is filled with 128 (no colour).
pub fn render_preview_frame(image: &LumaImage, target: Size, format: PixelFormat) -> Vec<u8> {
    let mut frame = Vec::with_capacity(format.frame_len(target));
    let (sw, sh) = (image.size.width as u64, image.size.height as u64);
    let (tw, th) = (target.width as u64, target.height as u64);
    for y in 0..th {
        let sy = (y * sh / th.max(1)) as usize;
        let row = &image.data[sy * sw as usize..(sy + 1) * sw as usize];
        frame.extend((0..tw).map(|x| row[(x * sw / tw.max(1)) as usize]));
    }
    if format == PixelFormat::NV21 {
        frame.resize(format.frame_len(target), 0x80);
    }
    debug!(from = %image.size, to = %target, ?format, "Rendered preview frame");
    frame
}

/// Encode a luminance image as JPEG
pub fn encode_jpeg(image: &LumaImage) -> BackendResult<Vec<u8>> {
    let gray = GrayImage::from_raw(image.size.width, image.size.height, image.data.clone())
        .ok_or_else(|| BackendError::Other("Luma buffer does not match its size".into()))?;
    let mut out = Cursor::new(Vec::new());
    gray.write_to(&mut out, ImageFormat::Jpeg)
        .map_err(|e| BackendError::Other(format!("JPEG encoding failed: {}", e)))?;
    Ok(out.into_inner())
}
