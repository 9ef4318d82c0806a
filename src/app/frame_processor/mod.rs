// SPDX-License-Identifier: MPL-2.0

//! Frame processor module for barcode decoding
//!
//! Preview frames are reduced to upright luminance images and decoded on a
//! dedicated worker thread. The decoder itself is an injected capability.

pub mod pipeline;
pub mod tasks;
pub mod types;

pub use pipeline::{DecodeOutcome, DecodePipeline};
pub use tasks::{Decoder, DecoderFactory, QrDecoder, QrDecoderFactory, qr_detector};
pub use types::{FrameRegion, LuminanceFrame, Symbol, SymbolFormat};
