// SPDX-License-Identifier: GPL-3.0-only

//! Decoder capability
//!
//! The session treats barcode decoding as an opaque capability: a
//! [`DecoderFactory`] builds one [`Decoder`] per previewing period, and the
//! decoder is only ever used from the decode worker thread.

pub mod qr_detector;

pub use qr_detector::{QrDecoder, QrDecoderFactory};

use super::types::{LuminanceFrame, Symbol, SymbolFormat};

/// Decodes symbols from luminance frames
pub trait Decoder: Send {
    /// First symbol found in `frame`
    fn decode(&mut self, frame: &LuminanceFrame) -> Option<Symbol>;

    /// Every symbol found in `frame`
    fn decode_multiple(&mut self, frame: &LuminanceFrame) -> Vec<Symbol> {
        self.decode(frame).into_iter().collect()
    }
}

/// Builds decoders restricted to a set of formats
pub trait DecoderFactory: Send + Sync {
    fn create(&self, formats: &[SymbolFormat]) -> Box<dyn Decoder>;
}

impl<F> DecoderFactory for F
where
    F: Fn(&[SymbolFormat]) -> Box<dyn Decoder> + Send + Sync,
{
    fn create(&self, formats: &[SymbolFormat]) -> Box<dyn Decoder> {
        self(formats)
    }
}
