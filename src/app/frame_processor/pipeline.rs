// SPDX-License-Identifier: GPL-3.0-only

//! Background decode worker
//!
//! Decoding runs on its own thread so the hardware frame callback returns
//! immediately. Frames are passed by value. Each submitted frame produces
//! exactly one delivery, even when the decoder panics.

use super::tasks::Decoder;
use super::types::{LuminanceFrame, Symbol};
use crate::backends::camera::Worker;
use crate::constants::DECODE_WORKER_NAME;
use std::panic::{AssertUnwindSafe, catch_unwind};
use tracing::{debug, trace, warn};

/// What the decoder found in one frame
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeOutcome {
    Single(Option<Symbol>),
    Multiple(Vec<Symbol>),
}

impl DecodeOutcome {
    /// Nothing was found
    pub fn is_empty(&self) -> bool {
        match self {
            DecodeOutcome::Single(symbol) => symbol.is_none(),
            DecodeOutcome::Multiple(symbols) => symbols.is_empty(),
        }
    }

    fn empty(multiple: bool) -> Self {
        if multiple {
            DecodeOutcome::Multiple(Vec::new())
        } else {
            DecodeOutcome::Single(None)
        }
    }
}

struct DecodeContext {
    decoder: Box<dyn Decoder>,
    frames: u64,
}

/// Owns the decode thread and its decoder
pub struct DecodePipeline {
    worker: Worker<DecodeContext>,
}

impl DecodePipeline {
    pub fn spawn(decoder: Box<dyn Decoder>) -> Self {
        let worker = Worker::spawn(
            DECODE_WORKER_NAME,
            DecodeContext {
                decoder,
                frames: 0,
            },
        );
        Self { worker }
    }

    /// Queue `frame` for decoding; `deliver` receives the outcome on the
    /// decode thread
    ///
    /// Returns `false` when the pipeline is shut down, in which case
    /// `deliver` is dropped without being called.
    pub fn submit<F>(&self, frame: LuminanceFrame, multiple: bool, deliver: F) -> bool
    where
        F: FnOnce(DecodeOutcome) + Send + 'static,
    {
        self.worker.handle().enqueue(move |ctx: &mut DecodeContext| {
            ctx.frames += 1;
            let start = std::time::Instant::now();
            let decoded = catch_unwind(AssertUnwindSafe(|| {
                if multiple {
                    DecodeOutcome::Multiple(ctx.decoder.decode_multiple(&frame))
                } else {
                    DecodeOutcome::Single(ctx.decoder.decode(&frame))
                }
            }));
            let outcome = decoded.unwrap_or_else(|_| {
                warn!(frame = ctx.frames, "Decoder panicked, reporting no symbol");
                DecodeOutcome::empty(multiple)
            });
            trace!(
                frame = ctx.frames,
                width = frame.width,
                height = frame.height,
                found = !outcome.is_empty(),
                decode_ms = start.elapsed().as_millis(),
                "Frame decoded"
            );
            deliver(outcome);
            Ok(())
        })
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_running()
    }

    /// Stop the decode thread after frames already queued
    pub fn shutdown(&mut self) {
        debug!("Shutting down decode pipeline");
        self.worker.shutdown();
    }
}
