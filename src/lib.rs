// SPDX-License-Identifier: MPL-2.0

//! scancam - camera session controller for live barcode scanning
//!
//! This library drives a single camera through its startup sequence, keeps
//! every hardware call on one worker thread, decodes preview frames on a
//! second thread and takes still pictures.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`app`]: Camera session and frame decoding
//! - [`backends`]: Camera hardware abstraction and the virtual camera
//! - [`pipelines`]: Still capture requests
//! - [`config`]: User settings handling
//!
//! # Example
//!
//! ```ignore
//! let surface = Arc::new(OffscreenSurface::available(Size::new(1080, 1920)));
//! let session = CameraSession::builder(VirtualCameraProvider::new(), surface).build();
//! session.on_view_sized(1080, 1920);
//! session.on_surface_available(1080, 1920);
//! let symbol = session.scan_once().blocking_recv()?;
//! ```

pub mod app;
pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod pipelines;

// Re-export commonly used types
pub use app::frame_processor::{Symbol, SymbolFormat};
pub use app::session::{OffscreenSurface, ViewHost};
pub use app::{CameraSession, LifecycleEvent, ScanCallback, SessionState};
pub use backends::camera::{Facing, Rect, Size};
pub use config::{FocusMode, Settings};
pub use errors::{AppError, AppResult};
pub use pipelines::photo::{PictureInfo, PictureRequest};
