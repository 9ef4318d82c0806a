// SPDX-License-Identifier: MPL-2.0

//! Application layer
//!
//! # Architecture
//!
//! - `session`: camera session state machine and its UI collaborators
//! - `frame_processor`: preview frame decoding on a dedicated worker
//!
//! # Main Types
//!
//! - `CameraSession`: public handle driving one camera
//! - `SessionState`: startup sequence position, observable through a watch channel

pub mod frame_processor;
pub mod session;

pub use session::{
    CameraSession, CameraSessionBuilder, LifecycleEvent, ScanCallback, SessionState,
};
