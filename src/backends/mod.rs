// SPDX-License-Identifier: MPL-2.0

//! Backend abstraction layer for camera hardware
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                  App Layer                  │
//! └────────────────────┬────────────────────────┘
//!                      │
//! ┌────────────────────┴────────────────────────┐
//! │              Backend Layer                  │
//! │  ┌─────────────────┐  ┌──────────────────┐  │
//! │  │     Camera      │  │  Virtual Camera  │  │
//! │  │ (traits, worker │  │  (in-process     │  │
//! │  │  negotiation)   │  │   provider)      │  │
//! │  └─────────────────┘  └──────────────────┘  │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`camera`]: hardware traits, worker thread, geometry and parameter negotiation
//! - [`virtual_camera`]: software camera used by tests and the `simulate` command

pub mod camera;
pub mod virtual_camera;
