// SPDX-License-Identifier: MPL-2.0

//! Capture pipelines
//!
//! - [`photo`]: still capture requests and their callback dispatch

pub mod photo;
