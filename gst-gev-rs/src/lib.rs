//! GStreamer Plugin for GigE-V cameras
//!
//! This crate implements a GStreamer plugin providing one element:
//!
//! - **gevsrc**: A live source element that discovers a GigE Vision camera
//!   through the Teledyne DALSA GigE-V framework, starts an asynchronous
//!   transfer and pushes every complete frame into the pipeline
//!
//! ## Supported Media Formats
//! - **Video**: GRAY8 (8-bit monochrome), width and height taken from the camera
//!
//! ## Runtime Requirements
//! The vendor library (`libGevApi.so`) is loaded when the element starts, so
//! the plugin builds and registers without the SDK installed. Setting
//! `simulate=true` replaces the camera with an in-process simulated one.
//!
//! ## GStreamer Concepts (for non-GStreamer developers)
//! - **Element**: A processing unit in a pipeline (source, filter, or sink)
//! - **Plugin**: A dynamically loadable library containing one or more elements
//! - **Caps (Capabilities)**: Media format descriptions (resolution, framerate, etc.)
//! - **Live source**: A source producing data in real time; it only produces
//!   in PLAYING

// SPDX-FileCopyrightText: 2025 Contributors to the gst-gev project.
// SPDX-License-Identifier: Apache-2.0

#![allow(clippy::non_send_fields_in_send_ty, unused_doc_comments)]

use gst::glib;
use gstreamer as gst;

/// GigE-V camera source element
pub mod gevsrc;

/// Registers every element of the plugin.
fn plugin_init(plugin: &gst::Plugin) -> Result<(), glib::BoolError> {
    gevsrc::register(plugin)?;
    Ok(())
}

/// GStreamer plugin metadata and entry point.
///
/// Generates the C entry point GStreamer calls when loading the shared
/// library, and `plugin_register_static()` for applications and tests that
/// link the crate directly.
gst::plugin_define!(
    gev,
    env!("CARGO_PKG_DESCRIPTION"),
    plugin_init,
    concat!(env!("CARGO_PKG_VERSION"), "-", env!("COMMIT_ID")),
    "Apache-2.0",
    env!("CARGO_PKG_NAME"),
    env!("CARGO_PKG_NAME"),
    env!("CARGO_PKG_REPOSITORY"),
    env!("BUILD_REL_DATE")
);
