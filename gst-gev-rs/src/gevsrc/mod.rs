//! GigE-V Source Element
//!
//! This module implements `gevsrc`, a live GStreamer source element that
//! streams monochrome frames from a GigE Vision camera.
//!
//! ## Responsibilities
//! - Discovers cameras and opens the one selected by `camera-id`
//! - Applies camera features (exposure, gain, binning, flips, ...)
//! - Runs the asynchronous transfer and waits for complete frames
//! - Stamps buffers with a framerate-derived timeline and sequential offsets
//! - Ends the stream after `num-buffers` frames
//!
//! ## Example Pipelines
//! ```bash
//! gst-launch-1.0 gevsrc camera-id=0 exposure=10 ! videoconvert ! autovideosink
//! gst-launch-1.0 gevsrc simulate=true num-buffers=100 ! videoconvert ! autovideosink
//! ```
//!
//! ## Architecture
//! - **PushSrc base class**: produces buffers on demand through `create()`
//!   (session-allocated frames) or `fill()` (BaseSrc-allocated buffers),
//!   selected by `delivery-mode`
//! - **Live source**: frames are produced only in PLAYING
//! - **One copy**: each frame is copied once, from the driver buffer pool
//!   into the outgoing buffer

// SPDX-FileCopyrightText: 2025 Contributors to the gst-gev project.
// SPDX-License-Identifier: Apache-2.0

use gst::glib;
use gst::prelude::*;
use gstreamer as gst;
use gstreamer_base as gst_base;

/// Buffer creation (waits for a frame, wraps or copies it, stamps it)
mod create_video;

/// Core implementation (properties, lifecycle, GStreamer trait impls)
mod imp;

/// Settings, runtime state and property enums
mod state;

pub use state::{DeliveryMode, Lut, WhiteBalance};

glib::wrapper! {
    pub struct GevSrc(ObjectSubclass<imp::GevSrc>) @extends gst_base::PushSrc, gst_base::BaseSrc, gst::Element, gst::Object;
}

/// Registers the gevsrc element with GStreamer.
pub fn register(plugin: &gst::Plugin) -> Result<(), glib::BoolError> {
    gst::Element::register(
        Some(plugin),
        "gevsrc",
        gst::Rank::NONE,
        GevSrc::static_type(),
    )
}
