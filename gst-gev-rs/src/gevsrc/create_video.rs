//! Video Buffer Creation for GigE-V Source
//!
//! This module turns frames delivered by the acquisition session into
//! GStreamer buffers.
//!
//! ## Video Format
//! - Input: one complete camera image from the driver buffer pool
//! - Output: GRAY8 buffer, rows packed to `width` bytes, described by a
//!   `VideoMeta`
//!
//! ## End of Stream
//! The last frame of the budget is pushed like any other; the next request
//! finds the session exhausted and returns EOS without waiting on the camera.
//!
//! ## Timestamps
//! PTS and DTS come from the session's frame clock (frame N at
//! N / framerate), unless `do-timestamp` is set, in which case the base
//! class stamps buffers with the running time. Offsets count delivered frames
//! from 0.

// SPDX-FileCopyrightText: 2025 Contributors to the gst-gev project.
// SPDX-License-Identifier: Apache-2.0

use gev::{Delivery, FrameInfo};
use glib::subclass::types::ObjectSubclassExt;
use gst::prelude::*;
use gstreamer as gst;
use gstreamer_video as gst_video;

use crate::gevsrc::imp::{CAT, CreateState, FillState, GevSrc};
use crate::gevsrc::state::State;

/// Waits once for a frame and wraps it in a new buffer.
///
/// # Returns
/// * `Ok(CreateState::DataCreated(buffer))` if a frame was delivered
/// * `Ok(CreateState::NoDataCreated)` after a timeout or an incomplete frame
/// * `Err(FlowError::Eos)` once the frame budget is spent
/// * `Err(FlowError::Error)` if acquisition failed
pub(crate) fn create_video(src: &GevSrc, state: &mut State) -> Result<CreateState, gst::FlowError> {
    let delivery = match state.session.try_next_frame() {
        Ok(Some(delivery)) => delivery,
        Ok(None) => return Ok(CreateState::NoDataCreated),
        Err(err) => return Err(acquisition_failed(src, err)),
    };

    if delivery.is_end_of_stream() {
        gst::debug!(CAT, imp = src, "Last frame of the budget");
    }
    let frame = delivery.into_frame();

    // The frame storage becomes the buffer memory; no second copy.
    let mut buffer = gst::Buffer::from_mut_slice(frame.data);
    {
        let buffer = buffer.get_mut().ok_or(gst::FlowError::Error)?;
        stamp_buffer(src, buffer, &frame.info)?;
    }

    gst::trace!(CAT, imp = src, "Produced buffer {:?}", buffer);
    Ok(CreateState::DataCreated(buffer))
}

/// Waits once for a frame and copies it into a base-class buffer.
///
/// # Returns
/// * `Ok(FillState::Filled)` if `buffer` now holds a frame
/// * `Ok(FillState::NoDataFilled)` after a timeout or an incomplete frame
/// * `Err(FlowError::Eos)` once the frame budget is spent
/// * `Err(FlowError::Error)` if acquisition failed or `buffer` is too small
pub(crate) fn fill_video(
    src: &GevSrc,
    state: &mut State,
    buffer: &mut gst::BufferRef,
) -> Result<FillState, gst::FlowError> {
    let delivery = {
        let mut map = buffer.map_writable().map_err(|_| {
            gst::error!(CAT, imp = src, "Failed to map buffer writable");
            gst::FlowError::Error
        })?;
        match state.session.try_next_frame_into(map.as_mut_slice()) {
            Ok(Some(delivery)) => delivery,
            Ok(None) => return Ok(FillState::NoDataFilled),
            Err(err) => return Err(acquisition_failed(src, err)),
        }
    };

    if delivery.is_end_of_stream() {
        gst::debug!(CAT, imp = src, "Last frame of the budget");
    }
    let info = match delivery {
        Delivery::Ready(info) | Delivery::EndOfStream(info) => info,
    };

    if buffer.size() != state.frame_size {
        buffer.set_size(state.frame_size);
    }
    stamp_buffer(src, buffer, &info)?;

    gst::trace!(CAT, imp = src, "Filled buffer {:?}", buffer);
    Ok(FillState::Filled)
}

/// Applies timing, offsets and the video meta of a delivered frame.
fn stamp_buffer(
    src: &GevSrc,
    buffer: &mut gst::BufferRef,
    info: &FrameInfo,
) -> Result<(), gst::FlowError> {
    if !src.obj().property::<bool>("do-timestamp") {
        let pts = gst::ClockTime::from_nseconds(info.timestamp.as_nanos() as u64);
        buffer.set_pts(pts);
        buffer.set_dts(pts);
    }
    buffer.set_duration(gst::ClockTime::from_nseconds(
        info.duration.as_nanos() as u64,
    ));
    buffer.set_offset(info.offset);
    buffer.set_offset_end(info.offset_end);

    let stride = i32::try_from(info.stride).map_err(|_| gst::FlowError::Error)?;
    gst_video::VideoMeta::add_full(
        buffer,
        gst_video::VideoFrameFlags::empty(),
        gst_video::VideoFormat::Gray8,
        info.width,
        info.height,
        &[0],
        &[stride],
    )
    .map_err(|err| {
        gst::error!(CAT, imp = src, "Failed to add video meta: {}", err);
        gst::FlowError::Error
    })?;

    Ok(())
}

/// Maps a session error to a flow return, posting an error message unless
/// the stream simply ended.
fn acquisition_failed(src: &GevSrc, err: gev::Error) -> gst::FlowError {
    if let gev::Error::EndOfStream = err {
        gst::debug!(CAT, imp = src, "Frame budget exhausted");
        return gst::FlowError::Eos;
    }
    gst::element_imp_error!(
        src,
        gst::StreamError::Failed,
        ["Frame acquisition failed: {}", err]
    );
    gst::FlowError::Error
}
