//! State Management for GigE-V Source
//!
//! This module defines the runtime state structures used by gevsrc:
//! - User settings (camera selection, timing, camera features)
//! - Property enums exposed through GObject
//! - Runtime state (the acquisition session and the negotiated format)
//!
//! ## Session Erasure
//! The element drives either the vendor library or the simulated camera.
//! [`CameraSession`] hides the driver type so the element holds one boxed
//! session regardless of which driver was picked at start.

// SPDX-FileCopyrightText: 2025 Contributors to the gst-gev project.
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use gst::glib;
use gstreamer as gst;

use gev::{
    AcquisitionSession, CameraDescriptor, CameraSettings, Delivery, Frame, FrameCounters,
    FrameInfo, GevDriver, ImageFormat, SessionConfig,
};

pub(crate) const DEFAULT_CAMERA_ID: i32 = 0;
pub(crate) const MAX_CAMERA_ID: i32 = 7;
pub(crate) const DEFAULT_FRAMERATE: f64 = 30.0;
pub(crate) const DEFAULT_TIMEOUT_MS: u32 = 1000;
pub(crate) const DEFAULT_BUFFER_COUNT: u32 = 8;
pub(crate) const DEFAULT_SIMULATED_CAMERAS: u32 = 1;

pub(crate) const DEFAULT_EXPOSURE_MS: f64 = 40.0;
pub(crate) const DEFAULT_GAIN: f64 = 1.0;
pub(crate) const DEFAULT_BLACK_LEVEL: f64 = 15.0;
pub(crate) const DEFAULT_BINNING: i32 = 1;
pub(crate) const DEFAULT_MAX_FRAMERATE: f64 = 25.0;
pub(crate) const DEFAULT_GAMMA: f64 = 1.5;

pub(crate) const DEFAULT_SHARPNESS: i32 = 2;
pub(crate) const DEFAULT_SATURATION: i32 = 25;
pub(crate) const DEFAULT_LUT1_OFFSET: i32 = 0;
pub(crate) const DEFAULT_LUT1_GAMMA: f64 = 0.45;
pub(crate) const DEFAULT_LUT1_GAIN: f64 = 1.099;
pub(crate) const DEFAULT_LUT2_OFFSET: i32 = 10;
pub(crate) const DEFAULT_LUT2_GAMMA: f64 = 0.45;
pub(crate) const DEFAULT_LUT2_GAIN: f64 = 1.501;

/// Who allocates the buffers pushed downstream.
#[derive(Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Clone, Copy, Default, glib::Enum)]
#[repr(u32)]
#[enum_type(name = "GstGevSrcDeliveryMode")]
pub enum DeliveryMode {
    #[default]
    #[enum_value(name = "The element allocates each frame", nick = "core-allocates")]
    CoreAllocates = 0,
    #[enum_value(name = "The base class allocates and the element fills", nick = "caller-provides")]
    CallerProvides = 1,
}

impl From<DeliveryMode> for gev::DeliveryMode {
    fn from(mode: DeliveryMode) -> Self {
        match mode {
            DeliveryMode::CoreAllocates => gev::DeliveryMode::CoreAllocates,
            DeliveryMode::CallerProvides => gev::DeliveryMode::CallerProvides,
        }
    }
}

/// White balance mode. Accepted for compatibility, not applied.
#[derive(Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Clone, Copy, Default, glib::Enum)]
#[repr(u32)]
#[enum_type(name = "GstGevSrcWhiteBalance")]
pub enum WhiteBalance {
    #[default]
    #[enum_value(name = "Manual", nick = "manual")]
    Manual = 0,
    #[enum_value(name = "One push", nick = "one-push")]
    OnePush = 1,
    #[enum_value(name = "Auto", nick = "auto")]
    Auto = 2,
}

/// Look-up table selection. Accepted for compatibility, not applied.
#[derive(Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Clone, Copy, Default, glib::Enum)]
#[repr(u32)]
#[enum_type(name = "GstGevSrcLut")]
pub enum Lut {
    #[enum_value(name = "Off", nick = "off")]
    Off = 0,
    #[default]
    #[enum_value(name = "LUT 1", nick = "lut1")]
    Lut1 = 1,
    #[enum_value(name = "LUT 2", nick = "lut2")]
    Lut2 = 2,
    #[enum_value(name = "Gamma", nick = "gamma")]
    Gamma = 3,
}

/// User-configurable settings for the gevsrc element.
///
/// Camera features left at `None` are not written to the camera.
#[derive(Debug, Clone)]
pub struct Settings {
    pub camera_id: i32,
    /// Requested sensor size; 0 keeps the camera's value
    pub width: u32,
    pub height: u32,
    /// Nominal framerate; None takes the camera's acquisition rate
    pub framerate: Option<f64>,
    pub timeout_ms: u32,
    pub buffer_count: u32,
    pub delivery_mode: DeliveryMode,
    pub simulate: bool,
    pub simulated_cameras: u32,
    /// Path of libGevApi.so
    pub library: String,

    pub exposure_ms: Option<f64>,
    pub gain: Option<f64>,
    pub black_level: Option<f64>,
    pub binning: Option<i32>,
    pub hflip: Option<bool>,
    pub vflip: Option<bool>,
    pub max_framerate: Option<f64>,
    pub gamma: Option<f64>,

    pub sharpness: i32,
    pub saturation: i32,
    pub white_balance: WhiteBalance,
    pub lut: Lut,
    pub lut1_offset: i32,
    pub lut1_gamma: f64,
    pub lut1_gain: f64,
    pub lut2_offset: i32,
    pub lut2_gamma: f64,
    pub lut2_gain: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            camera_id: DEFAULT_CAMERA_ID,
            width: 0,
            height: 0,
            framerate: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            buffer_count: DEFAULT_BUFFER_COUNT,
            delivery_mode: DeliveryMode::default(),
            simulate: false,
            simulated_cameras: DEFAULT_SIMULATED_CAMERAS,
            library: gev::config::get_gev_so_path().to_string_lossy().into_owned(),
            exposure_ms: None,
            gain: None,
            black_level: None,
            binning: None,
            hflip: None,
            vflip: None,
            max_framerate: None,
            gamma: None,
            sharpness: DEFAULT_SHARPNESS,
            saturation: DEFAULT_SATURATION,
            white_balance: WhiteBalance::default(),
            lut: Lut::default(),
            lut1_offset: DEFAULT_LUT1_OFFSET,
            lut1_gamma: DEFAULT_LUT1_GAMMA,
            lut1_gain: DEFAULT_LUT1_GAIN,
            lut2_offset: DEFAULT_LUT2_OFFSET,
            lut2_gamma: DEFAULT_LUT2_GAMMA,
            lut2_gain: DEFAULT_LUT2_GAIN,
        }
    }
}

impl Settings {
    /// Session configuration for one run delivering at most `frame_budget`
    /// frames (0 = unbounded).
    pub fn session_config(&self, frame_budget: u64) -> SessionConfig {
        SessionConfig {
            width: self.width,
            height: self.height,
            bytes_per_pixel: 1,
            buffer_count: self.buffer_count as usize,
            frame_timeout: Duration::from_millis(self.timeout_ms.into()),
            framerate: self.framerate,
            frame_budget,
            delivery_mode: self.delivery_mode.into(),
            camera: CameraSettings {
                exposure_ms: self.exposure_ms,
                gain: self.gain,
                black_level: self.black_level,
                binning: self.binning.map(i64::from),
                reverse_x: self.hflip,
                reverse_y: self.vflip,
                max_framerate: self.max_framerate,
                gamma: self.gamma,
            },
        }
    }
}

/// Acquisition session with the driver type erased.
pub trait CameraSession: Send {
    /// Refreshes the device directory and returns its size.
    fn enumerate(&mut self) -> usize;
    fn start(&mut self, camera_id: usize) -> gev::Result<ImageFormat>;
    fn stop(&mut self);
    fn device(&self) -> Option<&CameraDescriptor>;
    fn counters(&self) -> FrameCounters;
    fn frame_size(&self) -> Option<usize>;
    fn framerate(&self) -> Option<f64>;
    fn try_next_frame(&mut self) -> gev::Result<Option<Delivery<Frame>>>;
    fn try_next_frame_into(&mut self, dest: &mut [u8]) -> gev::Result<Option<Delivery<FrameInfo>>>;
}

impl<D: GevDriver> CameraSession for AcquisitionSession<D> {
    fn enumerate(&mut self) -> usize {
        AcquisitionSession::enumerate(self).len()
    }

    fn start(&mut self, camera_id: usize) -> gev::Result<ImageFormat> {
        AcquisitionSession::start(self, camera_id)
    }

    fn stop(&mut self) {
        AcquisitionSession::stop(self)
    }

    fn device(&self) -> Option<&CameraDescriptor> {
        AcquisitionSession::device(self)
    }

    fn counters(&self) -> FrameCounters {
        AcquisitionSession::counters(self)
    }

    fn frame_size(&self) -> Option<usize> {
        AcquisitionSession::frame_size(self)
    }

    fn framerate(&self) -> Option<f64> {
        AcquisitionSession::framerate(self)
    }

    fn try_next_frame(&mut self) -> gev::Result<Option<Delivery<Frame>>> {
        AcquisitionSession::try_next_frame(self)
    }

    fn try_next_frame_into(&mut self, dest: &mut [u8]) -> gev::Result<Option<Delivery<FrameInfo>>> {
        AcquisitionSession::try_next_frame_into(self, dest)
    }
}

/// Runtime state for a started gevsrc.
pub struct State {
    /// Streaming acquisition session
    pub session: Box<dyn CameraSession>,

    /// Geometry negotiated with the camera
    pub format: ImageFormat,

    /// Output caps (GRAY8 at the negotiated size and the run's framerate)
    pub caps: gst::Caps,

    /// Bytes of one output buffer
    pub frame_size: usize,

    pub delivery_mode: gev::DeliveryMode,
}

/// Context wrapper for the element's mutable state.
#[derive(Default)]
pub struct Context {
    /// None when stopped, Some when started
    pub state: Option<State>,

    /// Counters of the last finished run
    pub last_counters: FrameCounters,
}

impl Context {
    pub fn counters(&self) -> FrameCounters {
        self.state
            .as_ref()
            .map(|state| state.session.counters())
            .unwrap_or(self.last_counters)
    }
}
