// SPDX-FileCopyrightText: 2025 Contributors to the gst-gev project.
// SPDX-License-Identifier: Apache-2.0

//! Runtime configuration of an acquisition session.
//!
//! [`SessionConfig`] is fixed for the lifetime of one streaming run: it is
//! read when [`crate::AcquisitionSession::start`] is called and never
//! consulted for geometry afterwards.

use std::{path::PathBuf, time::Duration};

use crate::driver::FeatureValue;

/// Library name used when `GEV_LIBRARY_PATH` is not set.
pub const DEFAULT_GEV_LIBRARY: &str = "libGevApi.so";

/// Environment variable overriding the GigE-V library location.
pub const GEV_LIBRARY_ENV: &str = "GEV_LIBRARY_PATH";

pub const DEFAULT_BUFFER_COUNT: usize = 8;
pub const DEFAULT_FRAME_TIMEOUT: Duration = Duration::from_millis(1000);
pub const DEFAULT_FRAMERATE: f64 = 30.0;

/// Returns the path of the GigE-V shared library.
///
/// `GEV_LIBRARY_PATH` wins when set; otherwise the bare library name is
/// returned and the dynamic linker search path applies.
///
/// # Examples
///
/// ```no_run
/// use gev::{config::get_gev_so_path, load_api};
///
/// # fn main() -> Result<(), gev::Error> {
/// let api = load_api(get_gev_so_path())?;
/// # Ok(())
/// # }
/// ```
pub fn get_gev_so_path() -> PathBuf {
    std::env::var_os(GEV_LIBRARY_ENV)
        .filter(|path| !path.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| DEFAULT_GEV_LIBRARY.into())
}

/// Who supplies the destination storage for delivered frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryMode {
    /// The session allocates one output buffer per frame.
    #[default]
    CoreAllocates,
    /// The caller hands in a destination slice for every frame.
    CallerProvides,
}

/// Optional camera features written while the session is configuring.
///
/// `None` leaves the camera's current value alone. A rejected write is logged
/// and does not abort the start.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CameraSettings {
    /// Exposure time in milliseconds.
    pub exposure_ms: Option<f64>,
    pub gain: Option<f64>,
    pub black_level: Option<f64>,
    /// Applied to both axes.
    pub binning: Option<i64>,
    pub reverse_x: Option<bool>,
    pub reverse_y: Option<bool>,
    pub max_framerate: Option<f64>,
    pub gamma: Option<f64>,
}

impl CameraSettings {
    /// GenICam feature writes implied by these settings, in application order.
    pub fn features(&self) -> Vec<(&'static str, FeatureValue)> {
        let mut features = Vec::new();
        if let Some(exposure_ms) = self.exposure_ms {
            // ExposureTime is expressed in microseconds.
            features.push(("ExposureTime", FeatureValue::Float(exposure_ms * 1000.0)));
        }
        if let Some(gain) = self.gain {
            features.push(("Gain", FeatureValue::Float(gain)));
        }
        if let Some(black_level) = self.black_level {
            features.push(("BlackLevel", FeatureValue::Float(black_level)));
        }
        if let Some(binning) = self.binning {
            features.push(("BinningHorizontal", FeatureValue::Int(binning)));
            features.push(("BinningVertical", FeatureValue::Int(binning)));
        }
        if let Some(reverse_x) = self.reverse_x {
            features.push(("ReverseX", FeatureValue::Bool(reverse_x)));
        }
        if let Some(reverse_y) = self.reverse_y {
            features.push(("ReverseY", FeatureValue::Bool(reverse_y)));
        }
        if let Some(max_framerate) = self.max_framerate {
            features.push(("AcquisitionFrameRate", FeatureValue::Float(max_framerate)));
        }
        if let Some(gamma) = self.gamma {
            features.push(("Gamma", FeatureValue::Float(gamma)));
        }
        features
    }
}

/// Configuration of one acquisition session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Requested sensor width; `0` keeps the camera's current width.
    pub width: u32,
    /// Requested sensor height; `0` keeps the camera's current height.
    pub height: u32,
    /// Output bytes per pixel. Always 1 for GRAY8 output.
    pub bytes_per_pixel: u32,
    /// Number of buffers handed to the driver.
    pub buffer_count: usize,
    /// Maximum wait for one image.
    pub frame_timeout: Duration,
    /// Nominal rate used to derive timestamps and durations. `None` takes the
    /// camera's `AcquisitionFrameRate`, falling back to [`DEFAULT_FRAMERATE`].
    pub framerate: Option<f64>,
    /// Frames to deliver before end-of-stream; `0` streams forever.
    pub frame_budget: u64,
    pub delivery_mode: DeliveryMode,
    pub camera: CameraSettings,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            bytes_per_pixel: 1,
            buffer_count: DEFAULT_BUFFER_COUNT,
            frame_timeout: DEFAULT_FRAME_TIMEOUT,
            framerate: None,
            frame_budget: 0,
            delivery_mode: DeliveryMode::default(),
            camera: CameraSettings::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exposure_is_written_in_microseconds() {
        let settings = CameraSettings {
            exposure_ms: Some(40.0),
            binning: Some(2),
            ..Default::default()
        };

        let features = settings.features();
        assert_eq!(
            features,
            vec![
                ("ExposureTime", FeatureValue::Float(40_000.0)),
                ("BinningHorizontal", FeatureValue::Int(2)),
                ("BinningVertical", FeatureValue::Int(2)),
            ]
        );
    }

    #[test]
    fn empty_settings_write_nothing() {
        assert!(CameraSettings::default().features().is_empty());
    }

    #[test]
    fn defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.buffer_count, 8);
        assert_eq!(config.frame_timeout, Duration::from_millis(1000));
        assert_eq!(config.bytes_per_pixel, 1);
        assert_eq!(config.delivery_mode, DeliveryMode::CoreAllocates);
        assert_eq!(config.framerate, None);
    }
}
