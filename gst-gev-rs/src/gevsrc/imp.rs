//! GigE-V Source Implementation
//!
//! This module contains the core implementation of the gevsrc GStreamer element.
//! It implements GStreamer's PushSrc trait (a type of BaseSrc), handling:
//! - Element lifecycle (start/stop state transitions)
//! - Property management (camera selection, timing, camera features)
//! - Caps negotiation (GRAY8 at the size the camera reports)
//! - Buffer creation (`create()` or `fill()` depending on `delivery-mode`)
//! - End of stream after `num-buffers` frames
//!
//! ## Lifecycle
//! - `start()` (READY→PAUSED): loads the GigE-V library (or the simulated
//!   camera), enumerates cameras, opens `camera-id`, configures it and starts
//!   the transfer
//! - `create()`/`fill()` (PLAYING): waits for complete frames, retrying after
//!   timeouts and incomplete frames until one arrives or the element flushes
//! - `stop()` (PAUSED→READY): stops the transfer and closes the camera

// SPDX-FileCopyrightText: 2025 Contributors to the gst-gev project.
// SPDX-License-Identifier: Apache-2.0

use gst::glib;
use gst::prelude::*;
use gst::subclass::prelude::*;
use gst_base::prelude::*;
use gst_base::subclass::base_src::CreateSuccess;
use gst_base::subclass::prelude::*;
use gstreamer as gst;
use gstreamer::Buffer;
use gstreamer_base as gst_base;
use gstreamer_video as gst_video;

use std::sync::LazyLock;
use std::sync::Mutex;

use gev::{AcquisitionSession, GevLibrary, SimulatedDriver};

use crate::gevsrc;
use crate::gevsrc::create_video::{create_video, fill_video};
use crate::gevsrc::state::*;

/// GStreamer debug category for logging gevsrc-specific messages
pub(crate) static CAT: LazyLock<gst::DebugCategory> = LazyLock::new(|| {
    gst::DebugCategory::new(
        "gevsrc",
        gst::DebugColorFlags::empty(),
        Some("GigE-V Source"),
    )
});

/// Interruption state between frame waits
struct Unlock {
    /// True when flushing (stops the retry loop)
    flushing: bool,
}

impl Default for Unlock {
    fn default() -> Unlock {
        Unlock {
            flushing: true, // Start in flushing state until unlock_stop()
        }
    }
}

/// GigE-V Source element implementation.
#[derive(Default)]
pub struct GevSrc {
    /// User-configurable properties
    pub settings: Mutex<Settings>,

    /// Runtime state (acquisition session, negotiated format)
    pub context: Mutex<Context>,

    unlock: Mutex<Unlock>,
}

/// Result of one attempt to create a buffer.
pub enum CreateState {
    /// Buffer was created successfully
    DataCreated(Buffer),

    /// Timeout or incomplete frame, try again
    NoDataCreated,
}

/// Result of one attempt to fill a base-class buffer.
pub enum FillState {
    Filled,

    /// Timeout or incomplete frame, try again
    NoDataFilled,
}

#[glib::object_subclass]
impl ObjectSubclass for GevSrc {
    const NAME: &'static str = "GstRsGevSrc";
    type Type = gevsrc::GevSrc;
    type ParentType = gst_base::PushSrc;
}

/// Properties that are accepted but have no effect on the camera.
const UNSUPPORTED_PROPERTIES: &[&str] = &[
    "sharpness",
    "saturation",
    "white-balance",
    "lut",
    "lut1-offset",
    "lut1-gamma",
    "lut1-gain",
    "lut2-offset",
    "lut2-gamma",
    "lut2-gain",
];

impl ObjectImpl for GevSrc {
    fn properties() -> &'static [glib::ParamSpec] {
        static PROPERTIES: LazyLock<Vec<glib::ParamSpec>> = LazyLock::new(|| {
            vec![
                glib::ParamSpecInt::builder("camera-id")
                    .nick("Camera ID")
                    .blurb("Index of the camera in the discovered list")
                    .minimum(0)
                    .maximum(MAX_CAMERA_ID)
                    .default_value(DEFAULT_CAMERA_ID)
                    .mutable_ready()
                    .build(),
                glib::ParamSpecUInt::builder("width")
                    .nick("Width")
                    .blurb("Sensor width to request (0 = camera setting)")
                    .maximum(65535)
                    .default_value(0)
                    .mutable_ready()
                    .build(),
                glib::ParamSpecUInt::builder("height")
                    .nick("Height")
                    .blurb("Sensor height to request (0 = camera setting)")
                    .maximum(65535)
                    .default_value(0)
                    .mutable_ready()
                    .build(),
                glib::ParamSpecDouble::builder("framerate")
                    .nick("Framerate")
                    .blurb("Nominal framerate used for timestamps and caps (default: the camera's acquisition rate)")
                    .minimum(0.001)
                    .maximum(1000.0)
                    .default_value(DEFAULT_FRAMERATE)
                    .mutable_ready()
                    .build(),
                glib::ParamSpecUInt::builder("timeout")
                    .nick("Timeout")
                    .blurb("Maximum wait for one frame in milliseconds")
                    .minimum(1)
                    .maximum(60000)
                    .default_value(DEFAULT_TIMEOUT_MS)
                    .mutable_ready()
                    .build(),
                glib::ParamSpecUInt::builder("buffer-count")
                    .nick("Buffer count")
                    .blurb("Number of driver buffers")
                    .minimum(1)
                    .maximum(64)
                    .default_value(DEFAULT_BUFFER_COUNT)
                    .mutable_ready()
                    .build(),
                glib::ParamSpecEnum::builder_with_default("delivery-mode", DeliveryMode::default())
                    .nick("Delivery mode")
                    .blurb("Who allocates the output buffers")
                    .mutable_ready()
                    .build(),
                glib::ParamSpecBoolean::builder("simulate")
                    .nick("Simulate")
                    .blurb("Use a simulated camera instead of the GigE-V library")
                    .default_value(false)
                    .mutable_ready()
                    .build(),
                glib::ParamSpecUInt::builder("simulated-cameras")
                    .nick("Simulated cameras")
                    .blurb("Number of cameras the simulated driver reports")
                    .minimum(1)
                    .maximum(gev::MAX_CAMERAS as u32)
                    .default_value(DEFAULT_SIMULATED_CAMERAS)
                    .mutable_ready()
                    .build(),
                glib::ParamSpecString::builder("library")
                    .nick("Library")
                    .blurb("Path of the GigE-V library (libGevApi.so)")
                    .default_value(Some(gev::config::DEFAULT_GEV_LIBRARY))
                    .mutable_ready()
                    .build(),
                glib::ParamSpecDouble::builder("exposure")
                    .nick("Exposure")
                    .blurb("Exposure time in milliseconds")
                    .minimum(0.001)
                    .maximum(100_000.0)
                    .default_value(DEFAULT_EXPOSURE_MS)
                    .mutable_ready()
                    .build(),
                glib::ParamSpecDouble::builder("gain")
                    .nick("Gain")
                    .blurb("Sensor gain")
                    .minimum(0.0)
                    .maximum(1000.0)
                    .default_value(DEFAULT_GAIN)
                    .mutable_ready()
                    .build(),
                glib::ParamSpecDouble::builder("black-level")
                    .nick("Black level")
                    .blurb("Black level offset")
                    .minimum(-10_000.0)
                    .maximum(10_000.0)
                    .default_value(DEFAULT_BLACK_LEVEL)
                    .mutable_ready()
                    .build(),
                glib::ParamSpecInt::builder("binning")
                    .nick("Binning")
                    .blurb("Horizontal and vertical binning")
                    .minimum(1)
                    .maximum(8)
                    .default_value(DEFAULT_BINNING)
                    .mutable_ready()
                    .build(),
                glib::ParamSpecBoolean::builder("hflip")
                    .nick("Horizontal flip")
                    .blurb("Mirror the image horizontally (ReverseX)")
                    .default_value(false)
                    .mutable_ready()
                    .build(),
                glib::ParamSpecBoolean::builder("vflip")
                    .nick("Vertical flip")
                    .blurb("Mirror the image vertically (ReverseY)")
                    .default_value(false)
                    .mutable_ready()
                    .build(),
                glib::ParamSpecDouble::builder("max-framerate")
                    .nick("Maximum framerate")
                    .blurb("Acquisition framerate of the camera")
                    .minimum(0.001)
                    .maximum(1000.0)
                    .default_value(DEFAULT_MAX_FRAMERATE)
                    .mutable_ready()
                    .build(),
                glib::ParamSpecDouble::builder("gamma")
                    .nick("Gamma")
                    .blurb("Gamma correction")
                    .minimum(0.01)
                    .maximum(10.0)
                    .default_value(DEFAULT_GAMMA)
                    .mutable_ready()
                    .build(),
                glib::ParamSpecInt::builder("sharpness")
                    .nick("Sharpness")
                    .blurb("Sharpness (not supported, ignored)")
                    .minimum(-100)
                    .maximum(100)
                    .default_value(DEFAULT_SHARPNESS)
                    .mutable_ready()
                    .build(),
                glib::ParamSpecInt::builder("saturation")
                    .nick("Saturation")
                    .blurb("Saturation (not supported, ignored)")
                    .minimum(0)
                    .maximum(100)
                    .default_value(DEFAULT_SATURATION)
                    .mutable_ready()
                    .build(),
                glib::ParamSpecEnum::builder_with_default("white-balance", WhiteBalance::default())
                    .nick("White balance")
                    .blurb("White balance mode (not supported, ignored)")
                    .mutable_ready()
                    .build(),
                glib::ParamSpecEnum::builder_with_default("lut", Lut::default())
                    .nick("LUT")
                    .blurb("Look-up table (not supported, ignored)")
                    .mutable_ready()
                    .build(),
                glib::ParamSpecInt::builder("lut1-offset")
                    .nick("LUT1 offset")
                    .blurb("LUT1 offset (not supported, ignored)")
                    .minimum(-255)
                    .maximum(255)
                    .default_value(DEFAULT_LUT1_OFFSET)
                    .mutable_ready()
                    .build(),
                glib::ParamSpecDouble::builder("lut1-gamma")
                    .nick("LUT1 gamma")
                    .blurb("LUT1 gamma (not supported, ignored)")
                    .minimum(0.0)
                    .maximum(10.0)
                    .default_value(DEFAULT_LUT1_GAMMA)
                    .mutable_ready()
                    .build(),
                glib::ParamSpecDouble::builder("lut1-gain")
                    .nick("LUT1 gain")
                    .blurb("LUT1 gain (not supported, ignored)")
                    .minimum(0.0)
                    .maximum(10.0)
                    .default_value(DEFAULT_LUT1_GAIN)
                    .mutable_ready()
                    .build(),
                glib::ParamSpecInt::builder("lut2-offset")
                    .nick("LUT2 offset")
                    .blurb("LUT2 offset (not supported, ignored)")
                    .minimum(-255)
                    .maximum(255)
                    .default_value(DEFAULT_LUT2_OFFSET)
                    .mutable_ready()
                    .build(),
                glib::ParamSpecDouble::builder("lut2-gamma")
                    .nick("LUT2 gamma")
                    .blurb("LUT2 gamma (not supported, ignored)")
                    .minimum(0.0)
                    .maximum(10.0)
                    .default_value(DEFAULT_LUT2_GAMMA)
                    .mutable_ready()
                    .build(),
                glib::ParamSpecDouble::builder("lut2-gain")
                    .nick("LUT2 gain")
                    .blurb("LUT2 gain (not supported, ignored)")
                    .minimum(0.0)
                    .maximum(10.0)
                    .default_value(DEFAULT_LUT2_GAIN)
                    .mutable_ready()
                    .build(),
                glib::ParamSpecUInt64::builder("frames-delivered")
                    .nick("Frames delivered")
                    .blurb("Frames pushed in the current or last run")
                    .read_only()
                    .build(),
                glib::ParamSpecUInt64::builder("timeouts")
                    .nick("Timeouts")
                    .blurb("Frame waits that timed out in the current or last run")
                    .read_only()
                    .build(),
            ]
        });

        PROPERTIES.as_ref()
    }

    /// Configures the source as a live, time-based source.
    fn constructed(&self) {
        self.parent_constructed();

        #[cfg(feature = "tracing")]
        {
            use tracing_subscriber::filter::LevelFilter;
            use tracing_subscriber::util::SubscriberInitExt;
            let _ = tracing_subscriber::fmt()
                .compact()
                .with_file(true)
                .with_line_number(true)
                .with_thread_ids(true)
                .with_target(false)
                .with_max_level(LevelFilter::TRACE)
                .with_ansi(true)
                .finish()
                .try_init();
        }

        let obj = self.obj();
        obj.set_live(true);
        obj.set_format(gst::Format::Time);
    }

    fn set_property(&self, _id: usize, value: &glib::Value, pspec: &glib::ParamSpec) {
        let Ok(mut settings) = self.settings.lock() else {
            gst::error!(
                CAT,
                imp = self,
                "Settings mutex poisoned, property change ignored"
            );
            return;
        };

        let name = pspec.name();
        let result = match name {
            "camera-id" => value.get().map(|v| settings.camera_id = v),
            "width" => value.get().map(|v| settings.width = v),
            "height" => value.get().map(|v| settings.height = v),
            "framerate" => value.get().map(|v| settings.framerate = Some(v)),
            "timeout" => value.get().map(|v| settings.timeout_ms = v),
            "buffer-count" => value.get().map(|v| settings.buffer_count = v),
            "delivery-mode" => value.get().map(|v| settings.delivery_mode = v),
            "simulate" => value.get().map(|v| settings.simulate = v),
            "simulated-cameras" => value.get().map(|v| settings.simulated_cameras = v),
            "library" => value.get::<Option<String>>().map(|v| {
                settings.library = v.unwrap_or_else(|| {
                    gev::config::get_gev_so_path()
                        .to_string_lossy()
                        .into_owned()
                })
            }),
            "exposure" => value.get().map(|v| settings.exposure_ms = Some(v)),
            "gain" => value.get().map(|v| settings.gain = Some(v)),
            "black-level" => value.get().map(|v| settings.black_level = Some(v)),
            "binning" => value.get().map(|v| settings.binning = Some(v)),
            "hflip" => value.get().map(|v| settings.hflip = Some(v)),
            "vflip" => value.get().map(|v| settings.vflip = Some(v)),
            "max-framerate" => value.get().map(|v| settings.max_framerate = Some(v)),
            "gamma" => value.get().map(|v| settings.gamma = Some(v)),
            "sharpness" => value.get().map(|v| settings.sharpness = v),
            "saturation" => value.get().map(|v| settings.saturation = v),
            "white-balance" => value.get().map(|v| settings.white_balance = v),
            "lut" => value.get().map(|v| settings.lut = v),
            "lut1-offset" => value.get().map(|v| settings.lut1_offset = v),
            "lut1-gamma" => value.get().map(|v| settings.lut1_gamma = v),
            "lut1-gain" => value.get().map(|v| settings.lut1_gain = v),
            "lut2-offset" => value.get().map(|v| settings.lut2_offset = v),
            "lut2-gamma" => value.get().map(|v| settings.lut2_gamma = v),
            "lut2-gain" => value.get().map(|v| settings.lut2_gain = v),
            other => {
                gst::error!(CAT, imp = self, "Unknown property '{}'", other);
                return;
            }
        };

        match result {
            Ok(()) if UNSUPPORTED_PROPERTIES.contains(&name) => {
                gst::warning!(
                    CAT,
                    imp = self,
                    "Property '{}' is not supported by this camera interface and has no effect",
                    name
                );
            }
            Ok(()) => {
                gst::debug!(CAT, imp = self, "Set '{}' to {:?}", name, value);
            }
            Err(err) => {
                gst::error!(CAT, imp = self, "Invalid value for '{}': {}", name, err);
            }
        }
    }

    fn property(&self, _id: usize, pspec: &glib::ParamSpec) -> glib::Value {
        let running_framerate = || {
            self.context.lock().ok().and_then(|context| {
                context
                    .state
                    .as_ref()
                    .and_then(|state| state.session.framerate())
            })
        };

        match pspec.name() {
            "frames-delivered" | "timeouts" => {
                let counters = match self.context.lock() {
                    Ok(context) => context.counters(),
                    Err(_) => {
                        gst::error!(CAT, imp = self, "Context mutex poisoned");
                        Default::default()
                    }
                };
                return if pspec.name() == "timeouts" {
                    counters.timeout_count.to_value()
                } else {
                    counters.frames_delivered.to_value()
                };
            }
            _ => {}
        }

        let Ok(settings) = self.settings.lock() else {
            gst::error!(CAT, imp = self, "Settings mutex poisoned");
            return pspec.default_value().clone();
        };

        match pspec.name() {
            "camera-id" => settings.camera_id.to_value(),
            "width" => settings.width.to_value(),
            "height" => settings.height.to_value(),
            "framerate" => settings
                .framerate
                .or_else(running_framerate)
                .unwrap_or(DEFAULT_FRAMERATE)
                .to_value(),
            "timeout" => settings.timeout_ms.to_value(),
            "buffer-count" => settings.buffer_count.to_value(),
            "delivery-mode" => settings.delivery_mode.to_value(),
            "simulate" => settings.simulate.to_value(),
            "simulated-cameras" => settings.simulated_cameras.to_value(),
            "library" => settings.library.to_value(),
            "exposure" => settings.exposure_ms.unwrap_or(DEFAULT_EXPOSURE_MS).to_value(),
            "gain" => settings.gain.unwrap_or(DEFAULT_GAIN).to_value(),
            "black-level" => settings.black_level.unwrap_or(DEFAULT_BLACK_LEVEL).to_value(),
            "binning" => settings.binning.unwrap_or(DEFAULT_BINNING).to_value(),
            "hflip" => settings.hflip.unwrap_or(false).to_value(),
            "vflip" => settings.vflip.unwrap_or(false).to_value(),
            "max-framerate" => settings
                .max_framerate
                .unwrap_or(DEFAULT_MAX_FRAMERATE)
                .to_value(),
            "gamma" => settings.gamma.unwrap_or(DEFAULT_GAMMA).to_value(),
            "sharpness" => settings.sharpness.to_value(),
            "saturation" => settings.saturation.to_value(),
            "white-balance" => settings.white_balance.to_value(),
            "lut" => settings.lut.to_value(),
            "lut1-offset" => settings.lut1_offset.to_value(),
            "lut1-gamma" => settings.lut1_gamma.to_value(),
            "lut1-gain" => settings.lut1_gain.to_value(),
            "lut2-offset" => settings.lut2_offset.to_value(),
            "lut2-gamma" => settings.lut2_gamma.to_value(),
            "lut2-gain" => settings.lut2_gain.to_value(),
            other => {
                gst::error!(CAT, imp = self, "Unknown property {}", other);
                pspec.default_value().clone()
            }
        }
    }
}

impl GstObjectImpl for GevSrc {}

impl ElementImpl for GevSrc {
    fn metadata() -> Option<&'static gst::subclass::ElementMetadata> {
        static ELEMENT_METADATA: LazyLock<gst::subclass::ElementMetadata> = LazyLock::new(|| {
            gst::subclass::ElementMetadata::new(
                "GigE-V Source",
                "Source/Video",
                "Streams monochrome frames from a GigE Vision camera",
                "Contributors to the gst-gev project",
            )
        });

        Some(&*ELEMENT_METADATA)
    }

    fn pad_templates() -> &'static [gst::PadTemplate] {
        static PAD_TEMPLATES: LazyLock<Result<Vec<gst::PadTemplate>, glib::BoolError>> =
            LazyLock::new(|| {
                let caps = gst_video::VideoCapsBuilder::new()
                    .format(gst_video::VideoFormat::Gray8)
                    .build();
                let src_pad_template = gst::PadTemplate::new(
                    "src",
                    gst::PadDirection::Src,
                    gst::PadPresence::Always,
                    &caps,
                )?;

                Ok(vec![src_pad_template])
            });

        match PAD_TEMPLATES.as_ref() {
            Ok(templates) => templates,
            Err(err) => {
                tracing::error!("Failed to create src pad template: {:?}", err);
                &[]
            }
        }
    }
}

/// Maps a start failure to the closest GStreamer resource error.
fn start_error(camera_id: i32, err: gev::Error) -> gst::ErrorMessage {
    match err {
        gev::Error::InvalidCameraIndex { index, count } => gst::error_msg!(
            gst::ResourceError::NotFound,
            ["Camera {} not found ({} camera(s) discovered)", index, count]
        ),
        gev::Error::DeviceOpenFailed(status) => gst::error_msg!(
            gst::ResourceError::OpenRead,
            ["Failed to open camera {}: {}", camera_id, status]
        ),
        gev::Error::BufferAllocationFailed { size, count } => gst::error_msg!(
            gst::ResourceError::NoSpaceLeft,
            ["Failed to allocate {} buffer(s) of {} bytes", count, size]
        ),
        err @ gev::Error::LibLoading(_) => gst::error_msg!(
            gst::LibraryError::Init,
            ["Failed to load the GigE-V library: {}", err]
        ),
        err => gst::error_msg!(
            gst::ResourceError::Settings,
            ["Failed to start camera {}: {}", camera_id, err]
        ),
    }
}

impl BaseSrcImpl for GevSrc {
    /// Opens and starts the camera.
    ///
    /// The frame budget is taken from the base class `num-buffers` property.
    fn start(&self) -> Result<(), gst::ErrorMessage> {
        self.unlock_stop()?;

        let settings = self
            .settings
            .lock()
            .map_err(|e| {
                gst::error_msg!(
                    gst::CoreError::Failed,
                    ["Failed to lock settings mutex: {}", e]
                )
            })?
            .clone();

        let num_buffers = self.obj().property::<i32>("num-buffers");
        let frame_budget = u64::try_from(num_buffers).unwrap_or(0);
        let config = settings.session_config(frame_budget);

        let mut session: Box<dyn CameraSession> = if settings.simulate {
            gst::info!(
                CAT,
                imp = self,
                "Using {} simulated camera(s)",
                settings.simulated_cameras
            );
            let driver = SimulatedDriver::new().with_cameras(settings.simulated_cameras as usize);
            Box::new(AcquisitionSession::new(driver, config))
        } else {
            gst::info!(CAT, imp = self, "Loading {}", settings.library);
            let driver = gev::load_api(&settings.library)
                .and_then(GevLibrary::new)
                .map_err(|err| start_error(settings.camera_id, err))?;
            Box::new(AcquisitionSession::new(driver, config))
        };

        let count = session.enumerate();
        gst::info!(CAT, imp = self, "Discovered {} camera(s)", count);

        let camera_id = settings.camera_id as usize;
        let format = session
            .start(camera_id)
            .map_err(|err| start_error(settings.camera_id, err))?;
        let frame_size = session.frame_size().ok_or_else(|| {
            gst::error_msg!(gst::CoreError::Failed, ["Session did not start streaming"])
        })?;

        if let Some(device) = session.device() {
            gst::info!(CAT, imp = self, "Opened {} as {}", device, device.unique_name());
        }

        let framerate = session.framerate().unwrap_or(DEFAULT_FRAMERATE);
        gst::debug!(CAT, imp = self, "Nominal framerate {}", framerate);
        let framerate = gst::Fraction::approximate_f64(framerate)
            .unwrap_or_else(|| gst::Fraction::new(DEFAULT_FRAMERATE as i32, 1));
        let caps = gst_video::VideoCapsBuilder::new()
            .format(gst_video::VideoFormat::Gray8)
            .width(format.width as i32)
            .height(format.height as i32)
            .framerate(framerate)
            .build();

        if let Ok(blocksize) = u32::try_from(frame_size) {
            self.obj().set_blocksize(blocksize);
        }

        let mut context = self.context.lock().map_err(|e| {
            gst::error_msg!(
                gst::CoreError::Failed,
                ["Failed to lock context mutex: {}", e]
            )
        })?;
        context.last_counters = Default::default();
        context.state = Some(State {
            session,
            format,
            caps,
            frame_size,
            delivery_mode: settings.delivery_mode.into(),
        });

        gst::info!(
            CAT,
            imp = self,
            "Started: {}x{} GRAY8, {} bytes per frame, budget {}",
            format.width,
            format.height,
            frame_size,
            frame_budget
        );
        Ok(())
    }

    /// Stops the transfer and closes the camera. Safe to call when not started.
    fn stop(&self) -> Result<(), gst::ErrorMessage> {
        let mut context = self.context.lock().map_err(|e| {
            gst::error_msg!(
                gst::CoreError::Failed,
                ["Failed to lock context mutex: {}", e]
            )
        })?;

        if let Some(mut state) = context.state.take() {
            state.session.stop();
            context.last_counters = state.session.counters();
            gst::info!(
                CAT,
                imp = self,
                "Stopped after {} frame(s), {} timeout(s)",
                context.last_counters.frames_delivered,
                context.last_counters.timeout_count
            );
        }
        drop(context);

        self.unlock()?;
        Ok(())
    }

    fn is_seekable(&self) -> bool {
        false
    }

    /// Advertises GRAY8 at the camera size once started, the template before.
    fn caps(&self, filter: Option<&gst::Caps>) -> Option<gst::Caps> {
        let caps = match self.context.lock() {
            Ok(context) => context.state.as_ref().map(|state| state.caps.clone()),
            Err(_) => None,
        };
        let caps = caps.unwrap_or_else(|| self.obj().src_pad().pad_template_caps());

        match filter {
            Some(filter) => Some(filter.intersect_with_mode(&caps, gst::CapsIntersectMode::First)),
            None => Some(caps),
        }
    }

    /// Accepts only GRAY8 at the size the camera reported.
    fn set_caps(&self, caps: &gst::Caps) -> Result<(), gst::LoggableError> {
        let info = gst_video::VideoInfo::from_caps(caps)
            .map_err(|e| gst::loggable_error!(CAT, "Failed to parse caps {}: {}", caps, e))?;

        let context = self
            .context
            .lock()
            .map_err(|e| gst::loggable_error!(CAT, "Failed to lock context mutex {}", e))?;
        let state = context
            .state
            .as_ref()
            .ok_or(gst::loggable_error!(CAT, "Caps set before start"))?;

        if info.format() != gst_video::VideoFormat::Gray8
            || info.width() != state.format.width
            || info.height() != state.format.height
        {
            return Err(gst::loggable_error!(
                CAT,
                "Caps {} do not match the camera ({}x{} GRAY8)",
                caps,
                state.format.width,
                state.format.height
            ));
        }

        gst::debug!(CAT, imp = self, "Negotiated caps {}", caps);
        Ok(())
    }

    fn unlock(&self) -> Result<(), gst::ErrorMessage> {
        gst::debug!(CAT, imp = self, "Unlocking");
        let mut unlock = self.unlock.lock().map_err(|e| {
            gst::error_msg!(gst::CoreError::Failed, ["Failed to lock unlock state: {}", e])
        })?;
        unlock.flushing = true;

        Ok(())
    }

    fn unlock_stop(&self) -> Result<(), gst::ErrorMessage> {
        gst::debug!(CAT, imp = self, "Unlock stop");
        let mut unlock = self.unlock.lock().map_err(|e| {
            gst::error_msg!(gst::CoreError::Failed, ["Failed to lock unlock state: {}", e])
        })?;
        unlock.flushing = false;

        Ok(())
    }
}

impl PushSrcImpl for GevSrc {
    /// Produces the next buffer.
    ///
    /// In `core-allocates` mode the session allocates the frame and it is
    /// wrapped as is. In `caller-provides` mode the base class allocates a
    /// buffer of `blocksize` bytes and [`fill`](Self::fill) copies into it.
    /// Once the last frame of the budget was pushed, returns EOS.
    fn create(
        &self,
        buffer: Option<&mut gst::BufferRef>,
    ) -> Result<CreateSuccess, gst::FlowError> {
        let delivery_mode = {
            let context = self.context.lock().map_err(|_| gst::FlowError::Error)?;
            let state = context.state.as_ref().ok_or(gst::FlowError::Flushing)?;
            state.delivery_mode
        };

        if delivery_mode == gev::DeliveryMode::CallerProvides {
            return self.parent_create(buffer);
        }

        loop {
            if self.is_flushing() {
                return Err(gst::FlowError::Flushing);
            }
            match self.try_create()? {
                CreateState::DataCreated(buffer) => return Ok(CreateSuccess::NewBuffer(buffer)),
                CreateState::NoDataCreated => continue,
            }
        }
    }

    fn fill(&self, buffer: &mut gst::BufferRef) -> Result<gst::FlowSuccess, gst::FlowError> {
        loop {
            if self.is_flushing() {
                return Err(gst::FlowError::Flushing);
            }
            let mut context = self.context.lock().map_err(|_| gst::FlowError::Error)?;
            let state = context.state.as_mut().ok_or(gst::FlowError::Flushing)?;
            match fill_video(self, state, buffer)? {
                FillState::Filled => return Ok(gst::FlowSuccess::Ok),
                FillState::NoDataFilled => continue,
            }
        }
    }
}

impl GevSrc {
    fn is_flushing(&self) -> bool {
        self.unlock
            .lock()
            .map(|unlock| unlock.flushing)
            .unwrap_or(true)
    }

    /// Attempts to create a buffer without retrying.
    fn try_create(&self) -> Result<CreateState, gst::FlowError> {
        let mut context = self.context.lock().map_err(|_| gst::FlowError::Error)?;
        let state = context.state.as_mut().ok_or(gst::FlowError::Flushing)?;
        create_video(self, state)
    }
}
