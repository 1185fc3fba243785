// SPDX-FileCopyrightText: 2025 Contributors to the gst-gev project.
// SPDX-License-Identifier: Apache-2.0

//! Error types for GigE-V acquisition.
//!
//! Two layers live here: [`Status`], the raw status code every driver call
//! reports, and [`Error`], the taxonomy the acquisition core surfaces to its
//! callers once a status has been classified.

use std::fmt;

use crate::config::DeliveryMode;

/// Convenience result type using [`Error`] as the error variant.
pub type Result<T> = core::result::Result<T, Error>;

/// Raw status code reported by the driver (`GEV_STATUS`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Status(pub i16);

impl Status {
    pub const OK: Status = Status(gev_sys::GEVLIB_OK);
    pub const GENERIC: Status = Status(gev_sys::GEVLIB_ERROR_GENERIC);
    pub const NULL_PTR: Status = Status(gev_sys::GEVLIB_ERROR_NULL_PTR);
    pub const ARG_INVALID: Status = Status(gev_sys::GEVLIB_ERROR_ARG_INVALID);
    pub const INVALID_HANDLE: Status = Status(gev_sys::GEVLIB_ERROR_INVALID_HANDLE);
    pub const NOT_SUPPORTED: Status = Status(gev_sys::GEVLIB_ERROR_NOT_SUPPORTED);
    pub const TIME_OUT: Status = Status(gev_sys::GEVLIB_ERROR_TIME_OUT);
    pub const NO_CAMERA: Status = Status(gev_sys::GEVLIB_ERROR_NO_CAMERA);
    pub const DEVICE_NOT_FOUND: Status = Status(gev_sys::GEVLIB_ERROR_DEVICE_NOT_FOUND);
    pub const ACCESS_DENIED: Status = Status(gev_sys::GEVLIB_ERROR_ACCESS_DENIED);
    pub const XFER_NOT_INITIALIZED: Status = Status(gev_sys::GEVLIB_ERROR_XFER_NOT_INITIALIZED);
    pub const XFER_ACTIVE: Status = Status(gev_sys::GEVLIB_ERROR_XFER_ACTIVE);
    pub const XFER_NOT_ACTIVE: Status = Status(gev_sys::GEVLIB_ERROR_XFER_NOT_ACTIVE);
    pub const INSUFFICIENT_MEMORY: Status = Status(gev_sys::GEVLIB_ERROR_INSUFFICIENT_MEMORY);

    /// Converts a C status code into a `Result`.
    ///
    /// ```ignore
    /// Status::check(unsafe { api.stop_transfer(handle) })?;
    /// ```
    pub fn check(code: gev_sys::GevStatusCode) -> core::result::Result<(), Status> {
        if code == gev_sys::GEVLIB_OK {
            Ok(())
        } else {
            Err(Status(code))
        }
    }

    pub fn is_timeout(self) -> bool {
        self == Status::TIME_OUT
    }

    fn name(self) -> Option<&'static str> {
        Some(match self.0 {
            gev_sys::GEVLIB_OK => "GEVLIB_OK",
            gev_sys::GEVLIB_ERROR_GENERIC => "GEVLIB_ERROR_GENERIC",
            gev_sys::GEVLIB_ERROR_NULL_PTR => "GEVLIB_ERROR_NULL_PTR",
            gev_sys::GEVLIB_ERROR_ARG_INVALID => "GEVLIB_ERROR_ARG_INVALID",
            gev_sys::GEVLIB_ERROR_INVALID_HANDLE => "GEVLIB_ERROR_INVALID_HANDLE",
            gev_sys::GEVLIB_ERROR_NOT_SUPPORTED => "GEVLIB_ERROR_NOT_SUPPORTED",
            gev_sys::GEVLIB_ERROR_TIME_OUT => "GEVLIB_ERROR_TIME_OUT",
            gev_sys::GEVLIB_ERROR_NOT_IMPLEMENTED => "GEVLIB_ERROR_NOT_IMPLEMENTED",
            gev_sys::GEVLIB_ERROR_NO_CAMERA => "GEVLIB_ERROR_NO_CAMERA",
            gev_sys::GEVLIB_ERROR_INVALID_PIXEL_FORMAT => "GEVLIB_ERROR_INVALID_PIXEL_FORMAT",
            gev_sys::GEVLIB_ERROR_PARAMETER_INVALID => "GEVLIB_ERROR_PARAMETER_INVALID",
            gev_sys::GEVLIB_ERROR_SOFTWARE => "GEVLIB_ERROR_SOFTWARE",
            gev_sys::GEVLIB_ERROR_API_NOT_INITIALIZED => "GEVLIB_ERROR_API_NOT_INITIALIZED",
            gev_sys::GEVLIB_ERROR_DEVICE_NOT_FOUND => "GEVLIB_ERROR_DEVICE_NOT_FOUND",
            gev_sys::GEVLIB_ERROR_ACCESS_DENIED => "GEVLIB_ERROR_ACCESS_DENIED",
            gev_sys::GEVLIB_ERROR_NOT_AVAILABLE => "GEVLIB_ERROR_NOT_AVAILABLE",
            gev_sys::GEVLIB_ERROR_NO_SPACE => "GEVLIB_ERROR_NO_SPACE",
            gev_sys::GEVLIB_ERROR_XFER_NOT_INITIALIZED => "GEVLIB_ERROR_XFER_NOT_INITIALIZED",
            gev_sys::GEVLIB_ERROR_XFER_ACTIVE => "GEVLIB_ERROR_XFER_ACTIVE",
            gev_sys::GEVLIB_ERROR_XFER_NOT_ACTIVE => "GEVLIB_ERROR_XFER_NOT_ACTIVE",
            gev_sys::GEVLIB_ERROR_SYSTEM_RESOURCE => "GEVLIB_ERROR_SYSTEM_RESOURCE",
            gev_sys::GEVLIB_ERROR_INSUFFICIENT_MEMORY => "GEVLIB_ERROR_INSUFFICIENT_MEMORY",
            _ => return None,
        })
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} ({})", name, self.0),
            None => write!(f, "status {}", self.0),
        }
    }
}

/// Per-image transfer outcome reported alongside each received buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// All packets of the image arrived.
    Received,
    Pending,
    Timeout,
    Overflow,
    Bandwidth,
    Lost,
    Released,
    Unknown(i32),
}

impl FrameStatus {
    pub fn from_raw(status: i32) -> Self {
        match status {
            gev_sys::GEV_FRAME_STATUS_RECVD => FrameStatus::Received,
            gev_sys::GEV_FRAME_STATUS_PENDING => FrameStatus::Pending,
            gev_sys::GEV_FRAME_STATUS_TIMEOUT => FrameStatus::Timeout,
            gev_sys::GEV_FRAME_STATUS_OVERFLOW => FrameStatus::Overflow,
            gev_sys::GEV_FRAME_STATUS_BANDWIDTH => FrameStatus::Bandwidth,
            gev_sys::GEV_FRAME_STATUS_LOST => FrameStatus::Lost,
            gev_sys::GEV_FRAME_STATUS_RELEASED => FrameStatus::Released,
            other => FrameStatus::Unknown(other),
        }
    }

    /// True only for images whose every packet was received.
    pub fn is_complete(self) -> bool {
        self == FrameStatus::Received
    }
}

impl fmt::Display for FrameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameStatus::Received => f.write_str("received"),
            FrameStatus::Pending => f.write_str("pending"),
            FrameStatus::Timeout => f.write_str("timeout"),
            FrameStatus::Overflow => f.write_str("overflow"),
            FrameStatus::Bandwidth => f.write_str("bandwidth"),
            FrameStatus::Lost => f.write_str("lost"),
            FrameStatus::Released => f.write_str("released"),
            FrameStatus::Unknown(code) => write!(f, "unknown ({code})"),
        }
    }
}

/// Errors surfaced by the acquisition core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested ordinal is outside the last enumeration.
    #[error("Camera index {index} out of range ({count} camera(s) enumerated)")]
    InvalidCameraIndex { index: usize, count: usize },

    /// The camera refused to open or is owned by another process.
    #[error("Failed to open camera: {0}")]
    DeviceOpenFailed(Status),

    /// A required feature (width, height, pixel format, payload) could not be read.
    #[error("Failed to read feature '{feature}': {status}")]
    FeatureReadFailed { feature: String, status: Status },

    /// A feature could not be written.
    #[error("Failed to write feature '{feature}': {status}")]
    FeatureWriteFailed { feature: String, status: Status },

    /// The camera streams a pixel format that cannot become the output depth.
    #[error("Unsupported pixel format {pixel_format:#010x}")]
    UnsupportedPixelFormat { pixel_format: u32 },

    /// The frame buffer pool could not be obtained.
    #[error("Failed to allocate {count} buffer(s) of {size} bytes")]
    BufferAllocationFailed { size: u64, count: usize },

    /// The driver rejected the asynchronous transfer.
    #[error("Failed to start transfer: {0}")]
    TransferStartFailed(Status),

    /// The image was truncated, overflowed or otherwise unusable.
    #[error("Incomplete frame: {0}")]
    FrameIncomplete(FrameStatus),

    /// No image arrived within the frame timeout.
    #[error("Timed out waiting for a frame")]
    FrameTimedOut,

    /// Unexpected low-level failure that matches no other kind.
    #[error("Driver failure: {0}")]
    DriverFatal(String),

    /// The frame budget of the run is spent; no further frames are delivered.
    #[error("End of stream: the frame budget is exhausted")]
    EndOfStream,

    /// `start` was called on a session that is already streaming.
    #[error("Session is already streaming")]
    AlreadyStreaming,

    /// A frame was requested from a session that is not streaming.
    #[error("Session is not streaming")]
    NotStreaming,

    /// The frame entry point does not match the configured delivery mode.
    #[error("Session is configured for {configured:?} delivery")]
    DeliveryModeMismatch { configured: DeliveryMode },

    /// The caller-provided destination cannot hold one output frame.
    #[error("Destination holds {available} bytes, frame needs {needed}")]
    DestinationTooSmall { needed: usize, available: usize },

    /// Failed to load or interact with the GigE-V dynamic library.
    #[error("Loading library: {0}")]
    LibLoading(#[from] gev_sys::LibLoadingError),

    /// The driver reported a status outside of any acquisition step.
    #[error("Driver status: {0}")]
    Driver(Status),
}

impl From<Status> for Error {
    fn from(status: Status) -> Self {
        if status.is_timeout() {
            Error::FrameTimedOut
        } else {
            Error::Driver(status)
        }
    }
}
