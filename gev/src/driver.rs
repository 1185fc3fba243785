// SPDX-FileCopyrightText: 2025 Contributors to the gst-gev project.
// SPDX-License-Identifier: Apache-2.0

//! The driver boundary.
//!
//! [`GevDriver`] is the narrow set of GigE-V calls the acquisition core
//! needs. [`crate::GevLibrary`] implements it over the vendor library and
//! [`crate::SimulatedDriver`] implements it in memory, so every state
//! transition of [`crate::AcquisitionSession`] can be exercised without a
//! camera on the network.
//!
//! Drivers report raw [`Status`] codes; classifying them into
//! [`crate::Error`] kinds is the session's job.

use std::{fmt, time::Duration};

use crate::{BufferPool, CameraDescriptor, FrameStatus, Status};

/// Value of a GenICam feature.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FeatureValue {
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl FeatureValue {
    /// Integer view of the value, if it has one.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            FeatureValue::Int(value) => Some(value),
            FeatureValue::Bool(value) => Some(value as i64),
            FeatureValue::Float(_) => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        self.as_i64().and_then(|value| u32::try_from(value).ok())
    }

    /// Converts the value to the kind of `like`, the node's current value.
    ///
    /// Floats written to integer nodes are rounded.
    pub fn coerce_to(self, like: FeatureValue) -> FeatureValue {
        match (self, like) {
            (FeatureValue::Float(value), FeatureValue::Int(_)) => {
                FeatureValue::Int(value.round() as i64)
            }
            (FeatureValue::Float(value), FeatureValue::Bool(_)) => FeatureValue::Bool(value != 0.0),
            (FeatureValue::Int(value), FeatureValue::Float(_)) => FeatureValue::Float(value as f64),
            (FeatureValue::Int(value), FeatureValue::Bool(_)) => FeatureValue::Bool(value != 0),
            (FeatureValue::Bool(value), FeatureValue::Float(_)) => {
                FeatureValue::Float(if value { 1.0 } else { 0.0 })
            }
            (FeatureValue::Bool(value), FeatureValue::Int(_)) => FeatureValue::Int(value.into()),
            (value, _) => value,
        }
    }
}

impl fmt::Display for FeatureValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureValue::Int(value) => write!(f, "{value}"),
            FeatureValue::Float(value) => write!(f, "{value}"),
            FeatureValue::Bool(value) => write!(f, "{value}"),
        }
    }
}

/// Metadata of one image handed back by the driver.
///
/// The pixels stay in the [`BufferPool`] buffer at index `buffer`; nothing is
/// copied until the frame is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawImage {
    pub status: FrameStatus,
    /// Pool buffer holding the pixels, when the driver filled one.
    pub buffer: Option<usize>,
    /// Number of valid bytes in the buffer.
    pub len: usize,
    pub width: u32,
    pub height: u32,
    /// Bytes per pixel.
    pub depth: u32,
    /// Bytes between the starts of consecutive rows.
    pub pitch: usize,
    /// Device block id.
    pub id: u64,
    /// Device timestamp in camera ticks.
    pub timestamp: u64,
}

/// Low-level GigE-V operations used by the acquisition core.
///
/// Every method mirrors one (or a short fixed sequence of) vendor calls and
/// reports the vendor status unchanged.
pub trait GevDriver: Clone + Send + 'static {
    /// Opaque handle of an open camera.
    type Handle: Copy + fmt::Debug + Send + 'static;

    /// Lists reachable cameras, at most `max` of them.
    fn enumerate_devices(&self, max: usize) -> Result<Vec<CameraDescriptor>, Status>;

    /// Opens `device` for control.
    fn open_camera(&self, device: &CameraDescriptor) -> Result<Self::Handle, Status>;

    fn get_feature(&self, handle: Self::Handle, name: &str) -> Result<FeatureValue, Status>;

    fn set_feature(
        &self,
        handle: Self::Handle,
        name: &str,
        value: FeatureValue,
    ) -> Result<(), Status>;

    /// Bytes the camera needs per image, including any padding.
    fn payload_size(&self, handle: Self::Handle) -> Result<u64, Status>;

    /// Registers every buffer of `pool` with the driver and starts continuous
    /// asynchronous acquisition.
    ///
    /// On failure nothing stays registered.
    fn begin_transfer(&self, handle: Self::Handle, pool: &mut BufferPool) -> Result<(), Status>;

    /// Waits up to `timeout` for the next image.
    ///
    /// `Ok(None)` means the driver returned without an image and without
    /// reporting a timeout.
    fn wait_next_image(
        &self,
        handle: Self::Handle,
        pool: &mut BufferPool,
        timeout: Duration,
    ) -> Result<Option<RawImage>, Status>;

    /// Stops acquisition and releases the driver's hold on the pool.
    fn stop_transfer(&self, handle: Self::Handle) -> Result<(), Status>;

    fn close_camera(&self, handle: Self::Handle) -> Result<(), Status>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_follow_the_node_kind() {
        let int = FeatureValue::Int(0);
        let float = FeatureValue::Float(0.0);

        assert_eq!(FeatureValue::Float(2.6).coerce_to(int), FeatureValue::Int(3));
        assert_eq!(FeatureValue::Int(4).coerce_to(float), FeatureValue::Float(4.0));
        assert_eq!(
            FeatureValue::Bool(true).coerce_to(int),
            FeatureValue::Int(1)
        );
        assert_eq!(
            FeatureValue::Float(40_000.0).coerce_to(float),
            FeatureValue::Float(40_000.0)
        );
        assert_eq!(
            FeatureValue::Int(0).coerce_to(FeatureValue::Bool(true)),
            FeatureValue::Bool(false)
        );
    }
}
