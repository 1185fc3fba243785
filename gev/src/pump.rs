// SPDX-FileCopyrightText: 2025 Contributors to the gst-gev project.
// SPDX-License-Identifier: Apache-2.0

//! Frame pump: waits for the next image and classifies the outcome.
//!
//! The pump never allocates and never copies; a usable image names the pool
//! buffer the driver filled.

use std::time::Duration;

use tracing::{debug, trace};

use crate::{
    BufferPool, Error, FrameStatus, Result,
    driver::{GevDriver, RawImage},
};

/// Running totals of one streaming run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameCounters {
    /// Frames handed to the consumer. Doubles as the next buffer offset.
    pub frames_delivered: u64,
    /// Waits that ended without an image.
    pub timeout_count: u64,
    /// Images dropped because they were not fully received.
    pub incomplete_count: u64,
}

/// Result of one wait on the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// A complete image sits in the pool buffer named by `RawImage::buffer`.
    Ready(RawImage),
    /// An image arrived but is unusable. Retry.
    Incomplete(FrameStatus),
    /// Nothing arrived within the timeout. Retry.
    TimedOut,
}

impl FrameOutcome {
    /// Whether the caller should wait again.
    pub fn is_retry(&self) -> bool {
        !matches!(self, FrameOutcome::Ready(_))
    }
}

/// Waits once for the next image and classifies it.
///
/// Timeouts and incomplete images update `counters` and are returned as
/// retryable outcomes. Every other driver failure becomes
/// [`Error::DriverFatal`].
pub fn wait_next_frame<D: GevDriver>(
    driver: &D,
    handle: D::Handle,
    pool: &mut BufferPool,
    timeout: Duration,
    counters: &mut FrameCounters,
) -> Result<FrameOutcome> {
    let image = match driver.wait_next_image(handle, pool, timeout) {
        Ok(Some(image)) => image,
        Ok(None) => {
            return Err(Error::DriverFatal(
                "wait returned neither an image nor a timeout".to_string(),
            ));
        }
        Err(status) if status.is_timeout() => {
            counters.timeout_count += 1;
            trace!("No frame within {timeout:?} ({} so far)", counters.timeout_count);
            return Ok(FrameOutcome::TimedOut);
        }
        Err(status) => {
            return Err(Error::DriverFatal(format!(
                "waiting for next image failed: {status}"
            )));
        }
    };

    if !image.status.is_complete() {
        counters.incomplete_count += 1;
        debug!(
            "Dropping frame {}: {} ({} so far)",
            image.id,
            image.status,
            counters.incomplete_count
        );
        return Ok(FrameOutcome::Incomplete(image.status));
    }

    match image.buffer {
        Some(index) if index < pool.len() => Ok(FrameOutcome::Ready(image)),
        _ => Err(Error::DriverFatal(format!(
            "frame {} does not reference a registered buffer",
            image.id
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{SimulatedDriver, SimulatedFrame};

    const WAIT: Duration = Duration::from_millis(10);

    #[test]
    fn outcomes_update_the_counters() {
        let driver = SimulatedDriver::new().with_resolution(4, 2);
        let camera = &driver.enumerate_devices(1).unwrap()[0];
        let handle = driver.open_camera(camera).unwrap();
        let mut pool = BufferPool::allocate(8, 2).unwrap();
        driver.begin_transfer(handle, &mut pool).unwrap();
        driver.push_frames([
            SimulatedFrame::Timeout,
            SimulatedFrame::Incomplete(FrameStatus::Lost),
            SimulatedFrame::Complete,
        ]);

        let mut counters = FrameCounters::default();
        let mut wait = || wait_next_frame(&driver, handle, &mut pool, WAIT, &mut counters);
        assert_eq!(wait().unwrap(), FrameOutcome::TimedOut);
        assert_eq!(
            wait().unwrap(),
            FrameOutcome::Incomplete(FrameStatus::Lost)
        );
        let outcome = wait().unwrap();
        assert!(!outcome.is_retry());
        assert!(matches!(outcome, FrameOutcome::Ready(image) if image.buffer.is_some()));

        assert_eq!(counters.timeout_count, 1);
        assert_eq!(counters.incomplete_count, 1);
        assert_eq!(counters.frames_delivered, 0);
    }

    #[test]
    fn inactive_transfer_is_fatal() {
        let driver = SimulatedDriver::new();
        let camera = &driver.enumerate_devices(1).unwrap()[0];
        let handle = driver.open_camera(camera).unwrap();
        let mut pool = BufferPool::allocate(16, 1).unwrap();

        let mut counters = FrameCounters::default();
        let err = wait_next_frame(&driver, handle, &mut pool, WAIT, &mut counters).unwrap_err();
        assert!(matches!(err, Error::DriverFatal(_)));
        assert_eq!(counters, FrameCounters::default());
    }
}
