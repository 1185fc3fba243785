// SPDX-FileCopyrightText: 2025 Contributors to the gst-gev project.
// SPDX-License-Identifier: Apache-2.0

//! Acquisition session: the camera lifecycle state machine.
//!
//! ```text
//!  Idle ──start──► Opening ──► Configuring ──► Streaming ──stop──► Stopping ──► Idle
//!                     │             │
//!                     └──── error ──┴──────────────────────────────────────────► Idle
//! ```
//!
//! Everything acquired while starting is owned by a guard: the camera handle,
//! the buffer pool and the active transfer. When a step fails, the guards
//! acquired so far are dropped in reverse order, so a failed start leaves
//! nothing open. `stop` releases in the same order: transfer, then camera,
//! then pool.

use tracing::{debug, error, info, warn};

use crate::{
    BufferPool, CameraDescriptor, DeliveryMode, Error, Result, SessionConfig,
    config::DEFAULT_FRAMERATE,
    delivery::{Delivery, Frame, FrameDelivery, FrameInfo, PixelConversion},
    device,
    driver::{FeatureValue, GevDriver},
    pump::{self, FrameCounters, FrameOutcome},
};

/// Lifecycle state of an [`AcquisitionSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Opening,
    Configuring,
    Streaming,
    Stopping,
}

/// Geometry negotiated with the camera at start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageFormat {
    pub width: u32,
    pub height: u32,
    /// PFNC pixel format code.
    pub pixel_format: u32,
    /// Bytes per pixel on the wire.
    pub depth: u32,
    pub payload_size: u64,
}

impl ImageFormat {
    /// Size of each pool buffer: the larger of the packed image and the payload.
    pub fn buffer_size(&self) -> u64 {
        let packed = self.width as u64 * self.height as u64 * self.depth as u64;
        packed.max(self.payload_size)
    }
}

/// Open camera handle, closed on drop.
struct CameraGuard<D: GevDriver> {
    driver: D,
    handle: D::Handle,
}

impl<D: GevDriver> CameraGuard<D> {
    fn open(driver: D, device: &CameraDescriptor) -> Result<Self> {
        let handle = driver
            .open_camera(device)
            .map_err(Error::DeviceOpenFailed)?;
        Ok(Self { driver, handle })
    }
}

impl<D: GevDriver> Drop for CameraGuard<D> {
    fn drop(&mut self) {
        match self.driver.close_camera(self.handle) {
            Ok(()) => debug!("Camera closed"),
            Err(status) => error!("Failed to close camera: {status}"),
        }
    }
}

/// Active asynchronous transfer, stopped and freed on drop.
struct TransferGuard<D: GevDriver> {
    driver: D,
    handle: D::Handle,
}

impl<D: GevDriver> TransferGuard<D> {
    fn begin(driver: D, handle: D::Handle, pool: &mut BufferPool) -> Result<Self> {
        driver
            .begin_transfer(handle, pool)
            .map_err(Error::TransferStartFailed)?;
        Ok(Self { driver, handle })
    }
}

impl<D: GevDriver> Drop for TransferGuard<D> {
    fn drop(&mut self) {
        match self.driver.stop_transfer(self.handle) {
            Ok(()) => debug!("Transfer stopped"),
            Err(status) => error!("Failed to stop transfer: {status}"),
        }
    }
}

/// Resources of a streaming run.
///
/// Field order is drop order: the transfer ends and the camera closes before
/// the pool the driver wrote into is freed.
struct Streaming<D: GevDriver> {
    transfer: TransferGuard<D>,
    camera: CameraGuard<D>,
    pool: BufferPool,
    delivery: FrameDelivery,
    format: ImageFormat,
    /// Nominal rate of the run in frames per second.
    framerate: f64,
    device: CameraDescriptor,
}

/// Drives one camera from discovery to streaming and back.
///
/// # Examples
///
/// ```
/// use gev::{AcquisitionSession, SessionConfig, SimulatedDriver};
///
/// # fn main() -> Result<(), gev::Error> {
/// let config = SessionConfig {
///     frame_budget: 2,
///     ..Default::default()
/// };
/// let mut session = AcquisitionSession::new(SimulatedDriver::new(), config);
/// session.enumerate();
/// session.start(0)?;
/// while let Some(delivery) = session.next_frame(Some(5))? {
///     if delivery.is_end_of_stream() {
///         break;
///     }
/// }
/// session.stop();
/// # Ok(())
/// # }
/// ```
pub struct AcquisitionSession<D: GevDriver> {
    driver: D,
    config: SessionConfig,
    state: SessionState,
    devices: Vec<CameraDescriptor>,
    counters: FrameCounters,
    streaming: Option<Streaming<D>>,
}

impl<D: GevDriver> AcquisitionSession<D> {
    pub fn new(driver: D, config: SessionConfig) -> Self {
        Self {
            driver,
            config,
            state: SessionState::Idle,
            devices: Vec::new(),
            counters: FrameCounters::default(),
            streaming: None,
        }
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming.is_some()
    }

    /// Result of the most recent [`enumerate`](Self::enumerate).
    pub fn devices(&self) -> &[CameraDescriptor] {
        &self.devices
    }

    pub fn counters(&self) -> FrameCounters {
        self.counters
    }

    /// Geometry of the current run.
    pub fn format(&self) -> Option<&ImageFormat> {
        self.streaming.as_ref().map(|streaming| &streaming.format)
    }

    /// Camera of the current run.
    pub fn device(&self) -> Option<&CameraDescriptor> {
        self.streaming.as_ref().map(|streaming| &streaming.device)
    }

    /// Nominal framerate of the current run: the configured rate, else the
    /// camera's `AcquisitionFrameRate`, else [`DEFAULT_FRAMERATE`].
    pub fn framerate(&self) -> Option<f64> {
        self.streaming.as_ref().map(|streaming| streaming.framerate)
    }

    /// Bytes of one delivered frame in the current run.
    pub fn frame_size(&self) -> Option<usize> {
        self.streaming
            .as_ref()
            .map(|streaming| streaming.delivery.frame_size())
    }

    /// Refreshes the device directory.
    pub fn enumerate(&mut self) -> &[CameraDescriptor] {
        self.devices = device::enumerate(&self.driver);
        &self.devices
    }

    /// Opens camera `camera_id`, configures it and starts the transfer.
    ///
    /// On success the session is streaming and the counters and frame clock
    /// are reset. On failure the session is idle and nothing stays open.
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadyStreaming`] if a run is active
    /// - [`Error::InvalidCameraIndex`] if `camera_id` is not in the last enumeration
    /// - [`Error::DeviceOpenFailed`], [`Error::FeatureReadFailed`],
    ///   [`Error::BufferAllocationFailed`] or [`Error::TransferStartFailed`]
    ///   for the step that failed
    /// - [`Error::UnsupportedPixelFormat`] if the camera keeps a format that
    ///   cannot be turned into the output depth
    pub fn start(&mut self, camera_id: usize) -> Result<ImageFormat> {
        if self.streaming.is_some() {
            return Err(Error::AlreadyStreaming);
        }

        match self.open_and_configure(camera_id) {
            Ok(streaming) => {
                let format = streaming.format;
                info!(
                    "Streaming from {}: {}x{} depth {} payload {} bytes, {} buffer(s)",
                    streaming.device,
                    format.width,
                    format.height,
                    format.depth,
                    format.payload_size,
                    streaming.pool.len()
                );
                self.counters = FrameCounters::default();
                self.streaming = Some(streaming);
                self.state = SessionState::Streaming;
                Ok(format)
            }
            Err(err) => {
                self.state = SessionState::Idle;
                warn!("Failed to start camera {camera_id}: {err}");
                Err(err)
            }
        }
    }

    fn open_and_configure(&mut self, camera_id: usize) -> Result<Streaming<D>> {
        let device = self
            .devices
            .get(camera_id)
            .cloned()
            .ok_or(Error::InvalidCameraIndex {
                index: camera_id,
                count: self.devices.len(),
            })?;

        self.state = SessionState::Opening;
        let camera = CameraGuard::open(self.driver.clone(), &device)?;

        self.state = SessionState::Configuring;
        self.apply_features(camera.handle);
        let format = self.read_format(camera.handle)?;
        let conversion = PixelConversion::select(format.pixel_format, self.config.bytes_per_pixel)
            .ok_or(Error::UnsupportedPixelFormat {
                pixel_format: format.pixel_format,
            })?;
        if let PixelConversion::Narrow { shift, .. } = conversion {
            warn!(
                "Camera streams pixel format {:#010x}, narrowing to 8 bits (shift {shift})",
                format.pixel_format
            );
        }
        let framerate = self
            .config
            .framerate
            .or_else(|| self.camera_framerate(camera.handle))
            .unwrap_or(DEFAULT_FRAMERATE);

        let buffer_size = format.buffer_size();
        let buffer_count = self.config.buffer_count;
        let pool_size =
            usize::try_from(buffer_size).map_err(|_| Error::BufferAllocationFailed {
                size: buffer_size,
                count: buffer_count,
            })?;
        let mut pool = BufferPool::allocate(pool_size, buffer_count)?;
        let transfer = TransferGuard::begin(self.driver.clone(), camera.handle, &mut pool)?;

        let delivery = FrameDelivery::new(
            format.width,
            format.height,
            self.config.bytes_per_pixel,
            conversion,
            framerate,
            self.config.frame_budget,
        );

        Ok(Streaming {
            transfer,
            camera,
            pool,
            delivery,
            format,
            framerate,
            device,
        })
    }

    /// The camera's `AcquisitionFrameRate`, when it reports a usable one.
    fn camera_framerate(&self, handle: D::Handle) -> Option<f64> {
        let rate = match self.driver.get_feature(handle, "AcquisitionFrameRate") {
            Ok(FeatureValue::Float(rate)) => rate,
            Ok(FeatureValue::Int(rate)) => rate as f64,
            Ok(FeatureValue::Bool(_)) => return None,
            Err(status) => {
                debug!("AcquisitionFrameRate not readable: {status}");
                return None;
            }
        };
        (rate.is_finite() && rate > 0.0).then_some(rate)
    }

    /// Best-effort feature writes. Rejections are logged, never fatal.
    fn apply_features(&self, handle: D::Handle) {
        let mut features = vec![(
            "PixelFormat",
            FeatureValue::Int(gev_sys::PFNC_MONO8.into()),
        )];
        if self.config.width > 0 {
            features.push(("Width", FeatureValue::Int(self.config.width.into())));
        }
        if self.config.height > 0 {
            features.push(("Height", FeatureValue::Int(self.config.height.into())));
        }
        features.extend(self.config.camera.features());

        for (name, value) in features {
            match self.driver.set_feature(handle, name, value) {
                Ok(()) => debug!("Set {name} = {value}"),
                Err(status) => {
                    let err = Error::FeatureWriteFailed {
                        feature: name.to_string(),
                        status,
                    };
                    warn!("{err} (value {value}), continuing");
                }
            }
        }
    }

    fn read_format(&self, handle: D::Handle) -> Result<ImageFormat> {
        let read = |name: &str| -> Result<u32> {
            let value = self
                .driver
                .get_feature(handle, name)
                .map_err(|status| Error::FeatureReadFailed {
                    feature: name.to_string(),
                    status,
                })?;
            value.as_u32().ok_or_else(|| Error::FeatureReadFailed {
                feature: name.to_string(),
                status: crate::Status::ARG_INVALID,
            })
        };

        let width = read("Width")?;
        let height = read("Height")?;
        let pixel_format = read("PixelFormat")?;
        let payload_size =
            self.driver
                .payload_size(handle)
                .map_err(|status| Error::FeatureReadFailed {
                    feature: "PayloadSize".to_string(),
                    status,
                })?;

        Ok(ImageFormat {
            width,
            height,
            pixel_format,
            depth: gev_sys::pfnc_bits_per_pixel(pixel_format).div_ceil(8),
            payload_size,
        })
    }

    /// Ends the current run. Release failures are logged; the session always
    /// ends up idle. Calling `stop` while idle does nothing.
    pub fn stop(&mut self) {
        let Some(streaming) = self.streaming.take() else {
            self.state = SessionState::Idle;
            return;
        };

        self.state = SessionState::Stopping;
        info!(
            "Stopping: {} frame(s) delivered, {} timeout(s), {} incomplete",
            self.counters.frames_delivered,
            self.counters.timeout_count,
            self.counters.incomplete_count
        );
        drop(streaming);
        self.state = SessionState::Idle;
    }

    fn expect_mode(&self, mode: DeliveryMode) -> Result<()> {
        if self.config.delivery_mode == mode {
            Ok(())
        } else {
            Err(Error::DeliveryModeMismatch {
                configured: self.config.delivery_mode,
            })
        }
    }

    /// One wait for the next frame, copied into session-allocated storage.
    ///
    /// Returns `Ok(None)` after a timeout or an incomplete image, and
    /// [`Error::EndOfStream`] without waiting once the frame budget is spent.
    pub fn try_next_frame(&mut self) -> Result<Option<Delivery<Frame>>> {
        self.expect_mode(DeliveryMode::CoreAllocates)?;
        let streaming = self.streaming.as_mut().ok_or(Error::NotStreaming)?;
        if streaming.delivery.is_exhausted() {
            return Err(Error::EndOfStream);
        }

        match pump::wait_next_frame(
            &self.driver,
            streaming.camera.handle,
            &mut streaming.pool,
            self.config.frame_timeout,
            &mut self.counters,
        )? {
            FrameOutcome::Ready(image) => streaming
                .delivery
                .produce(&image, &streaming.pool, &mut self.counters)
                .map(Some),
            FrameOutcome::Incomplete(_) | FrameOutcome::TimedOut => Ok(None),
        }
    }

    /// One wait for the next frame, copied into `dest`.
    ///
    /// Returns `Ok(None)` after a timeout or an incomplete image.
    pub fn try_next_frame_into(&mut self, dest: &mut [u8]) -> Result<Option<Delivery<FrameInfo>>> {
        self.expect_mode(DeliveryMode::CallerProvides)?;
        let streaming = self.streaming.as_mut().ok_or(Error::NotStreaming)?;
        if streaming.delivery.is_exhausted() {
            return Err(Error::EndOfStream);
        }

        let needed = streaming.delivery.frame_size();
        if dest.len() < needed {
            return Err(Error::DestinationTooSmall {
                needed,
                available: dest.len(),
            });
        }

        match pump::wait_next_frame(
            &self.driver,
            streaming.camera.handle,
            &mut streaming.pool,
            self.config.frame_timeout,
            &mut self.counters,
        )? {
            FrameOutcome::Ready(image) => streaming
                .delivery
                .produce_into(&image, &streaming.pool, &mut self.counters, dest)
                .map(Some),
            FrameOutcome::Incomplete(_) | FrameOutcome::TimedOut => Ok(None),
        }
    }

    /// Waits until a frame is delivered.
    ///
    /// With `max_attempts` set, gives up with `Ok(None)` after that many
    /// consecutive timeouts or incomplete images.
    pub fn next_frame(&mut self, max_attempts: Option<u32>) -> Result<Option<Delivery<Frame>>> {
        let mut attempts = 0;
        loop {
            if let Some(delivery) = self.try_next_frame()? {
                return Ok(Some(delivery));
            }
            attempts += 1;
            if max_attempts.is_some_and(|max| attempts >= max) {
                return Ok(None);
            }
        }
    }

    /// Caller-provides counterpart of [`next_frame`](Self::next_frame).
    pub fn next_frame_into(
        &mut self,
        dest: &mut [u8],
        max_attempts: Option<u32>,
    ) -> Result<Option<Delivery<FrameInfo>>> {
        let mut attempts = 0;
        loop {
            if let Some(delivery) = self.try_next_frame_into(dest)? {
                return Ok(Some(delivery));
            }
            attempts += 1;
            if max_attempts.is_some_and(|max| attempts >= max) {
                return Ok(None);
            }
        }
    }
}

impl<D: GevDriver> Drop for AcquisitionSession<D> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use tracing_test::traced_test;

    use super::*;
    use crate::{SimulatedDriver, Status};

    fn streaming_session(driver: &SimulatedDriver) -> AcquisitionSession<SimulatedDriver> {
        let mut session = AcquisitionSession::new(driver.clone(), SessionConfig::default());
        session.enumerate();
        session.start(0).unwrap();
        session
    }

    #[test]
    #[traced_test]
    fn teardown_failures_are_logged() {
        let driver = SimulatedDriver::new().with_resolution(8, 8);
        let mut session = streaming_session(&driver);

        driver.fail_stop_transfer(Status::GENERIC);
        driver.fail_close(Status::INVALID_HANDLE);
        session.stop();

        assert_eq!(session.state(), SessionState::Idle);
        assert!(logs_contain("Failed to stop transfer: GEVLIB_ERROR_GENERIC (-1)"));
        assert!(logs_contain("Failed to close camera: GEVLIB_ERROR_INVALID_HANDLE (-4)"));
    }

    #[test]
    #[traced_test]
    fn pool_is_released_after_the_camera() {
        let driver = SimulatedDriver::new().with_resolution(8, 8);
        let mut session = streaming_session(&driver);
        session.stop();

        logs_assert(|lines: &[&str]| {
            let position = |needle: &str| {
                lines
                    .iter()
                    .position(|line| line.contains(needle))
                    .ok_or(format!("missing '{needle}'"))
            };
            let transfer = position("Transfer stopped")?;
            let camera = position("Camera closed")?;
            let pool = position("Released 8 frame buffer(s)")?;
            if transfer < camera && camera < pool {
                Ok(())
            } else {
                Err(format!("teardown order {transfer}, {camera}, {pool}"))
            }
        });
    }

    #[test]
    #[traced_test]
    fn rejected_features_are_logged() {
        let driver = SimulatedDriver::new().with_resolution(8, 8);
        driver.reject_feature("BlackLevel");
        let config = SessionConfig {
            camera: crate::CameraSettings {
                black_level: Some(12.0),
                ..Default::default()
            },
            ..Default::default()
        };
        let mut session = AcquisitionSession::new(driver.clone(), config);
        session.enumerate();
        session.start(0).unwrap();

        assert!(logs_contain("Failed to write feature 'BlackLevel'"));
    }

    #[test]
    fn buffer_size_covers_the_payload() {
        let format = ImageFormat {
            width: 10,
            height: 10,
            pixel_format: gev_sys::PFNC_MONO8,
            depth: 1,
            payload_size: 120,
        };
        assert_eq!(format.buffer_size(), 120);

        let format = ImageFormat {
            payload_size: 0,
            ..format
        };
        assert_eq!(format.buffer_size(), 100);
    }

    #[test]
    fn wider_pixel_formats_use_more_bytes() {
        let driver = SimulatedDriver::new()
            .with_resolution(8, 2)
            .with_pixel_format(gev_sys::PFNC_MONO16);
        driver.reject_feature("PixelFormat");
        let session = streaming_session(&driver);

        let format = session.format().unwrap();
        assert_eq!(format.depth, 2);
        assert_eq!(format.buffer_size(), 32);
        assert_eq!(session.frame_size(), Some(16));
    }

    #[test]
    #[traced_test]
    fn narrowed_formats_are_logged() {
        let driver = SimulatedDriver::new()
            .with_resolution(4, 1)
            .with_pixel_format(gev_sys::PFNC_MONO12);
        driver.reject_feature("PixelFormat");
        let _session = streaming_session(&driver);

        assert!(logs_contain("narrowing to 8 bits (shift 4)"));
    }
}
