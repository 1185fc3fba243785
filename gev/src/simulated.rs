// SPDX-FileCopyrightText: 2025 Contributors to the gst-gev project.
// SPDX-License-Identifier: Apache-2.0

//! In-memory [`GevDriver`] for tests and camera-less pipelines.
//!
//! The simulated cameras produce an 8-bit diagonal gradient that shifts by
//! one grey level per frame. Failures and frame outcomes can be scripted so
//! every branch of the acquisition session is reachable, and the driver keeps
//! counters of open handles and active transfers for leak checks.
//!
//! Frames are produced as fast as they are asked for until
//! `AcquisitionFrameRate` is written. From then on waits deliver at that rate
//! and time out when the next frame is not due within the wait timeout.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    net::Ipv4Addr,
    sync::{Arc, Mutex, MutexGuard},
    time::{Duration, Instant},
};

use crate::{
    BufferPool, CameraDescriptor, FrameStatus, HostInterface, MAX_CAMERAS_PER_NETIF, Status,
    driver::{FeatureValue, GevDriver, RawImage},
};

/// Scripted outcome of one wait on a simulated camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulatedFrame {
    /// A fully received image.
    Complete,
    /// An image that arrived with the given non-success status.
    Incomplete(FrameStatus),
    /// No image before the timeout.
    Timeout,
    /// The wait returns successfully without an image.
    Missing,
}

/// Handle of an open simulated camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SimulatedHandle(u32);

#[derive(Debug)]
struct Transfer {
    buffer_count: usize,
    next_buffer: usize,
    /// When the next paced frame is ready.
    next_due: Instant,
}

#[derive(Debug)]
struct SimulatedState {
    camera_count: usize,
    width: u32,
    height: u32,
    pixel_format: u32,
    row_padding: u32,
    payload_size: Option<u64>,
    features: HashMap<String, FeatureValue>,
    rejected_features: HashSet<String>,
    open: HashMap<SimulatedHandle, String>,
    next_handle: u32,
    transfers: HashMap<SimulatedHandle, Transfer>,
    script: VecDeque<SimulatedFrame>,
    frame_id: u64,
    fail_open: Option<Status>,
    fail_transfer_start: Option<Status>,
    fail_stop_transfer: Option<Status>,
    fail_close: Option<Status>,
    opened: usize,
    closed: usize,
    transfers_stopped: usize,
}

impl Default for SimulatedState {
    fn default() -> Self {
        Self {
            camera_count: 1,
            width: 640,
            height: 480,
            pixel_format: gev_sys::PFNC_MONO8,
            row_padding: 0,
            payload_size: None,
            features: HashMap::new(),
            rejected_features: HashSet::new(),
            open: HashMap::new(),
            next_handle: 1,
            transfers: HashMap::new(),
            script: VecDeque::new(),
            frame_id: 0,
            fail_open: None,
            fail_transfer_start: None,
            fail_stop_transfer: None,
            fail_close: None,
            opened: 0,
            closed: 0,
            transfers_stopped: 0,
        }
    }
}

impl SimulatedState {
    fn depth(&self) -> u32 {
        gev_sys::pfnc_bits_per_pixel(self.pixel_format).div_ceil(8).max(1)
    }

    fn pitch(&self) -> usize {
        self.width as usize * self.depth() as usize + self.row_padding as usize
    }

    fn payload(&self) -> u64 {
        self.payload_size
            .unwrap_or(self.pitch() as u64 * self.height as u64)
    }

    /// Interval between frames once a framerate was written.
    fn frame_period(&self) -> Option<Duration> {
        match self.features.get("AcquisitionFrameRate")? {
            FeatureValue::Float(rate) if rate.is_finite() && *rate > 0.0 => {
                Some(Duration::from_secs_f64(1.0 / rate))
            }
            _ => None,
        }
    }

    fn descriptor(index: usize) -> CameraDescriptor {
        let netif = index / MAX_CAMERAS_PER_NETIF;
        let host = u32::from(Ipv4Addr::new(192, 168, 1 + netif as u8, 1));
        CameraDescriptor {
            index,
            ip_addr: u32::from(Ipv4Addr::new(
                192,
                168,
                1 + netif as u8,
                10 + (index % MAX_CAMERAS_PER_NETIF) as u8,
            )),
            mac_high: 0x0000_0001,
            mac_low: 0x0d00_0000 | index as u32,
            host: HostInterface {
                ip_addr: host,
                if_index: netif as u32,
                ..Default::default()
            },
            manufacturer: "gst-gev".to_string(),
            model: "Simulated GigE camera".to_string(),
            serial: format!("SIM{index:05}"),
            version: "1.0".to_string(),
            ..Default::default()
        }
    }
}

/// Simulated GigE-V driver.
///
/// Clones share the same cameras, script and counters.
///
/// # Examples
///
/// ```
/// use gev::{AcquisitionSession, SessionConfig, SimulatedDriver};
///
/// # fn main() -> Result<(), gev::Error> {
/// let driver = SimulatedDriver::new().with_resolution(64, 48);
/// let mut session = AcquisitionSession::new(driver, SessionConfig::default());
/// session.enumerate();
/// session.start(0)?;
/// let frame = session.next_frame(Some(3))?.expect("frame");
/// assert_eq!(frame.frame().data.len(), 64 * 48);
/// session.stop();
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct SimulatedDriver {
    state: Arc<Mutex<SimulatedState>>,
}

impl SimulatedDriver {
    /// One 640x480 Mono8 camera.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, SimulatedState> {
        // A panic while holding the lock leaves plain data behind; keep going.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn with_cameras(self, count: usize) -> Self {
        self.state().camera_count = count;
        self
    }

    pub fn with_resolution(self, width: u32, height: u32) -> Self {
        {
            let mut state = self.state();
            state.width = width;
            state.height = height;
        }
        self
    }

    pub fn with_pixel_format(self, pixel_format: u32) -> Self {
        self.state().pixel_format = pixel_format;
        self
    }

    /// Extra bytes at the end of every row.
    pub fn with_row_padding(self, padding: u32) -> Self {
        self.state().row_padding = padding;
        self
    }

    /// Overrides the payload size reported by the camera.
    pub fn with_payload_size(self, bytes: u64) -> Self {
        self.state().payload_size = Some(bytes);
        self
    }

    /// Queues outcomes for upcoming waits. Once drained, waits succeed.
    pub fn push_frames(&self, frames: impl IntoIterator<Item = SimulatedFrame>) {
        self.state().script.extend(frames);
    }

    pub fn fail_open(&self, status: Status) {
        self.state().fail_open = Some(status);
    }

    pub fn fail_transfer_start(&self, status: Status) {
        self.state().fail_transfer_start = Some(status);
    }

    pub fn fail_stop_transfer(&self, status: Status) {
        self.state().fail_stop_transfer = Some(status);
    }

    pub fn fail_close(&self, status: Status) {
        self.state().fail_close = Some(status);
    }

    /// Makes writes to `name` fail with `NOT_SUPPORTED`.
    pub fn reject_feature(&self, name: &str) {
        self.state().rejected_features.insert(name.to_string());
    }

    /// Last value written to `name`.
    pub fn feature(&self, name: &str) -> Option<FeatureValue> {
        self.state().features.get(name).copied()
    }

    pub fn open_handles(&self) -> usize {
        self.state().open.len()
    }

    pub fn active_transfers(&self) -> usize {
        self.state().transfers.len()
    }

    pub fn opened_count(&self) -> usize {
        self.state().opened
    }

    pub fn closed_count(&self) -> usize {
        self.state().closed
    }

    pub fn stopped_transfer_count(&self) -> usize {
        self.state().transfers_stopped
    }

    /// Produces `outcome` for `handle`, writing the gradient into the next
    /// pool buffer for complete frames.
    fn deliver(
        &self,
        mut state: MutexGuard<'_, SimulatedState>,
        handle: SimulatedHandle,
        pool: &mut BufferPool,
        outcome: SimulatedFrame,
    ) -> Result<Option<RawImage>, Status> {
        let id = state.frame_id;
        state.frame_id += 1;

        let width = state.width;
        let height = state.height;
        let depth = state.depth();
        let pitch = state.pitch();
        let mut image = RawImage {
            status: FrameStatus::Received,
            buffer: None,
            len: 0,
            width,
            height,
            depth,
            pitch,
            id,
            timestamp: id * 1_000_000,
        };

        match outcome {
            SimulatedFrame::Timeout => return Err(Status::TIME_OUT),
            SimulatedFrame::Missing => return Ok(None),
            SimulatedFrame::Incomplete(status) => {
                image.status = status;
                return Ok(Some(image));
            }
            SimulatedFrame::Complete => {}
        }

        let Some(transfer) = state.transfers.get_mut(&handle) else {
            return Err(Status::XFER_NOT_ACTIVE);
        };
        let index = transfer.next_buffer;
        transfer.next_buffer = (index + 1) % transfer.buffer_count.max(1);

        if index >= pool.len() {
            return Err(Status::NULL_PTR);
        }
        // Every byte of a pixel carries the same level, so Mono16 narrows
        // back to the 8-bit gradient.
        let row_bytes = width as usize * depth as usize;
        let mut row = vec![0u8; row_bytes];
        for y in 0..height as usize {
            for (x, byte) in row.iter_mut().enumerate() {
                *byte = (x as u64 / depth as u64 + y as u64 + id) as u8;
            }
            pool.copy_in(index, y * pitch, &row);
        }

        image.buffer = Some(index);
        image.len = (pitch * height as usize).min(pool.buffer_size());
        Ok(Some(image))
    }
}

impl GevDriver for SimulatedDriver {
    type Handle = SimulatedHandle;

    fn enumerate_devices(&self, max: usize) -> Result<Vec<CameraDescriptor>, Status> {
        let count = self.state().camera_count.min(max);
        Ok((0..count).map(SimulatedState::descriptor).collect())
    }

    fn open_camera(&self, device: &CameraDescriptor) -> Result<SimulatedHandle, Status> {
        let mut state = self.state();
        if let Some(status) = state.fail_open.take() {
            return Err(status);
        }
        let known = (0..state.camera_count)
            .map(SimulatedState::descriptor)
            .any(|camera| camera.serial == device.serial);
        if !known {
            return Err(Status::DEVICE_NOT_FOUND);
        }
        if state.open.values().any(|serial| *serial == device.serial) {
            return Err(Status::ACCESS_DENIED);
        }

        let handle = SimulatedHandle(state.next_handle);
        state.next_handle += 1;
        state.open.insert(handle, device.serial.clone());
        state.opened += 1;
        Ok(handle)
    }

    fn get_feature(&self, handle: SimulatedHandle, name: &str) -> Result<FeatureValue, Status> {
        let state = self.state();
        if !state.open.contains_key(&handle) {
            return Err(Status::INVALID_HANDLE);
        }
        match name {
            "Width" => Ok(FeatureValue::Int(state.width.into())),
            "Height" => Ok(FeatureValue::Int(state.height.into())),
            "PixelFormat" => Ok(FeatureValue::Int(state.pixel_format.into())),
            "PayloadSize" => Ok(FeatureValue::Int(state.payload() as i64)),
            _ => state
                .features
                .get(name)
                .copied()
                .ok_or(Status::NOT_SUPPORTED),
        }
    }

    fn set_feature(
        &self,
        handle: SimulatedHandle,
        name: &str,
        value: FeatureValue,
    ) -> Result<(), Status> {
        let mut state = self.state();
        if !state.open.contains_key(&handle) {
            return Err(Status::INVALID_HANDLE);
        }
        if state.rejected_features.contains(name) {
            return Err(Status::NOT_SUPPORTED);
        }
        let as_u32 = || value.as_u32().ok_or(Status::ARG_INVALID);
        match name {
            "Width" => state.width = as_u32()?,
            "Height" => state.height = as_u32()?,
            "PixelFormat" => state.pixel_format = as_u32()?,
            _ => {}
        }
        state.features.insert(name.to_string(), value);
        Ok(())
    }

    fn payload_size(&self, handle: SimulatedHandle) -> Result<u64, Status> {
        let state = self.state();
        if !state.open.contains_key(&handle) {
            return Err(Status::INVALID_HANDLE);
        }
        Ok(state.payload())
    }

    fn begin_transfer(&self, handle: SimulatedHandle, pool: &mut BufferPool) -> Result<(), Status> {
        let mut state = self.state();
        if !state.open.contains_key(&handle) {
            return Err(Status::INVALID_HANDLE);
        }
        if let Some(status) = state.fail_transfer_start.take() {
            return Err(status);
        }
        if state.transfers.contains_key(&handle) {
            return Err(Status::XFER_ACTIVE);
        }
        let next_due = Instant::now() + state.frame_period().unwrap_or_default();
        state.transfers.insert(
            handle,
            Transfer {
                buffer_count: pool.len(),
                next_buffer: 0,
                next_due,
            },
        );
        Ok(())
    }

    fn wait_next_image(
        &self,
        handle: SimulatedHandle,
        pool: &mut BufferPool,
        timeout: Duration,
    ) -> Result<Option<RawImage>, Status> {
        let mut state = self.state();
        if !state.transfers.contains_key(&handle) {
            return Err(Status::XFER_NOT_ACTIVE);
        }

        let outcome = match state.script.pop_front() {
            Some(outcome) => outcome,
            None => {
                let Some(period) = state.frame_period() else {
                    return self.deliver(state, handle, pool, SimulatedFrame::Complete);
                };
                let due = state
                    .transfers
                    .get(&handle)
                    .map(|transfer| transfer.next_due)
                    .ok_or(Status::XFER_NOT_ACTIVE)?;
                drop(state);

                let wait = due.saturating_duration_since(Instant::now());
                if wait > timeout {
                    std::thread::sleep(timeout);
                    return Err(Status::TIME_OUT);
                }
                std::thread::sleep(wait);

                state = self.state();
                let transfer = state
                    .transfers
                    .get_mut(&handle)
                    .ok_or(Status::XFER_NOT_ACTIVE)?;
                transfer.next_due += period;
                SimulatedFrame::Complete
            }
        };
        self.deliver(state, handle, pool, outcome)
    }
    fn stop_transfer(&self, handle: SimulatedHandle) -> Result<(), Status> {
        let mut state = self.state();
        if state.transfers.remove(&handle).is_none() {
            return Err(Status::XFER_NOT_ACTIVE);
        }
        state.transfers_stopped += 1;
        match state.fail_stop_transfer.take() {
            Some(status) => Err(status),
            None => Ok(()),
        }
    }

    fn close_camera(&self, handle: SimulatedHandle) -> Result<(), Status> {
        let mut state = self.state();
        if state.open.remove(&handle).is_none() {
            return Err(Status::INVALID_HANDLE);
        }
        state.closed += 1;
        match state.fail_close.take() {
            Some(status) => Err(status),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cameras_open_exclusively() {
        let driver = SimulatedDriver::new().with_cameras(2);
        let cameras = driver.enumerate_devices(8).unwrap();
        assert_eq!(cameras.len(), 2);
        assert_ne!(cameras[0].serial, cameras[1].serial);

        let handle = driver.open_camera(&cameras[0]).unwrap();
        assert_eq!(
            driver.open_camera(&cameras[0]).unwrap_err(),
            Status::ACCESS_DENIED
        );
        driver.close_camera(handle).unwrap();
        assert_eq!(driver.open_handles(), 0);
    }

    #[test]
    fn enumeration_honors_the_limit() {
        let driver = SimulatedDriver::new().with_cameras(40);
        assert_eq!(driver.enumerate_devices(16).unwrap().len(), 16);
    }

    #[test]
    fn gradient_shifts_every_frame() {
        let driver = SimulatedDriver::new().with_resolution(4, 2);
        let camera = &driver.enumerate_devices(1).unwrap()[0];
        let handle = driver.open_camera(camera).unwrap();
        let mut pool = BufferPool::allocate(8, 2).unwrap();
        driver.begin_transfer(handle, &mut pool).unwrap();

        let first = driver
            .wait_next_image(handle, &mut pool, Duration::from_millis(10))
            .unwrap()
            .unwrap();
        assert_eq!(first.buffer, Some(0));
        let mut bytes = [0u8; 8];
        pool.copy_out(0, 0, &mut bytes);
        assert_eq!(bytes, [0, 1, 2, 3, 1, 2, 3, 4]);

        let second = driver
            .wait_next_image(handle, &mut pool, Duration::from_millis(10))
            .unwrap()
            .unwrap();
        assert_eq!(second.buffer, Some(1));
        pool.copy_out(1, 0, &mut bytes);
        assert_eq!(bytes, [1, 2, 3, 4, 2, 3, 4, 5]);

        driver.stop_transfer(handle).unwrap();
        driver.close_camera(handle).unwrap();
    }

    #[test]
    fn written_framerate_paces_the_waits() {
        let driver = SimulatedDriver::new().with_resolution(4, 2);
        let camera = &driver.enumerate_devices(1).unwrap()[0];
        let handle = driver.open_camera(camera).unwrap();
        driver
            .set_feature(handle, "AcquisitionFrameRate", FeatureValue::Float(20.0))
            .unwrap();
        let mut pool = BufferPool::allocate(8, 2).unwrap();
        driver.begin_transfer(handle, &mut pool).unwrap();

        // The first frame is due 50 ms after the transfer started.
        assert_eq!(
            driver
                .wait_next_image(handle, &mut pool, Duration::from_millis(5))
                .unwrap_err(),
            Status::TIME_OUT
        );
        let started = Instant::now();
        let image = driver
            .wait_next_image(handle, &mut pool, Duration::from_secs(1))
            .unwrap()
            .unwrap();
        assert_eq!(image.buffer, Some(0));
        assert!(started.elapsed() < Duration::from_secs(1));

        driver.stop_transfer(handle).unwrap();
        driver.close_camera(handle).unwrap();
    }
}
