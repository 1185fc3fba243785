// SPDX-FileCopyrightText: 2025 Contributors to the gst-gev project.
// SPDX-License-Identifier: Apache-2.0

//! [`GevDriver`] over the vendor GigE-V library.

use std::{
    ffi::{CString, c_char, c_int, c_void},
    sync::Arc,
    time::Duration,
};

use tracing::{debug, error, warn};

use crate::{
    BufferPool, CameraDescriptor, FrameStatus, HostInterface, Result, Status,
    api::GevApiHandle,
    driver::{FeatureValue, GevDriver, RawImage},
};

/// Heartbeat applied to every opened camera.
const HEARTBEAT_TIMEOUT_MS: u32 = 5000;

/// Initialized library state shared by every clone of [`GevLibrary`].
///
/// The API is uninitialized when the last reference is dropped.
struct LibraryContext {
    api: GevApiHandle,
}

impl Drop for LibraryContext {
    fn drop(&mut self) {
        // SAFETY: the API was initialized in `GevLibrary::new` and every camera
        // handle holds a clone of the context, so none can outlive this call.
        let status = unsafe { self.api.api_uninitialize() };
        if let Err(status) = Status::check(status) {
            error!("Failed to uninitialize GigE-V API: {status}");
        }
    }
}

/// Camera handle returned by the vendor library.
#[derive(Debug, Clone, Copy)]
pub struct GevHandle(gev_sys::GevCameraHandle);

// Safety: GigE-V handles may be used from any thread, one call at a time.
// The acquisition session owns each handle exclusively.
unsafe impl Send for GevHandle {}

/// GigE-V driver backed by the dynamically loaded vendor library.
#[derive(Clone)]
pub struct GevLibrary {
    context: Arc<LibraryContext>,
}

impl GevLibrary {
    /// Initializes the API and sets library logging to normal verbosity.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Driver`] if `GevApiInitialize` fails.
    pub fn new(api: Arc<gev_sys::GevApi>) -> Result<Self> {
        // SAFETY: first call made through the table.
        Status::check(unsafe { api.api_initialize() })?;
        let context = Arc::new(LibraryContext { api });

        let mut options = gev_sys::GevLibConfigOptions::default();
        // SAFETY: `options` is a valid, writable struct for the duration of both calls.
        let status = unsafe {
            match Status::check(context.api.get_library_config_options(&mut options)) {
                Ok(()) => {
                    options.logLevel = gev_sys::GEV_LOG_LEVEL_NORMAL;
                    Status::check(context.api.set_library_config_options(&mut options))
                }
                Err(status) => Err(status),
            }
        };
        if let Err(status) = status {
            warn!("Could not set GigE-V log level: {status}");
        }

        Ok(Self { context })
    }

    fn api(&self) -> &gev_sys::GevApi {
        &self.context.api
    }
}

fn string_from_c_chars(chars: &[c_char]) -> String {
    let bytes: Vec<u8> = chars
        .iter()
        .map(|c| *c as u8)
        .take_while(|b| *b != 0)
        .collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

fn c_chars_from_str(value: &str, chars: &mut [c_char]) {
    let len = value.len().min(chars.len().saturating_sub(1));
    for (dst, src) in chars.iter_mut().zip(value.as_bytes()[..len].iter()) {
        *dst = *src as c_char;
    }
}

fn descriptor_from_info(info: &gev_sys::GevCameraInfo) -> CameraDescriptor {
    CameraDescriptor {
        index: 0,
        ipv6: info.fIPv6 != 0,
        ip_addr: info.ipAddr,
        ip_addr_low: info.ipAddrLow,
        ip_addr_high: info.ipAddrHigh,
        mac_high: info.macHigh,
        mac_low: info.macLow,
        host: HostInterface {
            ipv6: info.host.fIPv6 != 0,
            ip_addr: info.host.ipAddr,
            ip_addr_low: info.host.ipAddrLow,
            ip_addr_high: info.host.ipAddrHigh,
            if_index: info.host.ifIndex,
        },
        mode: info.mode,
        capabilities: info.capabilities,
        manufacturer: string_from_c_chars(&info.manufacturer),
        model: string_from_c_chars(&info.model),
        serial: string_from_c_chars(&info.serial),
        version: string_from_c_chars(&info.version),
        user_name: string_from_c_chars(&info.username),
    }
}

fn info_from_descriptor(device: &CameraDescriptor) -> gev_sys::GevCameraInfo {
    let mut info = gev_sys::GevCameraInfo {
        fIPv6: device.ipv6 as i32,
        ipAddr: device.ip_addr,
        ipAddrLow: device.ip_addr_low,
        ipAddrHigh: device.ip_addr_high,
        macLow: device.mac_low,
        macHigh: device.mac_high,
        host: gev_sys::GevNetworkInterface {
            fIPv6: device.host.ipv6 as i32,
            ipAddr: device.host.ip_addr,
            ipAddrLow: device.host.ip_addr_low,
            ipAddrHigh: device.host.ip_addr_high,
            ifIndex: device.host.if_index,
        },
        mode: device.mode,
        capabilities: device.capabilities,
        ..Default::default()
    };
    c_chars_from_str(&device.manufacturer, &mut info.manufacturer);
    c_chars_from_str(&device.model, &mut info.model);
    c_chars_from_str(&device.serial, &mut info.serial);
    c_chars_from_str(&device.version, &mut info.version);
    c_chars_from_str(&device.user_name, &mut info.username);
    info
}

fn feature_status(code: c_int) -> core::result::Result<(), Status> {
    // Feature accessors report through an `int`; the codes share the GEV_STATUS range.
    Status::check(i16::try_from(code).unwrap_or(gev_sys::GEVLIB_ERROR_GENERIC))
}

impl GevDriver for GevLibrary {
    type Handle = GevHandle;

    fn enumerate_devices(&self, max: usize) -> core::result::Result<Vec<CameraDescriptor>, Status> {
        let mut infos = vec![gev_sys::GevCameraInfo::default(); max];
        let mut found: c_int = 0;
        let max = c_int::try_from(max).unwrap_or(c_int::MAX);
        // SAFETY: `infos` holds `max` writable entries.
        Status::check(unsafe { self.api().get_camera_list(infos.as_mut_ptr(), max, &mut found) })?;

        let found = usize::try_from(found).unwrap_or(0).min(infos.len());
        Ok(infos[..found].iter().map(descriptor_from_info).collect())
    }

    fn open_camera(&self, device: &CameraDescriptor) -> core::result::Result<GevHandle, Status> {
        let mut info = info_from_descriptor(device);
        let mut handle: gev_sys::GevCameraHandle = std::ptr::null_mut();
        // SAFETY: `info` and `handle` are valid for the duration of the call.
        Status::check(unsafe {
            self.api()
                .open_camera(&mut info, gev_sys::GEV_CONTROL_MODE, &mut handle)
        })?;
        if handle.is_null() {
            return Err(Status::NULL_PTR);
        }

        let mut options = gev_sys::GevCameraOptions::default();
        // SAFETY: `handle` was just opened; `options` is writable.
        let status = unsafe {
            match Status::check(self.api().get_camera_interface_options(handle, &mut options)) {
                Ok(()) => {
                    options.heartbeat_timeout_ms = HEARTBEAT_TIMEOUT_MS;
                    Status::check(self.api().set_camera_interface_options(handle, &mut options))
                }
                Err(status) => Err(status),
            }
        };
        if let Err(status) = status {
            warn!("Could not set heartbeat timeout: {status}");
        }

        debug!("Opened camera {device}");
        Ok(GevHandle(handle))
    }

    fn get_feature(&self, handle: GevHandle, name: &str) -> core::result::Result<FeatureValue, Status> {
        let name = CString::new(name).map_err(|_| Status::ARG_INVALID)?;
        let mut feature_type: c_int = 0;
        let mut value: u64 = 0;
        // SAFETY: `value` provides the 8 bytes announced to the library.
        feature_status(unsafe {
            self.api().get_feature_value(
                handle.0,
                name.as_ptr(),
                &mut feature_type,
                size_of::<u64>() as c_int,
                &mut value as *mut u64 as *mut c_void,
            )
        })?;

        Ok(match feature_type {
            gev_sys::GEV_FEATURE_TYPE_FLOAT => FeatureValue::Float(f64::from_bits(value)),
            gev_sys::GEV_FEATURE_TYPE_BOOL => FeatureValue::Bool(value != 0),
            _ => FeatureValue::Int(value as i64),
        })
    }

    fn set_feature(
        &self,
        handle: GevHandle,
        name: &str,
        value: FeatureValue,
    ) -> core::result::Result<(), Status> {
        // The node's current value tells which encoding it expects.
        let current = self.get_feature(handle, name).unwrap_or(value);
        let name = CString::new(name).map_err(|_| Status::ARG_INVALID)?;
        // SAFETY: each arm passes a pointer to a value of the announced size.
        feature_status(unsafe {
            match value.coerce_to(current) {
                FeatureValue::Int(value) => {
                    let mut raw = value;
                    self.api().set_feature_value(
                        handle.0,
                        name.as_ptr(),
                        size_of::<i64>() as c_int,
                        &mut raw as *mut i64 as *mut c_void,
                    )
                }
                FeatureValue::Float(value) => {
                    let mut raw = value;
                    self.api().set_feature_value(
                        handle.0,
                        name.as_ptr(),
                        size_of::<f64>() as c_int,
                        &mut raw as *mut f64 as *mut c_void,
                    )
                }
                FeatureValue::Bool(value) => {
                    let mut raw = c_int::from(value);
                    self.api().set_feature_value(
                        handle.0,
                        name.as_ptr(),
                        size_of::<c_int>() as c_int,
                        &mut raw as *mut c_int as *mut c_void,
                    )
                }
            }
        })
    }

    fn payload_size(&self, handle: GevHandle) -> core::result::Result<u64, Status> {
        let mut size: u64 = 0;
        let mut format: u32 = 0;
        // SAFETY: both out-pointers are valid.
        Status::check(unsafe {
            self.api()
                .get_payload_parameters(handle.0, &mut size, &mut format)
        })?;
        Ok(size)
    }

    fn begin_transfer(
        &self,
        handle: GevHandle,
        pool: &mut BufferPool,
    ) -> core::result::Result<(), Status> {
        let count = u32::try_from(pool.len()).map_err(|_| Status::ARG_INVALID)?;
        let mut addresses = pool.addresses();
        // SAFETY: every address points to `buffer_size` bytes that stay alive
        // until `stop_transfer` has freed the transfer.
        Status::check(unsafe {
            self.api().initialize_transfer(
                handle.0,
                gev_sys::GEV_ASYNCHRONOUS,
                pool.buffer_size() as u64,
                count,
                addresses.as_mut_ptr(),
            )
        })?;

        // SAFETY: the transfer was initialized above.
        let started = Status::check(unsafe {
            self.api()
                .start_transfer(handle.0, gev_sys::GEV_CONTINUOUS_TRANSFER)
        });
        if let Err(status) = started {
            // SAFETY: releases the transfer initialized above.
            unsafe { self.api().free_transfer(handle.0) };
            return Err(status);
        }
        Ok(())
    }

    fn wait_next_image(
        &self,
        handle: GevHandle,
        pool: &mut BufferPool,
        timeout: Duration,
    ) -> core::result::Result<Option<RawImage>, Status> {
        let timeout_ms = u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX);
        let mut image: *mut gev_sys::GevBufferObject = std::ptr::null_mut();
        // SAFETY: `image` is a valid out-pointer.
        Status::check(unsafe { self.api().wait_for_next_image(handle.0, &mut image, timeout_ms) })?;
        if image.is_null() {
            return Ok(None);
        }

        // SAFETY: non-null image objects stay valid until the next wait on this handle.
        let image = unsafe { &*image };
        let pitch = image.w as usize * image.d as usize + image.x_padding as usize;
        Ok(Some(RawImage {
            status: FrameStatus::from_raw(image.status),
            buffer: pool.index_of(image.address),
            len: usize::try_from(image.recv_size)
                .unwrap_or(usize::MAX)
                .min(pool.buffer_size()),
            width: image.w,
            height: image.h,
            depth: image.d,
            pitch,
            id: image.id,
            timestamp: image.timestamp,
        }))
    }

    fn stop_transfer(&self, handle: GevHandle) -> core::result::Result<(), Status> {
        // SAFETY: only called for a handle with an active transfer.
        let stopped = Status::check(unsafe { self.api().stop_transfer(handle.0) });
        let freed = Status::check(unsafe { self.api().free_transfer(handle.0) });
        stopped.and(freed)
    }

    fn close_camera(&self, handle: GevHandle) -> core::result::Result<(), Status> {
        let mut handle = handle.0;
        // SAFETY: the handle is not used again after this call.
        Status::check(unsafe { self.api().close_camera(&mut handle) })
    }
}
