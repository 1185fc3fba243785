// SPDX-FileCopyrightText: 2025 Contributors to the gst-gev project.
// SPDX-License-Identifier: Apache-2.0

//! # gev-sys: Raw FFI surface of the GigE-V framework
//!
//! This crate declares the subset of the Teledyne DALSA GigE-V C API
//! (`libGevApi.so`) used by the `gev` crate: plain `#[repr(C)]` types,
//! status and frame-status constants, and a [`GevApi`] function table that is
//! resolved at runtime with `libloading`.
//!
//! ## Usage
//!
//! **Most users should NOT use this crate directly.** Use the safe `gev`
//! wrapper crate instead, which provides:
//! - RAII ownership of camera handles and transfers
//! - Rust-idiomatic error handling with `Result`
//! - A driver trait that can be swapped for a simulated camera
//!
//! ## Runtime loading
//!
//! The vendor SDK is not needed at build time. [`GevApi::new`] opens the
//! shared library and resolves every symbol eagerly, so a missing or
//! incompatible SDK is reported once, at load time.
//!
//! ## Safety
//!
//! All functions in this crate are `unsafe` and require the caller to uphold
//! the SDK's invariants:
//! - `api_initialize` must be called before any other call
//! - Camera handles are only valid between `open_camera` and `close_camera`
//! - Buffers handed to `initialize_transfer` must outlive the transfer
//!   (until `free_transfer` returns)
//! - Image objects returned by `wait_for_next_image` are only valid until the
//!   next wait on the same handle

#![allow(non_snake_case)]
#![allow(clippy::missing_safety_doc)]

use std::ffi::{OsStr, c_char, c_int, c_void};

pub use libloading::Error as LibLoadingError;

/// Status code returned by most SDK calls (`GEV_STATUS`).
pub type GevStatusCode = i16;

/// Opaque camera handle (`GEV_CAMERA_HANDLE`).
pub type GevCameraHandle = *mut c_void;

pub const GEVLIB_OK: GevStatusCode = 0;
pub const GEVLIB_ERROR_GENERIC: GevStatusCode = -1;
pub const GEVLIB_ERROR_NULL_PTR: GevStatusCode = -2;
pub const GEVLIB_ERROR_ARG_INVALID: GevStatusCode = -3;
pub const GEVLIB_ERROR_INVALID_HANDLE: GevStatusCode = -4;
pub const GEVLIB_ERROR_NOT_SUPPORTED: GevStatusCode = -5;
pub const GEVLIB_ERROR_TIME_OUT: GevStatusCode = -6;
pub const GEVLIB_ERROR_NOT_IMPLEMENTED: GevStatusCode = -10;
pub const GEVLIB_ERROR_NO_CAMERA: GevStatusCode = -11;
pub const GEVLIB_ERROR_INVALID_PIXEL_FORMAT: GevStatusCode = -12;
pub const GEVLIB_ERROR_PARAMETER_INVALID: GevStatusCode = -13;
pub const GEVLIB_ERROR_SOFTWARE: GevStatusCode = -14;
pub const GEVLIB_ERROR_API_NOT_INITIALIZED: GevStatusCode = -15;
pub const GEVLIB_ERROR_DEVICE_NOT_FOUND: GevStatusCode = -16;
pub const GEVLIB_ERROR_ACCESS_DENIED: GevStatusCode = -17;
pub const GEVLIB_ERROR_NOT_AVAILABLE: GevStatusCode = -18;
pub const GEVLIB_ERROR_NO_SPACE: GevStatusCode = -19;
pub const GEVLIB_ERROR_XFER_NOT_INITIALIZED: GevStatusCode = -20;
pub const GEVLIB_ERROR_XFER_ACTIVE: GevStatusCode = -21;
pub const GEVLIB_ERROR_XFER_NOT_ACTIVE: GevStatusCode = -22;
pub const GEVLIB_ERROR_SYSTEM_RESOURCE: GevStatusCode = -23;
pub const GEVLIB_ERROR_INSUFFICIENT_MEMORY: GevStatusCode = -24;

/// Per-image transfer status (`GEV_BUFFER_OBJECT::status`).
pub const GEV_FRAME_STATUS_RECVD: i32 = 0;
pub const GEV_FRAME_STATUS_PENDING: i32 = 1;
pub const GEV_FRAME_STATUS_TIMEOUT: i32 = 2;
pub const GEV_FRAME_STATUS_OVERFLOW: i32 = 3;
pub const GEV_FRAME_STATUS_BANDWIDTH: i32 = 4;
pub const GEV_FRAME_STATUS_LOST: i32 = 5;
pub const GEV_FRAME_STATUS_RELEASED: i32 = -1;

/// Camera access modes for `GevOpenCamera`.
pub const GEV_MONITOR_MODE: c_int = 0;
pub const GEV_CONTROL_MODE: c_int = 2;
pub const GEV_EXCLUSIVE_MODE: c_int = 4;

/// Buffer cycling modes for `GevInitializeTransfer`.
pub const GEV_ASYNCHRONOUS: c_int = 0;
pub const GEV_SYNCHRONOUS_NEXT_EMPTY: c_int = 1;

/// Library log levels (`GEVLIB_CONFIG_OPTIONS::logLevel`).
pub const GEV_LOG_LEVEL_OFF: u32 = 0;
pub const GEV_LOG_LEVEL_NORMAL: u32 = 1;
pub const GEV_LOG_LEVEL_WARNINGS: u32 = 2;
pub const GEV_LOG_LEVEL_DEBUG: u32 = 3;
pub const GEV_LOG_LEVEL_TRACE: u32 = 4;

/// Feature value types reported by `GevGetFeatureValue`.
pub const GEV_FEATURE_TYPE_INT: c_int = 2;
pub const GEV_FEATURE_TYPE_BOOL: c_int = 3;
pub const GEV_FEATURE_TYPE_FLOAT: c_int = 5;
pub const GEV_FEATURE_TYPE_ENUM: c_int = 9;

/// GenICam PFNC codes of the monochrome formats.
pub const PFNC_MONO8: u32 = 0x0108_0001;
pub const PFNC_MONO10: u32 = 0x0110_0003;
pub const PFNC_MONO12: u32 = 0x0110_0005;
pub const PFNC_MONO14: u32 = 0x0110_0025;
pub const PFNC_MONO16: u32 = 0x0110_0007;

/// `numFrames` argument of `GevStartTransfer` for continuous acquisition.
pub const GEV_CONTINUOUS_TRANSFER: u32 = u32::MAX;

/// Length of the identification strings in [`GevCameraInfo`].
pub const GEV_INFO_STRLEN: usize = 65;

/// Host network interface a camera was discovered on (`GEV_NETWORK_INTERFACE`).
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct GevNetworkInterface {
    pub fIPv6: i32,
    pub ipAddr: u32,
    pub ipAddrLow: u32,
    pub ipAddrHigh: u32,
    pub ifIndex: u32,
}

/// One discovered device (`GEV_CAMERA_INFO` / `GEV_DEVICE_INTERFACE`).
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct GevCameraInfo {
    pub fIPv6: i32,
    pub ipAddr: u32,
    pub ipAddrLow: u32,
    pub ipAddrHigh: u32,
    pub macLow: u32,
    pub macHigh: u32,
    pub host: GevNetworkInterface,
    pub mode: u32,
    pub capabilities: u32,
    pub manufacturer: [c_char; GEV_INFO_STRLEN],
    pub model: [c_char; GEV_INFO_STRLEN],
    pub serial: [c_char; GEV_INFO_STRLEN],
    pub version: [c_char; GEV_INFO_STRLEN],
    pub username: [c_char; GEV_INFO_STRLEN],
}

impl Default for GevCameraInfo {
    fn default() -> Self {
        Self {
            fIPv6: 0,
            ipAddr: 0,
            ipAddrLow: 0,
            ipAddrHigh: 0,
            macLow: 0,
            macHigh: 0,
            host: GevNetworkInterface::default(),
            mode: 0,
            capabilities: 0,
            manufacturer: [0; GEV_INFO_STRLEN],
            model: [0; GEV_INFO_STRLEN],
            serial: [0; GEV_INFO_STRLEN],
            version: [0; GEV_INFO_STRLEN],
            username: [0; GEV_INFO_STRLEN],
        }
    }
}

/// Image descriptor returned by `GevWaitForNextImage` (`GEV_BUFFER_OBJECT`).
///
/// Only the leading fields are declared; the trailing file-name field is
/// never read through this type.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct GevBufferObject {
    pub payload_type: u32,
    pub state: u32,
    pub status: i32,
    pub timestamp_hi: u32,
    pub timestamp_lo: u32,
    pub timestamp: u64,
    pub recv_size: u64,
    pub id: u64,
    pub h: u32,
    pub w: u32,
    pub x_offset: u32,
    pub y_offset: u32,
    pub x_padding: u32,
    pub y_padding: u32,
    pub d: u32,
    pub format: u32,
    pub address: *mut u8,
    pub chunk_data: *mut u8,
    pub chunk_size: u32,
}

impl Default for GevBufferObject {
    fn default() -> Self {
        Self {
            payload_type: 0,
            state: 0,
            status: GEV_FRAME_STATUS_RECVD,
            timestamp_hi: 0,
            timestamp_lo: 0,
            timestamp: 0,
            recv_size: 0,
            id: 0,
            h: 0,
            w: 0,
            x_offset: 0,
            y_offset: 0,
            x_padding: 0,
            y_padding: 0,
            d: 0,
            format: 0,
            address: std::ptr::null_mut(),
            chunk_data: std::ptr::null_mut(),
            chunk_size: 0,
        }
    }
}

/// Library-wide options (`GEVLIB_CONFIG_OPTIONS`).
///
/// `_reserved` gives the SDK room to write fields added in later revisions.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct GevLibConfigOptions {
    pub version: u32,
    pub logLevel: u32,
    pub numRetries: u32,
    pub command_timeout_ms: u32,
    pub discovery_timeout_ms: u32,
    pub enumeration_port: u32,
    pub gvcp_port_range_start: u32,
    pub gvcp_port_range_end: u32,
    pub manual_socket_buffer_size: u32,
    pub _reserved: [u32; 16],
}

/// Per-camera interface options (`GEV_CAMERA_OPTIONS`).
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct GevCameraOptions {
    pub numRetries: u32,
    pub command_timeout_ms: u32,
    pub heartbeat_timeout_ms: u32,
    pub streamPktSize: u32,
    pub streamPktDelay: u32,
    pub streamNumFramesBuffered: u32,
    pub streamMemoryLimitMax: u32,
    pub streamMaxPacketResends: u32,
    pub streamFrame_timeout_ms: u32,
    pub streamThreadAffinity: i32,
    pub serverThreadAffinity: i32,
    pub msgChannel_timeout_ms: u32,
    pub enable_passthru_mode: u32,
    pub overflow_mode: u32,
    pub _reserved: [u32; 16],
}

type FnVoid = unsafe extern "C" fn() -> GevStatusCode;
type FnLibOptions = unsafe extern "C" fn(*mut GevLibConfigOptions) -> GevStatusCode;
type FnCameraList = unsafe extern "C" fn(*mut GevCameraInfo, c_int, *mut c_int) -> GevStatusCode;
type FnOpenCamera =
    unsafe extern "C" fn(*mut GevCameraInfo, c_int, *mut GevCameraHandle) -> GevStatusCode;
type FnCloseCamera = unsafe extern "C" fn(*mut GevCameraHandle) -> GevStatusCode;
type FnCameraOptions =
    unsafe extern "C" fn(GevCameraHandle, *mut GevCameraOptions) -> GevStatusCode;
type FnGetFeature =
    unsafe extern "C" fn(GevCameraHandle, *const c_char, *mut c_int, c_int, *mut c_void) -> c_int;
type FnSetFeature =
    unsafe extern "C" fn(GevCameraHandle, *const c_char, c_int, *mut c_void) -> c_int;
type FnPayload = unsafe extern "C" fn(GevCameraHandle, *mut u64, *mut u32) -> GevStatusCode;
type FnInitTransfer =
    unsafe extern "C" fn(GevCameraHandle, c_int, u64, u32, *mut *mut u8) -> GevStatusCode;
type FnStartTransfer = unsafe extern "C" fn(GevCameraHandle, u32) -> GevStatusCode;
type FnHandle = unsafe extern "C" fn(GevCameraHandle) -> GevStatusCode;
type FnWaitImage =
    unsafe extern "C" fn(GevCameraHandle, *mut *mut GevBufferObject, u32) -> GevStatusCode;

/// Function table of the dynamically loaded GigE-V library.
///
/// The `libloading::Library` is kept alive for as long as the table exists,
/// which keeps every resolved function pointer valid.
pub struct GevApi {
    _library: libloading::Library,
    api_initialize: FnVoid,
    api_uninitialize: FnVoid,
    get_library_config_options: FnLibOptions,
    set_library_config_options: FnLibOptions,
    get_camera_list: FnCameraList,
    open_camera: FnOpenCamera,
    close_camera: FnCloseCamera,
    get_camera_interface_options: FnCameraOptions,
    set_camera_interface_options: FnCameraOptions,
    get_feature_value: FnGetFeature,
    set_feature_value: FnSetFeature,
    get_payload_parameters: FnPayload,
    initialize_transfer: FnInitTransfer,
    start_transfer: FnStartTransfer,
    stop_transfer: FnHandle,
    free_transfer: FnHandle,
    wait_for_next_image: FnWaitImage,
}

impl GevApi {
    /// Opens the shared library at `path` and resolves every symbol.
    pub unsafe fn new<P: AsRef<OsStr>>(path: P) -> Result<Self, libloading::Error> {
        let library = unsafe { libloading::Library::new(path)? };
        unsafe { Self::from_library(library) }
    }

    /// Resolves every symbol from an already opened library.
    pub unsafe fn from_library<L>(library: L) -> Result<Self, libloading::Error>
    where
        L: Into<libloading::Library>,
    {
        let library = library.into();
        unsafe {
            Ok(Self {
                api_initialize: *library.get::<FnVoid>(b"GevApiInitialize\0")?,
                api_uninitialize: *library.get::<FnVoid>(b"GevApiUninitialize\0")?,
                get_library_config_options: *library.get::<FnLibOptions>(b"GevGetLibraryConfigOptions\0")?,
                set_library_config_options: *library.get::<FnLibOptions>(b"GevSetLibraryConfigOptions\0")?,
                get_camera_list: *library.get::<FnCameraList>(b"GevGetCameraList\0")?,
                open_camera: *library.get::<FnOpenCamera>(b"GevOpenCamera\0")?,
                close_camera: *library.get::<FnCloseCamera>(b"GevCloseCamera\0")?,
                get_camera_interface_options: *library.get::<FnCameraOptions>(b"GevGetCameraInterfaceOptions\0")?,
                set_camera_interface_options: *library.get::<FnCameraOptions>(b"GevSetCameraInterfaceOptions\0")?,
                get_feature_value: *library.get::<FnGetFeature>(b"GevGetFeatureValue\0")?,
                set_feature_value: *library.get::<FnSetFeature>(b"GevSetFeatureValue\0")?,
                get_payload_parameters: *library.get::<FnPayload>(b"GevGetPayloadParameters\0")?,
                initialize_transfer: *library.get::<FnInitTransfer>(b"GevInitializeTransfer\0")?,
                start_transfer: *library.get::<FnStartTransfer>(b"GevStartTransfer\0")?,
                stop_transfer: *library.get::<FnHandle>(b"GevStopTransfer\0")?,
                free_transfer: *library.get::<FnHandle>(b"GevFreeTransfer\0")?,
                wait_for_next_image: *library.get::<FnWaitImage>(b"GevWaitForNextImage\0")?,
                _library: library,
            })
        }
    }

    pub unsafe fn api_initialize(&self) -> GevStatusCode {
        unsafe { (self.api_initialize)() }
    }

    pub unsafe fn api_uninitialize(&self) -> GevStatusCode {
        unsafe { (self.api_uninitialize)() }
    }

    pub unsafe fn get_library_config_options(
        &self,
        options: *mut GevLibConfigOptions,
    ) -> GevStatusCode {
        unsafe { (self.get_library_config_options)(options) }
    }

    pub unsafe fn set_library_config_options(
        &self,
        options: *mut GevLibConfigOptions,
    ) -> GevStatusCode {
        unsafe { (self.set_library_config_options)(options) }
    }

    pub unsafe fn get_camera_list(
        &self,
        cameras: *mut GevCameraInfo,
        max_cameras: c_int,
        num_cameras: *mut c_int,
    ) -> GevStatusCode {
        unsafe { (self.get_camera_list)(cameras, max_cameras, num_cameras) }
    }

    pub unsafe fn open_camera(
        &self,
        device: *mut GevCameraInfo,
        mode: c_int,
        handle: *mut GevCameraHandle,
    ) -> GevStatusCode {
        unsafe { (self.open_camera)(device, mode, handle) }
    }

    pub unsafe fn close_camera(&self, handle: *mut GevCameraHandle) -> GevStatusCode {
        unsafe { (self.close_camera)(handle) }
    }

    pub unsafe fn get_camera_interface_options(
        &self,
        handle: GevCameraHandle,
        options: *mut GevCameraOptions,
    ) -> GevStatusCode {
        unsafe { (self.get_camera_interface_options)(handle, options) }
    }

    pub unsafe fn set_camera_interface_options(
        &self,
        handle: GevCameraHandle,
        options: *mut GevCameraOptions,
    ) -> GevStatusCode {
        unsafe { (self.set_camera_interface_options)(handle, options) }
    }

    pub unsafe fn get_feature_value(
        &self,
        handle: GevCameraHandle,
        feature_name: *const c_char,
        feature_type: *mut c_int,
        value_size: c_int,
        value: *mut c_void,
    ) -> c_int {
        unsafe { (self.get_feature_value)(handle, feature_name, feature_type, value_size, value) }
    }

    pub unsafe fn set_feature_value(
        &self,
        handle: GevCameraHandle,
        feature_name: *const c_char,
        value_size: c_int,
        value: *mut c_void,
    ) -> c_int {
        unsafe { (self.set_feature_value)(handle, feature_name, value_size, value) }
    }

    pub unsafe fn get_payload_parameters(
        &self,
        handle: GevCameraHandle,
        payload_size: *mut u64,
        data_format: *mut u32,
    ) -> GevStatusCode {
        unsafe { (self.get_payload_parameters)(handle, payload_size, data_format) }
    }

    pub unsafe fn initialize_transfer(
        &self,
        handle: GevCameraHandle,
        mode: c_int,
        buffer_size: u64,
        num_buffers: u32,
        buffers: *mut *mut u8,
    ) -> GevStatusCode {
        unsafe { (self.initialize_transfer)(handle, mode, buffer_size, num_buffers, buffers) }
    }

    pub unsafe fn start_transfer(&self, handle: GevCameraHandle, num_frames: u32) -> GevStatusCode {
        unsafe { (self.start_transfer)(handle, num_frames) }
    }

    pub unsafe fn stop_transfer(&self, handle: GevCameraHandle) -> GevStatusCode {
        unsafe { (self.stop_transfer)(handle) }
    }

    pub unsafe fn free_transfer(&self, handle: GevCameraHandle) -> GevStatusCode {
        unsafe { (self.free_transfer)(handle) }
    }

    pub unsafe fn wait_for_next_image(
        &self,
        handle: GevCameraHandle,
        image: *mut *mut GevBufferObject,
        timeout_ms: u32,
    ) -> GevStatusCode {
        unsafe { (self.wait_for_next_image)(handle, image, timeout_ms) }
    }
}

/// Bits per pixel encoded in a GenICam PFNC pixel-format code (bits 16..24).
pub fn pfnc_bits_per_pixel(format: u32) -> u32 {
    (format >> 16) & 0xff
}

/// Significant bits of an unpacked, little-endian monochrome format.
///
/// Returns `None` for packed, color and unknown formats.
pub fn pfnc_mono_significant_bits(format: u32) -> Option<u32> {
    match format {
        PFNC_MONO8 => Some(8),
        PFNC_MONO10 => Some(10),
        PFNC_MONO12 => Some(12),
        PFNC_MONO14 => Some(14),
        PFNC_MONO16 => Some(16),
        _ => None,
    }
}
