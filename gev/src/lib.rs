// SPDX-FileCopyrightText: 2025 Contributors to the gst-gev project.
// SPDX-License-Identifier: Apache-2.0

//! # GEV - GigE Vision acquisition core
//!
//! Safe, idiomatic Rust acquisition layer over the Teledyne DALSA GigE-V
//! framework, turning a networked monochrome camera into a stream of
//! timestamped 8-bit frames.
//!
//! ## Overview
//!
//! The vendor library is loaded at runtime ([`load_api`]) and wrapped by
//! [`GevLibrary`]. Everything above it talks to the [`GevDriver`] trait, so
//! the same session logic also runs against [`SimulatedDriver`].
//!
//! ### Key Concepts
//!
//! - **Device directory**: the ordered list of cameras found by [`enumerate`];
//!   cameras are addressed by their ordinal in the last enumeration
//! - **Session**: one camera's lifecycle from open to close ([`AcquisitionSession`])
//! - **Buffer pool**: fixed buffers the driver fills asynchronously ([`BufferPool`])
//! - **Pump**: waits for the next image and classifies it ([`wait_next_frame`])
//! - **Delivery**: copies, repacks and stamps a frame ([`FrameDelivery`])
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────┐
//! │ AcquisitionSession<D>│  (Idle → Opening → Configuring → Streaming → Stopping)
//! └──────────┬───────────┘
//!            │
//!            ├─► device::enumerate ──► Vec<CameraDescriptor>
//!            │
//!            ├─► BufferPool ◄── filled by the driver
//!            │
//!            └─► pump ──► FrameOutcome ──► FrameDelivery ──► Delivery<Frame>
//!                                                        └─► Delivery<FrameInfo>
//!
//!   D: GevDriver = GevLibrary (libGevApi.so) | SimulatedDriver
//! ```
//!
//! ## Examples
//!
//! ### Grabbing frames from the first camera
//!
//! ```no_run
//! use gev::{AcquisitionSession, GevLibrary, SessionConfig, config::get_gev_so_path, load_api};
//!
//! # fn main() -> Result<(), gev::Error> {
//! let driver = GevLibrary::new(load_api(get_gev_so_path())?)?;
//! let mut session = AcquisitionSession::new(driver, SessionConfig::default());
//!
//! for camera in session.enumerate() {
//!     println!("{camera}");
//! }
//!
//! let format = session.start(0)?;
//! println!("{}x{}", format.width, format.height);
//!
//! if let Some(delivery) = session.next_frame(Some(10))? {
//!     let frame = delivery.into_frame();
//!     println!("frame {} at {:?}", frame.info.offset, frame.info.timestamp);
//! }
//! session.stop();
//! # Ok(())
//! # }
//! ```
//!
//! ## Timing
//!
//! Frame timestamps are synthetic: the N-th delivered frame of a run (from 0)
//! is stamped `N * 1e9 / framerate` nanoseconds. Device timestamps are carried
//! alongside in [`FrameInfo`] but never used for presentation.
//!
//! ## Thread Safety
//!
//! - [`GevLibrary`] and [`SimulatedDriver`] are `Send + Sync` and cheap to clone
//! - [`AcquisitionSession`] is `Send` and must be driven by one thread at a time

mod api;
mod delivery;
mod device;
mod driver;
mod error;
mod library;
mod pool;
mod pump;
mod session;
mod simulated;

pub mod config;

pub use api::{GevApi, load_api};
pub use config::{CameraSettings, DeliveryMode, SessionConfig};
pub use delivery::{Delivery, Frame, FrameClock, FrameDelivery, FrameInfo, PixelConversion};
pub use device::{
    CameraDescriptor, HostInterface, MAX_CAMERAS, MAX_CAMERAS_PER_NETIF, MAX_NETIF, enumerate,
};
pub use driver::{FeatureValue, GevDriver, RawImage};
pub use error::{Error, FrameStatus, Result, Status};
pub use library::{GevHandle, GevLibrary};
pub use pool::BufferPool;
pub use pump::{FrameCounters, FrameOutcome, wait_next_frame};
pub use session::{AcquisitionSession, ImageFormat, SessionState};
pub use simulated::{SimulatedDriver, SimulatedFrame, SimulatedHandle};
