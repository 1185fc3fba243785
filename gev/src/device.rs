// SPDX-FileCopyrightText: 2025 Contributors to the gst-gev project.
// SPDX-License-Identifier: Apache-2.0

//! Device directory: discovery of GigE Vision cameras.
//!
//! Cameras are addressed by their ordinal in the most recent enumeration.
//! The ordinal is only meaningful until the next enumeration.

use std::{fmt, net::Ipv4Addr};

use serde::Serialize;

use crate::driver::GevDriver;

/// Host network interfaces scanned during discovery.
pub const MAX_NETIF: usize = 8;
/// Cameras considered per host interface.
pub const MAX_CAMERAS_PER_NETIF: usize = 32;
/// Upper bound on the size of one enumeration.
pub const MAX_CAMERAS: usize = MAX_NETIF * MAX_CAMERAS_PER_NETIF;

/// Host interface a camera was discovered on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HostInterface {
    pub ipv6: bool,
    pub ip_addr: u32,
    pub ip_addr_low: u32,
    pub ip_addr_high: u32,
    pub if_index: u32,
}

/// Identity of one discovered camera.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CameraDescriptor {
    /// Ordinal in the enumeration that produced this descriptor.
    pub index: usize,
    pub ipv6: bool,
    pub ip_addr: u32,
    pub ip_addr_low: u32,
    pub ip_addr_high: u32,
    pub mac_high: u32,
    pub mac_low: u32,
    pub host: HostInterface,
    pub mode: u32,
    pub capabilities: u32,
    pub manufacturer: String,
    pub model: String,
    pub serial: String,
    pub version: String,
    pub user_name: String,
}

impl CameraDescriptor {
    /// IPv4 address of the camera.
    pub fn ip(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.ip_addr)
    }

    pub fn mac(&self) -> [u8; 6] {
        let high = self.mac_high.to_be_bytes();
        let low = self.mac_low.to_be_bytes();
        [high[2], high[3], low[0], low[1], low[2], low[3]]
    }

    /// MAC address as colon-separated hex.
    pub fn mac_string(&self) -> String {
        self.mac()
            .iter()
            .map(|byte| format!("{byte:02x}"))
            .collect::<Vec<_>>()
            .join(":")
    }

    /// Per-camera base name built from the low 24 bits of the MAC address.
    pub fn unique_name(&self) -> String {
        format!("img_{:06x}", self.mac_low & 0x00ff_ffff)
    }
}

impl fmt::Display for CameraDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {} {} (serial {}, {} / {})",
            self.index,
            self.manufacturer,
            self.model,
            self.serial,
            self.ip(),
            self.mac_string()
        )
    }
}

/// Discovers reachable cameras.
///
/// The result holds at most [`MAX_CAMERAS`] entries with `index` set to the
/// ordinal. No cameras is not an error; a failing discovery is logged and
/// also yields an empty list.
pub fn enumerate<D: GevDriver>(driver: &D) -> Vec<CameraDescriptor> {
    let mut cameras = match driver.enumerate_devices(MAX_CAMERAS) {
        Ok(cameras) => cameras,
        Err(status) => {
            tracing::warn!("Camera discovery failed: {status}");
            Vec::new()
        }
    };

    cameras.truncate(MAX_CAMERAS);
    for (index, camera) in cameras.iter_mut().enumerate() {
        camera.index = index;
    }

    tracing::info!("Discovered {} camera(s)", cameras.len());
    for camera in &cameras {
        tracing::debug!("  {camera}");
    }
    cameras
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> CameraDescriptor {
        CameraDescriptor {
            ip_addr: u32::from(Ipv4Addr::new(192, 168, 1, 20)),
            mac_high: 0x0000_0001,
            mac_low: 0x0d12_3456,
            ..Default::default()
        }
    }

    #[test]
    fn mac_and_ip_formatting() {
        let camera = descriptor();
        assert_eq!(camera.ip(), Ipv4Addr::new(192, 168, 1, 20));
        assert_eq!(camera.mac_string(), "00:01:0d:12:34:56");
        assert_eq!(camera.unique_name(), "img_123456");
    }

    #[test]
    fn bounds() {
        assert_eq!(MAX_CAMERAS, 256);
    }
}
