// SPDX-FileCopyrightText: 2025 Contributors to the gst-gev project.
// SPDX-License-Identifier: Apache-2.0

//! Frame delivery: copies a pool image into output storage and stamps it.
//!
//! Output rows are tightly packed (`stride = width * bytes_per_pixel`), so a
//! camera that pads its rows is repacked during the copy. Wider monochrome
//! samples are narrowed to the output depth on the way. Every delivered
//! frame gets a timestamp and duration derived from the nominal framerate and
//! a sequential offset taken from the delivered-frame counter.
//!
//! Once the frame budget is reached the delivery is exhausted: the last frame
//! is flagged [`Delivery::EndOfStream`] and every later attempt fails with
//! [`Error::EndOfStream`].

use std::time::Duration;

use crate::{BufferPool, Error, FrameCounters, Result, driver::RawImage};

/// A delivered frame, flagged when it is the last one of the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery<T> {
    Ready(T),
    /// The frame budget is exhausted; this frame is still valid and the last one.
    EndOfStream(T),
}

impl<T> Delivery<T> {
    pub fn frame(&self) -> &T {
        match self {
            Delivery::Ready(frame) | Delivery::EndOfStream(frame) => frame,
        }
    }

    pub fn into_frame(self) -> T {
        match self {
            Delivery::Ready(frame) | Delivery::EndOfStream(frame) => frame,
        }
    }

    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, Delivery::EndOfStream(_))
    }

    fn map<U>(self, f: impl FnOnce(T) -> U) -> Delivery<U> {
        match self {
            Delivery::Ready(frame) => Delivery::Ready(f(frame)),
            Delivery::EndOfStream(frame) => Delivery::EndOfStream(f(frame)),
        }
    }
}

/// Timing and sequencing of a delivered frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    /// Position in the run, starting at 0.
    pub offset: u64,
    pub offset_end: u64,
    pub timestamp: Duration,
    pub duration: Duration,
    pub width: u32,
    pub height: u32,
    /// Bytes per output row.
    pub stride: usize,
    /// Device block id of the source image.
    pub device_frame_id: u64,
    /// Device timestamp of the source image, in camera ticks.
    pub device_timestamp: u64,
}

/// A frame copied into session-allocated storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub info: FrameInfo,
    pub data: Vec<u8>,
}

/// Synthetic presentation clock driven by the nominal framerate.
///
/// The N-th tick (from 0) returns `N * duration`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameClock {
    duration: Duration,
    next: Duration,
}

impl FrameClock {
    pub fn new(framerate: f64) -> Self {
        let duration = if framerate.is_finite() && framerate > 0.0 {
            Duration::from_nanos((1_000_000_000.0 / framerate) as u64)
        } else {
            Duration::ZERO
        };
        Self {
            duration,
            next: Duration::ZERO,
        }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Timestamp for the next frame, advancing the clock.
    pub fn tick(&mut self) -> Duration {
        let timestamp = self.next;
        self.next += self.duration;
        timestamp
    }
}

/// How camera pixels become output pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelConversion {
    /// Source and output pixels have the same size; bytes are copied.
    Copy { depth: usize },
    /// Little-endian monochrome samples of `depth` bytes, narrowed to one
    /// byte by dropping the `shift` least significant bits.
    Narrow { depth: usize, shift: u32 },
}

impl PixelConversion {
    /// Conversion from `pixel_format` to `bytes_per_pixel` output bytes, or
    /// `None` when the format cannot be represented.
    pub fn select(pixel_format: u32, bytes_per_pixel: u32) -> Option<Self> {
        let depth = gev_sys::pfnc_bits_per_pixel(pixel_format).div_ceil(8);
        if depth == bytes_per_pixel {
            return Some(PixelConversion::Copy {
                depth: depth as usize,
            });
        }
        let bits = gev_sys::pfnc_mono_significant_bits(pixel_format)?;
        (bytes_per_pixel == 1 && depth > 1).then_some(PixelConversion::Narrow {
            depth: depth as usize,
            shift: bits - 8,
        })
    }

    /// Bytes per source pixel.
    pub fn depth(&self) -> usize {
        match *self {
            PixelConversion::Copy { depth } | PixelConversion::Narrow { depth, .. } => depth,
        }
    }

    fn narrow_row(depth: usize, shift: u32, src: &[u8], dst: &mut [u8]) {
        for (sample, out) in src.chunks_exact(depth).zip(dst.iter_mut()) {
            let value = sample
                .iter()
                .take(4)
                .rev()
                .fold(0u32, |acc, byte| acc << 8 | u32::from(*byte));
            *out = (value >> shift).min(0xff) as u8;
        }
    }
}

/// Turns pool images into stamped output frames.
#[derive(Debug, Clone)]
pub struct FrameDelivery {
    clock: FrameClock,
    width: u32,
    height: u32,
    bytes_per_pixel: u32,
    conversion: PixelConversion,
    frame_budget: u64,
    exhausted: bool,
    /// Scratch row for narrowing conversions.
    row: Vec<u8>,
}

impl FrameDelivery {
    pub fn new(
        width: u32,
        height: u32,
        bytes_per_pixel: u32,
        conversion: PixelConversion,
        framerate: f64,
        frame_budget: u64,
    ) -> Self {
        Self {
            clock: FrameClock::new(framerate),
            width,
            height,
            bytes_per_pixel,
            conversion,
            frame_budget,
            exhausted: false,
            row: Vec::new(),
        }
    }

    pub fn stride(&self) -> usize {
        self.width as usize * self.bytes_per_pixel as usize
    }

    /// Bytes of one output frame.
    pub fn frame_size(&self) -> usize {
        self.stride() * self.height as usize
    }

    /// True once the frame carrying [`Delivery::EndOfStream`] was produced.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Copies `image` into a newly allocated frame.
    pub fn produce(
        &mut self,
        image: &RawImage,
        pool: &BufferPool,
        counters: &mut FrameCounters,
    ) -> Result<Delivery<Frame>> {
        if self.exhausted {
            return Err(Error::EndOfStream);
        }
        let mut data = vec![0u8; self.frame_size()];
        let delivery = self.stamp(image, pool, counters, &mut data)?;
        Ok(delivery.map(|info| Frame { info, data }))
    }

    /// Copies `image` into the first `frame_size()` bytes of `dest`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DestinationTooSmall`] before touching any state if
    /// `dest` cannot hold one frame, and [`Error::EndOfStream`] once the
    /// budget is exhausted.
    pub fn produce_into(
        &mut self,
        image: &RawImage,
        pool: &BufferPool,
        counters: &mut FrameCounters,
        dest: &mut [u8],
    ) -> Result<Delivery<FrameInfo>> {
        if self.exhausted {
            return Err(Error::EndOfStream);
        }
        let needed = self.frame_size();
        if dest.len() < needed {
            return Err(Error::DestinationTooSmall {
                needed,
                available: dest.len(),
            });
        }
        self.stamp(image, pool, counters, &mut dest[..needed])
    }

    /// Copies the rows of `image` out of the pool, converting pixels.
    ///
    /// Rows the image does not cover are left untouched in `dest`.
    fn copy_image(&mut self, image: &RawImage, pool: &BufferPool, dest: &mut [u8]) -> Result<()> {
        let index = image
            .buffer
            .filter(|index| *index < pool.len())
            .ok_or_else(|| Error::DriverFatal(format!("frame {} has no buffer", image.id)))?;
        let available = image.len.min(pool.buffer_size());
        let src_row_bytes = self.width as usize * self.conversion.depth();
        let stride = self.stride();
        if stride == 0 || image.pitch == 0 {
            return Ok(());
        }

        for (row, dst_row) in dest.chunks_mut(stride).take(self.height as usize).enumerate() {
            let start = row * image.pitch;
            if start >= available {
                break;
            }
            let len = src_row_bytes.min(available - start);
            match self.conversion {
                PixelConversion::Copy { .. } => {
                    let len = len.min(dst_row.len());
                    pool.copy_out(index, start, &mut dst_row[..len]);
                }
                PixelConversion::Narrow { depth, shift } => {
                    self.row.resize(len, 0);
                    let copied = pool.copy_out(index, start, &mut self.row).unwrap_or(0);
                    PixelConversion::narrow_row(depth, shift, &self.row[..copied], dst_row);
                }
            }
        }
        Ok(())
    }

    fn stamp(
        &mut self,
        image: &RawImage,
        pool: &BufferPool,
        counters: &mut FrameCounters,
        dest: &mut [u8],
    ) -> Result<Delivery<FrameInfo>> {
        self.copy_image(image, pool, dest)?;

        let offset = counters.frames_delivered;
        counters.frames_delivered += 1;
        let info = FrameInfo {
            offset,
            offset_end: counters.frames_delivered,
            timestamp: self.clock.tick(),
            duration: self.clock.duration(),
            width: self.width,
            height: self.height,
            stride: self.stride(),
            device_frame_id: image.id,
            device_timestamp: image.timestamp,
        };

        if self.frame_budget > 0 && counters.frames_delivered >= self.frame_budget {
            self.exhausted = true;
            Ok(Delivery::EndOfStream(info))
        } else {
            Ok(Delivery::Ready(info))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FrameStatus;

    const COPY: PixelConversion = PixelConversion::Copy { depth: 1 };

    fn image(width: u32, height: u32, pitch: usize) -> RawImage {
        RawImage {
            status: FrameStatus::Received,
            buffer: Some(0),
            len: pitch * height as usize,
            width,
            height,
            depth: 1,
            pitch,
            id: 7,
            timestamp: 0,
        }
    }

    fn pool_with(bytes: &[u8]) -> BufferPool {
        let mut pool = BufferPool::allocate(bytes.len(), 1).unwrap();
        pool.copy_in(0, 0, bytes);
        pool
    }

    #[test]
    fn clock_starts_at_zero() {
        let mut clock = FrameClock::new(25.0);
        assert_eq!(clock.duration(), Duration::from_millis(40));
        assert_eq!(clock.tick(), Duration::ZERO);
        assert_eq!(clock.tick(), Duration::from_millis(40));
        assert_eq!(clock.tick(), Duration::from_millis(80));
    }

    #[test]
    fn clock_ignores_nonsense_rates() {
        assert_eq!(FrameClock::new(0.0).duration(), Duration::ZERO);
        assert_eq!(FrameClock::new(f64::NAN).duration(), Duration::ZERO);
    }

    #[test]
    fn padded_rows_are_repacked() {
        let pool = pool_with(&[1, 2, 3, 0xee, 4, 5, 6, 0xee]);
        let mut delivery = FrameDelivery::new(3, 2, 1, COPY, 30.0, 0);
        let mut counters = FrameCounters::default();

        let frame = delivery
            .produce(&image(3, 2, 4), &pool, &mut counters)
            .unwrap()
            .into_frame();
        assert_eq!(frame.data, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn short_images_leave_the_rest_untouched() {
        let pool = pool_with(&[9, 9, 9, 8, 8, 8]);
        let mut delivery = FrameDelivery::new(3, 2, 1, COPY, 30.0, 0);
        let mut counters = FrameCounters::default();
        let mut short = image(3, 2, 3);
        short.len = 3;

        let frame = delivery.produce(&short, &pool, &mut counters).unwrap().into_frame();
        assert_eq!(frame.data, vec![9, 9, 9, 0, 0, 0]);
    }

    #[test]
    fn mono_formats_narrow_to_eight_bits() {
        assert_eq!(
            PixelConversion::select(gev_sys::PFNC_MONO8, 1),
            Some(PixelConversion::Copy { depth: 1 })
        );
        assert_eq!(
            PixelConversion::select(gev_sys::PFNC_MONO12, 1),
            Some(PixelConversion::Narrow { depth: 2, shift: 4 })
        );
        assert_eq!(
            PixelConversion::select(gev_sys::PFNC_MONO16, 2),
            Some(PixelConversion::Copy { depth: 2 })
        );
        // Mono12Packed, RGB8
        assert_eq!(PixelConversion::select(0x010C_0006, 1), None);
        assert_eq!(PixelConversion::select(0x0218_0014, 1), None);

        // Mono12 samples 0x0ff0 and 0x0123, little endian.
        let pool = pool_with(&[0xf0, 0x0f, 0x23, 0x01]);
        let conversion = PixelConversion::select(gev_sys::PFNC_MONO12, 1).unwrap();
        let mut delivery = FrameDelivery::new(2, 1, 1, conversion, 30.0, 0);
        let mut counters = FrameCounters::default();
        let mut wide = image(2, 1, 4);
        wide.depth = 2;

        let frame = delivery.produce(&wide, &pool, &mut counters).unwrap().into_frame();
        assert_eq!(frame.data, vec![0xff, 0x12]);
    }

    #[test]
    fn offsets_follow_the_delivered_count() {
        let pool = pool_with(&[1, 2, 3, 4]);
        let mut delivery = FrameDelivery::new(2, 2, 1, COPY, 30.0, 2);
        let mut counters = FrameCounters::default();

        let first = delivery.produce(&image(2, 2, 2), &pool, &mut counters).unwrap();
        assert!(!first.is_end_of_stream());
        assert_eq!(first.frame().info.offset, 0);
        assert_eq!(first.frame().info.offset_end, 1);
        assert_eq!(first.frame().data, vec![1, 2, 3, 4]);

        let second = delivery.produce(&image(2, 2, 2), &pool, &mut counters).unwrap();
        assert!(second.is_end_of_stream());
        assert_eq!(second.frame().info.offset, 1);
        assert_eq!(counters.frames_delivered, 2);
    }

    #[test]
    fn nothing_is_produced_after_the_last_frame() {
        let pool = pool_with(&[1, 2, 3, 4]);
        let mut delivery = FrameDelivery::new(2, 2, 1, COPY, 30.0, 1);
        let mut counters = FrameCounters::default();

        let last = delivery.produce(&image(2, 2, 2), &pool, &mut counters).unwrap();
        assert!(last.is_end_of_stream());
        assert!(delivery.is_exhausted());

        let err = delivery.produce(&image(2, 2, 2), &pool, &mut counters).unwrap_err();
        assert!(matches!(err, Error::EndOfStream));
        let mut dest = [0u8; 4];
        let err = delivery
            .produce_into(&image(2, 2, 2), &pool, &mut counters, &mut dest)
            .unwrap_err();
        assert!(matches!(err, Error::EndOfStream));
        assert_eq!(counters.frames_delivered, 1);
    }

    #[test]
    fn small_destination_is_rejected_without_side_effects() {
        let pool = BufferPool::allocate(4, 1).unwrap();
        let mut delivery = FrameDelivery::new(2, 2, 1, COPY, 30.0, 0);
        let mut counters = FrameCounters::default();
        let mut dest = [0u8; 3];

        let err = delivery
            .produce_into(&image(2, 2, 2), &pool, &mut counters, &mut dest)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::DestinationTooSmall {
                needed: 4,
                available: 3
            }
        ));
        assert_eq!(counters, FrameCounters::default());
    }
}
