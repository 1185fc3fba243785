// SPDX-FileCopyrightText: 2025 Contributors to the gst-gev project.
// SPDX-License-Identifier: Apache-2.0

//! Frame buffer pool.
//!
//! A fixed set of equally sized, zero-initialized buffers that the driver
//! fills asynchronously. Each buffer is a separate heap allocation, so its
//! address never moves while the pool is alive, and the pool never grows or
//! shrinks once allocated.
//!
//! The driver writes into the buffers from its own thread while a transfer
//! is active, so the pool never hands out references into them. Bytes move
//! in and out through [`BufferPool::copy_out`] and [`BufferPool::copy_in`],
//! which copy through raw pointers.

use std::{
    alloc::{self, Layout},
    ptr::{self, NonNull},
};

use crate::{Error, Result};

/// One heap block shared with the driver.
struct RawBuffer {
    ptr: NonNull<u8>,
    layout: Layout,
}

impl RawBuffer {
    /// Zeroed block of `size` bytes. `None` if the allocator refuses it.
    fn zeroed(size: usize) -> Option<Self> {
        if size == 0 {
            return None;
        }
        let layout = Layout::array::<u8>(size).ok()?;
        // SAFETY: `layout` has a non-zero size.
        let ptr = NonNull::new(unsafe { alloc::alloc_zeroed(layout) })?;
        Some(Self { ptr, layout })
    }
}

impl Drop for RawBuffer {
    fn drop(&mut self) {
        // SAFETY: `ptr` was returned by `alloc_zeroed` with this `layout`.
        unsafe { alloc::dealloc(self.ptr.as_ptr(), self.layout) };
    }
}

/// Buffers registered with the driver for one streaming run.
pub struct BufferPool {
    buffers: Vec<RawBuffer>,
    buffer_size: usize,
}

// SAFETY: the pool exclusively owns its allocations; every access goes
// through `&self`/`&mut self` methods that copy with raw pointers.
unsafe impl Send for BufferPool {}

impl BufferPool {
    /// Allocates `count` zeroed buffers of `buffer_size` bytes each.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BufferAllocationFailed`] if `count` or `buffer_size`
    /// is zero, or if the allocator refuses any of the buffers. Buffers that
    /// were already obtained are released before returning.
    pub fn allocate(buffer_size: usize, count: usize) -> Result<Self> {
        let failed = || Error::BufferAllocationFailed {
            size: buffer_size as u64,
            count,
        };

        if buffer_size == 0 || count == 0 {
            return Err(failed());
        }

        let mut buffers = Vec::new();
        buffers.try_reserve_exact(count).map_err(|_| failed())?;
        for _ in 0..count {
            buffers.push(RawBuffer::zeroed(buffer_size).ok_or_else(failed)?);
        }

        tracing::debug!("Allocated {count} frame buffer(s) of {buffer_size} bytes");
        Ok(Self {
            buffers,
            buffer_size,
        })
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Start addresses of every buffer, in pool order.
    ///
    /// The pointers stay valid until the pool is dropped.
    pub fn addresses(&mut self) -> Vec<*mut u8> {
        self.buffers
            .iter()
            .map(|buffer| buffer.ptr.as_ptr())
            .collect()
    }

    /// Index of the buffer starting at `address`.
    pub fn index_of(&self, address: *const u8) -> Option<usize> {
        self.buffers
            .iter()
            .position(|buffer| ptr::eq(buffer.ptr.as_ptr(), address))
    }

    /// Number of bytes a copy of `len` bytes at `offset` can move.
    fn span(&self, offset: usize, len: usize) -> usize {
        self.buffer_size.saturating_sub(offset).min(len)
    }

    /// Copies bytes starting at `offset` of buffer `index` into `dst`.
    ///
    /// Returns the number of bytes copied, which is short when the buffer
    /// ends first, or `None` for an unknown buffer.
    pub fn copy_out(&self, index: usize, offset: usize, dst: &mut [u8]) -> Option<usize> {
        let buffer = self.buffers.get(index)?;
        let len = self.span(offset, dst.len());
        if len > 0 {
            // SAFETY: `offset + len <= buffer_size`, and `dst` is a distinct
            // Rust allocation. The driver leaves a delivered buffer alone
            // until the next wait on its handle.
            unsafe {
                ptr::copy_nonoverlapping(buffer.ptr.as_ptr().add(offset), dst.as_mut_ptr(), len);
            }
        }
        Some(len)
    }

    /// Copies `src` into buffer `index` starting at `offset`.
    ///
    /// Returns the number of bytes copied, or `None` for an unknown buffer.
    pub fn copy_in(&mut self, index: usize, offset: usize, src: &[u8]) -> Option<usize> {
        let buffer = self.buffers.get(index)?;
        let len = self.span(offset, src.len());
        if len > 0 {
            // SAFETY: `offset + len <= buffer_size`, and `src` cannot alias a
            // pool allocation since none is ever exposed as a slice.
            unsafe {
                ptr::copy_nonoverlapping(src.as_ptr(), buffer.ptr.as_ptr().add(offset), len);
            }
        }
        Some(len)
    }
}

impl Drop for BufferPool {
    fn drop(&mut self) {
        tracing::debug!("Released {} frame buffer(s)", self.buffers.len());
    }
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("buffer_size", &self.buffer_size)
            .field("count", &self.buffers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffers_are_zeroed_and_distinct() {
        let mut pool = BufferPool::allocate(64, 4).unwrap();
        assert_eq!(pool.len(), 4);
        assert_eq!(pool.buffer_size(), 64);
        for i in 0..4 {
            let mut bytes = [0xffu8; 64];
            assert_eq!(pool.copy_out(i, 0, &mut bytes), Some(64));
            assert!(bytes.iter().all(|b| *b == 0));
        }

        let addresses = pool.addresses();
        for (i, address) in addresses.iter().enumerate() {
            assert_eq!(pool.index_of(*address), Some(i));
        }
        assert_eq!(pool.index_of(std::ptr::null()), None);
    }

    #[test]
    fn copies_stop_at_the_buffer_end() {
        let mut pool = BufferPool::allocate(8, 2).unwrap();
        let before = pool.addresses();

        assert_eq!(pool.copy_in(1, 6, &[1, 2, 3, 4]), Some(2));
        let mut tail = [0u8; 4];
        assert_eq!(pool.copy_out(1, 5, &mut tail), Some(3));
        assert_eq!(tail, [0, 1, 2, 0]);

        assert_eq!(pool.copy_out(1, 8, &mut tail), Some(0));
        assert_eq!(pool.copy_out(2, 0, &mut tail), None);
        assert_eq!(before, pool.addresses());
    }

    #[test]
    fn impossible_sizes_fail_cleanly() {
        let err = BufferPool::allocate(usize::MAX, 2).unwrap_err();
        assert!(matches!(
            err,
            Error::BufferAllocationFailed { count: 2, .. }
        ));

        assert!(BufferPool::allocate(0, 2).is_err());
        assert!(BufferPool::allocate(16, 0).is_err());
    }
}
