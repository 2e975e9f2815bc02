//! Fixed-capacity pixel-buffer pool.
//!
//! The preprocessor writes every prepared input into a buffer borrowed from
//! here, so steady-state operation allocates nothing per frame. Capacity is
//! fixed at construction; exhaustion is a predictable, recoverable condition
//! governed by [`ExhaustionPolicy`]. The default is fail-fast so a slow
//! consumer can never stall the capture pipeline.

use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};

use crate::error::ConversionError;
use crate::frame::PixelFormat;

/// What `acquire` does when every buffer is checked out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExhaustionPolicy {
    /// Return `ConversionError::PoolExhausted` immediately.
    FailFast,
    /// Wait up to the given duration for a buffer to come back, then fail.
    BoundedWait(Duration),
}

/// A reusable destination buffer keyed by (format, width, height).
#[derive(Debug)]
pub struct PixelBuffer {
    format: PixelFormat,
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl PixelBuffer {
    fn new(format: PixelFormat, width: u32, height: u32) -> Self {
        let len = width as usize * height as usize * format.bytes_per_pixel();
        Self {
            format,
            width,
            height,
            data: vec![0u8; len],
        }
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

/// Bounded pool of identically shaped buffers. The free list is a bounded
/// channel pre-filled to capacity; acquire is a receive, release is a send.
pub struct PixelBufferPool {
    capacity: usize,
    policy: ExhaustionPolicy,
    free_tx: Sender<PixelBuffer>,
    free_rx: Receiver<PixelBuffer>,
}

impl PixelBufferPool {
    pub fn new(
        format: PixelFormat,
        width: u32,
        height: u32,
        capacity: usize,
        policy: ExhaustionPolicy,
    ) -> Self {
        let (free_tx, free_rx) = bounded(capacity);
        for _ in 0..capacity {
            // The channel was just created with exactly this capacity.
            let _ = free_tx.send(PixelBuffer::new(format, width, height));
        }
        Self {
            capacity,
            policy,
            free_tx,
            free_rx,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Buffers currently available without waiting.
    pub fn available(&self) -> usize {
        self.free_rx.len()
    }

    /// Check a buffer out of the pool. It returns automatically when the
    /// guard is dropped.
    pub fn acquire(&self) -> Result<PooledBuffer, ConversionError> {
        let exhausted = ConversionError::PoolExhausted {
            capacity: self.capacity,
        };
        let buffer = match self.policy {
            ExhaustionPolicy::FailFast => self.free_rx.try_recv().map_err(|_| exhausted)?,
            ExhaustionPolicy::BoundedWait(timeout) => {
                match self.free_rx.recv_timeout(timeout) {
                    Ok(buffer) => buffer,
                    Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                        return Err(exhausted)
                    }
                }
            }
        };
        Ok(PooledBuffer {
            buffer: Some(buffer),
            free_tx: self.free_tx.clone(),
        })
    }
}

/// Exclusive handle to one pool buffer. Dropping it returns the buffer.
pub struct PooledBuffer {
    buffer: Option<PixelBuffer>,
    free_tx: Sender<PixelBuffer>,
}

impl PooledBuffer {
    pub fn get(&self) -> &PixelBuffer {
        self.buffer.as_ref().unwrap()
    }

    pub fn get_mut(&mut self) -> &mut PixelBuffer {
        self.buffer.as_mut().unwrap()
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            // If the pool is gone the buffer is simply freed.
            let _ = self.free_tx.send(buffer);
        }
    }
}

impl std::fmt::Debug for PooledBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledBuffer")
            .field("buffer", &self.buffer)
            .finish()
    }
}
