//! Capture device contract
//!
//! The camera owns a small pool of frame buffers. A buffer handed out by
//! [`CaptureDevice::acquire_frame`] stays checked out until it is given back
//! through [`CaptureDevice::release_frame`]; losing one starves the pool.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptureError {
    #[error("all {capacity} frame buffers are in use")]
    PoolExhausted { capacity: usize },
    #[error("sensor returned no frame: {0}")]
    NoFrame(String),
    #[error("capture device is not initialized")]
    NotInitialized,
}

/// One still frame checked out of the capture device's pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameBuffer {
    /// Pool slot the buffer came from.
    pub slot: usize,
    pub width: u32,
    pub height: u32,
    /// Encoded payload, normally JPEG. Never inspected by the session.
    pub data: Vec<u8>,
}

impl FrameBuffer {
    pub fn new(slot: usize, width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            slot,
            width,
            height,
            data,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

/// Counters a device can report about its buffer pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub acquired: u64,
    pub released: u64,
    pub failed: u64,
}

impl PoolStats {
    /// Buffers currently checked out.
    pub fn outstanding(&self) -> u64 {
        self.acquired.saturating_sub(self.released)
    }
}

pub trait CaptureDevice {
    fn acquire_frame(&mut self) -> Result<FrameBuffer, CaptureError>;

    fn release_frame(&mut self, frame: FrameBuffer);
}

impl<T: CaptureDevice + ?Sized> CaptureDevice for Box<T> {
    fn acquire_frame(&mut self) -> Result<FrameBuffer, CaptureError> {
        (**self).acquire_frame()
    }

    fn release_frame(&mut self, frame: FrameBuffer) {
        (**self).release_frame(frame)
    }
}
