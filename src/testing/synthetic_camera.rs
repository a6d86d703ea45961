//! Synthetic capture device
//!
//! Hands out gradient frames from a fixed pool of buffers, the way the
//! sensor driver does: once every slot is checked out, acquisition fails
//! until a buffer comes back.

use crate::device::{CaptureDevice, CaptureError, FrameBuffer, PoolStats};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;

/// Default number of frame buffers, matching the sensor driver's double buffering.
pub const DEFAULT_POOL_SIZE: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Payload {
    Jpeg,
    Raw,
}

#[derive(Debug)]
pub struct SyntheticCamera {
    width: u32,
    height: u32,
    payload: Payload,
    in_use: Vec<bool>,
    stats: PoolStats,
    fail_next: usize,
    frame_number: u64,
}

impl SyntheticCamera {
    /// Camera producing JPEG-encoded gradient frames.
    pub fn jpeg(width: u32, height: u32) -> Self {
        Self::with_payload(width, height, Payload::Jpeg)
    }

    /// Camera producing raw RGB24 frames; cheap enough for property tests.
    pub fn raw(width: u32, height: u32) -> Self {
        Self::with_payload(width, height, Payload::Raw)
    }

    fn with_payload(width: u32, height: u32, payload: Payload) -> Self {
        Self {
            width,
            height,
            payload,
            in_use: vec![false; DEFAULT_POOL_SIZE],
            stats: PoolStats::default(),
            fail_next: 0,
            frame_number: 0,
        }
    }

    pub fn with_pool(mut self, buffers: usize) -> Self {
        self.in_use = vec![false; buffers.max(1)];
        self
    }

    /// Fail the next `n` acquisitions as if the sensor returned nothing.
    pub fn fail_next(&mut self, n: usize) {
        self.fail_next = n;
    }

    pub fn stats(&self) -> PoolStats {
        self.stats
    }

    pub fn pool_size(&self) -> usize {
        self.in_use.len()
    }

    fn render(&self) -> Result<Vec<u8>, CaptureError> {
        match self.payload {
            Payload::Raw => Ok(synthetic_rgb(self.frame_number, self.width, self.height)),
            Payload::Jpeg => synthetic_jpeg(self.frame_number, self.width, self.height)
                .map_err(|e| CaptureError::NoFrame(format!("jpeg encode failed: {}", e))),
        }
    }
}

impl CaptureDevice for SyntheticCamera {
    fn acquire_frame(&mut self) -> Result<FrameBuffer, CaptureError> {
        if self.fail_next > 0 {
            self.fail_next -= 1;
            self.stats.failed += 1;
            return Err(CaptureError::NoFrame("injected failure".to_string()));
        }

        let slot = match self.in_use.iter().position(|used| !used) {
            Some(slot) => slot,
            None => {
                self.stats.failed += 1;
                return Err(CaptureError::PoolExhausted {
                    capacity: self.in_use.len(),
                });
            }
        };

        let data = match self.render() {
            Ok(data) => data,
            Err(e) => {
                self.stats.failed += 1;
                return Err(e);
            }
        };
        self.in_use[slot] = true;
        self.stats.acquired += 1;
        self.frame_number += 1;
        Ok(FrameBuffer::new(slot, self.width, self.height, data))
    }

    fn release_frame(&mut self, frame: FrameBuffer) {
        match self.in_use.get_mut(frame.slot) {
            Some(used) if *used => {
                *used = false;
                self.stats.released += 1;
            }
            _ => log::warn!("Released frame buffer {} that was not checked out", frame.slot),
        }
    }
}

/// RGB24 gradient that shifts with every frame.
pub fn synthetic_rgb(frame_number: u64, width: u32, height: u32) -> Vec<u8> {
    let base = (frame_number % 256) as u8;
    let mut data = Vec::with_capacity((width * height * 3) as usize);
    for y in 0..height {
        for x in 0..width {
            data.push(base.wrapping_add((x % 256) as u8));
            data.push(base.wrapping_add((y % 256) as u8));
            data.push(base.wrapping_add(((x + y) % 256) as u8));
        }
    }
    data
}

/// The same gradient, JPEG encoded.
pub fn synthetic_jpeg(frame_number: u64, width: u32, height: u32) -> image::ImageResult<Vec<u8>> {
    let base = (frame_number % 256) as u8;
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            base.wrapping_add((x % 256) as u8),
            base.wrapping_add((y % 256) as u8),
            base.wrapping_add(((x + y) % 256) as u8),
        ])
    });

    let mut out = Vec::new();
    DynamicImage::ImageRgb8(img).write_to(&mut Cursor::new(&mut out), ImageFormat::Jpeg)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_exhaustion_and_release() {
        let mut camera = SyntheticCamera::raw(2, 2).with_pool(2);
        let a = camera.acquire_frame().unwrap();
        let b = camera.acquire_frame().unwrap();
        assert_eq!(
            camera.acquire_frame(),
            Err(CaptureError::PoolExhausted { capacity: 2 })
        );

        camera.release_frame(a);
        let c = camera.acquire_frame().unwrap();
        camera.release_frame(b);
        camera.release_frame(c);

        let stats = camera.stats();
        assert_eq!(stats.acquired, 3);
        assert_eq!(stats.released, 3);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.outstanding(), 0);
    }

    #[test]
    fn test_injected_failures() {
        let mut camera = SyntheticCamera::raw(2, 2);
        camera.fail_next(2);
        assert!(camera.acquire_frame().is_err());
        assert!(camera.acquire_frame().is_err());
        assert!(camera.acquire_frame().is_ok());
    }

    #[test]
    fn test_jpeg_frames_have_markers() {
        let mut camera = SyntheticCamera::jpeg(16, 16);
        let frame = camera.acquire_frame().unwrap();
        assert_eq!(&frame.data[..2], &[0xFF, 0xD8]);
        assert_eq!(&frame.data[frame.len() - 2..], &[0xFF, 0xD9]);
        camera.release_frame(frame);
    }

    #[test]
    fn test_raw_frame_size() {
        assert_eq!(synthetic_rgb(3, 4, 5).len(), 4 * 5 * 3);
    }
}
