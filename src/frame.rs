//! Frame types and the shared latest-frame slot.
//!
//! - `Frame`: RGB24 pixel grid as produced by a capture source.
//! - `GrayFrame`: single-channel frame at processing resolution.
//! - `FrameSource`: "give me the current frame" interface the monitor reads from.
//! - `LatestFrameSlot`: mutex-guarded single-slot buffer with copy-on-read.
//!
//! Critical sections on the slot only move or clone a `Frame`. Image processing
//! and disk I/O always happen on a private copy, never under the lock.

use anyhow::{anyhow, Result};
use image::RgbImage;
use std::sync::{Arc, Mutex};

// ----------------------------------------------------------------------------
// Frame: RGB24 pixel grid
// ----------------------------------------------------------------------------

/// RGB24 frame, row-major, channels interleaved.
///
/// `Clone` is the snapshot copy taken by readers of the latest-frame slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

impl Frame {
    pub const CHANNELS: usize = 3;

    /// Wrap RGB24 bytes. Fails on zero dimensions or a length mismatch.
    pub fn from_rgb(data: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(anyhow!("frame dimensions must be non-zero ({}x{})", width, height));
        }
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(Self::CHANNELS))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if data.len() != expected {
            return Err(anyhow!(
                "RGB frame length mismatch: expected {}, got {}",
                expected,
                data.len()
            ));
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Frame filled with a single colour.
    pub fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Result<Self> {
        let pixels = (width as usize) * (height as usize);
        let data = rgb.iter().copied().cycle().take(pixels * 3).collect();
        Self::from_rgb(data, width, height)
    }

    pub fn from_image(image: RgbImage) -> Result<Self> {
        let (width, height) = image.dimensions();
        Self::from_rgb(image.into_raw(), width, height)
    }

    pub fn to_image(&self) -> Result<RgbImage> {
        RgbImage::from_raw(self.width, self.height, self.data.clone())
            .ok_or_else(|| anyhow!("frame buffer does not match its dimensions"))
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        let idx = ((y as usize) * (self.width as usize) + x as usize) * Self::CHANNELS;
        [self.data[idx], self.data[idx + 1], self.data[idx + 2]]
    }
}

// ----------------------------------------------------------------------------
// GrayFrame: processing-resolution intensity map
// ----------------------------------------------------------------------------

/// Single-channel 8-bit frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GrayFrame {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

impl GrayFrame {
    /// Buffers come from the motion pipeline, whose lengths are correct by construction.
    pub(crate) fn from_parts(data: Vec<u8>, width: u32, height: u32) -> Self {
        debug_assert_eq!(data.len(), (width as usize) * (height as usize));
        Self {
            data,
            width,
            height,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

// ----------------------------------------------------------------------------
// FrameSource + LatestFrameSlot
// ----------------------------------------------------------------------------

/// Supplies the most recent frame on demand.
///
/// Must be cheap enough to call every poll interval. `None` is a normal
/// condition (e.g. camera still starting up).
pub trait FrameSource: Send + Sync {
    fn latest_frame(&self) -> Option<Frame>;
}

/// Single-item, overwrite-on-write frame buffer shared between the
/// acquisition thread and the monitor.
#[derive(Clone, Debug, Default)]
pub struct LatestFrameSlot {
    slot: Arc<Mutex<Option<Frame>>>,
}

impl LatestFrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored frame. The previous frame is dropped outside the lock.
    pub fn publish(&self, frame: Frame) {
        let previous = {
            let mut guard = self.slot.lock().unwrap_or_else(|e| e.into_inner());
            guard.replace(frame)
        };
        drop(previous);
    }

    /// Forget the current frame (e.g. when the camera disconnects).
    pub fn clear(&self) {
        let previous = {
            let mut guard = self.slot.lock().unwrap_or_else(|e| e.into_inner());
            guard.take()
        };
        drop(previous);
    }
}

impl<T: FrameSource + ?Sized> FrameSource for Arc<T> {
    fn latest_frame(&self) -> Option<Frame> {
        (**self).latest_frame()
    }
}

impl FrameSource for LatestFrameSlot {
    fn latest_frame(&self) -> Option<Frame> {
        // A poisoned slot still holds a complete frame: publish only swaps an Option.
        let guard = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        guard.clone()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
