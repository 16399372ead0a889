//! Synthetic bin camera (`stub://`).
//!
//! Renders a static, slightly noisy bin floor and periodically "drops" a
//! coloured object into the centre of the view. Each object stays in place
//! until the next drop, so the motion monitor sees one change per drop.

use anyhow::{anyhow, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{CaptureSource, SourceStats};
use crate::frame::Frame;

/// Frames between two drops.
const DROP_PERIOD_FRAMES: u64 = 90;
/// Peak per-channel sensor noise. Well under the motion diff threshold.
const NOISE_AMPLITUDE: i16 = 3;
const FLOOR_RGB: [u8; 3] = [70, 70, 74];

/// Object colours cycled through on each drop: leaf, sheet, bottle, cardboard.
const DROP_COLOURS: [[u8; 3]; 4] = [
    [60, 170, 40],
    [245, 245, 240],
    [20, 60, 230],
    [150, 110, 70],
];

pub struct SyntheticSource {
    url: String,
    width: u32,
    height: u32,
    rng: StdRng,
    frame_count: u64,
    drops: u64,
    connected: bool,
}

impl SyntheticSource {
    pub fn new(url: &str, width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(anyhow!("synthetic source needs a non-zero frame size"));
        }
        Ok(Self {
            url: url.to_string(),
            width,
            height,
            rng: StdRng::seed_from_u64(0x5eed_b1a5),
            frame_count: 0,
            drops: 0,
            connected: false,
        })
    }

    fn render(&mut self) -> Result<Frame> {
        let (w, h) = (self.width as usize, self.height as usize);
        let side = (w.min(h) / 4).max(1);
        let (x0, y0) = ((w - side) / 2, (h - side) / 2);
        let object = if self.drops == 0 {
            None
        } else {
            Some(DROP_COLOURS[((self.drops - 1) % DROP_COLOURS.len() as u64) as usize])
        };

        let mut data = Vec::with_capacity(w * h * 3);
        for y in 0..h {
            for x in 0..w {
                let inside = (x0..x0 + side).contains(&x) && (y0..y0 + side).contains(&y);
                let base = match object {
                    Some(rgb) if inside => rgb,
                    _ => FLOOR_RGB,
                };
                for channel in base {
                    let noise = self.rng.gen_range(-NOISE_AMPLITUDE..=NOISE_AMPLITUDE);
                    data.push((channel as i16 + noise).clamp(0, 255) as u8);
                }
            }
        }
        Frame::from_rgb(data, self.width, self.height)
    }
}

impl CaptureSource for SyntheticSource {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn connect(&mut self) -> Result<()> {
        log::info!("SyntheticSource: connected to {}", self.url);
        self.connected = true;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if !self.connected {
            return Err(anyhow!("synthetic source not connected; call connect() first"));
        }
        self.frame_count += 1;
        if self.frame_count % DROP_PERIOD_FRAMES == 0 {
            self.drops += 1;
            log::debug!("SyntheticSource: drop #{}", self.drops);
        }
        self.render().map(Some)
    }

    fn is_healthy(&self) -> bool {
        self.connected
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.url.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requires_connect() {
        let mut source = SyntheticSource::new("stub://bin", 32, 24).unwrap();
        assert!(source.next_frame().is_err());
        source.connect().unwrap();
        let frame = source.next_frame().unwrap().unwrap();
        assert_eq!((frame.width(), frame.height()), (32, 24));
        assert_eq!(source.stats().frames_captured, 1);
    }

    #[test]
    fn drop_changes_the_centre_only() {
        let mut source = SyntheticSource::new("stub://bin", 40, 40).unwrap();
        source.connect().unwrap();
        let mut before = None;
        let mut after = None;
        for i in 1..=DROP_PERIOD_FRAMES {
            let frame = source.next_frame().unwrap().unwrap();
            if i == DROP_PERIOD_FRAMES - 1 {
                before = Some(frame);
            } else if i == DROP_PERIOD_FRAMES {
                after = Some(frame);
            }
        }
        let (before, after) = (before.unwrap(), after.unwrap());

        let centre_delta = (before.pixel(20, 20)[1] as i16 - after.pixel(20, 20)[1] as i16).abs();
        let corner_delta = (before.pixel(1, 1)[1] as i16 - after.pixel(1, 1)[1] as i16).abs();
        assert!(centre_delta > 50);
        assert!(corner_delta <= 2 * NOISE_AMPLITUDE);
    }

    #[test]
    fn zero_size_is_rejected() {
        assert!(SyntheticSource::new("stub://bin", 0, 10).is_err());
    }
}
