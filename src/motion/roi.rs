use anyhow::{anyhow, Result};

/// Centred square window inside the processing frame.
///
/// Bounds follow `x1 = cx - side/2`, `x2 = cx + side/2` with integer division,
/// so an odd `side` yields a window one pixel narrower than requested.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Roi {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl Roi {
    /// Compute the centred ROI. Fails when the window does not fit the frame.
    pub fn centered(frame_width: u32, frame_height: u32, side: u32) -> Result<Self> {
        if frame_width == 0 || frame_height == 0 {
            return Err(anyhow!(
                "processing resolution must be non-zero ({}x{})",
                frame_width,
                frame_height
            ));
        }
        let half = side / 2;
        if half == 0 {
            return Err(anyhow!("roi_size must be at least 2 (got {})", side));
        }
        let cx = frame_width / 2;
        let cy = frame_height / 2;
        if side > frame_width
            || side > frame_height
            || half > cx
            || half > cy
            || cx + half > frame_width
            || cy + half > frame_height
        {
            return Err(anyhow!(
                "roi_size {} does not fit the {}x{} processing frame",
                side,
                frame_width,
                frame_height
            ));
        }
        Ok(Self {
            x1: cx - half,
            y1: cy - half,
            x2: cx + half,
            y2: cy + half,
        })
    }

    pub fn width(&self) -> u32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> u32 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> usize {
        (self.width() as usize) * (self.height() as usize)
    }
}
