use crate::frame::{Frame, GrayFrame};

use super::imgproc;
use super::roi::Roi;

/// Geometry and sensitivity of the ROI differencing stage.
#[derive(Clone, Copy, Debug)]
pub struct DetectorSettings {
    pub process_width: u32,
    pub process_height: u32,
    pub roi: Roi,
    /// Per-pixel blurred difference above which a pixel counts as changed.
    pub diff_threshold: u8,
}

/// Result of feeding one frame to the detector.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MotionSample {
    /// No previous gray frame existed; nothing was compared.
    FirstFrame,
    /// Number of changed ROI pixels relative to the previous frame.
    Compared { change_pixels: u32 },
}

impl MotionSample {
    pub fn change_pixels(&self) -> u32 {
        match self {
            MotionSample::FirstFrame => 0,
            MotionSample::Compared { change_pixels } => *change_pixels,
        }
    }
}

/// Frame-differencing motion detector restricted to a central ROI.
///
/// Holds exactly one piece of state: the previous cycle's gray frame.
pub struct MotionDetector {
    settings: DetectorSettings,
    prev_gray: Option<GrayFrame>,
}

impl MotionDetector {
    pub fn new(settings: DetectorSettings) -> Self {
        Self {
            settings,
            prev_gray: None,
        }
    }

    pub fn settings(&self) -> &DetectorSettings {
        &self.settings
    }

    /// Whether a previous frame is available for comparison.
    pub fn is_primed(&self) -> bool {
        self.prev_gray.is_some()
    }

    /// Process one frame and replace `prev_gray` with it.
    pub fn observe(&mut self, frame: &Frame) -> MotionSample {
        let gray = imgproc::to_process_gray(
            frame,
            self.settings.process_width,
            self.settings.process_height,
        );
        let sample = match self.prev_gray.as_ref() {
            None => MotionSample::FirstFrame,
            Some(prev) => MotionSample::Compared {
                change_pixels: self.change_pixels(prev, &gray),
            },
        };
        self.prev_gray = Some(gray);
        sample
    }

    /// Count changed ROI pixels between two processing-resolution frames.
    pub fn change_pixels(&self, prev: &GrayFrame, curr: &GrayFrame) -> u32 {
        let roi = &self.settings.roi;
        let roi_prev = imgproc::crop(prev, roi);
        let roi_curr = imgproc::crop(curr, roi);
        let diff = imgproc::abs_diff(&roi_prev, &roi_curr);
        let mut map =
            imgproc::gaussian_blur_5x5(&diff, roi.width() as usize, roi.height() as usize);
        imgproc::threshold_binary(&mut map, self.settings.diff_threshold);
        imgproc::count_set(&map)
    }

    /// Drop the stored frame so the next observation is treated as the first.
    pub fn reset(&mut self) {
        self.prev_gray = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> DetectorSettings {
        DetectorSettings {
            process_width: 64,
            process_height: 48,
            roi: Roi::centered(64, 48, 32).unwrap(),
            diff_threshold: 25,
        }
    }

    /// 64x48 frame with a bright square of `side` pixels centred in the ROI.
    fn frame_with_square(side: u32, value: u8) -> Frame {
        let (w, h) = (64u32, 48u32);
        let mut data = vec![0u8; (w * h * 3) as usize];
        let x0 = w / 2 - side / 2;
        let y0 = h / 2 - side / 2;
        for y in y0..y0 + side {
            for x in x0..x0 + side {
                let idx = ((y * w + x) * 3) as usize;
                data[idx..idx + 3].copy_from_slice(&[value, value, value]);
            }
        }
        Frame::from_rgb(data, w, h).unwrap()
    }

    #[test]
    fn first_frame_is_never_compared() {
        let mut detector = MotionDetector::new(settings());
        assert!(!detector.is_primed());
        assert_eq!(
            detector.observe(&frame_with_square(32, 255)),
            MotionSample::FirstFrame
        );
        assert!(detector.is_primed());
    }

    #[test]
    fn identical_frames_produce_no_change() {
        let mut detector = MotionDetector::new(settings());
        let frame = frame_with_square(10, 200);
        detector.observe(&frame);
        for _ in 0..20 {
            assert_eq!(
                detector.observe(&frame),
                MotionSample::Compared { change_pixels: 0 }
            );
        }
    }

    #[test]
    fn saturated_roi_counts_every_pixel() {
        let mut detector = MotionDetector::new(settings());
        detector.observe(&frame_with_square(0, 0));
        let sample = detector.observe(&frame_with_square(32, 255));
        assert_eq!(sample.change_pixels(), 32 * 32);
    }

    #[test]
    fn change_grows_with_perturbation_size_until_saturation() {
        let detector = MotionDetector::new(settings());
        let blank = imgproc::to_process_gray(&frame_with_square(0, 0), 64, 48);

        let mut last = 0;
        for side in (4..=32).step_by(4) {
            let gray = imgproc::to_process_gray(&frame_with_square(side, 255), 64, 48);
            let change = detector.change_pixels(&blank, &gray);
            assert!(change > last, "side {} gave {} <= {}", side, change, last);
            last = change;
        }
        assert_eq!(last, 32 * 32);
    }

    #[test]
    fn reset_forgets_previous_frame() {
        let mut detector = MotionDetector::new(settings());
        detector.observe(&frame_with_square(0, 0));
        detector.reset();
        assert_eq!(
            detector.observe(&frame_with_square(32, 255)),
            MotionSample::FirstFrame
        );
    }
}
