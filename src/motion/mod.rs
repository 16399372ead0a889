//! Central-ROI motion detection.
//!
//! Each cycle the current frame is downsampled to the processing resolution,
//! converted to intensity, and differenced against the previous cycle inside
//! a centred square ROI. The difference is blurred, thresholded, and the
//! changed pixels counted. `CooldownGate` turns counts into debounced triggers.

mod cooldown;
mod detector;
pub mod imgproc;
mod roi;

pub use cooldown::CooldownGate;
pub use detector::{DetectorSettings, MotionDetector, MotionSample};
pub use roi::Roi;
