//! Frame acquisition sources.
//!
//! This module provides the camera side of the pipeline:
//! - Synthetic source (`stub://`) for demos and tests
//! - Image-directory replay (`dir://<path>` or a plain local path)
//! - HTTP MJPEG/JPEG cameras (feature: ingest-http)
//!
//! Sources only produce frames. The acquisition thread (`acquire`) owns a
//! source and publishes each frame into the `LatestFrameSlot` the monitor
//! reads from.

pub mod acquire;
pub mod directory;
#[cfg(feature = "ingest-http")]
pub mod http;
pub mod synthetic;

use std::time::Duration;

use anyhow::{anyhow, Result};

use crate::config::SourceSettings;
use crate::frame::Frame;

pub use acquire::{spawn_acquisition, AcquisitionSettings, AcquisitionStats, Acquisition};
pub use directory::DirectorySource;
#[cfg(feature = "ingest-http")]
pub use http::HttpSource;
pub use synthetic::SyntheticSource;

/// Counters reported by every source.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub source: String,
}

/// A camera or camera-like producer of RGB frames.
pub trait CaptureSource: Send {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// Open the underlying device, file set or stream.
    fn connect(&mut self) -> Result<()>;

    /// Produce the next frame. `Ok(None)` means the source is exhausted.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    fn is_healthy(&self) -> bool;

    fn stats(&self) -> SourceStats;

    /// Live sources deliver frames at their own rate and decimate internally;
    /// the acquisition loop only paces non-live sources.
    fn is_live(&self) -> bool {
        false
    }
}

/// Build the source named by `settings.url`.
pub fn open_source(settings: &SourceSettings) -> Result<Box<dyn CaptureSource>> {
    let url = settings.url.trim();
    if url.starts_with("stub://") {
        return Ok(Box::new(SyntheticSource::new(
            url,
            settings.width,
            settings.height,
        )?));
    }
    if let Some(path) = url.strip_prefix("dir://") {
        return Ok(Box::new(DirectorySource::new(path)));
    }
    if url.starts_with("http://") || url.starts_with("https://") {
        #[cfg(feature = "ingest-http")]
        {
            return Ok(Box::new(HttpSource::new(url, settings.target_fps)?));
        }
        #[cfg(not(feature = "ingest-http"))]
        {
            return Err(anyhow!("HTTP cameras require the ingest-http feature"));
        }
    }
    if url.contains("://") {
        return Err(anyhow!(
            "unsupported source url '{}'; expected stub://, dir://, http(s):// or a local path",
            url
        ));
    }
    Ok(Box::new(DirectorySource::new(url)))
}

pub(crate) fn frame_interval(target_fps: u32) -> Duration {
    if target_fps == 0 {
        Duration::from_millis(0)
    } else {
        Duration::from_millis((1000 / target_fps).max(1) as u64)
    }
}

#[cfg_attr(not(feature = "ingest-http"), allow(dead_code))]
pub(crate) fn health_grace(target_fps: u32) -> Duration {
    let base_ms = if target_fps == 0 {
        2_000
    } else {
        (1000 / target_fps).saturating_mul(6)
    };
    Duration::from_millis(base_ms.max(2_000) as u64)
}
