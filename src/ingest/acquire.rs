//! Acquisition thread: source → `LatestFrameSlot`.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};

use super::{frame_interval, CaptureSource};
use crate::clock::{Clock, StopSignal, SystemClock};
use crate::frame::LatestFrameSlot;

#[derive(Clone, Copy, Debug)]
pub struct AcquisitionSettings {
    /// Publish rate for non-live sources.
    pub target_fps: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for AcquisitionSettings {
    fn default() -> Self {
        Self {
            target_fps: 15,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(5),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AcquisitionStats {
    pub frames_published: u64,
    pub frame_errors: u64,
    pub connect_failures: u64,
    pub connects: u64,
    /// The source reported end of stream.
    pub exhausted: bool,
}

/// Handle to a running acquisition thread.
pub struct Acquisition {
    handle: JoinHandle<AcquisitionStats>,
}

impl Acquisition {
    /// Wait for the thread to exit. It exits once `stop` is raised or the
    /// source is exhausted.
    pub fn join(self) -> AcquisitionStats {
        match self.handle.join() {
            Ok(stats) => stats,
            Err(_) => {
                log::error!("acquisition thread panicked");
                AcquisitionStats::default()
            }
        }
    }
}

/// Start the acquisition loop on its own thread using the system clock.
pub fn spawn_acquisition(
    mut source: Box<dyn CaptureSource>,
    slot: LatestFrameSlot,
    stop: StopSignal,
    settings: AcquisitionSettings,
) -> Result<Acquisition> {
    let handle = thread::Builder::new()
        .name("acquisition".to_string())
        .spawn(move || run_acquisition(source.as_mut(), &slot, &SystemClock, &stop, settings))
        .context("failed to spawn acquisition thread")?;
    Ok(Acquisition { handle })
}

/// Pull frames until stopped or exhausted.
///
/// Connect and frame errors never end the loop: the slot is cleared, the
/// loop backs off (doubling up to `max_backoff`) and tries again.
pub fn run_acquisition(
    source: &mut dyn CaptureSource,
    slot: &LatestFrameSlot,
    clock: &dyn Clock,
    stop: &StopSignal,
    settings: AcquisitionSettings,
) -> AcquisitionStats {
    let mut stats = AcquisitionStats::default();
    let mut connected = false;
    let mut backoff = settings.initial_backoff;
    let pace = frame_interval(settings.target_fps);

    while !stop.is_stopped() {
        if !connected {
            match source.connect() {
                Ok(()) => {
                    connected = true;
                    stats.connects += 1;
                    backoff = settings.initial_backoff;
                }
                Err(e) => {
                    stats.connect_failures += 1;
                    log::warn!("{} source connect failed: {:#}", source.name(), e);
                    if !clock.sleep(backoff, stop) {
                        break;
                    }
                    backoff = (backoff * 2).min(settings.max_backoff);
                    continue;
                }
            }
        }

        match source.next_frame() {
            Ok(Some(frame)) => {
                slot.publish(frame);
                stats.frames_published += 1;
                backoff = settings.initial_backoff;
                if !source.is_live() && !clock.sleep(pace, stop) {
                    break;
                }
            }
            Ok(None) => {
                log::info!(
                    "{} source exhausted after {} frames",
                    source.name(),
                    stats.frames_published
                );
                stats.exhausted = true;
                break;
            }
            Err(e) => {
                stats.frame_errors += 1;
                log::warn!("{} source frame error: {:#}", source.name(), e);
                if !source.is_healthy() {
                    slot.clear();
                    connected = false;
                }
                if !clock.sleep(backoff, stop) {
                    break;
                }
                backoff = (backoff * 2).min(settings.max_backoff);
            }
        }
    }

    let source_stats = source.stats();
    log::debug!(
        "acquisition from {} finished: {} frames captured, {} published",
        source_stats.source,
        source_stats.frames_captured,
        stats.frames_published
    );
    stats
}
