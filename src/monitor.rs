//! Motion monitor: the trigger → settle → capture → classify loop.
//!
//! ```text
//! WAIT_FIRST_FRAME ──first frame──▶ IDLE ──motion & cooldown open──▶ SETTLING
//!                                    ▲                                  │
//!                                    └──────── CAPTURED ◀──settle delay─┘
//! ```
//!
//! One `step` is one cycle. Classification runs synchronously inside the
//! cycle, so a slow model delays the next frame comparison; the cooldown
//! window is measured from the trigger instant regardless.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Local};

use crate::classify::{ClassificationOutcome, Classifier, FailureCause};
use crate::clock::{Clock, StopSignal};
use crate::config::MotionSettings;
use crate::frame::{Frame, FrameSource};
use crate::motion::{CooldownGate, DetectorSettings, MotionDetector, MotionSample};
use crate::report::ResultSink;
use crate::snapshot::SnapshotWriter;

/// Timing and sensitivity of the trigger loop.
#[derive(Clone, Copy, Debug)]
pub struct MonitorSettings {
    pub detector: DetectorSettings,
    /// A trigger needs strictly more changed pixels than this.
    pub pixel_threshold: u32,
    pub cooldown: Duration,
    pub settle_delay: Duration,
    pub poll_interval: Duration,
}

impl MonitorSettings {
    pub fn from_motion(motion: &MotionSettings) -> Result<Self> {
        Ok(Self {
            detector: motion.detector_settings()?,
            pixel_threshold: motion.pixel_threshold,
            cooldown: motion.cooldown,
            settle_delay: motion.settle_delay,
            poll_interval: motion.poll_interval,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MonitorState {
    WaitFirstFrame,
    Idle,
    Settling,
    Captured,
}

/// Everything known about one accepted trigger.
#[derive(Clone, Debug)]
pub struct TriggerReport {
    /// 1-based trigger counter for this monitor.
    pub sequence: u64,
    pub change_pixels: u32,
    pub triggered_at: DateTime<Local>,
    /// Path of the written snapshot, if the capture succeeded.
    pub snapshot: Option<PathBuf>,
    pub outcome: ClassificationOutcome,
    pub settle: Duration,
    pub classification: Duration,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MonitorStats {
    pub cycles: u64,
    /// Cycles where the frame source had nothing to offer.
    pub frame_gaps: u64,
    pub triggers: u64,
    /// Threshold exceeded while the cooldown window was still closed.
    pub suppressed: u64,
    /// Triggers dropped because stop was requested while settling.
    pub abandoned: u64,
    pub snapshots: u64,
    pub classified: u64,
    pub unavailable: u64,
}

pub struct MotionMonitor<S: FrameSource, C: Clock> {
    source: S,
    clock: C,
    stop: StopSignal,
    settings: MonitorSettings,
    detector: MotionDetector,
    gate: CooldownGate,
    snapshots: SnapshotWriter,
    classifier: Classifier,
    sinks: Vec<Box<dyn ResultSink>>,
    state: MonitorState,
    stats: MonitorStats,
}

impl<S: FrameSource, C: Clock> MotionMonitor<S, C> {
    pub fn new(
        source: S,
        clock: C,
        stop: StopSignal,
        settings: MonitorSettings,
        snapshots: SnapshotWriter,
        classifier: Classifier,
    ) -> Self {
        Self {
            source,
            clock,
            stop,
            detector: MotionDetector::new(settings.detector),
            gate: CooldownGate::new(settings.cooldown),
            settings,
            snapshots,
            classifier,
            sinks: Vec::new(),
            state: MonitorState::WaitFirstFrame,
            stats: MonitorStats::default(),
        }
    }

    /// Add a sink that receives every `TriggerReport`.
    pub fn with_sink(mut self, sink: Box<dyn ResultSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn add_sink(&mut self, sink: Box<dyn ResultSink>) {
        self.sinks.push(sink);
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    pub fn stats(&self) -> &MonitorStats {
        &self.stats
    }

    pub fn settings(&self) -> &MonitorSettings {
        &self.settings
    }

    /// Loop until the stop signal is raised. Returns the accumulated stats.
    pub fn run(&mut self) -> MonitorStats {
        log::info!(
            "monitor started (roi {:?}, pixel threshold {}, cooldown {:?}, settle {:?}, classifier {})",
            self.settings.detector.roi,
            self.settings.pixel_threshold,
            self.settings.cooldown,
            self.settings.settle_delay,
            self.classifier.model_name()
        );
        while !self.stop.is_stopped() {
            self.step();
            if !self.clock.sleep(self.settings.poll_interval, &self.stop) {
                break;
            }
        }
        log::info!(
            "monitor stopped after {} cycles: {} triggers, {} classified, {} unavailable",
            self.stats.cycles,
            self.stats.triggers,
            self.stats.classified,
            self.stats.unavailable
        );
        self.stats.clone()
    }

    /// Run one monitoring cycle. Returns the report if the cycle triggered a
    /// capture. Does not include the trailing poll sleep.
    pub fn step(&mut self) -> Option<TriggerReport> {
        self.stats.cycles += 1;
        let Some(frame) = self.source.latest_frame() else {
            self.stats.frame_gaps += 1;
            return None;
        };

        let change_pixels = match self.detector.observe(&frame) {
            MotionSample::FirstFrame => {
                log::debug!("first frame {}x{} stored", frame.width(), frame.height());
                self.state = MonitorState::Idle;
                return None;
            }
            MotionSample::Compared { change_pixels } => change_pixels,
        };
        drop(frame);

        if change_pixels <= self.settings.pixel_threshold {
            return None;
        }
        let now = self.clock.now();
        if !self.gate.try_fire(now) {
            self.stats.suppressed += 1;
            log::debug!("motion ({} px) suppressed by cooldown", change_pixels);
            return None;
        }

        self.stats.triggers += 1;
        let sequence = self.stats.triggers;
        let triggered_at = Local::now();
        log::debug!("trigger #{}: {} changed pixels", sequence, change_pixels);

        self.state = MonitorState::Settling;
        if !self.clock.sleep(self.settings.settle_delay, &self.stop) {
            self.stats.abandoned += 1;
            self.state = MonitorState::Idle;
            log::info!("trigger #{} abandoned: stop requested while settling", sequence);
            return None;
        }
        let settle = self.clock.now().saturating_duration_since(now);
        let settled = self.source.latest_frame();

        self.state = MonitorState::Captured;
        let started = self.clock.now();
        let (snapshot, outcome) = self.capture(settled);
        let classification = self.clock.now().saturating_duration_since(started);

        match &outcome {
            ClassificationOutcome::Classified(_) => self.stats.classified += 1,
            ClassificationOutcome::Unavailable(_) => self.stats.unavailable += 1,
        }

        let report = TriggerReport {
            sequence,
            change_pixels,
            triggered_at,
            snapshot,
            outcome,
            settle,
            classification,
        };
        self.dispatch(&report);
        self.state = MonitorState::Idle;
        Some(report)
    }

    fn capture(&mut self, settled: Option<Frame>) -> (Option<PathBuf>, ClassificationOutcome) {
        let Some(frame) = settled else {
            log::warn!("no frame available after settle delay");
            return (
                None,
                ClassificationOutcome::unavailable(
                    FailureCause::Capture,
                    "no frame available after settle delay",
                ),
            );
        };
        let path = match self.snapshots.write(&frame) {
            Ok(path) => path,
            Err(e) => {
                log::warn!("snapshot write failed: {:#}", e);
                return (
                    None,
                    ClassificationOutcome::unavailable(FailureCause::Capture, format!("{:#}", e)),
                );
            }
        };
        self.stats.snapshots += 1;
        let outcome = self.classifier.classify(&path);
        (Some(path), outcome)
    }

    fn dispatch(&mut self, report: &TriggerReport) {
        for sink in self.sinks.iter_mut() {
            if let Err(e) = sink.record(report) {
                log::warn!("{} sink failed to record trigger #{}: {:#}", sink.name(), report.sequence, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::ColorHeuristicBackend;
    use crate::clock::ManualClock;
    use crate::frame::LatestFrameSlot;
    use crate::motion::Roi;
    use std::sync::Arc;

    fn settings() -> MonitorSettings {
        MonitorSettings {
            detector: DetectorSettings {
                process_width: 64,
                process_height: 48,
                roi: Roi::centered(64, 48, 32).unwrap(),
                diff_threshold: 25,
            },
            pixel_threshold: 100,
            cooldown: Duration::from_secs(2),
            settle_delay: Duration::from_millis(500),
            poll_interval: Duration::from_millis(10),
        }
    }

    fn monitor(
        slot: LatestFrameSlot,
        clock: ManualClock,
        dir: &std::path::Path,
    ) -> MotionMonitor<LatestFrameSlot, ManualClock> {
        MotionMonitor::new(
            slot,
            clock,
            StopSignal::new(),
            settings(),
            SnapshotWriter::new(dir).unwrap(),
            Classifier::new(Arc::new(ColorHeuristicBackend::new())),
        )
    }

    #[test]
    fn empty_slot_counts_gaps_and_stays_waiting() {
        let dir = tempfile::tempdir().unwrap();
        let mut monitor = monitor(LatestFrameSlot::new(), ManualClock::new(), dir.path());
        assert!(monitor.step().is_none());
        assert!(monitor.step().is_none());
        assert_eq!(monitor.stats().frame_gaps, 2);
        assert_eq!(monitor.state(), MonitorState::WaitFirstFrame);
    }

    #[test]
    fn first_frame_moves_to_idle() {
        let dir = tempfile::tempdir().unwrap();
        let slot = LatestFrameSlot::new();
        slot.publish(Frame::solid(64, 48, [255, 255, 255]).unwrap());
        let mut monitor = monitor(slot, ManualClock::new(), dir.path());
        assert!(monitor.step().is_none());
        assert_eq!(monitor.state(), MonitorState::Idle);
    }

    #[test]
    fn trigger_captures_and_classifies_settled_frame() {
        let dir = tempfile::tempdir().unwrap();
        let slot = LatestFrameSlot::new();
        let clock = ManualClock::new();
        let mut monitor = monitor(slot.clone(), clock.clone(), dir.path());

        slot.publish(Frame::solid(64, 48, [0, 0, 0]).unwrap());
        monitor.step();
        slot.publish(Frame::solid(64, 48, [245, 245, 240]).unwrap());
        let report = monitor.step().expect("trigger");

        assert_eq!(report.sequence, 1);
        assert_eq!(report.change_pixels, 32 * 32);
        assert_eq!(report.settle, Duration::from_millis(500));
        assert!(report.snapshot.as_ref().unwrap().exists());
        assert!(report.outcome.is_classified());
        assert_eq!(monitor.state(), MonitorState::Idle);
        assert_eq!(monitor.stats().snapshots, 1);
    }

    #[test]
    fn missing_settled_frame_is_capture_failure() {
        let dir = tempfile::tempdir().unwrap();
        let slot = LatestFrameSlot::new();
        let mut monitor = monitor(slot.clone(), ManualClock::new(), dir.path());
        assert!(matches!(
            monitor.capture(None).1,
            ClassificationOutcome::Unavailable(ref u) if u.cause == FailureCause::Capture
        ));
    }

    #[test]
    fn snapshot_failure_is_capture_failure_and_loop_continues() {
        let dir = tempfile::tempdir().unwrap();
        let snaps = dir.path().join("snaps");
        let slot = LatestFrameSlot::new();
        let mut monitor = monitor(slot.clone(), ManualClock::new(), &snaps);
        std::fs::remove_dir_all(&snaps).unwrap();

        slot.publish(Frame::solid(64, 48, [0, 0, 0]).unwrap());
        monitor.step();
        slot.publish(Frame::solid(64, 48, [255, 255, 255]).unwrap());
        let report = monitor.step().expect("trigger");

        assert!(report.snapshot.is_none());
        match report.outcome {
            ClassificationOutcome::Unavailable(u) => assert_eq!(u.cause, FailureCause::Capture),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(monitor.stats().unavailable, 1);
        assert_eq!(monitor.state(), MonitorState::Idle);
    }

    #[test]
    fn stop_during_settle_abandons_capture() {
        let dir = tempfile::tempdir().unwrap();
        let slot = LatestFrameSlot::new();
        let stop = StopSignal::new();
        let mut monitor = MotionMonitor::new(
            slot.clone(),
            ManualClock::new(),
            stop.clone(),
            settings(),
            SnapshotWriter::new(dir.path()).unwrap(),
            Classifier::new(Arc::new(ColorHeuristicBackend::new())),
        );

        slot.publish(Frame::solid(64, 48, [0, 0, 0]).unwrap());
        monitor.step();
        slot.publish(Frame::solid(64, 48, [255, 255, 255]).unwrap());
        stop.stop();
        assert!(monitor.step().is_none());
        assert_eq!(monitor.stats().triggers, 1);
        assert_eq!(monitor.stats().abandoned, 1);
        assert_eq!(monitor.stats().snapshots, 0);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
