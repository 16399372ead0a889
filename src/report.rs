//! Result sinks.
//!
//! The monitor hands every `TriggerReport` to each registered sink. A sink
//! failure is logged by the monitor and never interrupts the loop.

use anyhow::Result;

use crate::classify::ClassificationOutcome;
use crate::monitor::TriggerReport;

pub trait ResultSink: Send {
    fn name(&self) -> &'static str;

    fn record(&mut self, report: &TriggerReport) -> Result<()>;
}

/// Logs one line per trigger at `info` (or `warn` when unavailable).
#[derive(Clone, Copy, Debug, Default)]
pub struct LogSink;

impl ResultSink for LogSink {
    fn name(&self) -> &'static str {
        "log"
    }

    fn record(&mut self, report: &TriggerReport) -> Result<()> {
        let snapshot = report
            .snapshot
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "-".to_string());
        match &report.outcome {
            ClassificationOutcome::Classified(prediction) => log::info!(
                "drop #{}: {} ({:.2}%) snapshot={} change_pixels={} classify={}ms",
                report.sequence,
                prediction.category,
                prediction.confidence * 100.0,
                snapshot,
                report.change_pixels,
                report.classification.as_millis()
            ),
            ClassificationOutcome::Unavailable(unavailable) => log::warn!(
                "drop #{}: classification unavailable ({}: {}) snapshot={} change_pixels={}",
                report.sequence,
                unavailable.cause,
                unavailable.detail,
                snapshot,
                report.change_pixels
            ),
        }
        Ok(())
    }
}

/// Keeps every report in memory. Handy for embedding and tests.
#[derive(Clone, Debug, Default)]
pub struct MemorySink {
    reports: std::sync::Arc<std::sync::Mutex<Vec<TriggerReport>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of all reports recorded so far.
    pub fn reports(&self) -> Vec<TriggerReport> {
        self.reports
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl ResultSink for MemorySink {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn record(&mut self, report: &TriggerReport) -> Result<()> {
        self.reports
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(report.clone());
        Ok(())
    }
}
