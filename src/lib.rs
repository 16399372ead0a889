//! bin-sentry
//!
//! Motion-triggered capture and classification for a waste-sorting station.
//! A camera watches the drop zone of a bin. When an object lands in the
//! central region of interest the monitor waits for it to settle, saves a
//! snapshot and classifies it as mixed, organic, paper or plastic.
//!
//! # Pipeline
//!
//! ```text
//! CaptureSource ─▶ acquisition thread ─▶ LatestFrameSlot
//!                                              │
//!                                              ▼
//!         MotionMonitor: ROI difference ─▶ cooldown ─▶ settle ─▶ snapshot
//!                                                                   │
//!                                                                   ▼
//!                                    Classifier ─▶ TriggerReport ─▶ sinks
//! ```
//!
//! # Module Structure
//!
//! - `frame`: RGB/gray frames and the shared latest-frame slot
//! - `ingest`: capture sources and the acquisition thread
//! - `motion`: ROI differencing and cooldown gating
//! - `monitor`: the trigger/settle/capture state machine
//! - `snapshot`: collision-free JPEG snapshots
//! - `classify`: the model boundary (image in, category + confidence out)
//! - `report`, `storage`: result sinks and the SQLite event log
//! - `clock`: time source and stop signal shared by all loops
//! - `config`: file + environment configuration

use anyhow::{anyhow, Result};
use std::time::{SystemTime, UNIX_EPOCH};

pub mod classify;
pub mod clock;
pub mod config;
pub mod frame;
pub mod ingest;
pub mod monitor;
pub mod motion;
pub mod report;
pub mod snapshot;
pub mod storage;

pub use classify::{
    load_model, Category, ClassificationOutcome, Classifier, ClassifierBackend, FailureCause,
    ModelHandle, Prediction, Unavailable,
};
pub use clock::{Clock, ManualClock, StopSignal, SystemClock};
pub use config::SorterConfig;
pub use frame::{Frame, FrameSource, GrayFrame, LatestFrameSlot};
pub use ingest::{open_source, CaptureSource};
pub use monitor::{MonitorSettings, MonitorState, MonitorStats, MotionMonitor, TriggerReport};
pub use report::{LogSink, MemorySink, ResultSink};
pub use snapshot::SnapshotWriter;
pub use storage::{EventLogSink, EventLogStore, InMemoryEventLog, SqliteEventLog};

/// Current Unix time in seconds.
pub fn now_s() -> Result<u64> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|_| anyhow!("system clock is before the Unix epoch"))?
        .as_secs())
}
