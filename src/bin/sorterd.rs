//! sorterd - bin-sentry daemon
//!
//! This daemon:
//! 1. Loads configuration (SORTER_CONFIG file + SORTER_* env overrides)
//! 2. Loads the classification model once; a failure here is fatal
//! 3. Starts the acquisition thread feeding the latest-frame slot
//! 4. Runs the motion monitor until Ctrl-C
//! 5. Reports every trigger to the log and, if configured, the SQLite event log

use anyhow::{anyhow, Context, Result};

use bin_sentry::config::SorterConfig;
use bin_sentry::ingest::{open_source, spawn_acquisition, AcquisitionSettings};
use bin_sentry::{
    load_model, Classifier, EventLogSink, LatestFrameSlot, LogSink, MonitorSettings,
    MotionMonitor, SnapshotWriter, SqliteEventLog, StopSignal, SystemClock,
};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cfg = SorterConfig::load()?;
    let monitor_settings = MonitorSettings::from_motion(&cfg.motion)?;

    let model = load_model(&cfg.classifier).context("failed to load classification model")?;
    let classifier = Classifier::new(model);
    let snapshots = SnapshotWriter::new(&cfg.output.snapshot_dir)?;

    let stop = StopSignal::new();
    let handler_stop = stop.clone();
    ctrlc::set_handler(move || {
        log::info!("shutdown signal received");
        handler_stop.stop();
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    let slot = LatestFrameSlot::new();
    let source = open_source(&cfg.source)?;
    log::info!("capture source: {} ({})", source.name(), cfg.source.url);
    let acquisition = spawn_acquisition(
        source,
        slot.clone(),
        stop.clone(),
        AcquisitionSettings {
            target_fps: cfg.source.target_fps,
            ..AcquisitionSettings::default()
        },
    )?;

    let mut monitor = MotionMonitor::new(
        slot,
        SystemClock,
        stop.clone(),
        monitor_settings,
        snapshots,
        classifier,
    )
    .with_sink(Box::new(LogSink));
    if let Some(db_path) = cfg.output.events_db.as_deref() {
        let events = SqliteEventLog::open(db_path)
            .with_context(|| format!("failed to open event log {}", db_path))?;
        monitor.add_sink(Box::new(EventLogSink::new(events)));
        log::info!("recording drop events to {}", db_path);
    }
    log::info!(
        "sorterd running. snapshots in {}",
        cfg.output.snapshot_dir.display()
    );

    let stats = monitor.run();

    stop.stop();
    let acquisition_stats = acquisition.join();
    log::info!(
        "sorterd stopped: {} cycles, {} frame gaps, {} triggers ({} suppressed, {} abandoned), {} frames acquired",
        stats.cycles,
        stats.frame_gaps,
        stats.triggers,
        stats.suppressed,
        stats.abandoned,
        acquisition_stats.frames_published
    );
    Ok(())
}
