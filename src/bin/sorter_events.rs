//! sorter_events - inspect the drop event log written by sorterd.

use anyhow::{anyhow, Result};
use chrono::{Local, TimeZone};
use clap::{Parser, Subcommand};
use std::time::Duration;

use bin_sentry::storage::{EventLogStore, SqliteEventLog};

#[derive(Parser, Debug)]
#[command(author, version, about = "Inspect the bin-sentry drop event log")]
struct Args {
    /// SQLite event log path.
    #[arg(long, env = "SORTER_EVENTS_DB", default_value = "sorter_events.db")]
    db: String,
    /// Emit JSON instead of text.
    #[arg(long)]
    json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the most recent drops.
    Recent {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Count drops per category.
    Totals,
    /// Delete drops older than the given number of days.
    Prune {
        #[arg(long)]
        days: u64,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if !std::path::Path::new(&args.db).exists() {
        return Err(anyhow!("event log {} does not exist", args.db));
    }
    let mut store = SqliteEventLog::open(&args.db)?;

    match args.command {
        Command::Recent { limit } => {
            let events = store.recent(limit)?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&events)?);
                return Ok(());
            }
            for ev in events {
                let when = Local
                    .timestamp_opt(ev.created_at, 0)
                    .single()
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| ev.created_at.to_string());
                let result = match (ev.category, ev.confidence) {
                    (Some(category), Some(confidence)) => {
                        format!("{} ({:.2}%)", category, confidence * 100.0)
                    }
                    _ => format!(
                        "unavailable ({})",
                        ev.failure.as_deref().unwrap_or("unknown")
                    ),
                };
                println!(
                    "#{:<5} {}  {:<24} change_pixels={:<6} {}",
                    ev.sequence,
                    when,
                    result,
                    ev.change_pixels,
                    ev.snapshot.as_deref().unwrap_or("-")
                );
            }
        }
        Command::Totals => {
            let totals = store.category_totals()?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&totals)?);
                return Ok(());
            }
            for (category, count) in &totals.by_category {
                println!("{:<10} {}", category, count);
            }
            println!("{:<10} {}", "unavailable", totals.unavailable);
        }
        Command::Prune { days } => {
            let retention = Duration::from_secs(days.saturating_mul(24 * 60 * 60));
            let now = i64::try_from(bin_sentry::now_s()?)
                .map_err(|_| anyhow!("current time exceeds i64 range"))?;
            let deleted = store.enforce_retention(retention, now)?;
            log::info!("pruned {} events older than {} days", deleted, days);
        }
    }
    Ok(())
}
