use crate::error::BacktestError;
use configuration::ListenConfig;
use events::IngestRecord;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, timeout_at};

const BASE_INTERVAL: Duration = Duration::from_secs(1);
const MAX_INTERVAL: Duration = Duration::from_secs(2);
const INTERVAL_GROWTH: f64 = 1.5;
/// Quiet ticks tolerated before the interval starts to grow.
const GROWTH_AFTER_QUIET_TICKS: u32 = 3;

/// Record count from which a run is considered large.
const LARGE_RUN_RECORDS: usize = 10;
/// Quiet ticks after which a large run is considered settled.
const SETTLED_QUIET_TICKS: u32 = 5;
/// Quiet time after which a small run is considered finished.
const SHORT_RUN_QUIET: Duration = Duration::from_secs(10);

/// Why the listen loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ListenExit {
    /// At least ten records arrived and the stream then stayed quiet for five ticks.
    Settled,
    /// A handful of records arrived and nothing followed for ten seconds.
    ShortRun,
    /// The ingest worker shut down.
    Closed,
    /// The wall-clock budget ran out.
    Deadline,
}

impl fmt::Display for ListenExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            ListenExit::Settled => "stream settled",
            ListenExit::ShortRun => "short run finished",
            ListenExit::Closed => "ingest stopped",
            ListenExit::Deadline => "time budget exhausted",
        };
        f.write_str(reason)
    }
}

#[derive(Debug)]
pub struct ListenOutcome {
    pub records: Vec<IngestRecord>,
    pub exit: ListenExit,
    pub elapsed: Duration,
}

/// Waits for streamed backtest results with an adaptive polling interval.
///
/// The loop never runs longer than `max_seconds`. Records are drained from
/// the channel for one tick at a time; growth is judged per tick.
#[derive(Debug, Clone)]
pub struct ListenLoop {
    max_duration: Duration,
    show_progress: bool,
}

impl ListenLoop {
    pub fn new(config: &ListenConfig) -> Self {
        Self {
            max_duration: Duration::from_secs(config.max_seconds),
            show_progress: config.show_progress,
        }
    }

    pub fn with_max_seconds(mut self, max_seconds: u64) -> Self {
        self.max_duration = Duration::from_secs(max_seconds);
        self
    }

    pub async fn listen(
        &self,
        receiver: &mut mpsc::Receiver<IngestRecord>,
    ) -> Result<ListenOutcome, BacktestError> {
        let progress = self.progress_bar()?;

        let started = Instant::now();
        let deadline = started + self.max_duration;
        let mut last_growth = started;
        let mut quiet_ticks = 0u32;
        let mut interval = BASE_INTERVAL;
        let mut records = Vec::new();

        let exit = loop {
            let tick_end = (Instant::now() + interval).min(deadline);
            let before = records.len();
            let closed = drain_until(receiver, tick_end, &mut records).await;
            let now = Instant::now();

            if records.len() > before {
                last_growth = now;
                quiet_ticks = 0;
                interval = BASE_INTERVAL;
            } else {
                quiet_ticks += 1;
                if quiet_ticks > GROWTH_AFTER_QUIET_TICKS {
                    interval = interval.mul_f64(INTERVAL_GROWTH).min(MAX_INTERVAL);
                }
            }

            let count = records.len();
            let next_check = interval.as_secs_f64();
            progress.set_message(format!("{count} records, next check in {next_check:.1}s"));
            tracing::trace!(
                count,
                quiet_ticks,
                interval_ms = interval.as_millis() as u64,
                "Listen tick."
            );

            if closed {
                break ListenExit::Closed;
            }
            if count >= LARGE_RUN_RECORDS && quiet_ticks >= SETTLED_QUIET_TICKS {
                break ListenExit::Settled;
            }
            let short_run = count > 0 && count < LARGE_RUN_RECORDS;
            if short_run && now.duration_since(last_growth) > SHORT_RUN_QUIET {
                break ListenExit::ShortRun;
            }
            if now >= deadline {
                break ListenExit::Deadline;
            }
        };

        let elapsed = started.elapsed();
        progress.finish_with_message(format!("{} records ({exit})", records.len()));
        tracing::info!(
            records = records.len(),
            elapsed_secs = elapsed.as_secs_f64(),
            %exit,
            "Stopped listening."
        );

        Ok(ListenOutcome { records, exit, elapsed })
    }

    fn progress_bar(&self) -> Result<ProgressBar, BacktestError> {
        if !self.show_progress {
            return Ok(ProgressBar::hidden());
        }
        let spinner = ProgressBar::new_spinner();
        let template = "{spinner:.green} [{elapsed_precise}] {msg}";
        let style = ProgressStyle::default_spinner().template(template)?;
        spinner.set_style(style);
        spinner.enable_steady_tick(Duration::from_millis(120));
        Ok(spinner)
    }
}

/// Moves every record that arrives before `until` into `records`.
///
/// Returns `true` when the channel closed.
async fn drain_until(
    receiver: &mut mpsc::Receiver<IngestRecord>,
    until: Instant,
    records: &mut Vec<IngestRecord>,
) -> bool {
    loop {
        match timeout_at(until, receiver.recv()).await {
            Ok(Some(record)) => records.push(record),
            Ok(None) => return true,
            Err(_) => return false,
        }
    }
}
