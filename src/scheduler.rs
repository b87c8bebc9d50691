//! Scheduler - periodic enumeration of every enabled account
//!
//! Ticks come from the configured cron schedule. Each tick runs in its own task and
//! enumerates all enabled accounts concurrently. A tick that comes due while the
//! previous one is still running is skipped, never queued. Stopping lets the running
//! tick drain and starts no new ones.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use cron::Schedule;
use futures::stream::{self, FuturesUnordered, Stream, StreamExt};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::account::Roster;
use crate::discovery::RepositorySource;
use crate::report::{EnumerationResult, ResultAggregator, TickOutcome, TickReport};

/// Drives the enumerator on a schedule
pub struct Scheduler {
    schedule: Schedule,
    roster: Arc<Roster>,
    source: Arc<dyn RepositorySource>,
    reports: Option<mpsc::Sender<TickReport>>,
    shutdown_sender: broadcast::Sender<()>,
    stopping: Arc<AtomicBool>,
    is_running: Arc<AtomicBool>,
    stats: Arc<TickStats>,
    created_at: Instant,
}

/// Cloneable handle that stops a running scheduler from another task
#[derive(Clone)]
pub struct ShutdownHandle {
    sender: broadcast::Sender<()>,
    stopping: Arc<AtomicBool>,
}

impl ShutdownHandle {
    /// Start no further ticks; the tick in progress, if any, is allowed to finish
    pub fn stop(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        let _ = self.sender.send(());
    }
}

/// Scheduler statistics and status
#[derive(Debug, Clone)]
pub struct SchedulerStatus {
    pub is_running: bool,
    pub tick_in_progress: bool,
    pub uptime: Duration,
    pub ticks_started: u64,
    pub ticks_skipped: u64,
    pub ticks_completed: u64,
    pub last_tick: Option<DateTime<Utc>>,
    pub last_outcome: Option<TickOutcome>,
    pub next_tick: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct TickStats {
    started: AtomicU64,
    skipped: AtomicU64,
    completed: AtomicU64,
    active: AtomicBool,
    last: Mutex<Option<(DateTime<Utc>, TickOutcome)>>,
}

impl TickStats {
    /// Claim the single tick slot; false when a tick is already running
    fn try_begin(&self) -> bool {
        if self
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            self.skipped.fetch_add(1, Ordering::SeqCst);
            return false;
        }
        self.started.fetch_add(1, Ordering::SeqCst);
        true
    }

    fn finish(&self, report: &TickReport) {
        self.record_outcome(report);
        self.active.store(false, Ordering::SeqCst);
        self.completed.fetch_add(1, Ordering::SeqCst);
    }

    fn record_outcome(&self, report: &TickReport) {
        if let Ok(mut last) = self.last.lock() {
            *last = Some((report.tick, report.outcome));
        }
    }

    fn last(&self) -> Option<(DateTime<Utc>, TickOutcome)> {
        self.last.lock().ok().and_then(|last| *last)
    }
}

impl Scheduler {
    /// Create a scheduler for the enabled accounts of `roster`
    pub fn new(schedule: Schedule, roster: Roster, source: Arc<dyn RepositorySource>) -> Self {
        let (shutdown_sender, _) = broadcast::channel(1);

        Self {
            schedule,
            roster: Arc::new(roster),
            source,
            reports: None,
            shutdown_sender,
            stopping: Arc::new(AtomicBool::new(false)),
            is_running: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(TickStats::default()),
            created_at: Instant::now(),
        }
    }

    /// Deliver every tick report to `sender` (the backup step)
    pub fn with_report_sink(mut self, sender: mpsc::Sender<TickReport>) -> Self {
        self.reports = Some(sender);
        self
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            sender: self.shutdown_sender.clone(),
            stopping: self.stopping.clone(),
        }
    }

    /// Stop the scheduler; see [`ShutdownHandle::stop`]
    pub fn stop(&self) {
        info!("Stopping scheduler");
        self.shutdown_handle().stop();
    }

    /// Run on the cron schedule until stopped
    pub async fn run(&self) -> Result<()> {
        let first = self
            .schedule
            .upcoming(Utc)
            .next()
            .ok_or_else(|| anyhow!("Schedule has no upcoming run times"))?;

        info!(
            "Scheduler running with {} enabled accounts, first tick at {}",
            self.roster.enabled_count(),
            first
        );

        self.run_with_ticks(cron_ticks(self.schedule.clone())).await;
        Ok(())
    }

    /// Run with an arbitrary source of due times until it ends or the scheduler is stopped
    pub async fn run_with_ticks<S>(&self, ticks: S)
    where
        S: Stream<Item = DateTime<Utc>> + Send,
    {
        let mut ticks = Box::pin(ticks);
        let mut shutdown_receiver = self.shutdown_sender.subscribe();

        if self.stopping.load(Ordering::SeqCst) {
            info!("Scheduler was stopped before it started");
            return;
        }

        self.is_running.store(true, Ordering::SeqCst);
        let mut in_flight: Option<JoinHandle<()>> = None;

        loop {
            tokio::select! {
                // Shutdown signal received
                _ = shutdown_receiver.recv() => {
                    info!("Shutdown signal received in scheduler loop");
                    break;
                }

                next = ticks.next() => {
                    let Some(due) = next else {
                        debug!("Tick source exhausted");
                        break;
                    };

                    if self.stopping.load(Ordering::SeqCst) {
                        break;
                    }

                    if !self.stats.try_begin() {
                        warn!("Skipping tick due at {}: previous tick is still running", due);
                        continue;
                    }

                    in_flight = Some(self.spawn_tick(due));
                }
            }
        }

        if let Some(handle) = in_flight.take() {
            if !handle.is_finished() {
                info!("Waiting for the running tick to finish");
            }
            if let Err(e) = handle.await {
                error!("Tick task failed: {}", e);
            }
        }

        self.is_running.store(false, Ordering::SeqCst);
        info!("Scheduler loop exiting");
    }

    /// Run a single tick right now and return its report.
    ///
    /// Returns `None` without enumerating anything if a scheduled tick is in progress.
    pub async fn run_once(&self) -> Option<TickReport> {
        let due = Utc::now();
        if !self.stats.try_begin() {
            warn!("Not running tick at {}: another tick is still running", due);
            return None;
        }

        let report = execute_tick(due, &self.roster, self.source.as_ref()).await;
        self.stats.finish(&report);
        Some(report)
    }

    /// Get current scheduler status
    pub fn status(&self) -> SchedulerStatus {
        let is_running = self.is_running.load(Ordering::SeqCst);
        let last = self.stats.last();

        let next_tick = if is_running {
            self.schedule.upcoming(Utc).next()
        } else {
            None
        };

        SchedulerStatus {
            is_running,
            tick_in_progress: self.stats.active.load(Ordering::SeqCst),
            uptime: self.created_at.elapsed(),
            ticks_started: self.stats.started.load(Ordering::SeqCst),
            ticks_skipped: self.stats.skipped.load(Ordering::SeqCst),
            ticks_completed: self.stats.completed.load(Ordering::SeqCst),
            last_tick: last.map(|(tick, _)| tick),
            last_outcome: last.map(|(_, outcome)| outcome),
            next_tick,
        }
    }

    /// Spawn a tick whose slot was already claimed with `try_begin`
    fn spawn_tick(&self, due: DateTime<Utc>) -> JoinHandle<()> {
        let roster = self.roster.clone();
        let source = self.source.clone();
        let reports = self.reports.clone();
        let stats = self.stats.clone();

        debug!("Starting tick due at {}", due);

        tokio::spawn(async move {
            let report = execute_tick(due, &roster, source.as_ref()).await;
            log_report(&report);

            // Enumeration is over; a slow report consumer must not hold the tick slot
            stats.finish(&report);

            if let Some(reports) = reports {
                if reports.send(report).await.is_err() {
                    warn!("Report receiver closed, dropping report for tick {}", due);
                }
            }
        })
    }
}

/// Enumerate every enabled account of `roster` concurrently and aggregate the results.
///
/// Each account is awaited independently, so a slow or failing account delays only
/// its own result.
pub async fn execute_tick(
    due: DateTime<Utc>,
    roster: &Roster,
    source: &dyn RepositorySource,
) -> TickReport {
    let mut aggregator = ResultAggregator::new(due);

    let mut pending: FuturesUnordered<_> = roster
        .enabled()
        .enumerate()
        .map(|(position, account)| async move {
            let outcome = source.list_repositories(account).await;
            (position, EnumerationResult::new(account, outcome))
        })
        .collect();

    while let Some((position, result)) = pending.next().await {
        match &result.outcome {
            Ok(names) => debug!("{}: {} repositories", result.account, names.len()),
            Err(e) if e.is_transient() => {
                warn!("{} failed, retrying next tick: {}", result.account, e)
            }
            Err(e) => error!("{} failed: {}", result.account, e),
        }
        aggregator.record(position, result);
    }

    aggregator.finish(roster.rejected.clone())
}

/// Due times of `schedule`, each yielded once its time has come
pub fn cron_ticks(schedule: Schedule) -> impl Stream<Item = DateTime<Utc>> + Send {
    stream::unfold((schedule, None), |(schedule, last)| async move {
        let now = Utc::now();
        let from = match last {
            Some(last) if last > now => last,
            _ => now,
        };

        let next = schedule.after(&from).next()?;
        let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        debug!("Next tick due at {} (in {:.0}s)", next, wait.as_secs_f64());

        tokio::time::sleep(wait).await;
        Some((next, (schedule, Some(next))))
    })
}

/// Log completed tick
fn log_report(report: &TickReport) {
    let summary = format!(
        "Tick {} finished with {} in {:.2}s: {} accounts ok, {} failed, {} repositories",
        report.tick,
        report.outcome,
        report.duration.as_secs_f64(),
        report.succeeded(),
        report.failed(),
        report.total_repositories()
    );

    match report.outcome {
        TickOutcome::FullSuccess => info!("{}", summary),
        TickOutcome::PartialSuccess => warn!("{}", summary),
        TickOutcome::TotalFailure => error!("{}", summary),
    }
}
