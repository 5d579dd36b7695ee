//! Periodic job runner.
//!
//! One ticker per [`JobKind`]. The first firing happens one full period
//! after [`Scheduler::start`]. A firing that finds the previous run of the
//! same kind still in flight is skipped, not queued; different kinds run
//! concurrently. [`Scheduler::stop`] closes a gate every firing passes
//! through, and [`Scheduler::drain`] waits out the runs already started.

use std::{
  future::Future,
  sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicBool, Ordering},
  },
  time::Duration,
};

use rippl_core::store::{ActivityLog, CounterStore, SummaryStore};
use tokio::{
  sync::watch,
  task::{JoinHandle, JoinSet},
  time::{self, Instant, MissedTickBehavior},
};
use tracing::{error, info, warn};

use crate::{
  Result,
  config::ScheduleConfig,
  impact::ImpactEngine,
  job::{CycleReport, JobKind, JobOutcome},
  trending::TrendingEngine,
};

// ─── Runner ──────────────────────────────────────────────────────────────────

/// Something that can execute one run of each job kind.
pub trait JobRunner: Send + Sync + 'static {
  fn run(&self, kind: JobKind) -> impl Future<Output = Result<CycleReport>> + Send;
}

/// The production runner: the two engines.
pub struct Engines<C, L, S> {
  pub trending: Arc<TrendingEngine<C, L, S>>,
  pub impact:   Arc<ImpactEngine<L, S>>,
}

impl<C, L, S> JobRunner for Engines<C, L, S>
where
  C: CounterStore + 'static,
  L: ActivityLog + 'static,
  S: SummaryStore + 'static,
{
  async fn run(&self, kind: JobKind) -> Result<CycleReport> {
    match kind {
      JobKind::Impact => self.impact.run_cycle().await,
      JobKind::Trending => self.trending.run_cycle().await,
      JobKind::Decay => self.trending.run_decay().await,
    }
  }
}

// ─── Overlap guard ───────────────────────────────────────────────────────────

#[derive(Default)]
struct JobFlags([AtomicBool; 3]);

impl JobFlags {
  fn try_acquire(self: &Arc<Self>, kind: JobKind) -> Option<RunGuard> {
    self.0[kind.index()]
      .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
      .ok()
      .map(|_| RunGuard { flags: self.clone(), kind })
  }
}

/// Marks a kind as in flight until dropped.
struct RunGuard {
  flags: Arc<JobFlags>,
  kind:  JobKind,
}

impl Drop for RunGuard {
  fn drop(&mut self) { self.flags.0[self.kind.index()].store(false, Ordering::Release); }
}

// ─── Firing ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fire {
  Spawned,
  /// The previous run of the kind is still in flight.
  Busy,
  /// The scheduler is stopped.
  Closed,
}

/// What the tickers share with the scheduler.
struct Firing<R> {
  runner: Arc<R>,
  flags:  Arc<JobFlags>,
  /// Open between `start` and `stop`. Held from the check until the run is
  /// in `runs`.
  gate:   Mutex<bool>,
  runs:   Mutex<JoinSet<()>>,
}

impl<R: JobRunner> Firing<R> {
  fn fire(&self, kind: JobKind) -> Fire {
    let open = self.gate.lock().unwrap_or_else(PoisonError::into_inner);
    if !*open {
      return Fire::Closed;
    }
    let Some(guard) = self.flags.try_acquire(kind) else {
      info!(job = %kind, "previous run still in flight; skipping firing");
      return Fire::Busy;
    };

    let runner = self.runner.clone();
    let mut runs = self.runs.lock().unwrap_or_else(PoisonError::into_inner);
    while runs.try_join_next().is_some() {}
    runs.spawn(async move {
      execute(&*runner, kind, guard).await;
    });
    Fire::Spawned
  }

  fn set_open(&self, open: bool) {
    *self.gate.lock().unwrap_or_else(PoisonError::into_inner) = open;
  }
}

// ─── Scheduler ───────────────────────────────────────────────────────────────

struct Running {
  shutdown: watch::Sender<bool>,
  tickers:  Vec<JoinHandle<()>>,
}

pub struct Scheduler<R> {
  firing:   Arc<Firing<R>>,
  schedule: ScheduleConfig,
  running:  Mutex<Option<Running>>,
}

impl<R: JobRunner> Scheduler<R> {
  pub fn new(runner: Arc<R>, schedule: ScheduleConfig) -> Self {
    Self {
      firing: Arc::new(Firing {
        runner,
        flags: Arc::default(),
        gate: Mutex::new(false),
        runs: Mutex::new(JoinSet::new()),
      }),
      schedule,
      running: Mutex::new(None),
    }
  }

  /// Start the tickers. Returns `false` if they were already running.
  /// Must be called from within a tokio runtime.
  pub fn start(&self) -> bool {
    let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
    if running.is_some() {
      return false;
    }
    self.firing.set_open(true);

    let (shutdown, rx) = watch::channel(false);
    let mut tickers = Vec::with_capacity(JobKind::ALL.len());
    for kind in JobKind::ALL {
      let period = self.schedule.period(kind);
      if period.is_zero() {
        warn!(job = %kind, "zero period; job not scheduled");
        continue;
      }
      tickers.push(tokio::spawn(tick_loop(self.firing.clone(), kind, period, rx.clone())));
      info!(job = %kind, period_secs = period.as_secs(), "job scheduled");
    }

    *running = Some(Running { shutdown, tickers });
    true
  }

  /// Stop future firings. Once this returns no timer-driven run can start;
  /// runs already in flight keep going until [`Self::drain`] collects them.
  /// Returns `false` if nothing was running.
  pub fn stop(&self) -> bool {
    let Some(running) = self
      .running
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .take()
    else {
      return false;
    };
    self.firing.set_open(false);
    let _ = running.shutdown.send(true);
    for ticker in running.tickers {
      ticker.abort();
    }
    info!("scheduler stopped");
    true
  }

  pub fn is_running(&self) -> bool {
    self
      .running
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .is_some()
  }

  /// Wait for every timer-started run in flight to finish.
  pub async fn drain(&self) {
    let mut runs =
      std::mem::take(&mut *self.firing.runs.lock().unwrap_or_else(PoisonError::into_inner));
    let mut finished = 0usize;
    while let Some(result) = runs.join_next().await {
      if let Err(e) = result {
        error!(error = %e, "job task did not complete");
      }
      finished += 1;
    }
    info!(runs = finished, "in-flight runs drained");
  }

  /// Run one job immediately, under the same overlap guard as the tickers.
  pub async fn run_now(&self, kind: JobKind) -> JobOutcome {
    match self.firing.flags.try_acquire(kind) {
      Some(guard) => execute(&*self.firing.runner, kind, guard).await,
      None => {
        info!(job = %kind, "run already in flight; skipping");
        JobOutcome::Skipped { job: kind }
      }
    }
  }

  /// Impact, then trending.
  pub async fn run_all_now(&self) -> Vec<JobOutcome> {
    let mut out = Vec::with_capacity(2);
    for kind in [JobKind::Impact, JobKind::Trending] {
      out.push(self.run_now(kind).await);
    }
    out
  }
}

impl<R> Drop for Scheduler<R> {
  fn drop(&mut self) {
    *self.firing.gate.lock().unwrap_or_else(PoisonError::into_inner) = false;
    let running = self
      .running
      .get_mut()
      .unwrap_or_else(PoisonError::into_inner)
      .take();
    if let Some(running) = running {
      let _ = running.shutdown.send(true);
      for ticker in running.tickers {
        ticker.abort();
      }
    }
    // Undrained runs finish on their own.
    self
      .firing
      .runs
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .detach_all();
  }
}

async fn tick_loop<R: JobRunner>(
  firing: Arc<Firing<R>>,
  kind: JobKind,
  period: Duration,
  mut shutdown: watch::Receiver<bool>,
) {
  let mut ticker = time::interval_at(Instant::now() + period, period);
  ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

  loop {
    tokio::select! {
      biased;
      _ = shutdown.changed() => break,
      _ = ticker.tick() => {}
    }
    if firing.fire(kind) == Fire::Closed {
      break;
    }
  }
}

async fn execute<R: JobRunner>(runner: &R, kind: JobKind, guard: RunGuard) -> JobOutcome {
  let outcome = match runner.run(kind).await {
    Ok(report) => JobOutcome::Completed(report),
    Err(e) => {
      error!(job = %kind, error = %e, "job failed");
      JobOutcome::Failed { job: kind, error: e.to_string() }
    }
  };
  drop(guard);
  outcome
}
