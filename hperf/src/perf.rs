//! Load scheduler.
//!
//! Runs a single registered [`Job`] from many concurrent workers for a fixed
//! wall-clock duration, collecting per-trial latencies and outcomes.

use core::{
    fmt::{self, Display, Formatter},
    future::Future,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::{
    task::{JoinError, JoinHandle},
    time::Instant,
};

pub use crate::histogram::Bin;
use crate::{
    error::{TransportError, TrialError},
    histogram::LogHistogram,
};

/// Default number of histogram bins in the report.
pub const DEFAULT_BINS: usize = 15;

/// A unit of work executed repeatedly by the scheduler.
pub trait Job: Send + Sync + 'static {
    /// Executes a single trial.
    fn call(&self) -> impl Future<Output = Result<(), TrialError>> + Send;
}

impl<F, Fut> Job for F
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), TrialError>> + Send,
{
    #[inline]
    fn call(&self) -> impl Future<Output = Result<(), TrialError>> + Send {
        self()
    }
}

#[derive(Debug, Error)]
pub enum PerfError {
    #[error("a job is already registered")]
    AlreadyRegistered,
    #[error("no job registered")]
    NoJob,
    #[error("already started")]
    AlreadyStarted,
    #[error("worker failed: {0}")]
    Join(#[from] JoinError),
}

/// Scheduler config.
#[derive(Debug, Clone)]
pub struct PerfConfig {
    /// Number of concurrent workers.
    pub workers: usize,
    /// How long to run.
    pub duration: Duration,
    /// Number of histogram bins in the report.
    pub bins: usize,
}

#[derive(Debug, Default)]
struct Stat {
    num_trials: AtomicU64,
    num_success: AtomicU64,
    num_transport_errors: AtomicU64,
    num_status_errors: AtomicU64,
    num_timeouts: AtomicU64,
    hist: LogHistogram,
}

impl Stat {
    #[inline]
    fn on_trial(&self, now: &Instant, result: &Result<(), TrialError>) {
        self.num_trials.fetch_add(1, Ordering::Relaxed);
        self.hist.record(now.elapsed().as_micros() as u64);

        match result {
            Ok(()) => {
                self.num_success.fetch_add(1, Ordering::Relaxed);
            }
            Err(TrialError::Transport(TransportError::Timeout)) => {
                self.num_transport_errors.fetch_add(1, Ordering::Relaxed);
                self.num_timeouts.fetch_add(1, Ordering::Relaxed);
            }
            Err(TrialError::Transport(..)) => {
                self.num_transport_errors.fetch_add(1, Ordering::Relaxed);
            }
            Err(TrialError::Status(..)) => {
                self.num_status_errors.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

/// The load scheduler.
#[derive(Debug)]
pub struct Perf<J> {
    cfg: PerfConfig,
    job: Option<Arc<J>>,
    stat: Arc<Stat>,
    workers: Vec<JoinHandle<()>>,
    started_at: Option<Instant>,
}

impl<J> Perf<J>
where
    J: Job,
{
    pub fn new(cfg: PerfConfig) -> Self {
        Self {
            cfg,
            job: None,
            stat: Arc::new(Stat::default()),
            workers: Vec::new(),
            started_at: None,
        }
    }

    /// Registers the job to run.
    ///
    /// Only a single job can be registered.
    pub fn register(&mut self, job: J) -> Result<(), PerfError> {
        if self.job.is_some() {
            return Err(PerfError::AlreadyRegistered);
        }

        self.job = Some(Arc::new(job));
        Ok(())
    }

    /// Spawns workers on the current tokio runtime.
    pub fn start(&mut self) -> Result<(), PerfError> {
        let job = self.job.clone().ok_or(PerfError::NoJob)?;
        if self.started_at.is_some() {
            return Err(PerfError::AlreadyStarted);
        }

        let now = Instant::now();
        let deadline = now + self.cfg.duration;

        log::debug!(
            "starting {} workers for {:?} ...",
            self.cfg.workers,
            self.cfg.duration
        );

        self.workers = (0..self.cfg.workers)
            .map(|_| tokio::spawn(run_worker(job.clone(), self.stat.clone(), deadline)))
            .collect();
        self.started_at = Some(now);

        Ok(())
    }

    /// Waits for all workers to complete and builds the report.
    pub async fn wait(self) -> Result<Report, PerfError> {
        let started_at = self.started_at.ok_or(PerfError::NoJob)?;

        for worker in self.workers {
            worker.await?;
        }

        let report = Report::new(&self.stat, self.cfg.workers, started_at.elapsed(), self.cfg.bins);

        Ok(report)
    }
}

async fn run_worker<J>(job: Arc<J>, stat: Arc<Stat>, deadline: Instant)
where
    J: Job,
{
    loop {
        let now = Instant::now();
        if now >= deadline {
            break;
        }

        let result = job.call().await;
        stat.on_trial(&now, &result);
    }
}

/// Benchmark results.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub workers: usize,
    /// Actual run time, in seconds.
    pub elapsed: f64,
    pub trials: u64,
    pub successes: u64,
    pub failures: u64,
    pub transport_errors: u64,
    pub status_errors: u64,
    pub timeouts: u64,
    /// Trials per second.
    pub throughput: f64,
    pub mean_us: f64,
    pub p50_us: u64,
    pub p90_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
    pub histogram: Vec<Bin>,
}

impl Report {
    fn new(stat: &Stat, workers: usize, elapsed: Duration, bins: usize) -> Self {
        let trials = stat.num_trials.load(Ordering::Relaxed);
        let successes = stat.num_success.load(Ordering::Relaxed);
        let transport_errors = stat.num_transport_errors.load(Ordering::Relaxed);
        let status_errors = stat.num_status_errors.load(Ordering::Relaxed);
        let elapsed = elapsed.as_secs_f64();

        let throughput = if elapsed > 0.0 { trials as f64 / elapsed } else { 0.0 };

        Self {
            workers,
            elapsed,
            trials,
            successes,
            failures: transport_errors + status_errors,
            transport_errors,
            status_errors,
            timeouts: stat.num_timeouts.load(Ordering::Relaxed),
            throughput,
            mean_us: stat.hist.mean(),
            p50_us: stat.hist.quantile(0.5),
            p90_us: stat.hist.quantile(0.9),
            p99_us: stat.hist.quantile(0.99),
            max_us: stat.hist.max(),
            histogram: stat.hist.bins(bins),
        }
    }

    /// Returns the ratio of failed trials, from 0 to 1.
    #[inline]
    pub fn error_rate(&self) -> f64 {
        match self.trials {
            0 => 0.0,
            n => self.failures as f64 / n as f64,
        }
    }
}

impl Display for Report {
    fn fmt(&self, fmt: &mut Formatter) -> Result<(), fmt::Error> {
        writeln!(fmt, "workers:     {}", self.workers)?;
        writeln!(fmt, "elapsed:     {:.2}s", self.elapsed)?;
        writeln!(fmt, "trials:      {}", self.trials)?;
        writeln!(fmt, "throughput:  {:.2} req/s", self.throughput)?;
        writeln!(
            fmt,
            "failures:    {} ({:.2}%): transport {} (timeout {}), status {}",
            self.failures,
            self.error_rate() * 100.0,
            self.transport_errors,
            self.timeouts,
            self.status_errors,
        )?;
        writeln!(
            fmt,
            "latency:     mean {:.0}us, p50 {}us, p90 {}us, p99 {}us, max {}us",
            self.mean_us, self.p50_us, self.p90_us, self.p99_us, self.max_us,
        )?;

        let max = self.histogram.iter().map(|v| v.count).max().unwrap_or(0);
        if max > 0 {
            writeln!(fmt, "histogram:")?;
        }
        for bin in &self.histogram {
            let width = (bin.count * 40).div_ceil(max) as usize;
            let upper = match bin.upper_us {
                u64::MAX => "inf".to_owned(),
                v => format!("{v}us"),
            };
            writeln!(
                fmt,
                "  [{:>9}us, {:>11}) {:>10} {}",
                bin.lower_us,
                upper,
                bin.count,
                "*".repeat(width),
            )?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use core::sync::atomic::AtomicUsize;
    use std::io;

    use http::StatusCode;

    use super::*;

    fn cfg(workers: usize, duration: Duration) -> PerfConfig {
        PerfConfig { workers, duration, bins: DEFAULT_BINS }
    }

    async fn ok() -> Result<(), TrialError> {
        tokio::task::yield_now().await;
        Ok(())
    }

    #[test]
    fn single_registration() {
        let mut perf = Perf::new(cfg(1, Duration::ZERO));
        perf.register(ok).unwrap();

        assert!(matches!(perf.register(ok), Err(PerfError::AlreadyRegistered)));
    }

    #[tokio::test]
    async fn start_requires_job() {
        let mut perf = Perf::<fn() -> core::future::Ready<Result<(), TrialError>>>::new(cfg(1, Duration::ZERO));

        assert!(matches!(perf.start(), Err(PerfError::NoJob)));
    }

    #[tokio::test]
    async fn start_twice_is_rejected() {
        let mut perf = Perf::new(cfg(1, Duration::ZERO));
        perf.register(ok).unwrap();
        perf.start().unwrap();

        assert!(matches!(perf.start(), Err(PerfError::AlreadyStarted)));
        perf.wait().await.unwrap();
    }

    #[tokio::test]
    async fn zero_duration_yields_empty_report() {
        let mut perf = Perf::new(cfg(8, Duration::ZERO));
        perf.register(ok).unwrap();
        perf.start().unwrap();
        let report = perf.wait().await.unwrap();

        assert_eq!(0, report.trials);
        assert_eq!(0, report.failures);
        assert_eq!(0.0, report.error_rate());
        assert!(report.histogram.is_empty());
    }

    #[tokio::test]
    async fn zero_workers_yields_empty_report() {
        let mut perf = Perf::new(cfg(0, Duration::from_millis(50)));
        perf.register(ok).unwrap();
        perf.start().unwrap();
        let report = perf.wait().await.unwrap();

        assert_eq!(0, report.trials);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn outcomes_are_counted() {
        let counter = Arc::new(AtomicUsize::new(0));
        let job = {
            let counter = counter.clone();
            move || {
                let idx = counter.fetch_add(1, Ordering::Relaxed);
                async move {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                    match idx % 3 {
                        0 => Ok(()),
                        1 => Err(TrialError::Status(StatusCode::INTERNAL_SERVER_ERROR)),
                        _ => Err(TrialError::Transport(TransportError::Connect(io::Error::from(
                            io::ErrorKind::ConnectionRefused,
                        )))),
                    }
                }
            }
        };

        let mut perf = Perf::new(cfg(4, Duration::from_millis(200)));
        perf.register(job).unwrap();
        perf.start().unwrap();
        let report = perf.wait().await.unwrap();

        assert!(report.trials > 0);
        assert_eq!(counter.load(Ordering::Relaxed) as u64, report.trials);
        assert_eq!(report.trials, report.successes + report.failures);
        assert_eq!(report.failures, report.transport_errors + report.status_errors);
        assert!(report.successes > 0 && report.status_errors > 0 && report.transport_errors > 0);
        assert_eq!(report.trials, report.histogram.iter().map(|v| v.count).sum::<u64>());
        assert!(report.elapsed >= 0.2);
    }

    #[test]
    fn report_is_rendered() {
        let stat = Stat::default();
        let now = Instant::now();
        stat.on_trial(&now, &Ok(()));
        stat.on_trial(&now, &Err(TrialError::Transport(TransportError::Timeout)));

        let report = Report::new(&stat, 2, Duration::from_secs(1), DEFAULT_BINS);
        assert_eq!(2, report.trials);
        assert_eq!(1, report.timeouts);
        assert_eq!(0.5, report.error_rate());

        let text = report.to_string();
        assert!(text.contains("trials:      2"), "{text}");
        assert!(!text.contains(&u64::MAX.to_string()), "{text}");
        assert!(text.contains("histogram:"), "{text}");

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(2, json["trials"]);
        assert_eq!(1, json["transport_errors"]);
    }
}
