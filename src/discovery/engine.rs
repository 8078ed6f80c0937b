//! Host Discovery Engine - bounded worker pool over many targets
//!
//! Every target is queued up front. A fixed pool of workers pulls targets
//! one at a time and runs a complete [`HostScanner::scan`] before taking
//! the next. The result store is the only state the workers share.

use crate::config::{ScanConfig, TargetSource};
use crate::discovery::progress::{LogProgress, ProgressObserver, ProgressSnapshot};
use crate::discovery::{HostResult, HostScanner};
use crate::error::RunFailure;
use crate::network::{ProbeTransport, RawTransport};
use crate::output::{ResultStore, RunSummary};
use crate::utils::file_input::{dedup_targets, resolve_targets};
use crate::utils::Logger;
use log::{error, info, warn};
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::time::{Instant, MissedTickBehavior};

/// Shortest interval between progress samples
pub const MIN_PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

/// Outcome of a successful run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub summary: RunSummary,
    pub results: ResultStore,
    pub duration: Duration,
}

/// Counters shared between workers and the progress ticker
#[derive(Default)]
struct RunCounters {
    completed: AtomicUsize,
    alive: AtomicUsize,
}

impl RunCounters {
    fn snapshot(&self, total: usize, started: Instant) -> ProgressSnapshot {
        ProgressSnapshot {
            completed: self.completed.load(Ordering::Relaxed),
            total,
            alive: self.alive.load(Ordering::Relaxed),
            elapsed: started.elapsed(),
        }
    }
}

/// Main host discovery engine
pub struct HostDiscoveryEngine<T: ?Sized> {
    config: ScanConfig,
    transport: Arc<T>,
    observer: Arc<dyn ProgressObserver>,
    progress_interval: Duration,
}

impl HostDiscoveryEngine<RawTransport> {
    /// Validate the configuration, then open the raw sockets
    ///
    /// Fails with a capability error when raw sockets are not available.
    pub fn with_raw_transport(config: ScanConfig) -> crate::Result<Self> {
        config.validate()?;
        let transport = Arc::new(RawTransport::open()?);
        Self::new(config, transport)
    }
}

impl<T: ProbeTransport + ?Sized + 'static> HostDiscoveryEngine<T> {
    /// Create new host discovery engine
    pub fn new(config: ScanConfig, transport: Arc<T>) -> crate::Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            transport,
            observer: Arc::new(LogProgress),
            progress_interval: MIN_PROGRESS_INTERVAL,
        })
    }

    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Sampling interval for progress reports, never below one second
    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval.max(MIN_PROGRESS_INTERVAL);
        self
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Resolve targets, scan them all, export and summarize
    pub async fn run(&self, source: Option<&TargetSource>) -> Result<RunReport, RunFailure> {
        let targets = resolve_targets(source)?;
        self.run_targets(&targets).await
    }

    /// Scan already resolved targets, export and summarize
    pub async fn run_targets(&self, targets: &[Ipv4Addr]) -> Result<RunReport, RunFailure> {
        if targets.is_empty() {
            return Err(RunFailure::before_scan(crate::ScanError::Config(
                "no IP addresses to scan".to_string(),
            )));
        }
        let started = Instant::now();

        let results = self.scan_targets(targets).await;
        let output_path = &self.config.output_path;

        if let Err(e) = results.export_csv(output_path) {
            error!("{}", e);
            return Err(RunFailure::after_scan(e, results));
        }
        info!("Results saved to {}", output_path.display());

        Ok(RunReport {
            summary: results.summary(output_path),
            results,
            duration: started.elapsed(),
        })
    }

    /// Scan every target and return one record per distinct address
    pub async fn scan_targets(&self, targets: &[Ipv4Addr]) -> ResultStore {
        let targets = dedup_targets(targets);
        let total = targets.len();
        if total == 0 {
            return ResultStore::new();
        }

        let workers = self.config.concurrency.min(total);
        Logger::log_scan_start(total, self.config.max_level, workers);
        let started = Instant::now();

        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        for target in &targets {
            let _ = queue_tx.send(*target);
        }
        drop(queue_tx);

        let queue = Arc::new(Mutex::new(queue_rx));
        let store = Arc::new(Mutex::new(ResultStore::new()));
        let counters = Arc::new(RunCounters::default());
        let scanner = HostScanner::from_config(Arc::clone(&self.transport), &self.config);

        let mut handles = Vec::with_capacity(workers);
        for _ in 0..workers {
            let queue = Arc::clone(&queue);
            let store = Arc::clone(&store);
            let counters = Arc::clone(&counters);
            let observer = Arc::clone(&self.observer);
            let scanner = scanner.clone();

            handles.push(tokio::spawn(async move {
                loop {
                    // every target is queued before the workers start
                    let next = queue.lock().await.recv().await;
                    let Some(target) = next else { break };

                    let result = scanner.scan(target).await;
                    if result.is_alive() {
                        counters.alive.fetch_add(1, Ordering::Relaxed);
                    }

                    let stored = store.lock().await.insert(result.clone());
                    if stored {
                        observer.host_completed(&result);
                    } else {
                        warn!("Duplicate result for {} ignored", target);
                    }
                    counters.completed.fetch_add(1, Ordering::Relaxed);
                }
            }));
        }

        let ticker = {
            let counters = Arc::clone(&counters);
            let observer = Arc::clone(&self.observer);
            let interval = self.progress_interval;
            tokio::spawn(async move {
                let mut ticks = tokio::time::interval_at(started + interval, interval);
                ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    ticks.tick().await;
                    observer.progress(&counters.snapshot(total, started));
                }
            })
        };

        for handle in handles {
            if let Err(e) = handle.await {
                error!("Discovery worker failed: {}", e);
            }
        }
        ticker.abort();

        let mut results = std::mem::take(&mut *store.lock().await);
        fill_missing(&mut results, &targets);

        let snapshot = counters.snapshot(total, started);
        self.observer.finished(&snapshot);
        Logger::log_scan_complete(snapshot.elapsed, results.len(), total, snapshot.alive);

        results
    }
}

/// Insert an error record for every target a failed worker left behind
fn fill_missing(results: &mut ResultStore, targets: &[Ipv4Addr]) {
    for target in targets {
        if !results.contains(target) {
            warn!("No result recorded for {}, marking as error", target);
            results.insert(HostResult::errored(*target));
        }
    }
}
