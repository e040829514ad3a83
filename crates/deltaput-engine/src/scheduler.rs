//! Upload scheduler: a bounded worker pool with retry and backoff
//!
//! Workers share one unbounded queue. A recoverable failure doesn't keep the
//! worker busy: the file is handed to a detached timer task that puts it
//! back on the queue once its backoff has elapsed. Outcomes travel over a
//! channel to [`UploadScheduler::run`], which alone owns the tally and
//! closes the queue once every file has reached a terminal state.

use crate::progress::{FileEvent, Reporter};
use crate::source_file::SourceFile;
use crate::transport::Transport;
use deltaput_config::{Config, RunFlags};
use deltaput_types::{Error, Result, RetryConfig, UploadStats};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Configuration for the upload scheduler
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Number of concurrent workers
    pub workers: usize,
    /// Retry policy for recoverable failures
    pub retry: RetryConfig,
    /// Skip the transport entirely
    pub dry_run: bool,
    /// Deadline for a single transport call
    pub transfer_timeout: Option<Duration>,
}

impl SchedulerConfig {
    /// Create scheduler config from the run configuration
    pub fn from_config(config: &Config, flags: &RunFlags) -> Result<Self> {
        Ok(Self {
            workers: config.workers.get(),
            retry: config.retry.to_retry_config()?,
            dry_run: flags.dry_run,
            transfer_timeout: config.transfer_timeout(),
        })
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: num_cpus::get() * 2,
            retry: RetryConfig::default(),
            dry_run: false,
            transfer_timeout: None,
        }
    }
}

/// Result of draining the work list
#[derive(Debug, Default)]
pub struct Tally {
    /// Files the transport accepted, sorted
    pub completed: Vec<String>,
    /// Files that exhausted their retries or failed permanently, sorted
    pub rejected: Vec<String>,
    /// Counters for the summary
    pub stats: UploadStats,
    /// Set when the pool broke down before every file was resolved
    pub failure: Option<Error>,
}

impl Tally {
    fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Completed { name, bytes } => {
                self.stats.files_uploaded += 1;
                self.stats.bytes_uploaded += bytes;
                self.completed.push(name);
            }
            Outcome::Rejected { name } => {
                self.stats.files_rejected += 1;
                self.rejected.push(name);
            }
            Outcome::Skipped { .. } => self.stats.files_skipped += 1,
            Outcome::Retried { .. } => self.stats.retries += 1,
        }
    }
}

#[derive(Debug)]
enum Outcome {
    Completed { name: String, bytes: u64 },
    Rejected { name: String },
    Skipped { name: String },
    Retried { name: String },
}

impl Outcome {
    fn is_terminal(&self) -> bool {
        !matches!(self, Self::Retried { .. })
    }

    fn name(&self) -> &str {
        match self {
            Self::Completed { name, .. }
            | Self::Rejected { name }
            | Self::Skipped { name }
            | Self::Retried { name } => name,
        }
    }
}

type WorkQueue = Arc<Mutex<mpsc::UnboundedReceiver<Arc<SourceFile>>>>;

/// Drives a list of files through the transport
#[derive(Clone)]
pub struct UploadScheduler {
    config: SchedulerConfig,
    transport: Arc<dyn Transport>,
    reporter: Reporter,
}

impl std::fmt::Debug for UploadScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadScheduler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl UploadScheduler {
    /// Create a new upload scheduler
    pub fn new(config: SchedulerConfig, transport: Arc<dyn Transport>, reporter: Reporter) -> Self {
        Self {
            config,
            transport,
            reporter,
        }
    }

    /// Upload every file and wait until each one is completed or rejected.
    ///
    /// Per-file failures never abort the batch. If the pool itself breaks
    /// down the tally holds whatever was resolved so far, with
    /// [`Tally::failure`] set.
    pub async fn run(&self, files: Vec<SourceFile>) -> Tally {
        let start = Instant::now();
        let mut tally = Tally::default();
        let total = files.len();
        if total == 0 {
            return tally;
        }

        let worker_count = self.config.workers.clamp(1, total);
        info!("Uploading {} files with {} workers", total, worker_count);

        let (work_tx, work_rx) = mpsc::unbounded_channel();
        let (outcome_tx, mut outcome_rx) = mpsc::unbounded_channel();
        for file in files {
            // the receiver is alive, this can't fail
            let _ = work_tx.send(Arc::new(file));
        }

        let queue: WorkQueue = Arc::new(Mutex::new(work_rx));
        let mut workers = JoinSet::new();
        for id in 0..worker_count {
            let worker = Worker {
                id,
                queue: Arc::clone(&queue),
                requeue: work_tx.downgrade(),
                outcomes: outcome_tx.clone(),
                transport: Arc::clone(&self.transport),
                reporter: self.reporter.clone(),
                config: self.config.clone(),
            };
            workers.spawn(worker.run());
        }
        drop(outcome_tx);

        let mut outstanding = total;
        while outstanding > 0 {
            tokio::select! {
                received = outcome_rx.recv() => {
                    let Some(outcome) = received else {
                        tally.failure = Some(Error::scheduler(format!(
                            "workers stopped with {} of {} files unresolved",
                            outstanding, total
                        )));
                        break;
                    };
                    debug!("Outcome for {}: {:?}", outcome.name(), outcome);
                    if outcome.is_terminal() {
                        outstanding -= 1;
                    }
                    tally.record(outcome);
                }
                Some(joined) = workers.join_next() => {
                    // a worker only returns early by dying; its file is lost
                    if let Err(e) = joined {
                        warn!("Upload worker failed: {}", e);
                        tally.failure = Some(Error::scheduler(format!(
                            "worker failed with {} of {} files unresolved: {}",
                            outstanding, total, e
                        )));
                        workers.abort_all();
                        break;
                    }
                }
            }
        }

        // closing the queue lets idle workers exit
        drop(work_tx);
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(()) => {}
                Err(e) if e.is_cancelled() => {}
                Err(e) => {
                    warn!("Upload worker failed: {}", e);
                    if tally.failure.is_none() {
                        tally.failure = Some(Error::scheduler(format!("worker failed: {}", e)));
                    }
                }
            }
        }
        // uploads that finished before the pool broke still count
        while let Ok(outcome) = outcome_rx.try_recv() {
            if outcome.is_terminal() {
                tally.record(outcome);
            }
        }

        tally.completed.sort();
        tally.rejected.sort();
        tally.stats.duration = start.elapsed();
        info!(
            "Upload finished: {} completed, {} rejected, {} retries in {:?}",
            tally.stats.files_uploaded,
            tally.stats.files_rejected,
            tally.stats.retries,
            tally.stats.duration
        );
        tally
    }
}

struct Worker {
    id: usize,
    queue: WorkQueue,
    requeue: mpsc::WeakUnboundedSender<Arc<SourceFile>>,
    outcomes: mpsc::UnboundedSender<Outcome>,
    transport: Arc<dyn Transport>,
    reporter: Reporter,
    config: SchedulerConfig,
}

impl Worker {
    async fn run(self) {
        debug!("Worker {} started", self.id);
        loop {
            let next = self.queue.lock().await.recv().await;
            let Some(file) = next else {
                break;
            };

            let outcome = self.process(file).await;
            if self.outcomes.send(outcome).is_err() {
                break;
            }
        }
        debug!("Worker {} stopped", self.id);
    }

    async fn process(&self, file: Arc<SourceFile>) -> Outcome {
        let name = file.name().to_string();

        if self.config.dry_run {
            self.reporter.file_event(&name, FileEvent::WouldUpload, None);
            return Outcome::Skipped { name };
        }

        match self.attempt(&file).await {
            Ok(bytes) => {
                self.reporter.file_event(&name, FileEvent::Uploaded, None);
                Outcome::Completed { name, bytes }
            }
            Err(error) => {
                let attempts = file.record_attempt();
                let detail = error.to_string();

                if error.is_recoverable() && file.retriable() {
                    let delay = self.config.retry.delay_for_attempt(attempts);
                    warn!(
                        "Retrying {} in {:?} after attempt {}: {}",
                        name, delay, attempts, detail
                    );
                    self.reporter
                        .file_event(&name, FileEvent::Retry, Some(&detail));
                    self.schedule_retry(file, delay);
                    Outcome::Retried { name }
                } else {
                    warn!("Rejected {} after {} attempts: {}", name, attempts, detail);
                    self.reporter
                        .file_event(&name, FileEvent::Rejected, Some(&detail));
                    Outcome::Rejected { name }
                }
            }
        }
    }

    /// Read the body and hand it to the transport; returns the body size
    async fn attempt(&self, file: &SourceFile) -> Result<u64> {
        let body = file.body().await?;
        let size = body.len() as u64;

        let put = self.transport.put(file, body);
        match self.config.transfer_timeout {
            Some(limit) => tokio::time::timeout(limit, put)
                .await
                .map_err(|_| Error::Timeout {
                    millis: limit.as_millis() as u64,
                })??,
            None => put.await?,
        }

        Ok(size)
    }

    /// Re-enqueue `file` after `delay` without holding this worker
    fn schedule_retry(&self, file: Arc<SourceFile>, delay: Duration) {
        let requeue = self.requeue.clone();
        let outcomes = self.outcomes.clone();

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let sent = requeue
                .upgrade()
                .is_some_and(|queue| queue.send(Arc::clone(&file)).is_ok());
            if !sent {
                let _ = outcomes.send(Outcome::Rejected {
                    name: file.name().to_string(),
                });
            }
        });
    }
}
