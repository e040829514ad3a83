//! Run orchestration: hash, diff, upload, cache

use crate::{
    headers::HeaderResolver,
    progress::Reporter,
    scheduler::{SchedulerConfig, Tally, UploadScheduler},
    source_file::SourceFile,
    transport::Transport,
};
use deltaput_config::{Config, RunFlags};
use deltaput_sync::{CacheWriter, DiffEngine, DiffSet, Snapshot};
use deltaput_types::{Result, RunId, UploadStats};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// What a run found to do, before anything is sent
#[derive(Debug, Clone)]
pub struct Plan {
    /// Hashes of the source tree as it is now
    pub current: Snapshot,
    /// Paths that changed since the cached snapshot
    pub diff: DiffSet,
}

/// Summary of a run that had work to do
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Identifier of this run, for log correlation
    pub run_id: RunId,
    /// Number of changed files
    pub diff_size: usize,
    /// Files that reached the store
    pub completed: Vec<String>,
    /// Files that will be retried on the next run
    pub rejected: Vec<String>,
    /// Whether the upload phase ran
    pub uploaded: bool,
    /// Whether the run was a dry run
    pub dry_run: bool,
    /// Whether the cache file was rewritten
    pub cache_written: bool,
    /// Upload counters
    pub stats: UploadStats,
    /// Wall time of the whole run
    pub elapsed: Duration,
}

/// Final state of a run
#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// The source tree matches the cache
    NothingToDo,
    /// Something was (or would have been) uploaded
    Finished(RunReport),
}

/// Incremental upload engine
pub struct UploadEngine {
    config: Arc<Config>,
    flags: RunFlags,
    resolver: HeaderResolver,
    scheduler: UploadScheduler,
    reporter: Reporter,
}

impl std::fmt::Debug for UploadEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadEngine")
            .field("config", &self.config)
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}

impl UploadEngine {
    /// Create an engine; fails if the header rules or retry policy are invalid
    pub fn new(
        config: Config,
        flags: RunFlags,
        transport: Arc<dyn Transport>,
        reporter: Reporter,
    ) -> Result<Self> {
        let resolver = HeaderResolver::from_config(&config)?;
        let scheduler_config = SchedulerConfig::from_config(&config, &flags)?;
        let scheduler = UploadScheduler::new(scheduler_config, transport, reporter.clone());

        info!(
            "Upload engine ready for bucket '{}' from '{}'",
            config.bucket,
            config.source.display()
        );

        Ok(Self {
            config: Arc::new(config),
            flags,
            resolver,
            scheduler,
            reporter,
        })
    }

    /// Get the current configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Hash the source tree and diff it against the cache
    pub async fn plan(&self) -> Result<Plan> {
        let current = Snapshot::build(&self.config.source).await?;
        let cached = Snapshot::load(&self.config.cache_file).await?;
        let diff = DiffEngine::new().diff(&current, &cached);
        Ok(Plan { current, diff })
    }

    /// Upload what `plan` found and rewrite the cache
    pub async fn execute(&self, plan: Plan) -> Result<RunOutcome> {
        let start = Instant::now();
        let Plan { current, diff } = plan;

        if diff.is_empty() {
            self.reporter.phase("Nothing to upload.");
            return Ok(RunOutcome::NothingToDo);
        }

        let run_id = RunId::new_v4();
        info!("Run {}: {} files changed", run_id, diff.len());

        let uploaded = self.flags.do_upload;
        let tally = if uploaded {
            self.upload(&diff).await
        } else {
            self.reporter.phase("Skipping upload");
            Tally::default()
        };

        let next = if uploaded {
            CacheWriter::finalize(&current, &diff, tally.completed.iter().map(String::as_str))
        } else {
            current
        };

        let writer = CacheWriter::new(&self.config.cache_file, self.flags.writes_cache());
        let cache_result = writer.persist(&next).await;

        // a broken pool outranks a cache failure, but the cache was still attempted
        if let Some(failure) = tally.failure {
            if let Err(e) = &cache_result {
                warn!("Cache not saved after scheduler failure: {}", e);
            }
            return Err(failure);
        }
        let cache_written = cache_result?;

        Ok(RunOutcome::Finished(RunReport {
            run_id,
            diff_size: diff.len(),
            completed: tally.completed,
            rejected: tally.rejected,
            uploaded,
            dry_run: self.flags.dry_run,
            cache_written,
            stats: tally.stats,
            elapsed: start.elapsed(),
        }))
    }

    /// Plan and execute in one go
    pub async fn run(&self) -> Result<RunOutcome> {
        let plan = self.plan().await?;
        self.execute(plan).await
    }

    async fn upload(&self, diff: &DiffSet) -> Tally {
        let max_attempts = self.config.retry.max_attempts;
        let files: Vec<SourceFile> = diff
            .paths()
            .map(|name| SourceFile::new(&self.config.source, name, &self.resolver, max_attempts))
            .collect();

        self.reporter
            .phase(&format!("Uploading {} files", files.len()));
        let tally = self.scheduler.run(files).await;
        self.reporter.finish_line();
        tally
    }
}
