//! deltaput - incremental static site uploader
//!
//! Hashes a local directory, compares it with the hashes saved by the
//! previous run and uploads only what changed to an S3-style object store.

mod display;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use deltaput_config::{ConfigLoader, ConfigOverrides, RunFlags};
use deltaput_engine::{transport, Reporter, RunOutcome, UploadEngine};
use deltaput_types::{ErrorKind, Verbosity, WorkerCount};
use display::{create_analysis_spinner, display_error, display_report, display_success};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;

/// deltaput - upload only what changed
#[derive(Parser, Debug)]
#[command(
    name = "deltaput",
    version = env!("CARGO_PKG_VERSION"),
    about = "Incrementally upload a directory to an S3-style bucket",
    long_about = "deltaput hashes every file under the source directory, diffs the result\n\
                  against the cache file written by the previous run and uploads only new\n\
                  or changed files, gzipping and tagging them according to header rules."
)]
struct Cli {
    /// Number of concurrent uploads [default: 2 x CPU cores]
    #[arg(short, long)]
    workers: Option<usize>,

    /// Target bucket name
    #[arg(short, long)]
    bucket: Option<String>,

    /// Directory to upload [default: output]
    #[arg(short, long)]
    source: Option<PathBuf>,

    /// Hash cache file [default: .deltaput.txt]
    #[arg(long = "cachefile")]
    cache_file: Option<PathBuf>,

    /// Target region [default: us-east-1]
    #[arg(short, long)]
    region: Option<String>,

    /// AWS credentials profile; with --endpoint also selects DELTAPUT_<PROFILE>_TOKEN
    #[arg(short, long)]
    profile: Option<String>,

    /// Object store URL; file://<dir> writes to a local directory
    #[arg(long)]
    endpoint: Option<String>,

    /// Per-upload timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Show what would be uploaded without uploading or caching
    #[arg(long, visible_alias = "dry-run")]
    dry: bool,

    /// One line per file
    #[arg(short, long)]
    verbose: bool,

    /// Only warnings and errors
    #[arg(short, long)]
    quiet: bool,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Perform the upload phase
    #[arg(long, action = ArgAction::Set, default_value_t = true)]
    upload: bool,

    /// Rewrite the cache file at the end of the run
    #[arg(long, action = ArgAction::Set, default_value_t = true)]
    cache: bool,

    /// Gzip files whose header rules ask for it
    #[arg(long, action = ArgAction::Set)]
    gzip: Option<bool>,

    /// Request server-side encryption
    #[arg(long)]
    encrypt: bool,

    /// Configuration file (JSON, YAML or TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write the effective configuration back to --config
    #[arg(long)]
    save_config: bool,
}

/// Process exit codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    Success = 0,
    SetupFailed = 1,
    AuthError = 2,
    CmdLineOptionError = 3,
    CachingFailure = 4,
}

impl Exit {
    fn for_kind(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::Auth => Self::AuthError,
            ErrorKind::Config => Self::CmdLineOptionError,
            ErrorKind::Cache => Self::CachingFailure,
            _ => Self::SetupFailed,
        }
    }
}

impl From<Exit> for ExitCode {
    fn from(exit: Exit) -> Self {
        Self::from(exit as u8)
    }
}

/// A fatal outcome and the exit code it maps to
struct Failure {
    exit: Exit,
    error: anyhow::Error,
}

impl Failure {
    fn new(exit: Exit, error: impl Into<anyhow::Error>) -> Self {
        Self {
            exit,
            error: error.into(),
        }
    }
}

impl From<deltaput_types::Error> for Failure {
    fn from(error: deltaput_types::Error) -> Self {
        Self::new(Exit::for_kind(error.kind()), error)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                Exit::CmdLineOptionError.into()
            } else {
                Exit::Success.into()
            };
        }
    };

    if let Err(e) = init_logging(cli.debug, cli.quiet, cli.verbose) {
        display_error(&format!("{:#}", e));
        return Exit::SetupFailed.into();
    }

    info!("deltaput v{} starting", env!("CARGO_PKG_VERSION"));

    match run(cli).await {
        Ok(()) => Exit::Success.into(),
        Err(failure) => {
            display_error(&format!("{:#}", failure.error));
            failure.exit.into()
        }
    }
}

fn init_logging(debug: bool, quiet: bool, verbose: bool) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let level = if debug {
        "debug"
    } else if verbose {
        "info"
    } else if quiet {
        "error"
    } else {
        "warn"
    };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .context("invalid log filter")?;

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install logger: {}", e))?;

    Ok(())
}

fn overrides(cli: &Cli) -> std::result::Result<ConfigOverrides, Failure> {
    let workers = cli
        .workers
        .map(WorkerCount::new)
        .transpose()
        .map_err(|e| Failure::new(Exit::CmdLineOptionError, anyhow::anyhow!(e)))?;

    Ok(ConfigOverrides {
        workers,
        bucket: cli.bucket.clone(),
        source: cli.source.clone(),
        cache_file: cli.cache_file.clone(),
        region: cli.region.clone(),
        profile: cli.profile.clone(),
        endpoint: cli.endpoint.clone(),
        encrypt: cli.encrypt,
        gzip: cli.gzip,
        transfer_timeout_secs: cli.timeout,
    })
}

async fn run(cli: Cli) -> std::result::Result<(), Failure> {
    let flags = RunFlags {
        dry_run: cli.dry,
        verbose: cli.verbose,
        quiet: cli.quiet,
        do_upload: cli.upload,
        do_cache: cli.cache,
        save_config: cli.save_config,
        config_file: cli.config.clone(),
    };
    let verbosity = flags.verbosity();

    let mut config = ConfigLoader::load(flags.config_file.as_deref())
        .map_err(|e| Failure::new(Exit::CmdLineOptionError, e))?;
    config.merge(overrides(&cli)?);

    if flags.save_config {
        let path = flags.config_file.as_deref().ok_or_else(|| {
            Failure::new(
                Exit::CmdLineOptionError,
                anyhow::anyhow!("--save-config needs --config <file>"),
            )
        })?;
        ConfigLoader::save_to_file(&config, path)
            .with_context(|| format!("failed to save config to '{}'", path.display()))
            .map_err(|e| Failure::new(Exit::SetupFailed, e))?;
        info!("Saved configuration to '{}'", path.display());
    }

    config
        .validate_for_run()
        .map_err(|e| Failure::new(Exit::CmdLineOptionError, e))?;

    let transport = transport::for_run(&config, &flags)?;
    let reporter = Reporter::stdout(verbosity);
    let engine = UploadEngine::new(config, flags.clone(), transport, reporter)?;

    let plan = if verbosity == Verbosity::Normal {
        let spinner = create_analysis_spinner("Hashing files...");
        let plan = engine.plan().await;
        spinner.finish_and_clear();
        plan?
    } else {
        engine.plan().await?
    };

    match engine.execute(plan).await? {
        RunOutcome::NothingToDo => {}
        RunOutcome::Finished(report) => {
            display_report(&report, verbosity);
            if report.rejected.is_empty() && verbosity != Verbosity::Quiet && !report.dry_run {
                display_success("All changed files are up to date");
            }
        }
    }

    Ok(())
}
