//! Incremental upload engine for deltaput
//!
//! This crate turns a diff into uploads:
//!
//! - **Header resolution**: ordered pattern rules decide caching, gzip and
//!   encryption headers for each file
//! - **Source files**: the unit of work, with its body producer and a
//!   lock-guarded attempt counter
//! - **Scheduling**: a bounded worker pool with exponential backoff that
//!   never holds a worker while a retry waits
//! - **Transports**: SigV4-signed S3 `PUT` or a local directory store
//! - **Orchestration**: hash, diff, upload and cache in one run
//!
//! # Examples
//!
//! ```rust,no_run
//! use deltaput_config::{Config, RunFlags};
//! use deltaput_engine::{DirectoryTransport, Reporter, RunOutcome, UploadEngine};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config {
//!     bucket: "static.example.com".to_string(),
//!     ..Config::default()
//! };
//! let engine = UploadEngine::new(
//!     config,
//!     RunFlags::default(),
//!     Arc::new(DirectoryTransport::new("/tmp/store")),
//!     Reporter::silent(),
//! )?;
//! if let RunOutcome::Finished(report) = engine.run().await? {
//!     println!("Uploaded {} files", report.completed.len());
//! }
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod engine;
pub mod headers;
pub mod progress;
pub mod scheduler;
pub mod signing;
pub mod source_file;
pub mod transport;

pub use engine::{Plan, RunOutcome, RunReport, UploadEngine};
pub use headers::{content_type, HeaderResolver, HeaderRule, HeaderSet};
pub use progress::{FileEvent, Reporter};
pub use scheduler::{SchedulerConfig, Tally, UploadScheduler};
pub use signing::{AwsCredentials, SigV4Signer};
pub use source_file::SourceFile;
pub use transport::{
    Credentials, DirectoryTransport, HttpTransport, OfflineTransport, Transport,
};
