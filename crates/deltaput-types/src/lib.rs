//! Core type system and error handling for deltaput
//!
//! This crate provides the foundational types shared by every deltaput crate:
//!
//! - **Error handling**: [`Error`] with kinds and the recoverable
//!   transport-error allow-list
//! - **Configuration values**: validated [`WorkerCount`] and [`RetryConfig`]
//! - **Core types**: [`Verbosity`] and [`UploadStats`]
//!
//! # Features
//!
//! - `std` (default): Enable standard library features
//! - `serde`: Enable serialization support
//!
//! # Examples
//!
//! ```rust
//! use deltaput_types::{Error, RetryConfig};
//! use std::time::Duration;
//!
//! let retry = RetryConfig::default();
//! assert_eq!(retry.delay_for_attempt(1), Duration::from_millis(200));
//! assert!(Error::transport("write tcp: broken pipe").is_recoverable());
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod result;
pub mod types;

// Re-export commonly used types
pub use config::{RetryConfig, WorkerCount};
pub use error::{is_recoverable_message, Error, ErrorKind, RECOVERABLE_ERROR_SUFFIXES};
pub use result::Result;
pub use types::*;
