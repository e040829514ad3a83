//! deltaput integration test suite
//!
//! Cross-crate scenarios live in `tests/`; this library holds the fixtures
//! they share.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Site fixtures and fake transports
pub mod test_utils;
