//! Result type alias for deltaput operations

use crate::Error;

/// Result type alias for deltaput operations
pub type Result<T> = std::result::Result<T, Error>;
