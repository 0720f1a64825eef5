//! Result type alias for dagcopy operations

use crate::Error;

/// Result type alias for dagcopy operations
pub type Result<T> = std::result::Result<T, Error>;
