//! Shared data types for dagcopy

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Copy statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CopyStats {
    /// Number of nodes transferred to the destination, including pushes the
    /// destination answered with "already exists"
    pub nodes_copied: u64,
    /// Number of nodes found already present at the destination
    pub nodes_skipped: u64,
    /// Total bytes transferred
    pub bytes_copied: u64,
    /// Total duration of the operation
    pub duration: Duration,
}

impl CopyStats {
    /// Create a new empty statistics instance
    pub fn new() -> Self {
        Self::default()
    }
}
