//! Configuration types for dagcopy
//!
//! Type-safe configuration values shared by the config loader and the copy
//! engine.

/// Maximum number of concurrently running copy tasks.
///
/// Non-positive requests fall back to [`Concurrency::DEFAULT`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Concurrency(usize);

impl Concurrency {
    /// Default limit, consistent with dockerd and containerd
    pub const DEFAULT: usize = 3;

    /// Create a concurrency limit, replacing non-positive values with the default
    pub fn new(limit: i64) -> Self {
        if limit <= 0 {
            Self(Self::DEFAULT)
        } else {
            Self(usize::try_from(limit).unwrap_or(usize::MAX))
        }
    }

    /// Get the limit
    pub fn get(self) -> usize {
        self.0
    }
}

impl Default for Concurrency {
    fn default() -> Self {
        Self(Self::DEFAULT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, 3)]
    #[case(-7, 3)]
    #[case(1, 1)]
    #[case(16, 16)]
    fn test_concurrency_limit(#[case] requested: i64, #[case] expected: usize) {
        assert_eq!(Concurrency::new(requested).get(), expected);
    }

    #[test]
    fn test_default_concurrency() {
        assert_eq!(Concurrency::default().get(), Concurrency::DEFAULT);
    }
}
