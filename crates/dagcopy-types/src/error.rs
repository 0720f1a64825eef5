//! Error types and handling for dagcopy
//!
//! Every fallible operation in the workspace reports a single [`Error`]. The
//! copy engine treats all variants as fatal for the whole copy except
//! [`Error::AlreadyExists`], which a destination push reports when the digest
//! is already stored and which the transfer absorbs as success.

use std::fmt;

/// Copy stage at which a user-supplied hook failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum HookStage {
    /// Runs right before a node is transferred
    PreCopy,
    /// Runs right after a node was transferred
    PostCopy,
    /// Runs when a node is already present at the destination
    Skipped,
}

impl fmt::Display for HookStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PreCopy => "pre-copy",
            Self::PostCopy => "post-copy",
            Self::Skipped => "skipped",
        };
        f.write_str(name)
    }
}

/// Main error type for dagcopy operations
#[derive(thiserror::Error, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Error {
    /// Requested content or reference does not exist
    #[error("not found: {what}")]
    NotFound {
        /// Digest or reference that was looked up
        what: String,
    },

    /// Content with this digest is already stored
    #[error("already exists: {digest}")]
    AlreadyExists {
        /// Digest of the content
        digest: String,
    },

    /// Malformed digest string
    #[error("invalid digest {value:?}: {reason}")]
    InvalidDigest {
        /// The offending input
        value: String,
        /// Why it was rejected
        reason: String,
    },

    /// Manifest or index bytes could not be parsed
    #[error("invalid manifest {digest}: {message}")]
    Manifest {
        /// Digest of the node being parsed
        digest: String,
        /// Parser message
        message: String,
    },

    /// Content does not match its descriptor
    #[error("content verification failed for {digest}: {message}")]
    Verification {
        /// Digest the content was read under
        digest: String,
        /// What did not match
        message: String,
    },

    /// Internal consistency check failed
    #[error("internal invariant violated: {message}")]
    Invariant {
        /// What was found inconsistent
        message: String,
    },

    /// I/O operation failed
    #[error("I/O error: {message}")]
    Io {
        /// Error message from the I/O operation
        message: String,
    },

    /// Storage backend reported a transport failure
    #[error("storage error: {message}")]
    Storage {
        /// Backend message
        message: String,
    },

    /// A user-supplied hook failed
    #[error("{stage} hook failed: {message}")]
    Hook {
        /// Which hook failed
        stage: HookStage,
        /// Hook message
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message describing the configuration issue
        message: String,
    },

    /// Operation cancelled
    #[error("Operation cancelled")]
    Cancelled,

    /// Generic error with custom message
    #[error("{message}")]
    Other {
        /// Custom error message
        message: String,
    },
}

/// Error kind for categorizing errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing content or reference
    NotFound,
    /// Benign duplicate push
    AlreadyExists,
    /// Malformed input data (digests, manifests)
    InvalidData,
    /// Internal invariant violation
    Invariant,
    /// I/O and transport errors
    Io,
    /// User hook errors
    Hook,
    /// Configuration errors
    Config,
    /// Cancellation
    Cancelled,
    /// Other errors
    Other,
}

impl Error {
    /// Get the error kind
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Self::InvalidDigest { .. } | Self::Manifest { .. } | Self::Verification { .. } => {
                ErrorKind::InvalidData
            }
            Self::Invariant { .. } => ErrorKind::Invariant,
            Self::Io { .. } | Self::Storage { .. } => ErrorKind::Io,
            Self::Hook { .. } => ErrorKind::Hook,
            Self::Config { .. } => ErrorKind::Config,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Other { .. } => ErrorKind::Other,
        }
    }

    /// Check if this is the benign "content already exists" condition
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    /// Check if this is a not-found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this is a cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Create a new not-found error
    pub fn not_found<S: Into<String>>(what: S) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Create a new already-exists error
    pub fn already_exists<S: Into<String>>(digest: S) -> Self {
        Self::AlreadyExists {
            digest: digest.into(),
        }
    }

    /// Create a new manifest parse error
    pub fn manifest<D: Into<String>, S: Into<String>>(digest: D, message: S) -> Self {
        Self::Manifest {
            digest: digest.into(),
            message: message.into(),
        }
    }

    /// Create a new content verification error
    pub fn verification<D: Into<String>, S: Into<String>>(digest: D, message: S) -> Self {
        Self::Verification {
            digest: digest.into(),
            message: message.into(),
        }
    }

    /// Create a new invariant violation error
    pub fn invariant<S: Into<String>>(message: S) -> Self {
        Self::Invariant {
            message: message.into(),
        }
    }

    /// Create a new storage error
    pub fn storage<S: Into<String>>(message: S) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Create a new hook error
    pub fn hook<S: Into<String>>(stage: HookStage, message: S) -> Self {
        Self::Hook {
            stage,
            message: message.into(),
        }
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new generic error
    pub fn other<S: Into<String>>(message: S) -> Self {
        Self::Other {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Self::Io {
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn test_error_kind_consistency(message in ".*") {
            let errors = vec![
                Error::not_found(message.clone()),
                Error::already_exists(message.clone()),
                Error::invariant(message.clone()),
                Error::storage(message.clone()),
                Error::hook(HookStage::PreCopy, message.clone()),
                Error::config(message.clone()),
                Error::other(message.clone()),
            ];

            for error in errors {
                let kind = error.kind();
                match error {
                    Error::NotFound { .. } => prop_assert_eq!(kind, ErrorKind::NotFound),
                    Error::AlreadyExists { .. } => prop_assert_eq!(kind, ErrorKind::AlreadyExists),
                    Error::Invariant { .. } => prop_assert_eq!(kind, ErrorKind::Invariant),
                    Error::Storage { .. } => prop_assert_eq!(kind, ErrorKind::Io),
                    Error::Hook { .. } => prop_assert_eq!(kind, ErrorKind::Hook),
                    Error::Config { .. } => prop_assert_eq!(kind, ErrorKind::Config),
                    Error::Other { .. } => prop_assert_eq!(kind, ErrorKind::Other),
                    _ => {}
                }
            }
        }
    }

    #[test]
    fn test_already_exists_predicate() {
        assert!(Error::already_exists("sha256:aa").is_already_exists());
        assert!(!Error::not_found("sha256:aa").is_already_exists());
        assert!(Error::not_found("latest").is_not_found());
        assert!(Error::Cancelled.is_cancelled());
    }

    #[test]
    fn test_hook_error_message() {
        let error = Error::hook(HookStage::PostCopy, "disk full");
        assert_eq!(error.to_string(), "post-copy hook failed: disk full");
        assert_eq!(error.kind(), ErrorKind::Hook);
    }

    #[test]
    fn test_verification_is_invalid_data() {
        let error = Error::verification("sha256:aa", "expected 4 bytes, read 2");
        assert_eq!(error.kind(), ErrorKind::InvalidData);
        assert!(error.to_string().contains("expected 4 bytes"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short read");
        let error = Error::from(io_error);

        assert_eq!(error.kind(), ErrorKind::Io);
        assert!(error.to_string().contains("short read"));
    }
}
