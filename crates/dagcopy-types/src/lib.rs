//! Core type system and error handling for dagcopy
//!
//! This crate provides the foundational types shared by every dagcopy crate:
//!
//! - **Content identity**: [`Digest`], [`Descriptor`] and well-known media types
//! - **Error handling**: a single [`Error`] enum with kinds
//! - **Traits**: async storage ([`ReadOnlyStorage`], [`Storage`], [`Target`])
//!   and down-edge discovery ([`EdgeFinder`])
//! - **Configuration**: validated values such as [`Concurrency`]
//!
//! # Features
//!
//! - `serde`: Enable serialization support (OCI JSON field names)
//!
//! # Examples
//!
//! ```rust
//! use dagcopy_types::{media_type, Descriptor, Digest};
//!
//! let layer = Descriptor::from_bytes(media_type::OCI_LAYER_GZIP, b"hello");
//! assert_eq!(layer.size, 5);
//! assert_eq!(layer.digest, Digest::sha256(b"hello"));
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod descriptor;
pub mod error;
pub mod result;
pub mod traits;
pub mod types;

// Re-export commonly used types
pub use config::Concurrency;
pub use descriptor::{media_type, Descriptor, Digest};
pub use error::{Error, ErrorKind, HookStage};
pub use result::Result;
pub use traits::*;
pub use types::*;
