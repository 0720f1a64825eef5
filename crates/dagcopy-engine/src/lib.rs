//! Concurrent copy engine for content-addressed DAGs
//!
//! This crate copies a rooted graph of content-addressed nodes (OCI images,
//! indexes, artifacts and their blobs) from a source store to a destination
//! store.
//!
//! # Features
//!
//! - **Post-order transfers**: a node reaches the destination only after all
//!   of its children did, so the destination never holds dangling references
//! - **Deduplication**: shared subtrees are fetched and pushed once, no matter
//!   how many parents reach them concurrently
//! - **Skip existing**: nodes already at the destination are neither fetched
//!   nor traversed
//! - **Bounded concurrency**: at most [`CopyGraphOptions::concurrency`] node
//!   steps run at once
//! - **Fail fast**: the first error cancels everything still running
//!
//! # Examples
//!
//! ```rust
//! use dagcopy_content::Memory;
//! use dagcopy_engine::{copy_graph, CopyGraphOptions};
//! use dagcopy_types::{media_type, Descriptor};
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let src = Arc::new(Memory::new());
//! let dst = Arc::new(Memory::new());
//! let layer = Descriptor::from_bytes(media_type::OCI_LAYER_GZIP, b"layer");
//! src.push_bytes(&layer, b"layer".to_vec()).await?;
//!
//! let stats = copy_graph(src, dst.clone(), layer.clone(), CopyGraphOptions::new()).await?;
//! assert_eq!(stats.nodes_copied, 1);
//! assert!(dst.get(&layer).await.is_some());
//! # Ok::<(), dagcopy_types::Error>(())
//! # });
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod copy;
pub mod dispatch;
pub mod monitor;
pub mod options;
pub mod status;

pub use copy::{copy, copy_graph};
pub use dispatch::{dispatch, LimitRegion, Visit, VisitHandler};
pub use monitor::StatisticsCollector;
pub use options::{CopyGraphOptions, CopyOptions, Hook, RootFilter};
pub use status::{Completion, Tracker};
