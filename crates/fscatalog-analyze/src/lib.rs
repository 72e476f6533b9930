//! Hashing and duplicate analysis for fscatalog.
//!
//! - **Index building** - hash every file under a directory in parallel and
//!   persist the hash-to-paths mapping next to it
//! - **Duplicate detection** - report index buckets above a retention count
//!
//! # Duplicate Detection
//!
//! ```rust,no_run
//! use fscatalog_analyze::duplicates;
//! use fscatalog_scan::DirectoryNode;
//!
//! let mut dir = DirectoryNode::open("/path/to/photos").unwrap();
//! for group in duplicates(&mut dir, 1, false).unwrap() {
//!     println!("{} copies: {:?}", group.len(), group);
//! }
//! ```
//!
//! The first call hashes every file and writes `.fscatalog-<name>.json`
//! into the directory. Later calls reuse that file until `refresh` is set.

mod duplicates;
mod executor;
mod index;

pub use duplicates::{
    DuplicateDetector, DuplicateGroup, DuplicateReport, duplicates, find_duplicates,
};
pub use executor::{ExecutionStats, ParallelExecutor};
pub use index::{HashProgress, IndexBuilder};

// Re-export core types
pub use fscatalog_core::{ContentHash, FileNode, HashIndex};
