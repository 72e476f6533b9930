//! Directory object model for fscatalog.
//!
//! A [`DirectoryNode`] walks its subtree on first access, resolving every
//! entry to a [`Node`] through the variant resolver, and keeps the result
//! until explicitly refreshed. Walks are serial; metadata calls are cheap
//! and parallelism is reserved for hashing.
//!
//! # Example
//!
//! ```rust,no_run
//! use fscatalog_scan::{DirectoryNode, Variant};
//!
//! let dir = DirectoryNode::open("/path/to/photos").unwrap();
//! println!("{} files, {} bytes", dir.file_children().len(), dir.size());
//!
//! for image in dir.files_of(Variant::Image) {
//!     println!("{}", image.path().display());
//! }
//! ```
//!
//! Entries that cannot be read are skipped and reported through
//! [`DirectoryNode::warnings`].

mod directory;

pub use directory::{DirectoryFingerprint, DirectoryNode, DirectorySummary, Node};

// Re-export core types for convenience
pub use fscatalog_core::{
    CatalogConfig, CatalogError, ContentHash, FileNode, HashIndex, ScanWarning, Variant,
    WarningKind,
};
