//! Core types for fscatalog.
//!
//! This crate provides the pieces every other fscatalog crate builds on:
//! variant resolution for paths, lazily evaluated file nodes with their
//! sampled content hash, the persisted hash index, and configuration.

mod config;
mod error;
pub mod index;
pub mod media;
mod node;
pub mod variant;

pub use config::{CatalogConfig, CatalogConfigBuilder, DEFAULT_CHUNK_SIZE, DEFAULT_KEEP};
pub use error::{CatalogError, ScanWarning, WarningKind};
pub use index::{HashEntry, HashIndex};
pub use media::{FfprobeCommand, MediaProbe, StreamRecord};
pub use node::{ContentHash, FileNode};
pub use variant::{Variant, classify, resolve};
