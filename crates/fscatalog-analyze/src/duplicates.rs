//! Duplicate detection over a directory's hash index.
//!
//! A bucket of the index is reported when it holds more paths than the
//! retention count `keep`. The identity hash samples only the leading bytes
//! and the size, so large files sharing both can be reported together.

use std::fs;
use std::path::PathBuf;

use serde::Serialize;
use tracing::debug;

use fscatalog_core::{CatalogConfig, CatalogError, ContentHash, DEFAULT_KEEP, HashIndex};
use fscatalog_scan::DirectoryNode;

use crate::index::IndexBuilder;

/// A group of files sharing the same identity hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateGroup {
    /// Hash shared by all files in this group.
    pub hash: ContentHash,

    /// Paths to all files in the group, sorted.
    #[serde(serialize_with = "fscatalog_core::index::stored_paths::serialize")]
    pub paths: Vec<PathBuf>,
}

impl DuplicateGroup {
    /// Get the number of files in the group.
    pub fn count(&self) -> usize {
        self.paths.len()
    }

    /// Size of the group's files, read from the first path.
    pub fn file_size(&self) -> Option<u64> {
        let first = self.paths.first()?;
        fs::metadata(first).ok().map(|m| m.len())
    }
}

/// Results from duplicate analysis.
#[derive(Debug, Clone, Serialize)]
pub struct DuplicateReport {
    /// Reported groups, largest first.
    pub groups: Vec<DuplicateGroup>,

    /// Files present in the index.
    pub files_indexed: usize,

    /// Distinct hashes in the index.
    pub buckets: usize,

    /// Retention count used for the report.
    pub keep: usize,

    /// Number of reported groups.
    pub group_count: usize,
}

impl DuplicateReport {
    /// Check if any duplicates were found.
    pub fn has_duplicates(&self) -> bool {
        !self.groups.is_empty()
    }

    /// Get total number of files across all groups.
    pub fn total_duplicate_files(&self) -> usize {
        self.groups.iter().map(DuplicateGroup::count).sum()
    }

    /// Plain path lists, one per group.
    pub fn into_paths(self) -> Vec<Vec<PathBuf>> {
        self.groups.into_iter().map(|g| g.paths).collect()
    }
}

/// Selects index buckets that exceed a retention count.
#[derive(Debug, Clone, Copy)]
pub struct DuplicateDetector {
    keep: usize,
}

impl DuplicateDetector {
    /// Report buckets holding more than `keep` paths.
    pub fn new(keep: usize) -> Self {
        Self { keep }
    }

    /// Retention count.
    pub fn keep(&self) -> usize {
        self.keep
    }

    /// Collect every bucket of `index` with more than `keep` paths.
    pub fn detect(&self, index: &HashIndex) -> DuplicateReport {
        let mut groups: Vec<DuplicateGroup> = index
            .iter()
            .filter(|(_, paths)| paths.len() > self.keep)
            .map(|(hash, paths)| {
                let mut paths = paths.to_vec();
                paths.sort();
                DuplicateGroup { hash: *hash, paths }
            })
            .collect();

        groups.sort_by(|a, b| {
            b.count()
                .cmp(&a.count())
                .then_with(|| a.paths.first().cmp(&b.paths.first()))
        });

        debug!(keep = self.keep, groups = groups.len(), "duplicate buckets selected");

        let group_count = groups.len();
        DuplicateReport {
            groups,
            files_indexed: index.file_count(),
            buckets: index.len(),
            keep: self.keep,
            group_count,
        }
    }
}

impl Default for DuplicateDetector {
    fn default() -> Self {
        Self::new(DEFAULT_KEEP)
    }
}

/// Build (or reuse) the directory's index and report its duplicates.
///
/// `refresh` forces the persisted index to be discarded and every file to be
/// hashed again. The retention count comes from `config.keep`.
pub fn find_duplicates(
    dir: &mut DirectoryNode,
    config: &CatalogConfig,
    refresh: bool,
) -> Result<DuplicateReport, CatalogError> {
    let builder = IndexBuilder::with_config(config.clone());
    let index = builder.build(dir, refresh)?;
    Ok(DuplicateDetector::new(config.keep).detect(index))
}

/// Path groups whose bucket holds more than `keep` files.
///
/// Uses the default chunk size and worker count.
pub fn duplicates(
    dir: &mut DirectoryNode,
    keep: usize,
    refresh: bool,
) -> Result<Vec<Vec<PathBuf>>, CatalogError> {
    let config = CatalogConfig {
        keep,
        ..CatalogConfig::default()
    };
    find_duplicates(dir, &config, refresh).map(DuplicateReport::into_paths)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_with(buckets: &[(u8, &[&str])]) -> HashIndex {
        let mut index = HashIndex::new(4096);
        for (byte, paths) in buckets {
            for path in *paths {
                index.insert(ContentHash::new([*byte; 32]), PathBuf::from(path));
            }
        }
        index
    }

    #[test]
    fn test_detect_respects_keep() {
        let index = index_with(&[
            (1, &["/a", "/b", "/c"]),
            (2, &["/d", "/e"]),
            (3, &["/f"]),
        ]);

        let report = DuplicateDetector::new(2).detect(&index);
        assert_eq!(report.group_count, 1);
        assert_eq!(report.groups[0].count(), 3);

        let report = DuplicateDetector::new(1).detect(&index);
        assert_eq!(report.group_count, 2);
        assert!(report.groups.iter().all(|g| g.count() > 1));

        let report = DuplicateDetector::new(0).detect(&index);
        assert_eq!(report.group_count, 3);
        assert_eq!(report.files_indexed, 6);
        assert_eq!(report.buckets, 3);
    }

    #[test]
    fn test_groups_are_ordered() {
        let index = index_with(&[
            (1, &["/z/1", "/z/2"]),
            (2, &["/b/2", "/b/1"]),
            (3, &["/m/1", "/m/2", "/m/3"]),
        ]);

        let paths = DuplicateDetector::new(1).detect(&index).into_paths();
        assert_eq!(
            paths,
            vec![
                vec![
                    PathBuf::from("/m/1"),
                    PathBuf::from("/m/2"),
                    PathBuf::from("/m/3"),
                ],
                vec![PathBuf::from("/b/1"), PathBuf::from("/b/2")],
                vec![PathBuf::from("/z/1"), PathBuf::from("/z/2")],
            ]
        );
    }

    #[test]
    fn test_empty_index_has_no_duplicates() {
        let report = DuplicateDetector::default().detect(&HashIndex::new(4096));
        assert!(!report.has_duplicates());
        assert_eq!(report.total_duplicate_files(), 0);
        assert_eq!(report.keep, DEFAULT_KEEP);
    }

    #[test]
    fn test_file_size_of_missing_group() {
        let group = DuplicateGroup {
            hash: ContentHash::new([0; 32]),
            paths: vec![PathBuf::from("/definitely/not/here")],
        };
        assert_eq!(group.file_size(), None);
    }
}
