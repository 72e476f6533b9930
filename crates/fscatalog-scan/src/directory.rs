//! Directory nodes with lazily walked, cached subtrees.

use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::SystemTime;

use compact_str::CompactString;
use jwalk::{Parallelism, WalkDir};
use serde::Serialize;
use tracing::{debug, warn};

use fscatalog_core::{
    CatalogConfig, CatalogError, FileNode, HashIndex, ScanWarning, Variant, WarningKind, classify,
};

/// A catalogued path: either a leaf file or a directory.
#[derive(Debug)]
pub enum Node {
    File(FileNode),
    Directory(DirectoryNode),
}

impl Node {
    /// Absolute path of the node.
    pub fn path(&self) -> &Path {
        match self {
            Node::File(file) => file.path(),
            Node::Directory(dir) => dir.path(),
        }
    }

    /// Variant fixed when the node was created.
    pub fn variant(&self) -> Variant {
        match self {
            Node::File(file) => file.variant(),
            Node::Directory(_) => Variant::Directory,
        }
    }

    /// Check if this node is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self, Node::Directory(_))
    }

    pub fn as_file(&self) -> Option<&FileNode> {
        match self {
            Node::File(file) => Some(file),
            Node::Directory(_) => None,
        }
    }

    pub fn as_directory(&self) -> Option<&DirectoryNode> {
        match self {
            Node::Directory(dir) => Some(dir),
            Node::File(_) => None,
        }
    }

    /// Size in bytes; aggregated for directories.
    pub fn size(&self) -> Result<u64, CatalogError> {
        match self {
            Node::File(file) => file.size(),
            Node::Directory(dir) => Ok(dir.size()),
        }
    }
}

/// Result of one recursive walk.
#[derive(Debug, Default)]
struct Walk {
    nodes: Vec<Node>,
    warnings: Vec<ScanWarning>,
}

/// Structural identity of a directory.
///
/// Two directories compare equal when their top-level listing, emptiness and
/// relative subdirectory layout match. File contents are not compared.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DirectoryFingerprint {
    pub listing: Vec<CompactString>,
    pub is_empty: bool,
    pub subdirectories: Vec<PathBuf>,
}

/// Overview of a directory's contents.
#[derive(Debug, Clone, Serialize)]
pub struct DirectorySummary {
    pub path: PathBuf,
    pub file_count: usize,
    pub dir_count: usize,
    pub total_size: u64,
    pub variants: BTreeMap<Variant, usize>,
    pub warnings: usize,
}

/// A directory in the catalog.
///
/// The full recursive listing is produced on first access and cached until
/// [`DirectoryNode::refresh`] is called. Each directory owns its own hash
/// index, loaded from disk when the node is created.
#[derive(Debug)]
pub struct DirectoryNode {
    path: PathBuf,
    include_hidden: bool,
    walk: OnceLock<Walk>,
    size: OnceLock<u64>,
    index: Option<HashIndex>,
}

impl DirectoryNode {
    /// Open an existing directory with default settings.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        Self::with_config(path, &CatalogConfig::default())
    }

    /// Open an existing directory.
    ///
    /// Fails with `NotFound` when the path is missing and `NotADirectory`
    /// when it is a file. A persisted index that cannot be read is logged
    /// and ignored.
    pub fn with_config(
        path: impl AsRef<Path>,
        config: &CatalogConfig,
    ) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let path = path.canonicalize().map_err(|e| CatalogError::io(path, e))?;
        let metadata = std::fs::metadata(&path).map_err(|e| CatalogError::io(&path, e))?;
        if !metadata.is_dir() {
            return Err(CatalogError::NotADirectory { path });
        }
        Ok(Self::from_walk(path, config.include_hidden))
    }

    fn from_walk(path: PathBuf, include_hidden: bool) -> Self {
        let index = load_index(&path);
        Self {
            path,
            include_hidden,
            walk: OnceLock::new(),
            size: OnceLock::new(),
            index,
        }
    }

    /// Absolute path of this directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory name.
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.to_string_lossy().into_owned())
    }

    /// Every descendant, files and directories, at any depth.
    ///
    /// Walked once and cached. Subdirectories are fresh nodes that walk
    /// their own subtree when asked.
    pub fn children(&self) -> &[Node] {
        &self.walk().nodes
    }

    /// Descendants that are not directories.
    pub fn file_children(&self) -> Vec<&FileNode> {
        self.children().iter().filter_map(Node::as_file).collect()
    }

    /// Descendant directories.
    pub fn subdirectories(&self) -> Vec<&DirectoryNode> {
        self.children().iter().filter_map(Node::as_directory).collect()
    }

    /// Descendant files of one variant.
    pub fn files_of(&self, variant: Variant) -> Vec<&FileNode> {
        self.children()
            .iter()
            .filter_map(Node::as_file)
            .filter(|file| file.variant() == variant)
            .collect()
    }

    /// Descendant files with their access time, most recently read first.
    ///
    /// Files whose access time cannot be read are left out.
    pub fn by_access_time(&self) -> Vec<(&FileNode, SystemTime)> {
        let mut files: Vec<(&FileNode, SystemTime)> = self
            .file_children()
            .into_iter()
            .filter_map(|file| match file.accessed() {
                Ok(time) => Some((file, time)),
                Err(e) => {
                    debug!(path = %file.path().display(), error = %e, "no access time");
                    None
                }
            })
            .collect();
        files.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.path().cmp(b.0.path())));
        files
    }

    /// Find the first descendant with the given file name.
    pub fn find(&self, name: &str) -> Option<&Node> {
        self.children()
            .iter()
            .find(|node| node.path().file_name().is_some_and(|n| n == name))
    }

    /// True when the subtree holds no files.
    pub fn is_empty(&self) -> bool {
        !self.children().iter().any(|node| !node.is_dir())
    }

    /// Total size of all files in the subtree.
    ///
    /// Files whose size cannot be read count as zero.
    pub fn size(&self) -> u64 {
        *self.size.get_or_init(|| {
            self.file_children()
                .into_iter()
                .map(|file| match file.size() {
                    Ok(size) => size,
                    Err(e) => {
                        debug!(path = %file.path().display(), error = %e, "size unavailable");
                        0
                    }
                })
                .sum()
        })
    }

    /// Non-fatal problems met while walking.
    pub fn warnings(&self) -> &[ScanWarning] {
        &self.walk().warnings
    }

    /// Drop cached children and size so the next access walks again.
    pub fn refresh(&mut self) {
        self.walk = OnceLock::new();
        self.size = OnceLock::new();
    }

    /// Location of this directory's persisted index.
    pub fn index_path(&self) -> PathBuf {
        HashIndex::index_path_for(&self.path)
    }

    /// The index owned by this directory, if loaded or built.
    pub fn index(&self) -> Option<&HashIndex> {
        self.index.as_ref()
    }

    /// Replace the in-memory index.
    pub fn set_index(&mut self, index: HashIndex) -> &HashIndex {
        self.index.insert(index)
    }

    /// Forget the in-memory index.
    pub fn clear_index(&mut self) -> Option<HashIndex> {
        self.index.take()
    }

    /// Structural identity used for equality and hashing.
    pub fn fingerprint(&self) -> DirectoryFingerprint {
        let mut listing: Vec<CompactString> = match std::fs::read_dir(&self.path) {
            Ok(entries) => entries
                .filter_map(Result::ok)
                .map(|entry| CompactString::new(entry.file_name().to_string_lossy()))
                .filter(|name| !HashIndex::is_index_file_name(name))
                .collect(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "cannot list directory");
                Vec::new()
            }
        };
        listing.sort();

        let mut subdirectories: Vec<PathBuf> = self
            .subdirectories()
            .into_iter()
            .filter_map(|dir| dir.path().strip_prefix(&self.path).ok())
            .map(Path::to_path_buf)
            .collect();
        subdirectories.sort();

        DirectoryFingerprint {
            listing,
            is_empty: self.is_empty(),
            subdirectories,
        }
    }

    /// Counts per variant plus totals.
    pub fn describe(&self) -> DirectorySummary {
        let mut variants = BTreeMap::new();
        let mut file_count = 0;
        let mut dir_count = 0;
        for node in self.children() {
            if node.is_dir() {
                dir_count += 1;
            } else {
                file_count += 1;
                *variants.entry(node.variant()).or_insert(0) += 1;
            }
        }

        DirectorySummary {
            path: self.path.clone(),
            file_count,
            dir_count,
            total_size: self.size(),
            variants,
            warnings: self.warnings().len(),
        }
    }

    fn walk(&self) -> &Walk {
        self.walk.get_or_init(|| self.collect_entries())
    }

    /// Walk the subtree serially, resolving every entry.
    fn collect_entries(&self) -> Walk {
        let walker = WalkDir::new(&self.path)
            .parallelism(Parallelism::Serial)
            .skip_hidden(!self.include_hidden)
            .follow_links(false)
            .sort(true);

        let mut walk = Walk::default();

        for entry_result in walker {
            let entry = match entry_result {
                Ok(e) => e,
                Err(err) => {
                    let path = err.path().map(Path::to_path_buf).unwrap_or_default();
                    warn!(path = %path.display(), error = %err, "skipping unreadable entry");
                    walk.warnings.push(ScanWarning::read_error(path, &err));
                    continue;
                }
            };

            let path = entry.path();
            let file_type = entry.file_type();

            if let Some(err) = &entry.read_children_error {
                warn!(path = %path.display(), error = %err, "cannot read directory");
                walk.warnings.push(ScanWarning::read_error(&path, err));
            }

            if entry.depth == 0 {
                continue;
            }

            if file_type.is_dir() {
                walk.nodes
                    .push(Node::Directory(Self::from_walk(path, self.include_hidden)));
                continue;
            }

            if entry
                .file_name()
                .to_str()
                .is_some_and(HashIndex::is_index_file_name)
            {
                continue;
            }

            // Symlinks are catalogued as the file they point to; links to
            // directories are not followed.
            let target_is_dir = if file_type.is_symlink() {
                match std::fs::metadata(&path) {
                    Ok(meta) => meta.is_dir(),
                    Err(e) => {
                        let err = CatalogError::io(&path, e);
                        warn!(path = %path.display(), error = %err, "skipping broken link");
                        walk.warnings.push(ScanWarning::from_error(&path, &err));
                        continue;
                    }
                }
            } else {
                if let Err(e) = entry.metadata() {
                    warn!(path = %path.display(), error = %e, "skipping entry without metadata");
                    walk.warnings.push(ScanWarning::new(
                        &path,
                        e.to_string(),
                        WarningKind::MetadataError,
                    ));
                    continue;
                }
                false
            };

            if target_is_dir {
                debug!(path = %path.display(), "not following directory link");
                continue;
            }

            let variant = classify(&path, false);
            walk.nodes.push(Node::File(FileNode::with_variant(path, variant)));
        }

        debug!(
            path = %self.path.display(),
            entries = walk.nodes.len(),
            warnings = walk.warnings.len(),
            "walk complete"
        );
        walk
    }
}

impl PartialEq for DirectoryNode {
    fn eq(&self, other: &Self) -> bool {
        self.fingerprint() == other.fingerprint()
    }
}

impl Eq for DirectoryNode {}

impl Hash for DirectoryNode {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.fingerprint().hash(state);
    }
}

fn load_index(dir: &Path) -> Option<HashIndex> {
    let path = HashIndex::index_path_for(dir);
    match HashIndex::load(&path) {
        Ok(index) => index,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "ignoring unreadable index");
            None
        }
    }
}
