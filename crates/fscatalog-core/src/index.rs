//! Hash → paths mapping and its persisted form.
//!
//! Each catalogued directory keeps its index in a JSON file stored inside
//! itself, named after the directory: `<dir>/.fscatalog-<dirname>.json`.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::CatalogError;
use crate::node::ContentHash;

/// Prefix shared by every persisted index file.
pub const INDEX_FILE_PREFIX: &str = ".fscatalog-";

/// Extension of persisted index files.
pub const INDEX_FILE_EXTENSION: &str = "json";

const INDEX_FORMAT_VERSION: u32 = 1;

/// All paths sharing one content hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashEntry {
    pub hash: ContentHash,
    #[serde(with = "stored_paths")]
    pub paths: Vec<PathBuf>,
}

/// In-memory mapping from sampled content hash to the files carrying it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashIndex {
    chunk_size: usize,
    buckets: HashMap<ContentHash, Vec<PathBuf>>,
}

#[derive(Serialize, Deserialize)]
struct PersistedIndex {
    version: u32,
    chunk_size: usize,
    built_at: DateTime<Utc>,
    entries: Vec<HashEntry>,
}

impl HashIndex {
    /// Create an empty index for hashes sampled with `chunk_size` bytes.
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size,
            buckets: HashMap::new(),
        }
    }

    /// Chunk size the hashes were computed with.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Add a path under a hash. Colliding hashes keep every path.
    pub fn insert(&mut self, hash: ContentHash, path: PathBuf) {
        self.buckets.entry(hash).or_default().push(path);
    }

    /// Paths recorded under a hash.
    pub fn get(&self, hash: &ContentHash) -> Option<&[PathBuf]> {
        self.buckets.get(hash).map(Vec::as_slice)
    }

    /// Number of distinct hashes.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// Check if the index holds no hashes.
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Total number of indexed paths.
    pub fn file_count(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    /// Iterate over buckets in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (&ContentHash, &[PathBuf])> {
        self.buckets.iter().map(|(hash, paths)| (hash, paths.as_slice()))
    }

    /// Buckets as owned entries, sorted by hash.
    pub fn entries(&self) -> Vec<HashEntry> {
        let mut entries: Vec<HashEntry> = self
            .buckets
            .iter()
            .map(|(hash, paths)| HashEntry {
                hash: *hash,
                paths: paths.clone(),
            })
            .collect();
        entries.sort_by(|a, b| a.hash.cmp(&b.hash));
        entries
    }

    /// Location of the index file for a directory.
    pub fn index_path_for(dir: &Path) -> PathBuf {
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "root".to_string());
        dir.join(format!("{INDEX_FILE_PREFIX}{name}.{INDEX_FILE_EXTENSION}"))
    }

    /// Whether a file name belongs to a persisted index.
    pub fn is_index_file_name(name: &str) -> bool {
        name.starts_with(INDEX_FILE_PREFIX)
            && name.ends_with(&format!(".{INDEX_FILE_EXTENSION}"))
    }

    /// Write the index to `path`, replacing any previous file.
    ///
    /// Writes to a sibling temp file first, then renames over the target.
    pub fn save(&self, path: &Path) -> Result<(), CatalogError> {
        let persisted = PersistedIndex {
            version: INDEX_FORMAT_VERSION,
            chunk_size: self.chunk_size,
            built_at: Utc::now(),
            entries: self.entries(),
        };
        let json = serde_json::to_vec(&persisted).map_err(|e| CatalogError::Io {
            path: path.to_path_buf(),
            source: e.into(),
        })?;

        let tmp = path.with_extension(format!("{INDEX_FILE_EXTENSION}.tmp"));
        let mut file = fs::File::create(&tmp).map_err(|e| CatalogError::io(&tmp, e))?;
        file.write_all(&json).map_err(|e| CatalogError::io(&tmp, e))?;
        file.sync_all().map_err(|e| CatalogError::io(&tmp, e))?;
        fs::rename(&tmp, path).map_err(|e| CatalogError::io(path, e))?;
        debug!(path = %path.display(), buckets = self.len(), "index saved");
        Ok(())
    }

    /// Read an index from `path`.
    ///
    /// Returns `Ok(None)` when no file exists and [`CatalogError::CorruptIndex`]
    /// when it cannot be decoded.
    pub fn load(path: &Path) -> Result<Option<Self>, CatalogError> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CatalogError::io(path, e)),
        };

        let persisted: PersistedIndex =
            serde_json::from_slice(&bytes).map_err(|source| CatalogError::CorruptIndex {
                path: path.to_path_buf(),
                source,
            })?;

        if persisted.version != INDEX_FORMAT_VERSION {
            return Err(CatalogError::CorruptIndex {
                path: path.to_path_buf(),
                source: serde::de::Error::custom(format!(
                    "unsupported index version {}",
                    persisted.version
                )),
            });
        }

        let mut index = Self::new(persisted.chunk_size);
        for entry in persisted.entries {
            index.buckets.entry(entry.hash).or_default().extend(entry.paths);
        }
        debug!(
            path = %path.display(),
            built_at = %persisted.built_at,
            buckets = index.len(),
            "index loaded"
        );
        Ok(Some(index))
    }

    /// Delete the index file at `path` if it exists.
    pub fn remove(path: &Path) -> Result<bool, CatalogError> {
        match fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CatalogError::io(path, e)),
        }
    }
}

/// Path lists that survive names which are not valid UTF-8.
///
/// UTF-8 paths are stored as plain strings. Anything else is stored as
/// `{"raw": "<hex>"}` over the platform's native encoding (bytes on unix,
/// little-endian UTF-16 units on windows).
pub mod stored_paths {
    use std::ffi::OsString;
    use std::path::{Path, PathBuf};

    use serde::de::Error as _;
    use serde::ser::SerializeSeq;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    #[serde(untagged)]
    enum StoredPath {
        Utf8(String),
        Raw { raw: String },
    }

    pub fn serialize<S: Serializer>(
        paths: &[PathBuf],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(paths.len()))?;
        for path in paths {
            let stored = match path.to_str() {
                Some(text) => StoredPath::Utf8(text.to_string()),
                None => StoredPath::Raw {
                    raw: hex::encode(native_bytes(path)),
                },
            };
            seq.serialize_element(&stored)?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<PathBuf>, D::Error> {
        Vec::<StoredPath>::deserialize(deserializer)?
            .into_iter()
            .map(|stored| match stored {
                StoredPath::Utf8(text) => Ok(PathBuf::from(text)),
                StoredPath::Raw { raw } => hex::decode(&raw)
                    .ok()
                    .and_then(from_native_bytes)
                    .ok_or_else(|| D::Error::custom(format!("invalid raw path: {raw}"))),
            })
            .collect()
    }

    #[cfg(unix)]
    fn native_bytes(path: &Path) -> Vec<u8> {
        use std::os::unix::ffi::OsStrExt;
        path.as_os_str().as_bytes().to_vec()
    }

    #[cfg(unix)]
    fn from_native_bytes(bytes: Vec<u8>) -> Option<PathBuf> {
        use std::os::unix::ffi::OsStringExt;
        Some(PathBuf::from(OsString::from_vec(bytes)))
    }

    #[cfg(windows)]
    fn native_bytes(path: &Path) -> Vec<u8> {
        use std::os::windows::ffi::OsStrExt;
        path.as_os_str()
            .encode_wide()
            .flat_map(u16::to_le_bytes)
            .collect()
    }

    #[cfg(windows)]
    fn from_native_bytes(bytes: Vec<u8>) -> Option<PathBuf> {
        use std::os::windows::ffi::OsStringExt;
        if bytes.len() % 2 != 0 {
            return None;
        }
        let units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        Some(PathBuf::from(OsString::from_wide(&units)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_index() -> HashIndex {
        let mut index = HashIndex::new(4096);
        index.insert(ContentHash::new([1; 32]), PathBuf::from("/a/one.jpg"));
        index.insert(ContentHash::new([1; 32]), PathBuf::from("/a/two.jpg"));
        index.insert(ContentHash::new([2; 32]), PathBuf::from("/a/three.jpg"));
        index
    }

    #[test]
    fn test_insert_appends_on_collision() {
        let index = sample_index();
        assert_eq!(index.len(), 2);
        assert_eq!(index.file_count(), 3);
        assert_eq!(index.get(&ContentHash::new([1; 32])).unwrap().len(), 2);
    }

    #[test]
    fn test_index_path_for() {
        let path = HashIndex::index_path_for(Path::new("/home/user/Photos"));
        assert_eq!(path, PathBuf::from("/home/user/Photos/.fscatalog-Photos.json"));
        assert!(HashIndex::is_index_file_name(".fscatalog-Photos.json"));
        assert!(!HashIndex::is_index_file_name("Photos.json"));

        let root = HashIndex::index_path_for(Path::new("/"));
        assert_eq!(root, PathBuf::from("/.fscatalog-root.json"));
    }

    #[test]
    fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".fscatalog-test.json");
        let index = sample_index();

        index.save(&path).unwrap();
        let loaded = HashIndex::load(&path).unwrap().unwrap();
        assert_eq!(loaded, index);
        assert_eq!(loaded.chunk_size(), 4096);
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_paths_round_trip() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".fscatalog-latin1.json");
        let latin1 = PathBuf::from(OsStr::from_bytes(b"/photos/caf\xe9.jpg"));

        let mut index = sample_index();
        index.insert(ContentHash::new([1; 32]), latin1.clone());
        index.save(&path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"/a/one.jpg\""));
        assert!(text.contains(&hex::encode(b"/photos/caf\xe9.jpg")));

        let loaded = HashIndex::load(&path).unwrap().unwrap();
        assert_eq!(loaded, index);
        assert!(loaded.get(&ContentHash::new([1; 32])).unwrap().contains(&latin1));
    }

    #[test]
    fn test_load_rejects_bad_raw_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".fscatalog-raw.json");
        let hash = ContentHash::new([7; 32]).to_hex();
        let json = serde_json::json!({
            "version": 1,
            "chunk_size": 16,
            "built_at": "2024-01-01T00:00:00Z",
            "entries": [{ "hash": hash, "paths": [{ "raw": "zz" }] }],
        });
        fs::write(&path, json.to_string()).unwrap();
        let err = HashIndex::load(&path).unwrap_err();
        assert!(matches!(err, CatalogError::CorruptIndex { .. }));
    }

    #[test]
    fn test_load_missing_is_none() {
        let temp = TempDir::new().unwrap();
        assert!(HashIndex::load(&temp.path().join("nope.json")).unwrap().is_none());
    }

    #[test]
    fn test_load_corrupt() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".fscatalog-bad.json");
        fs::write(&path, "{ not json").unwrap();
        let err = HashIndex::load(&path).unwrap_err();
        assert!(matches!(err, CatalogError::CorruptIndex { .. }));
    }

    #[test]
    fn test_remove() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".fscatalog-x.json");
        sample_index().save(&path).unwrap();
        assert!(HashIndex::remove(&path).unwrap());
        assert!(!HashIndex::remove(&path).unwrap());
    }
}
