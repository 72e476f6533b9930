//! Leaf file nodes and the sampled content hash.

use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::SystemTime;

use blake3::Hasher;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CatalogError;
use crate::media::{MediaProbe, StreamRecord};
use crate::variant::{self, Variant};

/// BLAKE3 digest identifying a file by size and leading bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash(pub [u8; 32]);

impl ContentHash {
    /// Create a new ContentHash from raw bytes.
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the hash as a hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a 64 character hex string.
    pub fn from_hex(text: &str) -> Option<Self> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(text, &mut bytes).ok()?;
        Some(Self(bytes))
    }

    /// Hash a reader's first `chunk_size` bytes together with the file size.
    pub fn sample(reader: impl Read, size: u64, chunk_size: usize) -> std::io::Result<Self> {
        let mut head = Vec::with_capacity(chunk_size.min(size as usize));
        reader.take(chunk_size as u64).read_to_end(&mut head)?;

        let mut hasher = Hasher::new();
        hasher.update(&head);
        hasher.update(&size.to_le_bytes());
        Ok(Self(*hasher.finalize().as_bytes()))
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for ContentHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ContentHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let hex = String::deserialize(deserializer)?;
        Self::from_hex(&hex)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid content hash: {hex}")))
    }
}

/// A non-directory entry in the catalog.
///
/// Size and hash are read from disk on first use and cached for the
/// lifetime of the node.
#[derive(Debug)]
pub struct FileNode {
    path: PathBuf,
    variant: Variant,
    size: OnceLock<u64>,
    content_hash: OnceLock<(usize, ContentHash)>,
}

impl FileNode {
    /// Open an existing path, resolving its variant.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let path = path.canonicalize().map_err(|e| CatalogError::io(path, e))?;
        let variant = variant::resolve(&path)?;
        Ok(Self::with_variant(path, variant))
    }

    /// Create a node for an already-resolved absolute path.
    pub fn with_variant(path: impl Into<PathBuf>, variant: Variant) -> Self {
        Self {
            path: path.into(),
            variant,
            size: OnceLock::new(),
            content_hash: OnceLock::new(),
        }
    }

    /// Absolute path of this node.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Variant chosen at creation.
    pub fn variant(&self) -> Variant {
        self.variant
    }

    /// File name with extension.
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.to_string_lossy().into_owned())
    }

    /// Lowercase extension without the dot.
    pub fn extension(&self) -> Option<String> {
        self.path
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
    }

    /// Size in bytes.
    pub fn size(&self) -> Result<u64, CatalogError> {
        if let Some(size) = self.size.get() {
            return Ok(*size);
        }
        let metadata =
            std::fs::metadata(&self.path).map_err(|e| CatalogError::io(&self.path, e))?;
        Ok(*self.size.get_or_init(|| metadata.len()))
    }

    /// Sampled identity hash over the size and first `chunk_size` bytes.
    ///
    /// The first successful result is memoized. Asking again with a
    /// different chunk size re-reads the file without replacing the cache.
    pub fn content_hash(&self, chunk_size: usize) -> Result<ContentHash, CatalogError> {
        if let Some((cached_chunk, hash)) = self.content_hash.get() {
            if *cached_chunk == chunk_size {
                return Ok(*hash);
            }
            return self.compute_hash(chunk_size);
        }
        let hash = self.compute_hash(chunk_size)?;
        Ok(self.content_hash.get_or_init(|| (chunk_size, hash)).1)
    }

    fn compute_hash(&self, chunk_size: usize) -> Result<ContentHash, CatalogError> {
        let file = File::open(&self.path).map_err(|e| CatalogError::io(&self.path, e))?;
        let size = file
            .metadata()
            .map_err(|e| CatalogError::io(&self.path, e))?
            .len();
        let _ = self.size.set(size);
        ContentHash::sample(file, size, chunk_size).map_err(|e| CatalogError::io(&self.path, e))
    }

    /// Whether the file has an executable bit set.
    #[cfg(unix)]
    pub fn is_executable(&self) -> bool {
        use std::os::unix::fs::PermissionsExt;
        std::fs::metadata(&self.path)
            .map(|m| m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }

    #[cfg(not(unix))]
    pub fn is_executable(&self) -> bool {
        false
    }

    /// Interpreter line of a script, if it has one.
    pub fn shebang(&self) -> Result<Option<String>, CatalogError> {
        if self.variant != Variant::Script {
            return Ok(None);
        }
        let file = File::open(&self.path).map_err(|e| CatalogError::io(&self.path, e))?;
        let mut first = Vec::new();
        BufReader::new(file)
            .read_until(b'\n', &mut first)
            .map_err(|e| CatalogError::io(&self.path, e))?;
        let line = String::from_utf8_lossy(&first).trim_end().to_string();
        Ok(line.starts_with("#!").then_some(line))
    }

    /// Whether the path itself is a symbolic link.
    ///
    /// Nodes opened through [`FileNode::open`] hold the resolved target, so
    /// this is only true for nodes created from an unresolved walk path.
    pub fn is_link(&self) -> bool {
        std::fs::symlink_metadata(&self.path)
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false)
    }

    /// Last access time as reported by the filesystem.
    pub fn accessed(&self) -> Result<SystemTime, CatalogError> {
        std::fs::metadata(&self.path)
            .and_then(|m| m.accessed())
            .map_err(|e| CatalogError::io(&self.path, e))
    }

    /// Every line of the file with the line terminator removed.
    ///
    /// Git objects are decoded as Latin-1, everything else as UTF-8 with
    /// invalid sequences replaced. A trailing newline does not produce an
    /// empty last line.
    pub fn lines(&self) -> Result<Vec<String>, CatalogError> {
        let bytes = std::fs::read(&self.path).map_err(|e| CatalogError::io(&self.path, e))?;
        let mut lines: Vec<String> = bytes
            .split(|b| *b == b'\n')
            .map(|line| self.decode_line(line))
            .collect();
        if bytes.is_empty() || bytes.ends_with(b"\n") {
            lines.pop();
        }
        Ok(lines)
    }

    /// First `n` lines, reading no further than needed.
    pub fn head(&self, n: usize) -> Result<Vec<String>, CatalogError> {
        let file = File::open(&self.path).map_err(|e| CatalogError::io(&self.path, e))?;
        let mut reader = BufReader::new(file);
        let mut lines = Vec::new();
        let mut buf = Vec::new();
        while lines.len() < n {
            buf.clear();
            let read = reader
                .read_until(b'\n', &mut buf)
                .map_err(|e| CatalogError::io(&self.path, e))?;
            if read == 0 {
                break;
            }
            let line = buf.strip_suffix(b"\n").unwrap_or(&buf);
            lines.push(self.decode_line(line));
        }
        Ok(lines)
    }

    /// Last `n` lines.
    pub fn tail(&self, n: usize) -> Result<Vec<String>, CatalogError> {
        let mut lines = self.lines()?;
        let start = lines.len().saturating_sub(n);
        Ok(lines.split_off(start))
    }

    /// Number of lines in the file.
    pub fn line_count(&self) -> Result<usize, CatalogError> {
        Ok(self.lines()?.len())
    }

    /// Whether any line contains `needle`.
    pub fn contains(&self, needle: &str) -> Result<bool, CatalogError> {
        Ok(self.lines()?.iter().any(|line| line.contains(needle)))
    }

    /// Latin-1 decoded, whitespace-trimmed lines of a git object.
    ///
    /// Returns `None` for every other variant.
    pub fn decode(&self) -> Result<Option<Vec<String>>, CatalogError> {
        if self.variant != Variant::GitObject {
            return Ok(None);
        }
        let lines = self.lines()?;
        Ok(Some(lines.iter().map(|l| l.trim().to_string()).collect()))
    }

    fn decode_line(&self, line: &[u8]) -> String {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        match self.variant {
            Variant::GitObject => line.iter().map(|&b| char::from(b)).collect(),
            _ => String::from_utf8_lossy(line).into_owned(),
        }
    }

    /// Stream metadata from an external probe. Only media variants qualify.
    pub fn probe(&self, probe: &dyn MediaProbe) -> Result<Vec<StreamRecord>, CatalogError> {
        if !self.variant.is_media() {
            return Err(CatalogError::NotMedia {
                path: self.path.clone(),
            });
        }
        probe.probe(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_content_hash_hex() {
        let hash = ContentHash::new([0xab; 32]);
        assert_eq!(hash.to_hex().len(), 64);
        assert!(hash.to_hex().starts_with("abab"));
        assert_eq!(ContentHash::from_hex(&hash.to_hex()), Some(hash));
        assert_eq!(ContentHash::from_hex("zz"), None);
    }

    #[test]
    fn test_sample_depends_on_size() {
        let data = b"same leading bytes";
        let a = ContentHash::sample(&data[..], 100, 8).unwrap();
        let b = ContentHash::sample(&data[..], 200, 8).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_sample_ignores_bytes_past_chunk() {
        let a = ContentHash::sample(&b"prefix-AAAA"[..], 11, 7).unwrap();
        let b = ContentHash::sample(&b"prefix-BBBB"[..], 11, 7).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_open_missing_file() {
        let err = FileNode::open("/no/such/file.txt").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_size_and_hash_are_cached() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("notes.txt");
        fs::write(&path, "hello world").unwrap();

        let node = FileNode::open(&path).unwrap();
        assert_eq!(node.variant(), Variant::Text);
        assert_eq!(node.size().unwrap(), 11);
        let first = node.content_hash(1024).unwrap();

        fs::remove_file(&path).unwrap();
        assert_eq!(node.size().unwrap(), 11);
        assert_eq!(node.content_hash(1024).unwrap(), first);
        assert!(node.content_hash(4).is_err());
    }

    #[test]
    fn test_shebang() {
        let temp = TempDir::new().unwrap();
        let script = temp.path().join("run.sh");
        fs::write(&script, "#!/bin/sh\necho hi\n").unwrap();
        let plain = temp.path().join("lib.py");
        fs::write(&plain, "import os\n").unwrap();

        let node = FileNode::open(&script).unwrap();
        assert_eq!(node.shebang().unwrap().as_deref(), Some("#!/bin/sh"));
        assert_eq!(FileNode::open(&plain).unwrap().shebang().unwrap(), None);
    }

    #[test]
    fn test_lines_head_and_tail() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("notes.txt");
        fs::write(&path, "one\r\ntwo\nthree\nfour\n").unwrap();

        let node = FileNode::open(&path).unwrap();
        assert_eq!(node.lines().unwrap(), ["one", "two", "three", "four"]);
        assert_eq!(node.line_count().unwrap(), 4);
        assert_eq!(node.head(2).unwrap(), ["one", "two"]);
        assert_eq!(node.tail(2).unwrap(), ["three", "four"]);
        assert_eq!(node.head(10).unwrap().len(), 4);
        assert_eq!(node.tail(10).unwrap().len(), 4);
        assert!(node.head(0).unwrap().is_empty());
        assert!(node.contains("hre").unwrap());
        assert!(!node.contains("five").unwrap());
    }

    #[test]
    fn test_lines_of_empty_and_unterminated_files() {
        let temp = TempDir::new().unwrap();
        let empty = temp.path().join("empty.txt");
        fs::write(&empty, "").unwrap();
        let open_ended = temp.path().join("open.txt");
        fs::write(&open_ended, "a\n\nb").unwrap();

        assert_eq!(FileNode::open(&empty).unwrap().line_count().unwrap(), 0);
        let node = FileNode::open(&open_ended).unwrap();
        assert_eq!(node.lines().unwrap(), ["a", "", "b"]);
        assert_eq!(node.tail(1).unwrap(), ["b"]);
    }

    #[test]
    fn test_decode_git_object_as_latin1() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("4b825dc642cb6eb9a060e54bf8d69288fbee4904");
        fs::write(&path, b"blob 5\x00caf\xe9  \n").unwrap();
        let plain = temp.path().join("cafe.txt");
        fs::write(&plain, b"caf\xe9\n").unwrap();

        let node = FileNode::open(&path).unwrap();
        assert_eq!(node.variant(), Variant::GitObject);
        assert_eq!(node.decode().unwrap(), Some(vec!["blob 5\u{0}caf\u{e9}".to_string()]));

        let text = FileNode::open(&plain).unwrap();
        assert_eq!(text.decode().unwrap(), None);
        assert_eq!(text.lines().unwrap(), ["caf\u{fffd}"]);
    }

    #[test]
    fn test_lines_of_missing_file() {
        let node = FileNode::with_variant("/no/such/notes.txt", Variant::Text);
        assert!(node.lines().unwrap_err().is_not_found());
        assert!(node.head(1).unwrap_err().is_not_found());
        assert!(node.accessed().is_err());
        assert!(!node.is_link());
    }

    #[cfg(unix)]
    #[test]
    fn test_is_link() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("target.txt");
        fs::write(&target, "data").unwrap();
        let link = temp.path().join("link.txt");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        assert!(FileNode::with_variant(&link, Variant::Text).is_link());
        assert!(!FileNode::with_variant(&target, Variant::Text).is_link());
        assert!(!FileNode::open(&link).unwrap().is_link());
    }
}
