//! Path classification into node variants.
//!
//! Resolution order:
//! 1. directories
//! 2. lowercase extension lookup
//! 3. basename patterns (git loose objects, sensor logs)
//! 4. [`Variant::Generic`]

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, IntoStaticStr};

use crate::error::CatalogError;

/// Category of a catalogued path, fixed when its node is created.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumIter,
    IntoStaticStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Variant {
    Directory,
    Image,
    Video,
    Audio,
    Log,
    Script,
    Archive,
    Document,
    Config,
    Text,
    GitObject,
    Generic,
}

impl Variant {
    /// Check if this is a directory.
    pub fn is_dir(self) -> bool {
        self == Variant::Directory
    }

    /// Whether an external media probe can inspect this variant.
    pub fn is_media(self) -> bool {
        matches!(self, Variant::Video | Variant::Audio)
    }
}

const EXTENSIONS: &[(&str, Variant)] = &[
    // Images
    ("jpg", Variant::Image),
    ("jpeg", Variant::Image),
    ("png", Variant::Image),
    ("gif", Variant::Image),
    ("nef", Variant::Image),
    ("webp", Variant::Image),
    ("heic", Variant::Image),
    ("bmp", Variant::Image),
    ("tif", Variant::Image),
    ("tiff", Variant::Image),
    ("cr2", Variant::Image),
    ("raf", Variant::Image),
    ("dng", Variant::Image),
    // Videos
    ("mp4", Variant::Video),
    ("avi", Variant::Video),
    ("mkv", Variant::Video),
    ("wmv", Variant::Video),
    ("webm", Variant::Video),
    ("m4v", Variant::Video),
    ("flv", Variant::Video),
    ("mpg", Variant::Video),
    ("mov", Variant::Video),
    // Audio
    ("mp3", Variant::Audio),
    ("flac", Variant::Audio),
    ("wav", Variant::Audio),
    ("ogg", Variant::Audio),
    ("opus", Variant::Audio),
    ("m4a", Variant::Audio),
    ("aac", Variant::Audio),
    ("wma", Variant::Audio),
    // Logs
    ("log", Variant::Log),
    ("csv", Variant::Log),
    // Code
    ("py", Variant::Script),
    ("bat", Variant::Script),
    ("sh", Variant::Script),
    ("c", Variant::Script),
    ("cpp", Variant::Script),
    ("h", Variant::Script),
    ("java", Variant::Script),
    ("js", Variant::Script),
    ("ts", Variant::Script),
    ("php", Variant::Script),
    ("html", Variant::Script),
    ("css", Variant::Script),
    ("scss", Variant::Script),
    ("ps1", Variant::Script),
    ("rs", Variant::Script),
    // Archives
    ("zip", Variant::Archive),
    ("rar", Variant::Archive),
    ("tar", Variant::Archive),
    ("bz2", Variant::Archive),
    ("7z", Variant::Archive),
    ("gz", Variant::Archive),
    ("xz", Variant::Archive),
    ("tgz", Variant::Archive),
    ("zipx", Variant::Archive),
    // Documents
    ("pdf", Variant::Document),
    ("doc", Variant::Document),
    ("docx", Variant::Document),
    ("odt", Variant::Document),
    ("pptx", Variant::Document),
    // Config
    ("ini", Variant::Config),
    ("xml", Variant::Config),
    ("json", Variant::Config),
    ("cfg", Variant::Config),
    ("conf", Variant::Config),
    ("yaml", Variant::Config),
    ("yml", Variant::Config),
    ("toml", Variant::Config),
    ("properties", Variant::Config),
    // Plain text
    ("txt", Variant::Text),
    ("md", Variant::Text),
    ("out", Variant::Text),
    ("note", Variant::Text),
];

static GIT_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9a-f]{37,41}$").expect("valid git object pattern"));

static SENSOR_LOG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+mhz|\d\.\d+v").expect("valid sensor log pattern"));

/// Look up the variant for a lowercase extension without the leading dot.
pub fn variant_for_extension(ext: &str) -> Option<Variant> {
    EXTENSIONS
        .iter()
        .find(|(candidate, _)| *candidate == ext)
        .map(|(_, variant)| *variant)
}

/// Classify a path without touching the filesystem.
///
/// `is_dir` comes from the caller's own stat or directory entry.
pub fn classify(path: &Path, is_dir: bool) -> Variant {
    if is_dir {
        return Variant::Directory;
    }

    let by_extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .and_then(|ext| variant_for_extension(&ext));
    if let Some(variant) = by_extension {
        return variant;
    }

    let basename = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    if GIT_OBJECT.is_match(&basename) {
        Variant::GitObject
    } else if SENSOR_LOG.is_match(&basename) {
        Variant::Log
    } else {
        Variant::Generic
    }
}

/// Resolve the variant of an existing path.
///
/// Follows symlinks. Fails only when the path does not exist or cannot be
/// stat'ed; unknown types fall back to [`Variant::Generic`].
pub fn resolve(path: &Path) -> Result<Variant, CatalogError> {
    let metadata = std::fs::metadata(path).map_err(|e| CatalogError::io(path, e))?;
    Ok(classify(path, metadata.is_dir()))
}
