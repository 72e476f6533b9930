//! Boundary to the external media prober.
//!
//! Only stream records are consumed here; decoding and transcoding stay in
//! the external tool.

use std::path::{Path, PathBuf};
use std::process::Command;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::CatalogError;

/// One stream reported by the prober.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamRecord {
    pub index: u32,
    pub codec_type: Option<String>,
    pub codec_name: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Duration in seconds.
    pub duration: Option<f64>,
    /// Average frames per second, rounded.
    pub frame_rate: Option<u32>,
}

impl StreamRecord {
    /// Whether the stream carries video.
    pub fn is_video(&self) -> bool {
        self.codec_type.as_deref() == Some("video")
    }

    /// Whether the stream carries audio.
    pub fn is_audio(&self) -> bool {
        self.codec_type.as_deref() == Some("audio")
    }

    /// Frame size for video streams.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        match (self.is_video(), self.width, self.height) {
            (true, Some(w), Some(h)) => Some((w, h)),
            _ => None,
        }
    }
}

/// Something that can list the streams of a media file.
pub trait MediaProbe: Send + Sync {
    /// Probe a file. Fails with [`CatalogError::NotMedia`] when the file
    /// holds no streams.
    fn probe(&self, path: &Path) -> Result<Vec<StreamRecord>, CatalogError>;
}

/// Runs `ffprobe` from `PATH` (or an explicit binary).
#[derive(Debug, Clone)]
pub struct FfprobeCommand {
    program: PathBuf,
}

impl FfprobeCommand {
    pub fn new() -> Self {
        Self {
            program: PathBuf::from("ffprobe"),
        }
    }

    /// Use a specific ffprobe binary.
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for FfprobeCommand {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaProbe for FfprobeCommand {
    fn probe(&self, path: &Path) -> Result<Vec<StreamRecord>, CatalogError> {
        if !path.exists() {
            return Err(CatalogError::NotFound {
                path: path.to_path_buf(),
            });
        }

        let output = Command::new(&self.program)
            .args(["-v", "quiet", "-print_format", "json", "-show_streams"])
            .arg(path)
            .output()
            .map_err(|e| CatalogError::Probe {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            debug!(path = %path.display(), status = %output.status, "ffprobe rejected file");
            return Err(CatalogError::NotMedia {
                path: path.to_path_buf(),
            });
        }

        parse_ffprobe_output(path, &output.stdout)
    }
}

#[derive(Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<RawStream>,
}

#[derive(Deserialize)]
struct RawStream {
    index: u32,
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    duration: Option<String>,
    avg_frame_rate: Option<String>,
}

/// Decode ffprobe's `-show_streams` JSON.
pub fn parse_ffprobe_output(path: &Path, json: &[u8]) -> Result<Vec<StreamRecord>, CatalogError> {
    let parsed: ProbeOutput = serde_json::from_slice(json).map_err(|e| CatalogError::Probe {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    if parsed.streams.is_empty() {
        return Err(CatalogError::NotMedia {
            path: path.to_path_buf(),
        });
    }

    Ok(parsed
        .streams
        .into_iter()
        .map(|raw| StreamRecord {
            index: raw.index,
            codec_type: raw.codec_type,
            codec_name: raw.codec_name,
            width: raw.width,
            height: raw.height,
            duration: raw.duration.and_then(|d| d.parse().ok()),
            frame_rate: raw.avg_frame_rate.as_deref().and_then(parse_frame_rate),
        })
        .collect())
}

/// Parse ffprobe rationals such as `30000/1001`. A zero denominator gives 0.
fn parse_frame_rate(rational: &str) -> Option<u32> {
    let (num, den) = rational.split_once('/')?;
    let num: f64 = num.trim().parse().ok()?;
    let den: f64 = den.trim().parse().ok()?;
    if den == 0.0 {
        return Some(0);
    }
    Some((num / den).round() as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "streams": [
            {
                "index": 0,
                "codec_name": "h264",
                "codec_type": "video",
                "width": 1920,
                "height": 1080,
                "avg_frame_rate": "30000/1001",
                "duration": "12.345000"
            },
            {
                "index": 1,
                "codec_name": "aac",
                "codec_type": "audio",
                "avg_frame_rate": "0/0"
            }
        ]
    }"#;

    #[test]
    fn test_parse_streams() {
        let streams = parse_ffprobe_output(Path::new("clip.mp4"), SAMPLE.as_bytes()).unwrap();
        assert_eq!(streams.len(), 2);

        let video = &streams[0];
        assert!(video.is_video());
        assert_eq!(video.dimensions(), Some((1920, 1080)));
        assert_eq!(video.frame_rate, Some(30));
        assert_eq!(video.duration, Some(12.345));

        let audio = &streams[1];
        assert!(audio.is_audio());
        assert_eq!(audio.dimensions(), None);
        assert_eq!(audio.frame_rate, Some(0));
    }

    #[test]
    fn test_no_streams_is_not_media() {
        let err = parse_ffprobe_output(Path::new("x.mp4"), br#"{"streams": []}"#).unwrap_err();
        assert!(matches!(err, CatalogError::NotMedia { .. }));

        let err = parse_ffprobe_output(Path::new("x.mp4"), b"{}").unwrap_err();
        assert!(matches!(err, CatalogError::NotMedia { .. }));
    }

    #[test]
    fn test_garbage_is_probe_error() {
        let err = parse_ffprobe_output(Path::new("x.mp4"), b"not json").unwrap_err();
        assert!(matches!(err, CatalogError::Probe { .. }));
    }
}
