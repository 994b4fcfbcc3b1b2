use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::foundation::core::{FrameRate, FrameSize};
use crate::foundation::error::{SpatialError, SpatialResult};

/// The visual track of a source asset.
#[derive(Clone, Debug, PartialEq)]
pub struct VideoTrackInfo {
    /// Container stream index.
    pub index: u32,
    /// Codec short name as reported by the prober (`hevc`, `h264`, ...).
    pub codec_name: String,
    /// Decoded frame size. For side-by-side sources this is the full frame.
    pub size: FrameSize,
    /// Constant frame rate the decoder is driven at.
    pub frame_rate: FrameRate,
    /// Frame count when the container declares one.
    pub frame_count: Option<u64>,
}

/// The first audio track of a source asset.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioTrackInfo {
    /// Container stream index.
    pub index: u32,
    /// Codec short name.
    pub codec_name: String,
    /// Samples per second.
    pub sample_rate: u32,
    /// Interleaved channel count.
    pub channels: u16,
    /// Declared bit rate in bits per second.
    pub bit_rate: Option<u64>,
}

/// What the reader knows about a source container before decoding starts.
#[derive(Clone, Debug, PartialEq)]
pub struct AssetInfo {
    /// Where the asset lives.
    pub path: PathBuf,
    /// Container duration in seconds, `0.0` when unknown.
    pub duration_secs: f64,
    /// First visual track.
    pub video: Option<VideoTrackInfo>,
    /// First audio track.
    pub audio: Option<AudioTrackInfo>,
    /// Container-level metadata.
    pub tags: BTreeMap<String, String>,
}

impl AssetInfo {
    /// The visual track, or [`SpatialError::InputTrackMissing`].
    pub fn video_track(&self) -> SpatialResult<&VideoTrackInfo> {
        self.video.as_ref().ok_or_else(|| {
            SpatialError::input_track_missing(format!(
                "'{}' has no video track",
                self.path.display()
            ))
        })
    }

    /// The audio track, or [`SpatialError::InputTrackMissing`].
    pub fn audio_track(&self) -> SpatialResult<&AudioTrackInfo> {
        self.audio.as_ref().ok_or_else(|| {
            SpatialError::input_track_missing(format!(
                "'{}' has no audio track",
                self.path.display()
            ))
        })
    }
}

/// Probe `path` with `ffprobe`.
#[tracing::instrument(level = "debug")]
pub fn probe_asset(path: &Path) -> SpatialResult<AssetInfo> {
    if !path.exists() {
        return Err(SpatialError::validation(format!(
            "input '{}' does not exist",
            path.display()
        )));
    }

    let out = std::process::Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_streams",
            "-show_format",
        ])
        .arg(path)
        .output()
        .map_err(|e| SpatialError::evaluation(format!("failed to run ffprobe: {e}")))?;
    if !out.status.success() {
        return Err(SpatialError::evaluation(format!(
            "ffprobe failed for '{}': {}",
            path.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }

    parse_probe_json(&out.stdout, path)
}

#[derive(serde::Deserialize)]
struct ProbeStream {
    index: u32,
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    nb_frames: Option<String>,
    sample_rate: Option<String>,
    channels: Option<u16>,
    bit_rate: Option<String>,
}

#[derive(serde::Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
    #[serde(default)]
    tags: BTreeMap<String, String>,
}

#[derive(serde::Deserialize)]
struct ProbeOut {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

/// Build an [`AssetInfo`] from `ffprobe -print_format json` output.
pub(crate) fn parse_probe_json(json: &[u8], path: &Path) -> SpatialResult<AssetInfo> {
    let parsed: ProbeOut = serde_json::from_slice(json)
        .map_err(|e| SpatialError::evaluation(format!("ffprobe json parse failed: {e}")))?;

    let video = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .map(video_track)
        .transpose()?;
    let audio = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("audio"))
        .map(audio_track)
        .transpose()?;
    let duration_secs = parsed
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(0.0);
    let tags = parsed.format.map(|f| f.tags).unwrap_or_default();

    Ok(AssetInfo {
        path: path.to_path_buf(),
        duration_secs,
        video,
        audio,
        tags,
    })
}

fn video_track(s: &ProbeStream) -> SpatialResult<VideoTrackInfo> {
    let width = s
        .width
        .ok_or_else(|| SpatialError::evaluation("missing video width from ffprobe"))?;
    let height = s
        .height
        .ok_or_else(|| SpatialError::evaluation("missing video height from ffprobe"))?;

    // Some containers report `0/0` for the average rate; fall back to the stream base rate.
    let rate = [s.avg_frame_rate.as_deref(), s.r_frame_rate.as_deref()]
        .into_iter()
        .flatten()
        .find_map(|r| FrameRate::parse_ratio(r).ok())
        .ok_or_else(|| SpatialError::evaluation("invalid video frame rate from ffprobe"))?;

    Ok(VideoTrackInfo {
        index: s.index,
        codec_name: s.codec_name.clone().unwrap_or_default(),
        size: FrameSize::new(width, height)?,
        frame_rate: rate,
        frame_count: s.nb_frames.as_deref().and_then(|n| n.parse().ok()),
    })
}

fn audio_track(s: &ProbeStream) -> SpatialResult<AudioTrackInfo> {
    let sample_rate = s
        .sample_rate
        .as_deref()
        .and_then(|r| r.parse::<u32>().ok())
        .filter(|r| *r > 0)
        .ok_or_else(|| SpatialError::evaluation("missing audio sample_rate from ffprobe"))?;
    let channels = s
        .channels
        .filter(|c| *c > 0)
        .ok_or_else(|| SpatialError::evaluation("missing audio channels from ffprobe"))?;

    Ok(AudioTrackInfo {
        index: s.index,
        codec_name: s.codec_name.clone().unwrap_or_default(),
        sample_rate,
        channels,
        bit_rate: s.bit_rate.as_deref().and_then(|b| b.parse().ok()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SBS_WITH_AUDIO: &str = r#"{
        "streams": [
            {"index": 0, "codec_type": "video", "codec_name": "hevc", "width": 3840, "height": 1080,
             "avg_frame_rate": "30/1", "r_frame_rate": "30/1", "nb_frames": "60"},
            {"index": 1, "codec_type": "audio", "codec_name": "aac", "sample_rate": "48000",
             "channels": 2, "bit_rate": "128000"}
        ],
        "format": {"duration": "2.000000",
                   "tags": {"com.apple.quicktime.spatial.format-version": "1.0"}}
    }"#;

    #[test]
    fn parses_video_and_audio_tracks() {
        let info = parse_probe_json(SBS_WITH_AUDIO.as_bytes(), Path::new("in.mov")).unwrap();
        let video = info.video_track().unwrap();
        assert_eq!(video.size, FrameSize::new(3840, 1080).unwrap());
        assert_eq!(video.frame_rate, FrameRate::new(30, 1).unwrap());
        assert_eq!(video.frame_count, Some(60));
        let audio = info.audio_track().unwrap();
        assert_eq!((audio.sample_rate, audio.channels), (48_000, 2));
        assert_eq!(audio.bit_rate, Some(128_000));
        assert!((info.duration_secs - 2.0).abs() < 1e-9);
        assert_eq!(
            info.tags
                .get("com.apple.quicktime.spatial.format-version")
                .map(String::as_str),
            Some("1.0")
        );
    }

    #[test]
    fn zero_average_rate_falls_back_to_base_rate() {
        let json = r#"{"streams": [{"index": 0, "codec_type": "video", "width": 64, "height": 16,
            "avg_frame_rate": "0/0", "r_frame_rate": "30000/1001"}]}"#;
        let info = parse_probe_json(json.as_bytes(), Path::new("in.mp4")).unwrap();
        assert_eq!(
            info.video_track().unwrap().frame_rate,
            FrameRate::new(30_000, 1001).unwrap()
        );
        assert!(info.audio.is_none());
        assert!(info.tags.is_empty());
    }

    #[test]
    fn audio_only_input_reports_missing_video() {
        let json = r#"{"streams": [{"index": 0, "codec_type": "audio", "sample_rate": "44100",
            "channels": 1}]}"#;
        let info = parse_probe_json(json.as_bytes(), Path::new("a.m4a")).unwrap();
        let err = info.video_track().unwrap_err();
        assert!(matches!(err, SpatialError::InputTrackMissing(_)));
    }
}
