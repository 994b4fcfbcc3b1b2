//! Stand-alone helpers for pulling the audio out of a source and putting it back later.
//!
//! [`transcode_to_mvhevc`](crate::transcode_to_mvhevc) writes audio straight from the reader and
//! does not call these.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::asset::probe_asset;
use crate::backend::ffmpeg::{ensure_parent_dir, run_ffmpeg};
use crate::foundation::error::SpatialResult;
use crate::transcode::remove_stale_output;

/// File name [`extract_audio`] writes into its output directory.
pub const EXTRACTED_AUDIO_FILE: &str = "extracted_audio.m4a";
/// File name [`merge`] writes next to the video when no output path is given.
pub const MERGED_OUTPUT_FILE: &str = "output.mov";

/// Copy the first audio track of `source` into `<out_dir>/extracted_audio.m4a`.
///
/// AAC is stream-copied; other codecs are re-encoded to AAC to fit the `.m4a` container.
#[tracing::instrument]
pub fn extract_audio(source: &Path, out_dir: &Path) -> SpatialResult<PathBuf> {
    let info = probe_asset(source)?;
    let track = info.audio_track()?;

    let out = out_dir.join(EXTRACTED_AUDIO_FILE);
    ensure_parent_dir(&out)?;
    remove_stale_output(&out)?;

    let codec = if track.codec_name == "aac" { "copy" } else { "aac" };
    let mut args: Vec<OsString> = vec!["-y".into(), "-i".into(), source.into()];
    args.extend(["-map", "0:a:0", "-vn", "-c:a", codec].map(OsString::from));
    args.push(out.clone().into());
    run_ffmpeg("audio extract", &args)?;
    tracing::info!(out = %out.display(), codec = %track.codec_name, "audio extracted");
    Ok(out)
}

/// Combine the first video track of `video` with the first audio track of `audio`.
///
/// Both tracks are stream-copied and the result is cut to the shorter of the two. Container
/// metadata of `video` is carried over. Writes `output.mov` next to `video` unless `out` is given.
#[tracing::instrument]
pub fn merge(video: &Path, audio: &Path, out: Option<&Path>) -> SpatialResult<PathBuf> {
    probe_asset(video)?.video_track()?;
    probe_asset(audio)?.audio_track()?;

    let out = match out {
        Some(p) => p.to_path_buf(),
        None => video
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(MERGED_OUTPUT_FILE),
    };
    ensure_parent_dir(&out)?;
    remove_stale_output(&out)?;

    let mut args: Vec<OsString> = vec![
        "-y".into(),
        "-i".into(),
        video.into(),
        "-i".into(),
        audio.into(),
    ];
    args.extend(
        [
            "-map",
            "0:v:0",
            "-map",
            "1:a:0",
            "-map_metadata",
            "0",
            "-c",
            "copy",
            "-shortest",
            "-movflags",
            "use_metadata_tags",
        ]
        .map(OsString::from),
    );
    args.push(out.clone().into());
    run_ffmpeg("merge", &args)?;
    tracing::info!(out = %out.display(), "tracks merged");
    Ok(out)
}
