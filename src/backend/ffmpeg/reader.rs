use std::io::BufReader;
use std::path::Path;
use std::process::{ChildStdout, Command, Stdio};

use crate::asset::{AssetInfo, AudioTrackInfo, VideoTrackInfo, probe_asset};
use crate::backend::ffmpeg::mkv::ClusterChunker;
use crate::backend::ffmpeg::{ToolProcess, read_full};
use crate::foundation::core::{FrameRate, FrameSize};
use crate::foundation::error::{SpatialError, SpatialResult};
use crate::media::pixel::{PixelBuffer, PixelFormat, byte_len};
use crate::reader::{
    AudioCursor, AudioOutputSettings, AudioSample, ReaderBackend, SampleCursor, VideoCursor,
    VideoOutputSettings, VideoSample,
};

/// Reader backend on `ffmpeg` subprocesses: video is decoded, audio is stream-copied.
#[derive(Debug)]
pub struct FfmpegReader {
    info: AssetInfo,
}

impl FfmpegReader {
    /// Probe `path` and prepare to decode it.
    pub fn open(path: &Path) -> SpatialResult<Self> {
        Ok(Self {
            info: probe_asset(path)?,
        })
    }
}

impl ReaderBackend for FfmpegReader {
    fn asset(&self) -> &AssetInfo {
        &self.info
    }

    fn start_video(
        &mut self,
        track: &VideoTrackInfo,
        settings: &VideoOutputSettings,
    ) -> SpatialResult<VideoCursor> {
        let rate = track.frame_rate;
        let rate_arg = rate.to_string();
        let mut cmd = Command::new("ffmpeg");
        cmd.args(["-hide_banner", "-nostdin", "-loglevel", "error", "-i"])
            .arg(&self.info.path)
            .args([
                "-map",
                "0:v:0",
                "-an",
                "-r",
                rate_arg.as_str(),
                "-f",
                "rawvideo",
                "-pix_fmt",
                settings.pixel_format.ffmpeg_name(),
                "pipe:1",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped());

        let mut proc = ToolProcess::spawn("video decode", cmd)?;
        let stdout = BufReader::new(proc.take_stdout()?);
        tracing::debug!(size = %track.size, %rate, "video decoder started");

        Ok(Box::new(FfmpegVideoCursor {
            proc,
            stdout,
            size: track.size,
            format: settings.pixel_format,
            rate,
            next: 0,
            done: false,
        }))
    }

    fn start_audio(
        &mut self,
        track: &AudioTrackInfo,
        settings: &AudioOutputSettings,
    ) -> SpatialResult<AudioCursor> {
        let cluster_ms = cluster_time_limit_ms(settings.chunk_frames, track.sample_rate);
        let cluster_arg = cluster_ms.to_string();
        let mut cmd = Command::new("ffmpeg");
        cmd.args(["-hide_banner", "-nostdin", "-loglevel", "error", "-i"])
            .arg(&self.info.path)
            .args([
                "-map",
                "0:a:0",
                "-vn",
                "-c:a",
                "copy",
                "-f",
                "matroska",
                "-cluster_time_limit",
                cluster_arg.as_str(),
                "pipe:1",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped());

        let mut proc = ToolProcess::spawn("audio demux", cmd)?;
        let stdout = BufReader::new(proc.take_stdout()?);
        tracing::debug!(
            codec = %track.codec_name,
            sample_rate = track.sample_rate,
            cluster_ms,
            "audio passthrough started"
        );

        Ok(Box::new(FfmpegAudioCursor {
            proc,
            chunker: ClusterChunker::new(stdout),
            done: false,
        }))
    }
}

/// Matroska cluster length that holds about `chunk_frames` audio frames.
fn cluster_time_limit_ms(chunk_frames: u32, sample_rate: u32) -> u64 {
    (u64::from(chunk_frames) * 1000 / u64::from(sample_rate.max(1))).max(1)
}

struct FfmpegVideoCursor {
    proc: ToolProcess,
    stdout: BufReader<ChildStdout>,
    size: FrameSize,
    format: PixelFormat,
    rate: FrameRate,
    next: u64,
    done: bool,
}

impl SampleCursor<VideoSample> for FfmpegVideoCursor {
    fn next_sample(&mut self) -> SpatialResult<Option<VideoSample>> {
        if self.done {
            return Ok(None);
        }
        let mut data = vec![0u8; byte_len(self.size, self.format)];
        let n = read_full(&mut self.stdout, &mut data).map_err(|e| {
            SpatialError::evaluation(format!("failed to read decoded video frame: {e}"))
        })?;
        if n == 0 {
            self.done = true;
            self.proc.finish()?;
            return Ok(None);
        }
        if n != data.len() {
            self.done = true;
            return Err(SpatialError::evaluation(format!(
                "decoded video frame {} is truncated: got {n} bytes, expected {}",
                self.next,
                data.len()
            )));
        }

        let pts = self.rate.frame_time(self.next);
        self.next += 1;
        Ok(Some(VideoSample {
            pts,
            image: PixelBuffer::from_data(self.size, self.format, data)?,
        }))
    }
}

struct FfmpegAudioCursor {
    proc: ToolProcess,
    chunker: ClusterChunker<BufReader<ChildStdout>>,
    done: bool,
}

impl SampleCursor<AudioSample> for FfmpegAudioCursor {
    fn next_sample(&mut self) -> SpatialResult<Option<AudioSample>> {
        if self.done {
            return Ok(None);
        }
        match self.chunker.next_chunk() {
            Ok(Some(chunk)) => Ok(Some(AudioSample {
                pts: chunk.pts,
                data: chunk.data,
            })),
            Ok(None) => {
                self.done = true;
                self.proc.finish()?;
                Ok(None)
            }
            Err(e) => {
                self.done = true;
                Err(e)
            }
        }
    }
}
