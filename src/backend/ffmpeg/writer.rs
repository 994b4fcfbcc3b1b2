use std::ffi::OsString;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::{ChildStdin, Command, Stdio};

use anyhow::Context as _;

use crate::backend::ffmpeg::{
    ToolProcess, ensure_parent_dir, is_ffmpeg_on_path, is_multiview_x265, run_ffmpeg,
};
use crate::foundation::core::{FrameRate, FrameSize, LayerId, MediaTime};
use crate::foundation::error::{SpatialError, SpatialResult};
use crate::media::pixel::{PixelFormat, byte_len};
use crate::reader::AudioSample;
use crate::tagged::{Tag, TaggedBufferGroup};
use crate::writer::{
    AudioInput, AudioInputSettings, MetadataItem, MultiviewSettings, VideoInput, WriterBackend,
    WriterInputs,
};

/// Multiview HEVC encoder for the `ffmpeg` writer.
///
/// The encoder must be an `x265` build with multiview support (`--num-views`). It receives both
/// layers of each frame packed side by side and writes them as two HEVC layers.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct EncoderOpts {
    /// `x265` executable.
    pub program: String,
    /// Extra `x265` arguments (`--preset`, `--crf`, ...).
    pub extra_args: Vec<String>,
}

impl Default for EncoderOpts {
    fn default() -> Self {
        Self {
            program: "x265".to_string(),
            extra_args: vec!["--preset".to_string(), "medium".to_string()],
        }
    }
}

/// Options for [`FfmpegWriter`].
#[derive(Clone, Debug)]
pub struct FfmpegWriterOpts {
    /// Final `.mov` path.
    pub out_path: PathBuf,
    /// Video encoder.
    pub encoder: EncoderOpts,
    /// Overwrite `out_path` if it already exists.
    pub overwrite: bool,
}

impl FfmpegWriterOpts {
    /// Defaults for writing to `out_path`.
    pub fn new(out_path: impl Into<PathBuf>) -> Self {
        Self {
            out_path: out_path.into(),
            encoder: EncoderOpts::default(),
            overwrite: true,
        }
    }
}

struct Scratch {
    _dir: tempfile::TempDir,
    video: PathBuf,
    frame_rate: FrameRate,
    audio: Option<PathBuf>,
    metadata: Vec<MetadataItem>,
}

/// Writer backend that encodes MV-HEVC with `x265` and muxes with `ffmpeg` in `finalize`.
///
/// Each appended frame lands in the slot its timestamp names at the multiview frame rate; slots
/// skipped by dropped frames repeat the previous frame. Audio arrives as Matroska chunks from
/// [`FfmpegReader`](crate::FfmpegReader) and is stream-copied into the output.
pub struct FfmpegWriter {
    opts: FfmpegWriterOpts,
    scratch: Option<Scratch>,
}

impl FfmpegWriter {
    /// Create a writer; nothing touches the filesystem until `start`.
    pub fn new(opts: FfmpegWriterOpts) -> Self {
        Self {
            opts,
            scratch: None,
        }
    }
}

impl std::fmt::Debug for FfmpegWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FfmpegWriter")
            .field("opts", &self.opts)
            .field("started", &self.scratch.is_some())
            .finish()
    }
}

impl WriterBackend for FfmpegWriter {
    fn can_apply(&self, settings: &MultiviewSettings) -> SpatialResult<()> {
        let FrameSize { width, height } = settings.eye_size;
        if !width.is_multiple_of(2) || !height.is_multiple_of(2) {
            return Err(SpatialError::output_settings_rejected(format!(
                "eye frame size must be even for 4:2:0 output, got {}",
                settings.eye_size
            )));
        }
        if width.checked_mul(2).is_none() {
            return Err(SpatialError::output_settings_rejected(format!(
                "eye width {width} is too large to pack both layers"
            )));
        }
        Ok(())
    }

    fn start(
        &mut self,
        video: &MultiviewSettings,
        audio: Option<&AudioInputSettings>,
        _at: MediaTime,
    ) -> SpatialResult<WriterInputs> {
        let out = &self.opts.out_path;
        ensure_parent_dir(out)?;
        if !self.opts.overwrite && out.exists() {
            return Err(SpatialError::writer_start(format!(
                "output file '{}' already exists",
                out.display()
            )));
        }
        if !is_ffmpeg_on_path() {
            return Err(SpatialError::writer_start(
                "ffmpeg is required for MV-HEVC output, but was not found on PATH",
            ));
        }
        if !is_multiview_x265(&self.opts.encoder.program) {
            return Err(SpatialError::writer_start(format!(
                "'{}' is not an x265 build with multiview (--num-views) support",
                self.opts.encoder.program
            )));
        }

        let dir = tempfile::Builder::new()
            .prefix("spatialvideo-")
            .tempdir()
            .context("failed to create writer scratch directory")?;
        let video_path = dir.path().join("layers.hevc");

        let encoder = spawn_encoder(&self.opts.encoder, video, &video_path)?;
        let audio_in = match audio {
            Some(settings) => {
                let path = dir.path().join("audio.mka");
                let file = File::create(&path)
                    .with_context(|| format!("failed to create '{}'", path.display()))?;
                tracing::debug!(
                    sample_rate = settings.sample_rate,
                    channels = settings.channels,
                    "spooling passthrough audio"
                );
                Some((path, BufWriter::new(file)))
            }
            None => None,
        };

        self.scratch = Some(Scratch {
            video: video_path,
            frame_rate: video.frame_rate,
            audio: audio_in.as_ref().map(|(p, _)| p.clone()),
            metadata: video.metadata.clone(),
            _dir: dir,
        });

        Ok(WriterInputs {
            video: Box::new(encoder),
            audio: audio_in.map(|(path, out)| {
                Box::new(FfmpegAudioInput { path, out: Some(out) }) as Box<dyn AudioInput>
            }),
        })
    }

    #[tracing::instrument(level = "debug", skip(self), fields(out = %self.opts.out_path.display()))]
    fn finalize(self: Box<Self>) -> SpatialResult<()> {
        let scratch = self
            .scratch
            .ok_or_else(|| SpatialError::evaluation("ffmpeg writer was never started"))?;
        let audio = scratch.audio.as_deref().filter(|path| {
            std::fs::metadata(path)
                .map(|m| m.len() > 0)
                .unwrap_or(false)
        });

        let args = mux_args(
            &scratch.video,
            scratch.frame_rate,
            audio,
            &scratch.metadata,
            &self.opts.out_path,
        );
        run_ffmpeg("mux", &args)?;
        tracing::info!(out = %self.opts.out_path.display(), "mux complete");
        Ok(())
    }
}

/// `ffmpeg` turns the packed frames into Y4M for `x265`, which writes the layered bitstream.
fn spawn_encoder(
    enc: &EncoderOpts,
    settings: &MultiviewSettings,
    out: &Path,
) -> SpatialResult<FfmpegVideoInput> {
    let eye = settings.eye_size;
    let packed_arg = FrameSize::new(eye.width.saturating_mul(2), eye.height)?.to_string();
    let rate_arg = settings.frame_rate.to_string();

    let mut convert = Command::new("ffmpeg");
    convert.stdin(Stdio::piped()).stdout(Stdio::piped());
    convert.args([
        "-hide_banner",
        "-loglevel",
        "error",
        "-f",
        "rawvideo",
        "-pix_fmt",
        settings.pixel_format.ffmpeg_name(),
        "-s",
        packed_arg.as_str(),
        "-r",
        rate_arg.as_str(),
        "-i",
        "pipe:0",
        "-an",
        "-pix_fmt",
        "yuv420p",
        "-f",
        "yuv4mpegpipe",
        "pipe:1",
    ]);
    let mut convert = ToolProcess::spawn("colour conversion", convert)?;
    let stdin = convert.take_stdin()?;
    let y4m = convert.take_stdout()?;

    let mut encode = Command::new(&enc.program);
    encode.stdin(Stdio::from(y4m)).stdout(Stdio::null());
    encode
        .args([
            "--input",
            "-",
            "--y4m",
            "--num-views",
            "2",
            "--format",
            "1",
            "--no-progress",
            "--log-level",
            "error",
        ])
        .args(&enc.extra_args)
        .arg("--output")
        .arg(out);
    let encode = ToolProcess::spawn("MV-HEVC encode", encode)?;

    Ok(FfmpegVideoInput {
        convert,
        encode,
        frames: Some(LayeredFrameWriter::new(
            stdin,
            eye,
            settings.pixel_format,
            settings.frame_rate,
        )?),
    })
}

fn mux_args(
    video: &Path,
    frame_rate: FrameRate,
    audio: Option<&Path>,
    metadata: &[MetadataItem],
    out: &Path,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-y", "-framerate"].map(OsString::from).to_vec();
    args.push(frame_rate.to_string().into());
    args.extend(["-f", "hevc", "-i"].map(OsString::from));
    args.push(video.into());
    match audio {
        Some(path) => {
            args.extend(["-f", "matroska", "-i"].map(OsString::from));
            args.push(path.into());
            args.extend(["-map", "0:v:0", "-map", "1:a:0"].map(OsString::from));
        }
        None => args.extend(["-map", "0:v:0", "-an"].map(OsString::from)),
    }
    args.extend(["-c", "copy", "-tag:v", "hvc1"].map(OsString::from));
    for item in metadata {
        args.push("-metadata".into());
        args.push(format!("{}={}", item.key, item.value).into());
    }
    args.extend(["-movflags", "use_metadata_tags"].map(OsString::from));
    args.push(out.into());
    args
}

/// 0-based frame slot `pts` falls in at `rate`, rounded to the nearest slot.
fn frame_slot(pts: MediaTime, rate: FrameRate) -> SpatialResult<u64> {
    let num = i128::from(pts.value) * i128::from(rate.num);
    let den = i128::from(pts.timescale) * i128::from(rate.den);
    let slot = (2 * num + den).div_euclid(2 * den);
    u64::try_from(slot).map_err(|_| {
        SpatialError::append(format!("presentation time {pts} is before the session start"))
    })
}

/// Packs both layers of each frame side by side in layer order and writes one packed frame per
/// slot of the multiview frame rate.
struct LayeredFrameWriter<W> {
    sink: W,
    eye: FrameSize,
    format: PixelFormat,
    rate: FrameRate,
    packed: Vec<u8>,
    next_slot: u64,
    has_frame: bool,
    held: u64,
}

impl<W> LayeredFrameWriter<W> {
    fn new(sink: W, eye: FrameSize, format: PixelFormat, rate: FrameRate) -> SpatialResult<Self> {
        let packed = FrameSize::new(eye.width.saturating_mul(2), eye.height)?;
        Ok(Self {
            sink,
            eye,
            format,
            rate,
            packed: vec![0; byte_len(packed, format)],
            next_slot: 0,
            has_frame: false,
            held: 0,
        })
    }

    /// Layer each buffer's tags name, checked against its size and the other buffers.
    fn layers(&self, group: &TaggedBufferGroup) -> SpatialResult<[usize; 2]> {
        let mut slots = [usize::MAX; 2];
        for (i, tagged) in group.iter().enumerate() {
            let [Tag::VideoLayerId(id), Tag::StereoView(view)] = tagged.tags() else {
                return Err(SpatialError::append("buffer is missing its layer tags"));
            };
            let layer = LayerId::from_index(id)
                .ok_or_else(|| SpatialError::append(format!("unknown video layer id {id}")))?;
            if layer.stereo_view() != view {
                return Err(SpatialError::append(format!(
                    "layer {id} is tagged {view:?}, expected {:?}",
                    layer.stereo_view()
                )));
            }
            let buf = tagged.buffer();
            if buf.size() != self.eye || buf.format() != self.format {
                return Err(SpatialError::append(format!(
                    "layer {id} buffer is {} {:?}, expected {} {:?}",
                    buf.size(),
                    buf.format(),
                    self.eye,
                    self.format
                )));
            }
            let slot = &mut slots[layer.index() as usize];
            if *slot != usize::MAX {
                return Err(SpatialError::append(format!("layer {id} appears twice")));
            }
            *slot = i;
        }
        if slots.contains(&usize::MAX) {
            return Err(SpatialError::append("frame is missing a layer"));
        }
        Ok(slots)
    }

    fn pack(&mut self, group: &TaggedBufferGroup, order: [usize; 2]) {
        let row_bytes = self.eye.width as usize * self.format.bytes_per_pixel();
        let buffers: Vec<_> = group.iter().collect();
        for (layer, &i) in order.iter().enumerate() {
            let buf = buffers[i].buffer();
            for y in 0..self.eye.height {
                let off = (y as usize * 2 + layer) * row_bytes;
                self.packed[off..off + row_bytes].copy_from_slice(buf.row(y));
            }
        }
    }
}

impl<W: Write> LayeredFrameWriter<W> {
    /// Write `group` into the slot for `pts`. Returns how many earlier slots were held.
    fn append(&mut self, group: &TaggedBufferGroup, pts: MediaTime) -> SpatialResult<u64> {
        let slot = frame_slot(pts, self.rate)?;
        if slot < self.next_slot {
            return Err(SpatialError::append(format!(
                "presentation time {pts} maps to frame {slot}, which is already written"
            )));
        }
        let order = self.layers(group)?;
        let gap = slot - self.next_slot;

        if self.has_frame {
            for _ in 0..gap {
                self.write_packed()?;
            }
            self.pack(group, order);
            self.write_packed()?;
        } else {
            // Nothing to hold before the first frame; it fills the leading slots itself.
            self.pack(group, order);
            for _ in 0..=gap {
                self.write_packed()?;
            }
            self.has_frame = true;
        }
        self.next_slot = slot + 1;
        self.held += gap;
        Ok(gap)
    }

    fn write_packed(&mut self) -> SpatialResult<()> {
        self.sink
            .write_all(&self.packed)
            .map_err(|e| SpatialError::append(format!("failed to write frame to the encoder: {e}")))
    }
}

struct FfmpegVideoInput {
    convert: ToolProcess,
    encode: ToolProcess,
    frames: Option<LayeredFrameWriter<ChildStdin>>,
}

impl VideoInput for FfmpegVideoInput {
    fn append_tagged_buffers(
        &mut self,
        group: TaggedBufferGroup,
        pts: MediaTime,
    ) -> SpatialResult<()> {
        let Some(frames) = self.frames.as_mut() else {
            return Err(SpatialError::append("encoder input is already closed"));
        };
        let held = frames.append(&group, pts)?;
        if held > 0 {
            tracing::debug!(%pts, held, "held previous frame over missing slots");
        }
        Ok(())
    }

    fn mark_finished(&mut self) -> SpatialResult<()> {
        if let Some(frames) = self.frames.take() {
            tracing::debug!(
                slots = frames.next_slot,
                held = frames.held,
                "closing encoder input"
            );
        }
        self.convert.finish()?;
        self.encode.finish()
    }
}

struct FfmpegAudioInput {
    path: PathBuf,
    out: Option<BufWriter<File>>,
}

impl AudioInput for FfmpegAudioInput {
    fn append(&mut self, sample: AudioSample) -> SpatialResult<()> {
        let Some(out) = self.out.as_mut() else {
            return Err(SpatialError::append("audio input is already closed"));
        };
        out.write_all(&sample.data)
            .with_context(|| format!("failed to write audio to '{}'", self.path.display()))?;
        Ok(())
    }

    fn mark_finished(&mut self) -> SpatialResult<()> {
        if let Some(mut out) = self.out.take() {
            out.flush()
                .with_context(|| format!("failed to flush '{}'", self.path.display()))?;
        }
        Ok(())
    }
}
