use std::path::{Path, PathBuf};
use std::sync::mpsc;

use crate::backend::ffmpeg::reader::FfmpegReader;
use crate::backend::ffmpeg::writer::{EncoderOpts, FfmpegWriter, FfmpegWriterOpts};
use crate::foundation::core::MediaTime;
use crate::foundation::error::{SpatialError, SpatialResult};
use crate::media::pixel::PixelFormat;
use crate::media::pool::{PixelBufferPool, PoolOpts};
use crate::media::transfer::PixelTransferSession;
use crate::reader::{
    AssetReader, AudioOutputSettings, AudioSample, TrackCursor, VideoOutputSettings, VideoSample,
};
use crate::split::FrameSplitter;
use crate::tagged::TaggedBufferGroup;
use crate::writer::{
    AssetWriter, AudioInputHandle, AudioInputSettings, MultiviewSettings, VideoInputHandle,
};

/// What to do when one eye cannot be cropped out of a frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelTransferPolicy {
    /// Abort the transcode.
    #[default]
    Fatal,
    /// Log, count, and continue with the next frame.
    SkipFrame,
}

/// Options controlling a transcode.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct TranscodeOpts {
    /// Depth of the bounded channel between each reader worker and writer worker.
    pub channel_capacity: usize,
    /// Policy for per-frame crop failures.
    pub pixel_transfer_failure: PixelTransferPolicy,
    /// Eye buffer pool settings.
    pub pool: PoolOpts,
    /// Layout the reader decodes into.
    pub reader_pixel_format: PixelFormat,
    /// Multiview encoder used by the `ffmpeg` writer.
    pub encoder: EncoderOpts,
    /// Target audio frames per chunk pulled from the reader.
    pub audio_chunk_frames: u32,
    /// Appended to the input file stem to name the output.
    pub output_suffix: String,
    /// Output container extension, without the dot.
    pub output_extension: String,
    /// Delete an existing output before writing.
    pub remove_existing_output: bool,
}

impl Default for TranscodeOpts {
    fn default() -> Self {
        Self {
            channel_capacity: 4,
            pixel_transfer_failure: PixelTransferPolicy::Fatal,
            pool: PoolOpts::default(),
            reader_pixel_format: PixelFormat::Rgba,
            encoder: EncoderOpts::default(),
            audio_chunk_frames: 1024,
            output_suffix: "_MVHEVC".to_string(),
            output_extension: "mov".to_string(),
            remove_existing_output: true,
        }
    }
}

impl TranscodeOpts {
    /// Reject option values the pipeline cannot run with.
    pub fn validate(&self) -> SpatialResult<()> {
        if self.channel_capacity == 0 {
            return Err(SpatialError::validation("channel_capacity must be > 0"));
        }
        if self.audio_chunk_frames == 0 {
            return Err(SpatialError::validation("audio_chunk_frames must be > 0"));
        }
        if self.output_suffix.is_empty() {
            return Err(SpatialError::validation(
                "output_suffix must not be empty (the output would replace the input)",
            ));
        }
        if self.output_extension.is_empty() || self.output_extension.contains(['.', '/', '\\']) {
            return Err(SpatialError::validation(format!(
                "output_extension '{}' must be a bare extension such as 'mov'",
                self.output_extension
            )));
        }
        if self.encoder.program.trim().is_empty() {
            return Err(SpatialError::validation("encoder.program must not be empty"));
        }
        Ok(())
    }
}

/// Counters from one transcode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TranscodeStats {
    /// Side-by-side frames pulled from the reader.
    pub video_samples_read: u64,
    /// Eye buffers the writer accepted (two per frame).
    pub tagged_buffers_appended: u64,
    /// Frames the writer rejected.
    pub frames_dropped: u64,
    /// Frames skipped because an eye could not be cropped.
    pub frames_skipped: u64,
    /// Audio chunks pulled from the reader.
    pub audio_samples_read: u64,
    /// Audio chunks the writer accepted.
    pub audio_samples_forwarded: u64,
    /// Audio chunks the writer rejected.
    pub audio_samples_dropped: u64,
    /// Eye buffers the pool had to allocate.
    pub pool_allocations: u64,
}

#[derive(Default)]
struct ProducerStats {
    read: u64,
    skipped: u64,
    pool_allocations: u64,
}

#[derive(Default)]
struct ConsumerStats {
    appended: u64,
    dropped: u64,
}

/// Convert the side-by-side video from `reader` into a multiview stream on `writer`.
///
/// Reading, splitting, and appending run on dedicated workers joined by bounded channels. Audio is
/// forwarded chunk by chunk without decoding. Returns once the writer has finalized the output.
#[tracing::instrument(skip_all, fields(source = %reader.asset().path.display()))]
pub fn transcode_to_mvhevc(
    mut reader: AssetReader,
    mut writer: AssetWriter,
    opts: &TranscodeOpts,
) -> SpatialResult<TranscodeStats> {
    opts.validate()?;

    let asset = reader.asset().clone();
    let track = asset.video_track()?.clone();
    let splitter = FrameSplitter::new(track.size)?;
    let eye = splitter.eye_frame_size();

    writer.add_video_input(MultiviewSettings::new(
        eye,
        opts.reader_pixel_format,
        track.frame_rate,
    ))?;
    reader.add_video_output(VideoOutputSettings {
        pixel_format: opts.reader_pixel_format,
    })?;
    match asset.audio.as_ref() {
        Some(audio) => {
            reader.add_audio_output(AudioOutputSettings {
                chunk_frames: opts.audio_chunk_frames,
            })?;
            writer.add_audio_input(AudioInputSettings {
                sample_rate: audio.sample_rate,
                channels: audio.channels,
            })?;
        }
        None => tracing::info!("source has no audio track, writing video only"),
    }

    let cursors = reader.start()?;
    let (mut video_in, audio_in) = writer.start(MediaTime::ZERO)?;
    tracing::info!(
        source = %track.size,
        eye = %eye,
        rate = %track.frame_rate,
        audio = asset.audio.is_some(),
        "transcode started"
    );

    let cap = opts.channel_capacity;
    let policy = opts.pixel_transfer_failure;
    let pool_opts = opts.pool;

    let (produced, consumed, (audio_read, audio_forwarded)) = std::thread::scope(
        |scope| -> SpatialResult<(ProducerStats, ConsumerStats, (u64, ConsumerStats))> {
            let (video_tx, video_rx) = mpsc::sync_channel::<(MediaTime, TaggedBufferGroup)>(cap);
            let mut video_cursor = cursors.video;

            let video_reader = scope.spawn(move || {
                produce_video(&mut video_cursor, &splitter, pool_opts, policy, &video_tx)
            });
            let video_writer = scope.spawn(|| consume_video(&mut video_in, video_rx));

            let audio = match (cursors.audio, audio_in) {
                (Some(mut cursor), Some(mut input)) => {
                    let (audio_tx, audio_rx) = mpsc::sync_channel::<AudioSample>(cap);
                    let audio_reader = scope.spawn(move || produce_audio(&mut cursor, &audio_tx));
                    let audio_writer = scope.spawn(move || consume_audio(&mut input, audio_rx));
                    Some((audio_reader, audio_writer))
                }
                _ => None,
            };

            let produced = join_worker(video_reader, "video reader");
            let consumed = join_worker(video_writer, "video writer");
            let audio = match audio {
                Some((audio_reader, audio_writer)) => {
                    let read = join_worker(audio_reader, "audio reader");
                    let written = join_worker(audio_writer, "audio writer");
                    read.and_then(|read| written.map(|written| (read, written)))
                }
                None => Ok((0, ConsumerStats::default())),
            };

            Ok((produced?, consumed?, audio?))
        },
    )?;

    let stats = TranscodeStats {
        video_samples_read: produced.read,
        tagged_buffers_appended: consumed.appended * 2,
        frames_dropped: consumed.dropped,
        frames_skipped: produced.skipped,
        audio_samples_read: audio_read,
        audio_samples_forwarded: audio_forwarded.appended,
        audio_samples_dropped: audio_forwarded.dropped,
        pool_allocations: produced.pool_allocations,
    };

    writer.finalize()?.wait()?;
    tracing::info!(
        frames = stats.video_samples_read,
        buffers = stats.tagged_buffers_appended,
        dropped = stats.frames_dropped,
        skipped = stats.frames_skipped,
        audio = stats.audio_samples_forwarded,
        "transcode finished"
    );
    Ok(stats)
}

fn join_worker<T>(
    handle: std::thread::ScopedJoinHandle<'_, SpatialResult<T>>,
    name: &str,
) -> SpatialResult<T> {
    handle
        .join()
        .map_err(|_| SpatialError::evaluation(format!("{name} thread panicked")))?
}

fn produce_video(
    cursor: &mut TrackCursor<VideoSample>,
    splitter: &FrameSplitter,
    pool_opts: PoolOpts,
    policy: PixelTransferPolicy,
    tx: &mpsc::SyncSender<(MediaTime, TaggedBufferGroup)>,
) -> SpatialResult<ProducerStats> {
    let mut stats = ProducerStats::default();
    let mut session = PixelTransferSession::new();
    let mut pool: Option<PixelBufferPool> = None;

    while let Some(sample) = cursor.next_sample()? {
        // Created on the first frame so the pool matches the decoded pixel format.
        let pool = match &mut pool {
            Some(pool) => &*pool,
            slot @ None => &*slot.insert(PixelBufferPool::new(
                splitter.eye_frame_size(),
                sample.image.format(),
                pool_opts,
            )?),
        };

        let group = match splitter.split(&sample.image, pool, &mut session) {
            Ok(group) => group,
            Err(e @ SpatialError::PixelTransfer(_)) if policy == PixelTransferPolicy::SkipFrame => {
                tracing::warn!(pts = %sample.pts, error = %e, "skipping frame");
                stats.skipped += 1;
                continue;
            }
            Err(e) => return Err(e),
        };

        if tx.send((sample.pts, group)).is_err() {
            // The writer worker stopped; its own result carries the reason.
            break;
        }
    }

    stats.read = cursor.samples_read();
    stats.pool_allocations = pool.map(|p| p.stats().allocations).unwrap_or(0);
    Ok(stats)
}

fn consume_video(
    input: &mut VideoInputHandle,
    rx: mpsc::Receiver<(MediaTime, TaggedBufferGroup)>,
) -> SpatialResult<ConsumerStats> {
    let mut stats = ConsumerStats::default();
    for (pts, group) in rx {
        match input.append(group, pts) {
            Ok(()) => {
                stats.appended += 1;
                tracing::debug!(%pts, "appended tagged buffers");
            }
            Err(e) => {
                stats.dropped += 1;
                tracing::warn!(%pts, error = %e, "dropped frame");
            }
        }
    }
    input.mark_finished()?;
    Ok(stats)
}

fn produce_audio(
    cursor: &mut TrackCursor<AudioSample>,
    tx: &mpsc::SyncSender<AudioSample>,
) -> SpatialResult<u64> {
    while let Some(sample) = cursor.next_sample()? {
        if tx.send(sample).is_err() {
            break;
        }
    }
    Ok(cursor.samples_read())
}

fn consume_audio(
    input: &mut AudioInputHandle,
    rx: mpsc::Receiver<AudioSample>,
) -> SpatialResult<ConsumerStats> {
    let mut stats = ConsumerStats::default();
    for sample in rx {
        let pts = sample.pts;
        match input.append(sample) {
            Ok(()) => stats.appended += 1,
            Err(e) => {
                stats.dropped += 1;
                tracing::warn!(%pts, error = %e, "dropped audio chunk");
            }
        }
    }
    input.mark_finished()?;
    Ok(stats)
}

/// `<dir>/<stem><suffix>.<extension>` for `input`.
pub fn output_path_for(input: &Path, opts: &TranscodeOpts) -> SpatialResult<PathBuf> {
    let stem = input.file_stem().ok_or_else(|| {
        SpatialError::validation(format!("input '{}' has no file name", input.display()))
    })?;
    let mut name = stem.to_os_string();
    name.push(&opts.output_suffix);
    name.push(".");
    name.push(&opts.output_extension);
    Ok(input.with_file_name(name))
}

/// Delete `path` if it exists.
pub fn remove_stale_output(path: &Path) -> SpatialResult<()> {
    use anyhow::Context as _;
    match std::fs::remove_file(path) {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "removed stale output");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e)
            .with_context(|| format!("failed to remove existing output '{}'", path.display()))
            .map_err(Into::into),
    }
}

/// Convert the side-by-side file at `input` with the `ffmpeg` backends and return the output path.
#[tracing::instrument(skip(opts))]
pub fn spatial_video(input: &Path, opts: &TranscodeOpts) -> SpatialResult<PathBuf> {
    opts.validate()?;
    let out = output_path_for(input, opts)?;
    if out == input {
        return Err(SpatialError::validation(format!(
            "output path '{}' would overwrite the input",
            out.display()
        )));
    }
    if opts.remove_existing_output {
        remove_stale_output(&out)?;
    }

    let reader = AssetReader::new(FfmpegReader::open(input)?);
    let writer = AssetWriter::new(FfmpegWriter::new(FfmpegWriterOpts {
        out_path: out.clone(),
        encoder: opts.encoder.clone(),
        overwrite: opts.remove_existing_output,
    }));
    transcode_to_mvhevc(reader, writer, opts)?;
    Ok(out)
}
