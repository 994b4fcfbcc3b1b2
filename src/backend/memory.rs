//! In-memory reader and writer backends for tests and debugging runs without `ffmpeg`.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::asset::{AssetInfo, AudioTrackInfo, VideoTrackInfo};
use crate::foundation::core::{FrameRate, FrameSize, MediaTime};
use crate::foundation::error::{SpatialError, SpatialResult};
use crate::media::pixel::{PixelBuffer, PixelFormat};
use crate::reader::{
    AudioCursor, AudioOutputSettings, AudioSample, ReaderBackend, SampleCursor, VideoCursor,
    VideoOutputSettings, VideoSample,
};
use crate::tagged::{Tag, TaggedBufferGroup};
use crate::writer::{
    AudioInput, AudioInputSettings, MultiviewSettings, VideoInput, WriterBackend, WriterInputs,
};

/// Fill of the left half of synthetic side-by-side frames.
pub const LEFT_EYE_RGBA: [u8; 4] = [220, 40, 40, 255];
/// Fill of the right half of synthetic side-by-side frames.
pub const RIGHT_EYE_RGBA: [u8; 4] = [40, 40, 220, 255];

/// Reader backend that synthesizes side-by-side frames and audio chunks in memory.
///
/// Audio chunks carry `f32` PCM standing in for encoded packets, four bytes per channel per frame.
#[derive(Clone, Debug)]
pub struct MemoryReader {
    info: AssetInfo,
    frames: u64,
    audio_frames: u64,
    corrupt_frames: Vec<u64>,
    fail_start: bool,
}

impl MemoryReader {
    /// `frames` frames of `size`, left half [`LEFT_EYE_RGBA`], right half [`RIGHT_EYE_RGBA`].
    pub fn synthetic(size: FrameSize, frame_rate: FrameRate, frames: u64) -> Self {
        Self {
            info: AssetInfo {
                path: PathBuf::from("memory://synthetic"),
                duration_secs: frames as f64 / frame_rate.as_f64(),
                video: Some(VideoTrackInfo {
                    index: 0,
                    codec_name: "rawvideo".to_string(),
                    size,
                    frame_rate,
                    frame_count: Some(frames),
                }),
                audio: None,
                tags: Default::default(),
            },
            frames,
            audio_frames: 0,
            corrupt_frames: Vec::new(),
            fail_start: false,
        }
    }

    /// Add an audio track covering the whole video duration.
    pub fn with_audio(mut self, sample_rate: u32, channels: u16) -> Self {
        self.audio_frames = (self.info.duration_secs * f64::from(sample_rate)).round() as u64;
        self.info.audio = Some(AudioTrackInfo {
            index: 1,
            codec_name: "pcm_f32le".to_string(),
            sample_rate,
            channels,
            bit_rate: Some(u64::from(sample_rate) * u64::from(channels) * 32),
        });
        self
    }

    /// Deliver frame `index` two pixels narrower than the rest.
    pub fn with_corrupt_frame(mut self, index: u64) -> Self {
        self.corrupt_frames.push(index);
        self
    }

    /// Remove the visual track.
    pub fn without_video(mut self) -> Self {
        self.info.video = None;
        self
    }

    /// Fail every `start_*` call.
    pub fn with_start_failure(mut self) -> Self {
        self.fail_start = true;
        self
    }
}

impl ReaderBackend for MemoryReader {
    fn asset(&self) -> &AssetInfo {
        &self.info
    }

    fn start_video(
        &mut self,
        track: &VideoTrackInfo,
        settings: &VideoOutputSettings,
    ) -> SpatialResult<VideoCursor> {
        if self.fail_start {
            return Err(SpatialError::reader_start("synthetic reader refused to start"));
        }
        Ok(Box::new(MemoryVideoCursor {
            template: side_by_side_frame(track.size, settings.pixel_format),
            rate: track.frame_rate,
            total: self.frames,
            next: 0,
            corrupt: self.corrupt_frames.clone(),
        }))
    }

    fn start_audio(
        &mut self,
        track: &AudioTrackInfo,
        settings: &AudioOutputSettings,
    ) -> SpatialResult<AudioCursor> {
        if self.fail_start {
            return Err(SpatialError::reader_start("synthetic reader refused to start"));
        }
        Ok(Box::new(MemoryAudioCursor {
            sample_rate: track.sample_rate,
            channels: track.channels,
            chunk_frames: u64::from(settings.chunk_frames),
            total: self.audio_frames,
            next: 0,
        }))
    }
}

fn side_by_side_frame(size: FrameSize, format: PixelFormat) -> PixelBuffer {
    let mut frame = PixelBuffer::new(size, format);
    let split = (size.width / 2) as usize * format.bytes_per_pixel();
    for y in 0..size.height {
        let row = frame.row_mut(y);
        let (left, right) = row.split_at_mut(split);
        for px in left.chunks_exact_mut(4) {
            px.copy_from_slice(&LEFT_EYE_RGBA);
        }
        for px in right.chunks_exact_mut(4) {
            px.copy_from_slice(&RIGHT_EYE_RGBA);
        }
    }
    frame
}

struct MemoryVideoCursor {
    template: PixelBuffer,
    rate: FrameRate,
    total: u64,
    next: u64,
    corrupt: Vec<u64>,
}

impl SampleCursor<VideoSample> for MemoryVideoCursor {
    fn next_sample(&mut self) -> SpatialResult<Option<VideoSample>> {
        if self.next >= self.total {
            return Ok(None);
        }
        let idx = self.next;
        self.next += 1;

        let image = if self.corrupt.contains(&idx) {
            let size = self.template.size();
            let narrow = FrameSize::new(size.width.saturating_sub(2).max(1), size.height)?;
            PixelBuffer::new(narrow, self.template.format())
        } else {
            self.template.clone()
        };
        Ok(Some(VideoSample {
            pts: self.rate.frame_time(idx),
            image,
        }))
    }
}

struct MemoryAudioCursor {
    sample_rate: u32,
    channels: u16,
    chunk_frames: u64,
    total: u64,
    next: u64,
}

impl SampleCursor<AudioSample> for MemoryAudioCursor {
    fn next_sample(&mut self) -> SpatialResult<Option<AudioSample>> {
        if self.next >= self.total {
            return Ok(None);
        }
        let frames = self.chunk_frames.min(self.total - self.next);
        let mut data = Vec::with_capacity(frames as usize * usize::from(self.channels) * 4);
        for n in self.next..self.next + frames {
            let v = (n % 480) as f32 / 480.0;
            for _ in 0..self.channels {
                data.extend_from_slice(&v.to_le_bytes());
            }
        }
        let pts = MediaTime::new(self.next as i64, self.sample_rate)?;
        self.next += frames;
        Ok(Some(AudioSample { pts, data }))
    }
}

/// Failure injection and capture options for [`MemoryWriter`].
#[derive(Clone, Debug, Default)]
pub struct MemoryWriterOpts {
    /// Keep a copy of every appended eye buffer.
    pub keep_pixels: bool,
    /// 0-based append calls on the video input that fail.
    pub fail_video_appends: Vec<u64>,
    /// Reject every multiview configuration.
    pub reject_settings: bool,
    /// Fail to start.
    pub fail_start: bool,
}

/// One multiview frame as seen by [`MemoryWriter`].
#[derive(Clone, Debug)]
pub struct CapturedGroup {
    /// Presentation time.
    pub pts: MediaTime,
    /// Tags of each buffer, in the order they were appended.
    pub tags: Vec<[Tag; 2]>,
    /// Size of each buffer.
    pub sizes: Vec<FrameSize>,
    /// Copies of the buffers when [`MemoryWriterOpts::keep_pixels`] is set.
    pub pixels: Vec<PixelBuffer>,
}

/// Everything a [`MemoryWriter`] received.
#[derive(Clone, Debug, Default)]
pub struct MemoryCapture {
    /// Video settings passed to `start`.
    pub video_settings: Option<MultiviewSettings>,
    /// Audio settings passed to `start`.
    pub audio_settings: Option<AudioInputSettings>,
    /// Accepted multiview frames.
    pub groups: Vec<CapturedGroup>,
    /// Accepted audio chunks.
    pub audio: Vec<AudioSample>,
    /// The video input was marked finished.
    pub video_finished: bool,
    /// The audio input was marked finished.
    pub audio_finished: bool,
    /// `finalize` ran.
    pub finalized: bool,
}

impl MemoryCapture {
    /// Total audio bytes received.
    pub fn audio_bytes(&self) -> usize {
        self.audio.iter().map(|s| s.data.len()).sum()
    }

    /// Total tagged buffers received.
    pub fn tagged_buffers(&self) -> usize {
        self.groups.iter().map(|g| g.tags.len()).sum()
    }
}

/// Shared view of a [`MemoryWriter`]'s capture that outlives the writer.
#[derive(Clone, Debug, Default)]
pub struct CaptureHandle(Arc<Mutex<MemoryCapture>>);

impl CaptureHandle {
    fn lock(&self) -> MutexGuard<'_, MemoryCapture> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the capture so far.
    pub fn snapshot(&self) -> MemoryCapture {
        self.lock().clone()
    }
}

/// Writer backend that records everything in memory.
#[derive(Debug, Default)]
pub struct MemoryWriter {
    opts: MemoryWriterOpts,
    capture: CaptureHandle,
}

impl MemoryWriter {
    /// Create a writer with the given options.
    pub fn new(opts: MemoryWriterOpts) -> Self {
        Self {
            opts,
            capture: CaptureHandle::default(),
        }
    }

    /// Handle to inspect what was written.
    pub fn capture(&self) -> CaptureHandle {
        self.capture.clone()
    }
}

impl WriterBackend for MemoryWriter {
    fn can_apply(&self, settings: &MultiviewSettings) -> SpatialResult<()> {
        if self.opts.reject_settings {
            return Err(SpatialError::output_settings_rejected(format!(
                "memory writer configured to reject {} multiview output",
                settings.eye_size
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
        if self.opts.fail_start {
            return Err(SpatialError::writer_start("memory writer configured to fail"));
        }
        {
            let mut cap = self.capture.lock();
            cap.video_settings = Some(video.clone());
            cap.audio_settings = audio.copied();
        }
        Ok(WriterInputs {
            video: Box::new(MemoryVideoInput {
                capture: self.capture.clone(),
                keep_pixels: self.opts.keep_pixels,
                fail_at: self.opts.fail_video_appends.clone(),
                calls: 0,
            }),
            audio: audio.map(|_| {
                Box::new(MemoryAudioInput {
                    capture: self.capture.clone(),
                }) as Box<dyn AudioInput>
            }),
        })
    }

    fn finalize(self: Box<Self>) -> SpatialResult<()> {
        self.capture.lock().finalized = true;
        Ok(())
    }
}

struct MemoryVideoInput {
    capture: CaptureHandle,
    keep_pixels: bool,
    fail_at: Vec<u64>,
    calls: u64,
}

impl VideoInput for MemoryVideoInput {
    fn append_tagged_buffers(
        &mut self,
        group: TaggedBufferGroup,
        pts: MediaTime,
    ) -> SpatialResult<()> {
        let call = self.calls;
        self.calls += 1;
        if self.fail_at.contains(&call) {
            return Err(SpatialError::append(format!("injected failure at append {call}")));
        }

        let captured = CapturedGroup {
            pts,
            tags: group.iter().map(|b| b.tags()).collect(),
            sizes: group.iter().map(|b| b.buffer().size()).collect(),
            pixels: if self.keep_pixels {
                group.iter().map(|b| b.buffer().to_pixel_buffer()).collect()
            } else {
                Vec::new()
            },
        };
        self.capture.lock().groups.push(captured);
        Ok(())
    }

    fn mark_finished(&mut self) -> SpatialResult<()> {
        self.capture.lock().video_finished = true;
        Ok(())
    }
}

struct MemoryAudioInput {
    capture: CaptureHandle,
}

impl AudioInput for MemoryAudioInput {
    fn append(&mut self, sample: AudioSample) -> SpatialResult<()> {
        self.capture.lock().audio.push(sample);
        Ok(())
    }

    fn mark_finished(&mut self) -> SpatialResult<()> {
        self.capture.lock().audio_finished = true;
        Ok(())
    }
}
