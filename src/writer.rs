use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

use crate::foundation::core::{FrameRate, FrameSize, LayerId, MediaTime, StereoView};
use crate::foundation::error::{SpatialError, SpatialResult};
use crate::media::pixel::PixelFormat;
use crate::reader::AudioSample;
use crate::tagged::TaggedBufferGroup;

/// Container metadata key carrying the spatial format version.
pub const SPATIAL_FORMAT_VERSION_KEY: &str = "com.apple.quicktime.spatial.format-version";
/// Container metadata key carrying the aggressor count.
pub const SPATIAL_AGGRESSORS_SEEN_KEY: &str = "com.apple.quicktime.spatial.aggressors-seen";
/// Interaxial distance of a typical stereo rig, in micrometers.
pub const DEFAULT_STEREO_BASELINE_UM: u32 = 63_123;

/// One key/value pair written into the output container.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MetadataItem {
    /// Fully qualified key.
    pub key: String,
    /// String value.
    pub value: String,
}

impl MetadataItem {
    /// Build an item.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// The metadata every spatial video output carries.
pub fn spatial_metadata() -> Vec<MetadataItem> {
    vec![
        MetadataItem::new(SPATIAL_FORMAT_VERSION_KEY, "1.0"),
        MetadataItem::new(SPATIAL_AGGRESSORS_SEEN_KEY, "0"),
    ]
}

/// Compression family of the multiview video track.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum VideoCodec {
    /// HEVC with multiview layers.
    #[default]
    Hevc,
}

/// Compression properties of the multiview video input.
#[derive(Clone, Debug, PartialEq)]
pub struct MultiviewSettings {
    /// Codec family.
    pub codec: VideoCodec,
    /// Per-layer frame size.
    pub eye_size: FrameSize,
    /// Layout of the tagged buffers.
    pub pixel_format: PixelFormat,
    /// Rate of multiview frames (one per time instant, not per layer).
    pub frame_rate: FrameRate,
    /// Layer ids in the stream, in view order.
    pub video_layer_ids: Vec<u32>,
    /// View ids, one per layer.
    pub view_ids: Vec<u32>,
    /// The (left, right) view ids.
    pub left_and_right_view_ids: Vec<u32>,
    /// A left eye view is present.
    pub has_left_eye_view: bool,
    /// A right eye view is present.
    pub has_right_eye_view: bool,
    /// Eye shown by 2D players.
    pub hero_eye: StereoView,
    /// Stereo camera baseline in micrometers.
    pub stereo_camera_baseline_um: u32,
    /// Container metadata.
    pub metadata: Vec<MetadataItem>,
}

impl MultiviewSettings {
    /// Two-layer stereo settings: layer 0 left (hero), layer 1 right.
    pub fn new(eye_size: FrameSize, pixel_format: PixelFormat, frame_rate: FrameRate) -> Self {
        let ids: Vec<u32> = LayerId::ALL.iter().map(|l| l.index()).collect();
        Self {
            codec: VideoCodec::Hevc,
            eye_size,
            pixel_format,
            frame_rate,
            video_layer_ids: ids.clone(),
            view_ids: ids.clone(),
            left_and_right_view_ids: ids,
            has_left_eye_view: true,
            has_right_eye_view: true,
            hero_eye: StereoView::Left,
            stereo_camera_baseline_um: DEFAULT_STEREO_BASELINE_UM,
            metadata: spatial_metadata(),
        }
    }

    /// Check the settings describe a two-view stereo stream. Size limits of a particular encoder
    /// are left to [`WriterBackend::can_apply`].
    pub fn validate(&self) -> SpatialResult<()> {
        let FrameSize { width, height } = self.eye_size;
        if width == 0 || height == 0 {
            return Err(SpatialError::output_settings_rejected(format!(
                "eye frame size must be non-zero, got {}",
                self.eye_size
            )));
        }
        if self.video_layer_ids != [0, 1] {
            return Err(SpatialError::output_settings_rejected(format!(
                "video layer ids must be [0, 1], got {:?}",
                self.video_layer_ids
            )));
        }
        if self.view_ids != self.video_layer_ids || self.left_and_right_view_ids != self.view_ids {
            return Err(SpatialError::output_settings_rejected(
                "view ids must match the video layer ids",
            ));
        }
        if !(self.has_left_eye_view && self.has_right_eye_view) {
            return Err(SpatialError::output_settings_rejected(
                "both eye views must be present",
            ));
        }
        if self.stereo_camera_baseline_um == 0 {
            return Err(SpatialError::output_settings_rejected(
                "stereo camera baseline must be > 0",
            ));
        }
        Ok(())
    }
}

/// Parameters of the source audio the audio input receives. The audio itself stays encoded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AudioInputSettings {
    /// Samples per second.
    pub sample_rate: u32,
    /// Interleaved channel count.
    pub channels: u16,
}

/// Destination for multiview-tagged frames.
pub trait VideoInput: Send {
    /// Append both layers of one frame. The group's buffers go back to their pool once dropped.
    fn append_tagged_buffers(&mut self, group: TaggedBufferGroup, pts: MediaTime)
    -> SpatialResult<()>;
    /// No more frames will be appended.
    fn mark_finished(&mut self) -> SpatialResult<()>;
}

/// Destination for audio chunks.
pub trait AudioInput: Send {
    /// Append one chunk as-is.
    fn append(&mut self, sample: AudioSample) -> SpatialResult<()>;
    /// No more chunks will be appended.
    fn mark_finished(&mut self) -> SpatialResult<()>;
}

/// Inputs created by [`WriterBackend::start`].
pub struct WriterInputs {
    /// Multiview video input.
    pub video: Box<dyn VideoInput>,
    /// Audio input, when audio settings were given.
    pub audio: Option<Box<dyn AudioInput>>,
}

/// Output container implementation behind an [`AssetWriter`].
pub trait WriterBackend: Send {
    /// Reject settings this backend cannot encode.
    fn can_apply(&self, settings: &MultiviewSettings) -> SpatialResult<()>;
    /// Open the output and create the inputs. Sessions always start at [`MediaTime::ZERO`].
    fn start(
        &mut self,
        video: &MultiviewSettings,
        audio: Option<&AudioInputSettings>,
        at: MediaTime,
    ) -> SpatialResult<WriterInputs>;
    /// Complete the container. Called once, after every input is marked finished.
    fn finalize(self: Box<Self>) -> SpatialResult<()>;
}

/// Lifecycle of an [`AssetWriter`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriterState {
    /// No inputs added yet.
    Created,
    /// The video input is configured.
    Configured,
    /// Inputs accept samples.
    Writing,
    /// The container is being completed in the background.
    Finalizing,
    /// The output is complete.
    Finished,
    /// Start or finalize failed.
    Failed,
}

#[derive(Debug)]
struct WriterTracking {
    state: WriterState,
    video_finished: bool,
    audio_finished: bool,
}

type SharedTracking = Arc<Mutex<WriterTracking>>;

fn lock(t: &SharedTracking) -> MutexGuard<'_, WriterTracking> {
    t.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Append-only write session producing one output container.
pub struct AssetWriter {
    backend: Box<dyn WriterBackend>,
    tracking: SharedTracking,
    video: Option<MultiviewSettings>,
    audio: Option<AudioInputSettings>,
}

impl AssetWriter {
    /// Wrap a backend.
    pub fn new(backend: impl WriterBackend + 'static) -> Self {
        Self {
            backend: Box::new(backend),
            tracking: Arc::new(Mutex::new(WriterTracking {
                state: WriterState::Created,
                video_finished: false,
                audio_finished: false,
            })),
            video: None,
            audio: None,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> WriterState {
        lock(&self.tracking).state
    }

    /// Configure the multiview video input.
    pub fn add_video_input(&mut self, settings: MultiviewSettings) -> SpatialResult<()> {
        self.ensure_configurable()?;
        settings
            .validate()
            .and_then(|()| self.backend.can_apply(&settings))
            .map_err(|e| match e {
                SpatialError::OutputSettingsRejected(_) => e,
                other => SpatialError::output_settings_rejected(other.to_string()),
            })?;
        self.video = Some(settings);
        lock(&self.tracking).state = WriterState::Configured;
        Ok(())
    }

    /// Configure the audio input.
    pub fn add_audio_input(&mut self, settings: AudioInputSettings) -> SpatialResult<()> {
        self.ensure_configurable()?;
        if settings.sample_rate == 0 || settings.channels == 0 {
            return Err(SpatialError::output_settings_rejected(format!(
                "audio input needs a sample rate and channels, got {settings:?}"
            )));
        }
        self.audio = Some(settings);
        Ok(())
    }

    fn ensure_configurable(&self) -> SpatialResult<()> {
        match self.state() {
            WriterState::Created | WriterState::Configured => Ok(()),
            other => Err(SpatialError::evaluation(format!(
                "writer inputs cannot change in state {other:?}"
            ))),
        }
    }

    /// Open the output and begin the session at `at`.
    pub fn start(&mut self, at: MediaTime) -> SpatialResult<(VideoInputHandle, Option<AudioInputHandle>)> {
        if self.state() != WriterState::Configured {
            return Err(SpatialError::evaluation(format!(
                "writer cannot start in state {:?}",
                self.state()
            )));
        }
        if at != MediaTime::ZERO {
            return Err(SpatialError::writer_start(format!(
                "sessions start at zero, got {at}"
            )));
        }
        let Some(video) = self.video.as_ref() else {
            return Err(SpatialError::evaluation("writer has no video input"));
        };

        let inputs = match self.backend.start(video, self.audio.as_ref(), at) {
            Ok(inputs) => inputs,
            Err(e) => {
                lock(&self.tracking).state = WriterState::Failed;
                return Err(match e {
                    SpatialError::WriterStart(_) => e,
                    other => SpatialError::writer_start(other.to_string()),
                });
            }
        };

        {
            let mut t = lock(&self.tracking);
            t.state = WriterState::Writing;
            t.audio_finished = inputs.audio.is_none();
        }
        tracing::info!(eye = %video.eye_size, rate = %video.frame_rate, "writer started");

        let video = VideoInputHandle {
            inner: inputs.video,
            tracking: self.tracking.clone(),
            last_pts: None,
            appended: 0,
            finished: false,
        };
        let audio = inputs.audio.map(|inner| AudioInputHandle {
            inner,
            tracking: self.tracking.clone(),
            appended: 0,
            finished: false,
        });
        Ok((video, audio))
    }

    /// Complete the output in the background. Every input must already be marked finished.
    pub fn finalize(self) -> SpatialResult<FinalizeHandle> {
        {
            let mut t = lock(&self.tracking);
            if t.state != WriterState::Writing {
                return Err(SpatialError::evaluation(format!(
                    "writer cannot finalize in state {:?}",
                    t.state
                )));
            }
            if !(t.video_finished && t.audio_finished) {
                return Err(SpatialError::evaluation(
                    "writer inputs must be marked finished before finalize",
                ));
            }
            t.state = WriterState::Finalizing;
        }

        let backend = self.backend;
        let tracking = self.tracking.clone();
        let handle = std::thread::Builder::new()
            .name("spatialvideo-finalize".to_string())
            .spawn(move || {
                let res = backend.finalize();
                lock(&tracking).state = if res.is_ok() {
                    WriterState::Finished
                } else {
                    WriterState::Failed
                };
                res
            })
            .map_err(|e| SpatialError::evaluation(format!("failed to spawn finalize thread: {e}")))?;

        Ok(FinalizeHandle {
            handle,
            tracking: self.tracking,
        })
    }
}

impl std::fmt::Debug for AssetWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetWriter")
            .field("state", &self.state())
            .field("video", &self.video)
            .field("audio", &self.audio)
            .finish()
    }
}

/// Completion token for [`AssetWriter::finalize`].
pub struct FinalizeHandle {
    handle: JoinHandle<SpatialResult<()>>,
    tracking: SharedTracking,
}

impl FinalizeHandle {
    /// Block until the output is complete.
    pub fn wait(self) -> SpatialResult<()> {
        let res = self
            .handle
            .join()
            .map_err(|_| SpatialError::evaluation("finalize thread panicked"))
            .and_then(|res| res);
        if res.is_err() {
            lock(&self.tracking).state = WriterState::Failed;
        }
        res
    }
}

/// Session-aware wrapper around the backend's [`VideoInput`].
pub struct VideoInputHandle {
    inner: Box<dyn VideoInput>,
    tracking: SharedTracking,
    last_pts: Option<MediaTime>,
    appended: u64,
    finished: bool,
}

impl VideoInputHandle {
    /// False once the input is finished or the session stopped writing.
    pub fn is_ready_for_more_data(&self) -> bool {
        !self.finished && lock(&self.tracking).state == WriterState::Writing
    }

    /// Groups accepted so far.
    pub fn appended(&self) -> u64 {
        self.appended
    }

    /// Append one frame's tagged buffers at `pts`. Timestamps must strictly increase.
    pub fn append(&mut self, group: TaggedBufferGroup, pts: MediaTime) -> SpatialResult<()> {
        if !self.is_ready_for_more_data() {
            return Err(SpatialError::append("video input is not accepting data"));
        }
        if let Some(last) = self.last_pts
            && pts <= last
        {
            return Err(SpatialError::append(format!(
                "out-of-order presentation time {pts} after {last}"
            )));
        }
        self.inner
            .append_tagged_buffers(group, pts)
            .map_err(|e| match e {
                SpatialError::Append(_) => e,
                other => SpatialError::append(other.to_string()),
            })?;
        self.last_pts = Some(pts);
        self.appended += 1;
        Ok(())
    }

    /// Close the input. Idempotent.
    pub fn mark_finished(&mut self) -> SpatialResult<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        self.inner.mark_finished()?;
        lock(&self.tracking).video_finished = true;
        Ok(())
    }
}

/// Session-aware wrapper around the backend's [`AudioInput`].
pub struct AudioInputHandle {
    inner: Box<dyn AudioInput>,
    tracking: SharedTracking,
    appended: u64,
    finished: bool,
}

impl AudioInputHandle {
    /// False once the input is finished or the session stopped writing.
    pub fn is_ready_for_more_data(&self) -> bool {
        !self.finished && lock(&self.tracking).state == WriterState::Writing
    }

    /// Chunks accepted so far.
    pub fn appended(&self) -> u64 {
        self.appended
    }

    /// Append one chunk unmodified.
    pub fn append(&mut self, sample: AudioSample) -> SpatialResult<()> {
        if !self.is_ready_for_more_data() {
            return Err(SpatialError::append("audio input is not accepting data"));
        }
        self.inner.append(sample).map_err(|e| match e {
            SpatialError::Append(_) => e,
            other => SpatialError::append(other.to_string()),
        })?;
        self.appended += 1;
        Ok(())
    }

    /// Close the input. Idempotent.
    pub fn mark_finished(&mut self) -> SpatialResult<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        self.inner.mark_finished()?;
        lock(&self.tracking).audio_finished = true;
        Ok(())
    }
}

#[cfg(test)]
#[path = "../tests/unit/writer.rs"]
mod tests;
