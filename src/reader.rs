use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::asset::{AssetInfo, AudioTrackInfo, VideoTrackInfo};
use crate::foundation::core::MediaTime;
use crate::foundation::error::{SpatialError, SpatialResult};
use crate::media::pixel::{PixelBuffer, PixelFormat};

/// One decoded side-by-side frame.
#[derive(Clone, Debug)]
pub struct VideoSample {
    /// Presentation time.
    pub pts: MediaTime,
    /// Full side-by-side image.
    pub image: PixelBuffer,
}

/// One chunk of source audio, still in the source's encoding. The bytes are forwarded to the
/// writer untouched; a reader and writer backend pair agrees on how chunks are framed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AudioSample {
    /// Presentation time of the first packet in the chunk.
    pub pts: MediaTime,
    /// Encoded bytes.
    pub data: Vec<u8>,
}

/// Forward-only cursor over one track's samples. `Ok(None)` means the track is exhausted.
pub trait SampleCursor<S>: Send {
    /// Pull the next sample.
    fn next_sample(&mut self) -> SpatialResult<Option<S>>;
}

/// Boxed video cursor returned by a [`ReaderBackend`].
pub type VideoCursor = Box<dyn SampleCursor<VideoSample>>;
/// Boxed audio cursor returned by a [`ReaderBackend`].
pub type AudioCursor = Box<dyn SampleCursor<AudioSample>>;

/// How decoded video frames are delivered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VideoOutputSettings {
    /// Pixel layout of every [`VideoSample::image`].
    pub pixel_format: PixelFormat,
}

/// How passthrough audio is chunked.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AudioOutputSettings {
    /// Target audio frames per chunk. Backends round this to whole packets.
    pub chunk_frames: u32,
}

impl Default for AudioOutputSettings {
    fn default() -> Self {
        Self { chunk_frames: 1024 }
    }
}

/// Source of decoded samples for an [`AssetReader`].
pub trait ReaderBackend: Send {
    /// Tracks of the opened asset.
    fn asset(&self) -> &AssetInfo;
    /// Begin decoding the visual track.
    fn start_video(
        &mut self,
        track: &VideoTrackInfo,
        settings: &VideoOutputSettings,
    ) -> SpatialResult<VideoCursor>;
    /// Begin reading the audio track without decoding it.
    fn start_audio(
        &mut self,
        track: &AudioTrackInfo,
        settings: &AudioOutputSettings,
    ) -> SpatialResult<AudioCursor>;
}

/// Lifecycle of an [`AssetReader`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReaderState {
    /// No outputs added yet.
    Created,
    /// At least the video output is configured.
    Configured,
    /// Cursors are live.
    Reading,
    /// Every started cursor returned `None`.
    Exhausted,
    /// Start or a cursor failed.
    Failed,
}

#[derive(Debug)]
struct ReaderTracking {
    state: ReaderState,
    open_tracks: usize,
}

type SharedTracking = Arc<Mutex<ReaderTracking>>;

fn lock(t: &SharedTracking) -> MutexGuard<'_, ReaderTracking> {
    t.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Read session over one source asset.
pub struct AssetReader {
    backend: Box<dyn ReaderBackend>,
    tracking: SharedTracking,
    video: Option<VideoOutputSettings>,
    audio: Option<AudioOutputSettings>,
}

impl AssetReader {
    /// Wrap an opened backend.
    pub fn new(backend: impl ReaderBackend + 'static) -> Self {
        Self {
            backend: Box::new(backend),
            tracking: Arc::new(Mutex::new(ReaderTracking {
                state: ReaderState::Created,
                open_tracks: 0,
            })),
            video: None,
            audio: None,
        }
    }

    /// Tracks of the source asset.
    pub fn asset(&self) -> &AssetInfo {
        self.backend.asset()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ReaderState {
        lock(&self.tracking).state
    }

    /// Request decoded frames from the visual track.
    pub fn add_video_output(&mut self, settings: VideoOutputSettings) -> SpatialResult<()> {
        self.ensure_configurable()?;
        self.asset().video_track()?;
        self.video = Some(settings);
        lock(&self.tracking).state = ReaderState::Configured;
        Ok(())
    }

    /// Request passthrough chunks from the audio track.
    pub fn add_audio_output(&mut self, settings: AudioOutputSettings) -> SpatialResult<()> {
        self.ensure_configurable()?;
        self.asset().audio_track()?;
        if settings.chunk_frames == 0 {
            return Err(SpatialError::validation("audio chunk_frames must be > 0"));
        }
        self.audio = Some(settings);
        Ok(())
    }

    fn ensure_configurable(&self) -> SpatialResult<()> {
        match self.state() {
            ReaderState::Created | ReaderState::Configured => Ok(()),
            other => Err(SpatialError::evaluation(format!(
                "reader outputs cannot change in state {other:?}"
            ))),
        }
    }

    /// Start decoding and hand out the cursors.
    #[tracing::instrument(level = "debug", skip(self), fields(path = %self.asset().path.display()))]
    pub fn start(&mut self) -> SpatialResult<ReaderCursors> {
        if self.state() != ReaderState::Configured {
            return Err(SpatialError::evaluation(format!(
                "reader cannot start in state {:?}",
                self.state()
            )));
        }
        let Some(video_settings) = self.video else {
            return Err(SpatialError::evaluation("reader has no video output"));
        };

        match self.start_cursors(video_settings) {
            Ok(cursors) => {
                let mut t = lock(&self.tracking);
                t.state = ReaderState::Reading;
                t.open_tracks = 1 + usize::from(cursors.audio.is_some());
                Ok(cursors)
            }
            Err(e) => {
                lock(&self.tracking).state = ReaderState::Failed;
                Err(match e {
                    SpatialError::ReaderStart(_) => e,
                    other => SpatialError::reader_start(other.to_string()),
                })
            }
        }
    }

    fn start_cursors(&mut self, video_settings: VideoOutputSettings) -> SpatialResult<ReaderCursors> {
        let video_track = self.asset().video_track()?.clone();
        let video = self.backend.start_video(&video_track, &video_settings)?;
        let audio = match self.audio {
            Some(settings) => {
                let audio_track = self.asset().audio_track()?.clone();
                Some(self.backend.start_audio(&audio_track, &settings)?)
            }
            None => None,
        };

        Ok(ReaderCursors {
            video: TrackCursor::new(video, self.tracking.clone()),
            audio: audio.map(|c| TrackCursor::new(c, self.tracking.clone())),
        })
    }
}

impl std::fmt::Debug for AssetReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetReader")
            .field("path", &self.asset().path)
            .field("state", &self.state())
            .finish()
    }
}

/// Cursors produced by [`AssetReader::start`].
pub struct ReaderCursors {
    /// Side-by-side frames.
    pub video: TrackCursor<VideoSample>,
    /// Audio chunks, when an audio output was added.
    pub audio: Option<TrackCursor<AudioSample>>,
}

/// Fused cursor that reports exhaustion and failure back to its reader.
pub struct TrackCursor<S> {
    inner: Box<dyn SampleCursor<S>>,
    tracking: SharedTracking,
    samples_read: u64,
    done: bool,
}

impl<S> TrackCursor<S> {
    fn new(inner: Box<dyn SampleCursor<S>>, tracking: SharedTracking) -> Self {
        Self {
            inner,
            tracking,
            samples_read: 0,
            done: false,
        }
    }

    /// Samples returned so far.
    pub fn samples_read(&self) -> u64 {
        self.samples_read
    }

    /// Pull the next sample. Once this returns `Ok(None)` or an error it keeps returning `Ok(None)`.
    pub fn next_sample(&mut self) -> SpatialResult<Option<S>> {
        if self.done {
            return Ok(None);
        }
        match self.inner.next_sample() {
            Ok(Some(sample)) => {
                self.samples_read += 1;
                Ok(Some(sample))
            }
            Ok(None) => {
                self.done = true;
                let mut t = lock(&self.tracking);
                t.open_tracks = t.open_tracks.saturating_sub(1);
                if t.open_tracks == 0 && t.state == ReaderState::Reading {
                    t.state = ReaderState::Exhausted;
                }
                Ok(None)
            }
            Err(e) => {
                self.done = true;
                lock(&self.tracking).state = ReaderState::Failed;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
#[path = "../tests/unit/reader.rs"]
mod tests;
