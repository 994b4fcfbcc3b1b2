//! Spatial video converts side-by-side stereoscopic video into multiview HEVC (MV-HEVC).
//!
//! Each side-by-side frame is cropped into a left and a right eye buffer, the buffers are tagged
//! as multiview layers 0 and 1, and the writer encodes them as one two-layer video track
//! alongside the untouched source audio.
//!
//! - Open a source with an [`AssetReader`] over a [`ReaderBackend`]
//! - Open an output with an [`AssetWriter`] over a [`WriterBackend`]
//! - Run [`transcode_to_mvhevc`], or [`spatial_video`] for the `ffmpeg`-backed file-to-file path
#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod foundation;
mod media;

pub(crate) mod asset;
pub mod audio_tools;
pub mod backend;
pub(crate) mod reader;
pub(crate) mod split;
pub(crate) mod tagged;
pub(crate) mod transcode;
pub(crate) mod writer;

pub use crate::foundation::core::{FrameRate, FrameSize, LayerId, MediaTime, StereoView};
pub use crate::foundation::error::{SpatialError, SpatialResult};

pub use crate::asset::{AssetInfo, AudioTrackInfo, VideoTrackInfo, probe_asset};
pub use crate::audio_tools::{extract_audio, merge};
pub use crate::backend::ffmpeg::{
    EncoderOpts, FfmpegReader, FfmpegWriter, FfmpegWriterOpts, ensure_parent_dir,
    is_ffmpeg_on_path, is_ffprobe_on_path, is_multiview_x265,
};
pub use crate::backend::memory::{
    CaptureHandle, CapturedGroup, MemoryCapture, MemoryReader, MemoryWriter, MemoryWriterOpts,
};
pub use crate::media::pixel::{PixelBuffer, PixelFormat};
pub use crate::media::pool::{PixelBufferPool, PoolOpts, PoolStats, PooledBuffer};
pub use crate::media::transfer::{CleanAperture, PixelTransferSession};
pub use crate::reader::{
    AssetReader, AudioCursor, AudioOutputSettings, AudioSample, ReaderBackend, ReaderCursors,
    ReaderState, SampleCursor, TrackCursor, VideoCursor, VideoOutputSettings, VideoSample,
};
pub use crate::split::{FrameSplitter, eye_aperture};
pub use crate::tagged::{Tag, TaggedBuffer, TaggedBufferGroup, assemble};
pub use crate::transcode::{
    PixelTransferPolicy, TranscodeOpts, TranscodeStats, output_path_for, remove_stale_output,
    spatial_video, transcode_to_mvhevc,
};
pub use crate::writer::{
    AssetWriter, AudioInput, AudioInputHandle, AudioInputSettings, FinalizeHandle, MetadataItem,
    MultiviewSettings, SPATIAL_AGGRESSORS_SEEN_KEY, SPATIAL_FORMAT_VERSION_KEY, VideoCodec,
    VideoInput, VideoInputHandle, WriterBackend, WriterInputs, WriterState, spatial_metadata,
};
