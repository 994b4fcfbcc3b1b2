use super::*;
use crate::backend::memory::{MemoryWriter, MemoryWriterOpts};
use crate::media::pool::{PixelBufferPool, PoolOpts};
use crate::tagged::assemble;

fn settings() -> MultiviewSettings {
    MultiviewSettings::new(
        FrameSize::new(4, 2).unwrap(),
        PixelFormat::Rgba,
        FrameRate::new(30, 1).unwrap(),
    )
}

fn group(pool: &PixelBufferPool) -> TaggedBufferGroup {
    assemble(pool.acquire(), pool.acquire())
}

fn eye_pool() -> PixelBufferPool {
    PixelBufferPool::new(
        FrameSize::new(4, 2).unwrap(),
        PixelFormat::Rgba,
        PoolOpts::default(),
    )
    .unwrap()
}

#[test]
fn default_settings_describe_left_hero_stereo() {
    let s = settings();
    assert!(s.validate().is_ok());
    assert_eq!(s.video_layer_ids, vec![0, 1]);
    assert_eq!(s.hero_eye, StereoView::Left);
    assert_eq!(s.stereo_camera_baseline_um, 63_123);
    assert_eq!(
        s.metadata,
        vec![
            MetadataItem::new("com.apple.quicktime.spatial.format-version", "1.0"),
            MetadataItem::new("com.apple.quicktime.spatial.aggressors-seen", "0"),
        ]
    );
}

#[test]
fn invalid_settings_are_rejected() {
    let mut empty = settings();
    empty.eye_size = FrameSize { width: 0, height: 2 };
    assert!(matches!(
        empty.validate(),
        Err(SpatialError::OutputSettingsRejected(_))
    ));

    let mut three_views = settings();
    three_views.video_layer_ids = vec![0, 1, 2];
    assert!(three_views.validate().is_err());

    let mut mono = settings();
    mono.has_right_eye_view = false;
    assert!(mono.validate().is_err());

    let mut writer = AssetWriter::new(MemoryWriter::new(MemoryWriterOpts::default()));
    assert!(matches!(
        writer.add_video_input(three_views),
        Err(SpatialError::OutputSettingsRejected(_))
    ));
    assert_eq!(writer.state(), WriterState::Created);
}

#[test]
fn odd_eye_sizes_are_left_to_the_backend() {
    let mut odd = settings();
    odd.eye_size = FrameSize::new(961, 4).unwrap();
    assert!(odd.validate().is_ok());

    let mut writer = AssetWriter::new(MemoryWriter::new(MemoryWriterOpts::default()));
    writer.add_video_input(odd).unwrap();
    assert_eq!(writer.state(), WriterState::Configured);
}

#[test]
fn lifecycle_finalizes_once_inputs_finish() {
    let backend = MemoryWriter::new(MemoryWriterOpts::default());
    let capture = backend.capture();
    let mut writer = AssetWriter::new(backend);
    writer.add_video_input(settings()).unwrap();
    writer
        .add_audio_input(AudioInputSettings {
            sample_rate: 48_000,
            channels: 2,
        })
        .unwrap();
    let (mut video, audio) = writer.start(MediaTime::ZERO).unwrap();
    let mut audio = audio.unwrap();
    assert_eq!(writer.state(), WriterState::Writing);

    let pool = eye_pool();
    let rate = FrameRate::new(30, 1).unwrap();
    for i in 0..3 {
        video.append(group(&pool), rate.frame_time(i)).unwrap();
    }
    assert_eq!(video.appended(), 3);
    // Appended buffers were released back to the pool.
    assert_eq!(pool.stats().outstanding, 0);

    audio
        .append(AudioSample {
            pts: MediaTime::ZERO,
            data: vec![0; 8],
        })
        .unwrap();

    video.mark_finished().unwrap();
    assert!(audio.is_ready_for_more_data());
    audio.mark_finished().unwrap();
    assert!(!video.is_ready_for_more_data());

    let handle = writer.finalize().unwrap();
    handle.wait().unwrap();
    let cap = capture.snapshot();
    assert!(cap.finalized);
    assert_eq!(cap.groups.len(), 3);
    assert_eq!(cap.audio.len(), 1);
}

#[test]
fn finalize_requires_finished_inputs() {
    let mut writer = AssetWriter::new(MemoryWriter::new(MemoryWriterOpts::default()));
    writer.add_video_input(settings()).unwrap();
    let (_video, _audio) = writer.start(MediaTime::ZERO).unwrap();
    assert!(matches!(
        writer.finalize().err(),
        Some(SpatialError::Evaluation(_))
    ));
}

#[test]
fn append_rejects_non_increasing_pts_and_after_finish() {
    let mut writer = AssetWriter::new(MemoryWriter::new(MemoryWriterOpts::default()));
    writer.add_video_input(settings()).unwrap();
    let (mut video, audio) = writer.start(MediaTime::ZERO).unwrap();
    assert!(audio.is_none());

    let pool = eye_pool();
    let t = MediaTime::new(1, 30).unwrap();
    video.append(group(&pool), t).unwrap();
    let err = video
        .append(group(&pool), MediaTime::new(2, 60).unwrap())
        .unwrap_err();
    assert!(matches!(err, SpatialError::Append(_)));

    video.mark_finished().unwrap();
    assert!(video.append(group(&pool), MediaTime::new(1, 1).unwrap()).is_err());
    assert_eq!(video.appended(), 1);

    writer.finalize().unwrap().wait().unwrap();
}

#[test]
fn start_failure_is_writer_start() {
    let mut writer = AssetWriter::new(MemoryWriter::new(MemoryWriterOpts {
        fail_start: true,
        ..MemoryWriterOpts::default()
    }));
    writer.add_video_input(settings()).unwrap();
    assert!(matches!(
        writer.start(MediaTime::ZERO).err(),
        Some(SpatialError::WriterStart(_))
    ));
    assert_eq!(writer.state(), WriterState::Failed);
}
