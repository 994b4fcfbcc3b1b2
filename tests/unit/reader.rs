use super::*;
use crate::backend::memory::MemoryReader;
use crate::foundation::core::{FrameRate, FrameSize};

fn synthetic(frames: u64) -> MemoryReader {
    MemoryReader::synthetic(
        FrameSize::new(8, 2).unwrap(),
        FrameRate::new(30, 1).unwrap(),
        frames,
    )
}

#[test]
fn lifecycle_runs_to_exhausted() {
    let mut reader = AssetReader::new(synthetic(3).with_audio(48_000, 2));
    assert_eq!(reader.state(), ReaderState::Created);
    reader.add_video_output(VideoOutputSettings::default()).unwrap();
    reader.add_audio_output(AudioOutputSettings::default()).unwrap();
    assert_eq!(reader.state(), ReaderState::Configured);

    let mut cursors = reader.start().unwrap();
    assert_eq!(reader.state(), ReaderState::Reading);

    let mut pts = Vec::new();
    while let Some(sample) = cursors.video.next_sample().unwrap() {
        pts.push(sample.pts);
    }
    assert_eq!(pts.len(), 3);
    assert_eq!(pts[2], MediaTime::new(2, 30).unwrap());
    assert_eq!(cursors.video.samples_read(), 3);
    // Video alone is not enough; the audio cursor is still open.
    assert_eq!(reader.state(), ReaderState::Reading);

    let mut audio = cursors.audio.take().unwrap();
    let mut frames = 0u64;
    while let Some(chunk) = audio.next_sample().unwrap() {
        assert_eq!(chunk.pts, MediaTime::new(frames as i64, 48_000).unwrap());
        // Stereo f32: eight bytes per frame.
        frames += chunk.data.len() as u64 / 8;
    }
    // 3 frames at 30 fps is 0.1 s of audio.
    assert_eq!(frames, 4_800);
    assert_eq!(reader.state(), ReaderState::Exhausted);

    // Fused.
    assert!(cursors.video.next_sample().unwrap().is_none());
}

#[test]
fn start_without_outputs_is_rejected() {
    let mut reader = AssetReader::new(synthetic(1));
    assert!(matches!(reader.start(), Err(SpatialError::Evaluation(_))));
}

#[test]
fn missing_tracks_are_reported() {
    let mut reader = AssetReader::new(synthetic(1).without_video());
    let err = reader
        .add_video_output(VideoOutputSettings::default())
        .unwrap_err();
    assert!(matches!(err, SpatialError::InputTrackMissing(_)));

    let mut reader = AssetReader::new(synthetic(1));
    let err = reader
        .add_audio_output(AudioOutputSettings::default())
        .unwrap_err();
    assert!(matches!(err, SpatialError::InputTrackMissing(_)));
}

#[test]
fn backend_start_failure_becomes_reader_start() {
    let mut reader = AssetReader::new(synthetic(1).with_start_failure());
    reader.add_video_output(VideoOutputSettings::default()).unwrap();
    let err = reader.start().err().unwrap();
    assert!(matches!(err, SpatialError::ReaderStart(_)));
    assert_eq!(reader.state(), ReaderState::Failed);
}

#[test]
fn outputs_are_frozen_after_start() {
    let mut reader = AssetReader::new(synthetic(1));
    reader.add_video_output(VideoOutputSettings::default()).unwrap();
    let _cursors = reader.start().unwrap();
    assert!(reader.add_video_output(VideoOutputSettings::default()).is_err());
    assert!(reader.start().is_err());
}
