use spatialvideo::backend::memory::{LEFT_EYE_RGBA, RIGHT_EYE_RGBA};
use spatialvideo::{
    AssetReader, AssetWriter, FrameRate, FrameSize, MediaTime, MemoryReader, MemoryWriter,
    MemoryWriterOpts, PixelTransferPolicy, SpatialError, StereoView, Tag, TranscodeOpts,
    transcode_to_mvhevc,
};

fn fps30() -> FrameRate {
    FrameRate::new(30, 1).unwrap()
}

fn small_source(frames: u64) -> MemoryReader {
    MemoryReader::synthetic(FrameSize::new(8, 2).unwrap(), fps30(), frames)
}

#[test]
fn every_frame_becomes_left_then_right_layer() {
    let backend = MemoryWriter::new(MemoryWriterOpts {
        keep_pixels: true,
        ..MemoryWriterOpts::default()
    });
    let capture = backend.capture();

    let stats = transcode_to_mvhevc(
        AssetReader::new(small_source(5)),
        AssetWriter::new(backend),
        &TranscodeOpts::default(),
    )
    .unwrap();

    assert_eq!(stats.video_samples_read, 5);
    assert_eq!(stats.tagged_buffers_appended, 10);
    assert_eq!(stats.frames_dropped, 0);
    assert_eq!(stats.frames_skipped, 0);

    let cap = capture.snapshot();
    assert!(cap.finalized);
    assert!(cap.video_finished);
    assert_eq!(cap.tagged_buffers(), 10);

    let settings = cap.video_settings.unwrap();
    assert_eq!(settings.eye_size, FrameSize::new(4, 2).unwrap());
    assert_eq!(settings.frame_rate, fps30());
    assert_eq!(settings.video_layer_ids, vec![0, 1]);

    for (i, group) in cap.groups.iter().enumerate() {
        assert_eq!(group.pts, fps30().frame_time(i as u64));
        assert_eq!(
            group.tags,
            vec![
                [Tag::VideoLayerId(0), Tag::StereoView(StereoView::Left)],
                [Tag::VideoLayerId(1), Tag::StereoView(StereoView::Right)],
            ]
        );
        assert_eq!(group.sizes, vec![FrameSize::new(4, 2).unwrap(); 2]);
        let (left, right) = (&group.pixels[0], &group.pixels[1]);
        for y in 0..2 {
            for x in 0..4 {
                assert_eq!(left.pixel(x, y), LEFT_EYE_RGBA);
                assert_eq!(right.pixel(x, y), RIGHT_EYE_RGBA);
            }
        }
    }
}

#[test]
fn source_without_audio_writes_video_only() {
    let backend = MemoryWriter::new(MemoryWriterOpts::default());
    let capture = backend.capture();

    let stats = transcode_to_mvhevc(
        AssetReader::new(small_source(2)),
        AssetWriter::new(backend),
        &TranscodeOpts::default(),
    )
    .unwrap();

    assert_eq!(stats.audio_samples_read, 0);
    assert_eq!(stats.audio_samples_forwarded, 0);
    let cap = capture.snapshot();
    assert!(cap.audio_settings.is_none());
    assert!(cap.audio.is_empty());
    assert!(!cap.audio_finished);
    assert!(cap.finalized);
}

#[test]
fn uhd_side_by_side_with_audio() {
    let reader = MemoryReader::synthetic(FrameSize::new(3840, 1080).unwrap(), fps30(), 60)
        .with_audio(48_000, 2);
    let backend = MemoryWriter::new(MemoryWriterOpts::default());
    let capture = backend.capture();

    let stats = transcode_to_mvhevc(
        AssetReader::new(reader),
        AssetWriter::new(backend),
        &TranscodeOpts::default(),
    )
    .unwrap();

    assert_eq!(stats.video_samples_read, 60);
    assert_eq!(stats.tagged_buffers_appended, 120);
    // 96 000 frames in chunks of 1024.
    assert_eq!(stats.audio_samples_read, 94);
    assert_eq!(stats.audio_samples_forwarded, 94);
    assert_eq!(stats.audio_samples_dropped, 0);
    assert!(stats.pool_allocations >= 2);

    let cap = capture.snapshot();
    assert_eq!(
        cap.video_settings.as_ref().map(|s| s.eye_size),
        Some(FrameSize::new(1920, 1080).unwrap())
    );
    let audio = cap.audio_settings.unwrap();
    assert_eq!((audio.sample_rate, audio.channels), (48_000, 2));
    assert_eq!(cap.audio_bytes(), 2 * 48_000 * 2 * 4);
    assert_eq!(cap.groups.last().map(|g| g.pts), Some(fps30().frame_time(59)));
    assert!(cap.audio_finished);
    assert!(cap.finalized);

    // Audio is forwarded untouched and in order.
    let mut next = 0i64;
    for chunk in &cap.audio {
        assert_eq!(chunk.pts, MediaTime::new(next, 48_000).unwrap());
        next += (chunk.data.len() / (2 * 4)) as i64;
    }
    assert_eq!(next, 96_000);
}

#[test]
fn odd_eye_width_converts_end_to_end() {
    // 1922 wide: each eye is 961 columns and the right eye starts at column 961.
    let backend = MemoryWriter::new(MemoryWriterOpts {
        keep_pixels: true,
        ..MemoryWriterOpts::default()
    });
    let capture = backend.capture();

    let stats = transcode_to_mvhevc(
        AssetReader::new(MemoryReader::synthetic(
            FrameSize::new(1922, 4).unwrap(),
            fps30(),
            2,
        )),
        AssetWriter::new(backend),
        &TranscodeOpts::default(),
    )
    .unwrap();

    assert_eq!(stats.tagged_buffers_appended, 4);
    let cap = capture.snapshot();
    assert_eq!(
        cap.video_settings.as_ref().map(|s| s.eye_size),
        Some(FrameSize::new(961, 4).unwrap())
    );
    for group in &cap.groups {
        for x in [0, 480, 960] {
            assert_eq!(group.pixels[0].pixel(x, 3), LEFT_EYE_RGBA);
            assert_eq!(group.pixels[1].pixel(x, 3), RIGHT_EYE_RGBA);
        }
    }
    assert!(cap.finalized);
}

#[test]
fn rejected_appends_are_dropped_and_the_run_continues() {
    let backend = MemoryWriter::new(MemoryWriterOpts {
        fail_video_appends: vec![1, 3],
        ..MemoryWriterOpts::default()
    });
    let capture = backend.capture();

    let stats = transcode_to_mvhevc(
        AssetReader::new(small_source(5)),
        AssetWriter::new(backend),
        &TranscodeOpts::default(),
    )
    .unwrap();

    assert_eq!(stats.video_samples_read, 5);
    assert_eq!(stats.frames_dropped, 2);
    assert_eq!(
        stats.tagged_buffers_appended,
        2 * (stats.video_samples_read - stats.frames_dropped - stats.frames_skipped)
    );

    let cap = capture.snapshot();
    let pts: Vec<_> = cap.groups.iter().map(|g| g.pts).collect();
    assert_eq!(
        pts,
        vec![fps30().frame_time(0), fps30().frame_time(2), fps30().frame_time(4)]
    );
    assert!(cap.finalized);
}

#[test]
fn crop_failure_can_skip_the_frame() {
    let backend = MemoryWriter::new(MemoryWriterOpts::default());
    let capture = backend.capture();
    let opts = TranscodeOpts {
        pixel_transfer_failure: PixelTransferPolicy::SkipFrame,
        ..TranscodeOpts::default()
    };

    let stats = transcode_to_mvhevc(
        AssetReader::new(small_source(5).with_corrupt_frame(2)),
        AssetWriter::new(backend),
        &opts,
    )
    .unwrap();

    assert_eq!(stats.video_samples_read, 5);
    assert_eq!(stats.frames_skipped, 1);
    assert_eq!(stats.tagged_buffers_appended, 8);

    let cap = capture.snapshot();
    assert!(cap.groups.iter().all(|g| g.pts != fps30().frame_time(2)));
    assert!(cap.finalized);
}

#[test]
fn crop_failure_is_fatal_by_default() {
    let backend = MemoryWriter::new(MemoryWriterOpts::default());
    let capture = backend.capture();

    let err = transcode_to_mvhevc(
        AssetReader::new(small_source(5).with_corrupt_frame(2)),
        AssetWriter::new(backend),
        &TranscodeOpts::default(),
    )
    .unwrap_err();

    assert!(matches!(err, SpatialError::PixelTransfer(_)), "{err}");
    let cap = capture.snapshot();
    assert!(!cap.finalized);
    assert!(cap.groups.len() <= 2);
}

#[test]
fn rejected_output_settings_fail_before_reading() {
    let backend = MemoryWriter::new(MemoryWriterOpts {
        reject_settings: true,
        ..MemoryWriterOpts::default()
    });
    let capture = backend.capture();

    let err = transcode_to_mvhevc(
        AssetReader::new(small_source(3)),
        AssetWriter::new(backend),
        &TranscodeOpts::default(),
    )
    .unwrap_err();

    assert!(matches!(err, SpatialError::OutputSettingsRejected(_)));
    assert!(capture.snapshot().video_settings.is_none());
}

#[test]
fn reader_start_failure_is_reported() {
    let err = transcode_to_mvhevc(
        AssetReader::new(small_source(3).with_start_failure()),
        AssetWriter::new(MemoryWriter::new(MemoryWriterOpts::default())),
        &TranscodeOpts::default(),
    )
    .unwrap_err();
    assert!(matches!(err, SpatialError::ReaderStart(_)));
}

#[test]
fn source_without_video_is_reported() {
    let err = transcode_to_mvhevc(
        AssetReader::new(small_source(3).without_video()),
        AssetWriter::new(MemoryWriter::new(MemoryWriterOpts::default())),
        &TranscodeOpts::default(),
    )
    .unwrap_err();
    assert!(matches!(err, SpatialError::InputTrackMissing(_)));
}

#[test]
fn single_slot_channels_still_deliver_everything() {
    let backend = MemoryWriter::new(MemoryWriterOpts::default());
    let capture = backend.capture();
    let opts = TranscodeOpts {
        channel_capacity: 1,
        audio_chunk_frames: 100,
        ..TranscodeOpts::default()
    };

    let stats = transcode_to_mvhevc(
        AssetReader::new(small_source(30).with_audio(8_000, 1)),
        AssetWriter::new(backend),
        &opts,
    )
    .unwrap();

    assert_eq!(stats.tagged_buffers_appended, 60);
    // One second of 8 kHz audio in chunks of 100.
    assert_eq!(stats.audio_samples_forwarded, 80);
    assert_eq!(capture.snapshot().audio_bytes(), 8_000 * 4);
}
