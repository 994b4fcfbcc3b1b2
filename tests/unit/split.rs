use super::*;
use crate::foundation::core::StereoView;
use crate::media::pixel::PixelFormat;
use crate::media::pool::PoolOpts;

fn side_by_side(width: u32, height: u32) -> PixelBuffer {
    let size = FrameSize::new(width, height).unwrap();
    let mut buf = PixelBuffer::new(size, PixelFormat::Rgba);
    for y in 0..height {
        let row = buf.row_mut(y);
        for x in 0..width {
            let off = x as usize * 4;
            let eye = if x < width / 2 { 10 } else { 200 };
            row[off..off + 4].copy_from_slice(&[eye, x as u8, y as u8, 255]);
        }
    }
    buf
}

#[test]
fn eye_apertures_tile_the_frame_without_gap_or_overlap() {
    for width in [2u32, 3, 8, 9, 1920, 1921, 3840] {
        let source = FrameSize::new(width, 4).unwrap();
        let eye = source.eye_frame_size();
        let (lx, _) = eye_aperture(eye, LayerId::Left).origin_in(source).unwrap();
        let (rx, _) = eye_aperture(eye, LayerId::Right).origin_in(source).unwrap();
        assert_eq!(lx, 0, "width {width}");
        assert_eq!(rx, eye.width, "width {width}");
        assert!(rx + eye.width <= width, "width {width}");
    }
}

#[test]
fn split_produces_left_then_right_eye_pixels() {
    let source = side_by_side(8, 2);
    let splitter = FrameSplitter::new(source.size()).unwrap();
    let pool = PixelBufferPool::new(
        splitter.eye_frame_size(),
        PixelFormat::Rgba,
        PoolOpts::default(),
    )
    .unwrap();
    let mut session = PixelTransferSession::new();

    let group = splitter.split(&source, &pool, &mut session).unwrap();

    let left = group.left().buffer();
    let right = group.right().buffer();
    assert_eq!(left.size(), FrameSize::new(4, 2).unwrap());
    assert_eq!(left.pixel(0, 0), [10, 0, 0, 255]);
    assert_eq!(left.pixel(3, 1), [10, 3, 1, 255]);
    assert_eq!(right.pixel(0, 0), [200, 4, 0, 255]);
    assert_eq!(right.pixel(3, 1), [200, 7, 1, 255]);
    assert_eq!(group.right().stereo_view(), StereoView::Right);
    assert_eq!(session.transfers(), 2);
    assert_eq!(pool.stats().outstanding, 2);
}

#[test]
fn odd_width_drops_the_last_column() {
    let source = side_by_side(9, 1);
    let splitter = FrameSplitter::new(source.size()).unwrap();
    let pool =
        PixelBufferPool::new(splitter.eye_frame_size(), PixelFormat::Rgba, PoolOpts::default())
            .unwrap();
    let mut session = PixelTransferSession::new();

    let right = splitter
        .split_layer(&source, LayerId::Right, &pool, &mut session)
        .unwrap();
    assert_eq!(right.size().width, 4);
    assert_eq!(right.pixel(0, 0)[1], 4);
    assert_eq!(right.pixel(3, 0)[1], 7);
}

#[test]
fn wrong_source_size_is_a_transfer_failure() {
    let splitter = FrameSplitter::new(FrameSize::new(8, 2).unwrap()).unwrap();
    let pool =
        PixelBufferPool::new(splitter.eye_frame_size(), PixelFormat::Rgba, PoolOpts::default())
            .unwrap();
    let mut session = PixelTransferSession::new();
    let err = splitter
        .split(&side_by_side(6, 2), &pool, &mut session)
        .unwrap_err();
    assert!(matches!(err, SpatialError::PixelTransfer(_)));
}

#[test]
fn one_pixel_wide_source_cannot_be_split() {
    assert!(FrameSplitter::new(FrameSize::new(1, 4).unwrap()).is_err());
}
