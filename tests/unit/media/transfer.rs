use super::*;
use crate::media::pixel::PixelFormat;

fn gradient(width: u32, height: u32) -> PixelBuffer {
    let size = FrameSize::new(width, height).unwrap();
    let mut buf = PixelBuffer::new(size, PixelFormat::Rgba);
    for y in 0..height {
        let row = buf.row_mut(y);
        for x in 0..width {
            let off = x as usize * 4;
            row[off..off + 4].copy_from_slice(&[x as u8, y as u8, 0, 255]);
        }
    }
    buf
}

#[test]
fn centered_aperture_origin() {
    let ap = CleanAperture {
        width: 4,
        height: 2,
        horizontal_offset: 0.0,
        vertical_offset: 0.0,
    };
    assert_eq!(ap.origin_in(FrameSize::new(8, 2).unwrap()).unwrap(), (2, 0));
}

#[test]
fn aperture_outside_source_is_rejected() {
    let ap = CleanAperture {
        width: 4,
        height: 2,
        horizontal_offset: 3.0,
        vertical_offset: 0.0,
    };
    let err = ap.origin_in(FrameSize::new(8, 2).unwrap()).unwrap_err();
    assert!(matches!(err, SpatialError::PixelTransfer(_)));
}

#[test]
fn crop_copies_the_aperture_rows() {
    let src = gradient(8, 3);
    let ap = CleanAperture {
        width: 4,
        height: 3,
        horizontal_offset: 2.0,
        vertical_offset: 0.0,
    };
    let mut dst = PixelBuffer::new(ap.size(), PixelFormat::Rgba);
    let mut session = PixelTransferSession::new();
    session.transfer(&src, &ap, &mut dst).unwrap();

    assert_eq!(dst.pixel(0, 0), [4, 0, 0, 255]);
    assert_eq!(dst.pixel(3, 2), [7, 2, 0, 255]);
    assert_eq!(session.transfers(), 1);
}

#[test]
fn destination_size_mismatch_fails() {
    let src = gradient(8, 2);
    let ap = CleanAperture {
        width: 4,
        height: 2,
        horizontal_offset: -2.0,
        vertical_offset: 0.0,
    };
    let mut dst = PixelBuffer::new(FrameSize::new(3, 2).unwrap(), PixelFormat::Rgba);
    let mut session = PixelTransferSession::new();
    assert!(session.transfer(&src, &ap, &mut dst).is_err());
    assert_eq!(session.transfers(), 0);
}

#[test]
fn format_mismatch_fails() {
    let src = gradient(8, 2);
    let ap = CleanAperture {
        width: 4,
        height: 2,
        horizontal_offset: -2.0,
        vertical_offset: 0.0,
    };
    let mut dst = PixelBuffer::new(ap.size(), PixelFormat::Bgra);
    let mut session = PixelTransferSession::new();
    assert!(session.transfer(&src, &ap, &mut dst).is_err());
}
