use crate::foundation::core::FrameSize;
use crate::foundation::error::{SpatialError, SpatialResult};
use crate::media::pixel::PixelBuffer;

/// Rectangular region of valid content inside a source frame.
///
/// Offsets follow the clean-aperture convention: they locate the aperture's center relative to the
/// center of the full frame, in pixels. A horizontal offset of `0.0` is a centered aperture.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CleanAperture {
    /// Aperture width in pixels.
    pub width: u32,
    /// Aperture height in pixels.
    pub height: u32,
    /// Horizontal distance from the frame center to the aperture center.
    pub horizontal_offset: f64,
    /// Vertical distance from the frame center to the aperture center.
    pub vertical_offset: f64,
}

impl CleanAperture {
    /// Aperture size.
    pub fn size(&self) -> FrameSize {
        FrameSize {
            width: self.width,
            height: self.height,
        }
    }

    /// Top-left pixel of this aperture inside a frame of `source` size.
    ///
    /// Fractional edges (odd source or aperture sizes) are floored, so two adjacent apertures never
    /// overlap or leave a gap between them.
    pub fn origin_in(&self, source: FrameSize) -> SpatialResult<(u32, u32)> {
        let x = edge(source.width, self.width, self.horizontal_offset);
        let y = edge(source.height, self.height, self.vertical_offset);
        let fits = |start: f64, len: u32, total: u32| {
            start >= 0.0 && start + f64::from(len) <= f64::from(total)
        };
        if !fits(x, self.width, source.width) || !fits(y, self.height, source.height) {
            return Err(SpatialError::pixel_transfer(format!(
                "clean aperture {}x{} at offset ({}, {}) does not fit a {source} frame",
                self.width, self.height, self.horizontal_offset, self.vertical_offset
            )));
        }
        Ok((x as u32, y as u32))
    }
}

fn edge(total: u32, len: u32, center_offset: f64) -> f64 {
    (f64::from(total) / 2.0 + center_offset - f64::from(len) / 2.0).floor()
}

/// Reusable pixel copy engine.
///
/// One session is created per transcode and reused for every frame and both eyes. It is not
/// shared across threads; callers hand it around by `&mut`.
#[derive(Debug, Default)]
pub struct PixelTransferSession {
    transfers: u64,
}

impl PixelTransferSession {
    /// Create a session that crops sources to the clean aperture.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful transfers performed so far.
    pub fn transfers(&self) -> u64 {
        self.transfers
    }

    /// Copy `aperture` of `src` into `dst`, which must be aperture-sized.
    pub fn transfer(
        &mut self,
        src: &PixelBuffer,
        aperture: &CleanAperture,
        dst: &mut PixelBuffer,
    ) -> SpatialResult<()> {
        if src.format() != dst.format() {
            return Err(SpatialError::pixel_transfer(format!(
                "format conversion is not supported ({:?} -> {:?})",
                src.format(),
                dst.format()
            )));
        }

        let region = aperture.size();
        let (x0, y0) = aperture.origin_in(src.size())?;
        if dst.size() != region {
            return Err(SpatialError::pixel_transfer(format!(
                "destination is {} but the transfer region is {region}",
                dst.size()
            )));
        }

        let bpp = src.format().bytes_per_pixel();
        let start = x0 as usize * bpp;
        let end = start + region.width as usize * bpp;
        for y in 0..region.height {
            dst.row_mut(y).copy_from_slice(&src.row(y0 + y)[start..end]);
        }

        self.transfers = self.transfers.saturating_add(1);
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/media/transfer.rs"]
mod tests;
