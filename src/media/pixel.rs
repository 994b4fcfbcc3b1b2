use crate::foundation::core::FrameSize;
use crate::foundation::error::{SpatialError, SpatialResult};

/// Packed 8-bit, 4-channel pixel layouts understood by the pipeline.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    /// Straight-alpha RGBA8.
    #[default]
    Rgba,
    /// Straight-alpha BGRA8.
    Bgra,
}

impl PixelFormat {
    /// Bytes per pixel.
    pub fn bytes_per_pixel(self) -> usize {
        4
    }

    /// `-pix_fmt` name used when talking to `ffmpeg`.
    pub fn ffmpeg_name(self) -> &'static str {
        match self {
            PixelFormat::Rgba => "rgba",
            PixelFormat::Bgra => "bgra",
        }
    }
}

/// Owned raster with tightly packed rows (`stride == width * 4`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PixelBuffer {
    size: FrameSize,
    format: PixelFormat,
    pub(crate) data: Vec<u8>,
}

impl PixelBuffer {
    /// Allocate a zeroed buffer.
    pub fn new(size: FrameSize, format: PixelFormat) -> Self {
        let len = byte_len(size, format);
        Self {
            size,
            format,
            data: vec![0u8; len],
        }
    }

    /// Wrap existing pixel bytes, checking the length against `size` and `format`.
    pub fn from_data(size: FrameSize, format: PixelFormat, data: Vec<u8>) -> SpatialResult<Self> {
        let expected = byte_len(size, format);
        if data.len() != expected {
            return Err(SpatialError::validation(format!(
                "pixel buffer {size} {format:?} expects {expected} bytes, got {}",
                data.len()
            )));
        }
        Ok(Self { size, format, data })
    }

    pub(crate) fn from_parts(size: FrameSize, format: PixelFormat, data: Vec<u8>) -> Self {
        debug_assert_eq!(data.len(), byte_len(size, format));
        Self { size, format, data }
    }

    /// Dimensions in pixels.
    pub fn size(&self) -> FrameSize {
        self.size
    }

    /// Pixel layout.
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Bytes per row.
    pub fn stride(&self) -> usize {
        self.size.width as usize * self.format.bytes_per_pixel()
    }

    /// All pixel bytes, row-major.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Mutable pixel bytes, row-major.
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Bytes of row `y`.
    pub fn row(&self, y: u32) -> &[u8] {
        let stride = self.stride();
        let off = y as usize * stride;
        &self.data[off..off + stride]
    }

    /// Mutable bytes of row `y`.
    pub fn row_mut(&mut self, y: u32) -> &mut [u8] {
        let stride = self.stride();
        let off = y as usize * stride;
        &mut self.data[off..off + stride]
    }

    /// The 4 bytes of pixel `(x, y)`.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let bpp = self.format.bytes_per_pixel();
        let row = self.row(y);
        let off = x as usize * bpp;
        [row[off], row[off + 1], row[off + 2], row[off + 3]]
    }
}

pub(crate) fn byte_len(size: FrameSize, format: PixelFormat) -> usize {
    size.pixel_count().saturating_mul(format.bytes_per_pixel())
}
