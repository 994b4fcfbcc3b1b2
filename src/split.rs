use crate::foundation::core::{FrameSize, LayerId};
use crate::foundation::error::{SpatialError, SpatialResult};
use crate::media::pixel::PixelBuffer;
use crate::media::pool::{PixelBufferPool, PooledBuffer};
use crate::media::transfer::{CleanAperture, PixelTransferSession};
use crate::tagged::{TaggedBufferGroup, assemble};

/// Clean aperture selecting one eye of a side-by-side frame.
///
/// The horizontal offset is `-(eye_width / 2) + layer * eye_width` from the frame center, so
/// layer 0 covers the left half and layer 1 the right half.
pub fn eye_aperture(eye: FrameSize, layer: LayerId) -> CleanAperture {
    let eye_w = f64::from(eye.width);
    CleanAperture {
        width: eye.width,
        height: eye.height,
        horizontal_offset: -(eye_w / 2.0) + f64::from(layer.index()) * eye_w,
        vertical_offset: 0.0,
    }
}

/// Crops side-by-side frames of one fixed size into left/right eye buffers.
#[derive(Clone, Copy, Debug)]
pub struct FrameSplitter {
    source: FrameSize,
    eye: FrameSize,
    apertures: [CleanAperture; 2],
}

impl FrameSplitter {
    /// Build a splitter for side-by-side frames of `source` size.
    pub fn new(source: FrameSize) -> SpatialResult<Self> {
        let eye = source.eye_frame_size();
        if eye.width == 0 || eye.height == 0 {
            return Err(SpatialError::validation(format!(
                "side-by-side frame {source} is too small to split"
            )));
        }
        Ok(Self {
            source,
            eye,
            apertures: LayerId::ALL.map(|layer| eye_aperture(eye, layer)),
        })
    }

    /// Side-by-side frame size this splitter accepts.
    pub fn source_size(&self) -> FrameSize {
        self.source
    }

    /// Size of each eye buffer.
    pub fn eye_frame_size(&self) -> FrameSize {
        self.eye
    }

    /// Aperture used for `layer`.
    pub fn aperture(&self, layer: LayerId) -> &CleanAperture {
        &self.apertures[layer.index() as usize]
    }

    /// Crop one eye of `image` into a buffer drawn from `pool`.
    pub fn split_layer(
        &self,
        image: &PixelBuffer,
        layer: LayerId,
        pool: &PixelBufferPool,
        session: &mut PixelTransferSession,
    ) -> SpatialResult<PooledBuffer> {
        if image.size() != self.source {
            return Err(SpatialError::pixel_transfer(format!(
                "layer {}: source frame is {} but the splitter expects {}",
                layer.index(),
                image.size(),
                self.source
            )));
        }
        if pool.size() != self.eye {
            return Err(SpatialError::pixel_transfer(format!(
                "layer {}: pool buffers are {} but eye frames are {}",
                layer.index(),
                pool.size(),
                self.eye
            )));
        }

        let mut out = pool.acquire();
        session
            .transfer(image, self.aperture(layer), &mut out)
            .map_err(|e| match e {
                SpatialError::PixelTransfer(msg) => {
                    SpatialError::pixel_transfer(format!("layer {}: {msg}", layer.index()))
                }
                other => other,
            })?;
        Ok(out)
    }

    /// Crop both eyes of `image` and tag them, left eye first.
    pub fn split(
        &self,
        image: &PixelBuffer,
        pool: &PixelBufferPool,
        session: &mut PixelTransferSession,
    ) -> SpatialResult<TaggedBufferGroup> {
        let left = self.split_layer(image, LayerId::Left, pool, session)?;
        let right = self.split_layer(image, LayerId::Right, pool, session)?;
        Ok(assemble(left, right))
    }
}

#[cfg(test)]
#[path = "../tests/unit/split.rs"]
mod tests;
