use crate::foundation::core::{LayerId, StereoView};
use crate::media::pool::PooledBuffer;

/// One tag attached to a multiview buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Tag {
    /// Multiview video layer id.
    VideoLayerId(u32),
    /// Stereo eye.
    StereoView(StereoView),
}

/// Eye buffer annotated with its layer and view tags.
#[derive(Debug)]
pub struct TaggedBuffer {
    layer: LayerId,
    buffer: PooledBuffer,
}

impl TaggedBuffer {
    /// Tag `buffer` as `layer`. The stereo view follows from the layer.
    pub fn new(layer: LayerId, buffer: PooledBuffer) -> Self {
        Self { layer, buffer }
    }

    /// Layer this buffer belongs to.
    pub fn layer(&self) -> LayerId {
        self.layer
    }

    /// Eye this buffer shows.
    pub fn stereo_view(&self) -> StereoView {
        self.layer.stereo_view()
    }

    /// Tags in the order they are attached: layer id, then stereo view.
    pub fn tags(&self) -> [Tag; 2] {
        [
            Tag::VideoLayerId(self.layer.index()),
            Tag::StereoView(self.stereo_view()),
        ]
    }

    /// The eye pixels.
    pub fn buffer(&self) -> &PooledBuffer {
        &self.buffer
    }
}

/// The two tagged eye buffers produced from one side-by-side frame, left eye first.
#[derive(Debug)]
pub struct TaggedBufferGroup {
    buffers: [TaggedBuffer; 2],
}

impl TaggedBufferGroup {
    /// Left-eye (layer 0) buffer.
    pub fn left(&self) -> &TaggedBuffer {
        &self.buffers[0]
    }

    /// Right-eye (layer 1) buffer.
    pub fn right(&self) -> &TaggedBuffer {
        &self.buffers[1]
    }

    /// Buffers in layer order.
    pub fn iter(&self) -> std::slice::Iter<'_, TaggedBuffer> {
        self.buffers.iter()
    }
}

impl<'a> IntoIterator for &'a TaggedBufferGroup {
    type Item = &'a TaggedBuffer;
    type IntoIter = std::slice::Iter<'a, TaggedBuffer>;

    fn into_iter(self) -> Self::IntoIter {
        self.buffers.iter()
    }
}

/// Package the per-layer buffers of one frame for the writer, left eye first.
pub fn assemble(left: PooledBuffer, right: PooledBuffer) -> TaggedBufferGroup {
    TaggedBufferGroup {
        buffers: [
            TaggedBuffer::new(LayerId::Left, left),
            TaggedBuffer::new(LayerId::Right, right),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::core::FrameSize;
    use crate::media::pixel::PixelFormat;
    use crate::media::pool::{PixelBufferPool, PoolOpts};

    #[test]
    fn left_is_layer_zero_and_comes_first() {
        let pool = PixelBufferPool::new(
            FrameSize::new(2, 2).unwrap(),
            PixelFormat::Rgba,
            PoolOpts::default(),
        )
        .unwrap();
        let group = assemble(pool.acquire(), pool.acquire());

        let order: Vec<_> = group.iter().map(|b| b.tags()).collect();
        assert_eq!(
            order,
            vec![
                [Tag::VideoLayerId(0), Tag::StereoView(StereoView::Left)],
                [Tag::VideoLayerId(1), Tag::StereoView(StereoView::Right)],
            ]
        );
        assert_eq!(group.left().layer(), LayerId::Left);
        assert_eq!(group.right().stereo_view(), StereoView::Right);
    }
}
