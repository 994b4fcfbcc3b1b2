use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::foundation::core::FrameSize;
use crate::foundation::error::{SpatialError, SpatialResult};
use crate::media::pixel::{PixelBuffer, PixelFormat, byte_len};

/// Pool configuration for eye-sized pixel buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct PoolOpts {
    /// Maximum number of released buffers kept for reuse. Extra releases are freed.
    pub max_retained: usize,
}

impl Default for PoolOpts {
    fn default() -> Self {
        Self { max_retained: 8 }
    }
}

/// Allocation counters for a [`PixelBufferPool`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Buffers currently parked in the pool.
    pub retained: usize,
    /// Buffers currently handed out and not yet released.
    pub outstanding: usize,
    /// Fresh allocations performed because the pool was empty.
    pub allocations: u64,
    /// Acquisitions served from a parked buffer.
    pub reuses: u64,
    /// Releases that freed the buffer because the pool was full.
    pub dropped_on_release: u64,
}

struct PoolState {
    free: Vec<Vec<u8>>,
    stats: PoolStats,
}

struct PoolShared {
    size: FrameSize,
    format: PixelFormat,
    opts: PoolOpts,
    state: Mutex<PoolState>,
}

impl PoolShared {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Reusable set of same-sized pixel buffers.
///
/// Acquisition allocates when the pool is empty. A [`PooledBuffer`] goes back to the pool when it
/// is dropped, which is usually on the writer side after the frame has been consumed. Clones share
/// the same storage.
#[derive(Clone)]
pub struct PixelBufferPool {
    shared: Arc<PoolShared>,
}

impl PixelBufferPool {
    /// Create an empty pool of `size` buffers in `format`.
    pub fn new(size: FrameSize, format: PixelFormat, opts: PoolOpts) -> SpatialResult<Self> {
        if size.width == 0 || size.height == 0 {
            return Err(SpatialError::validation(format!(
                "pixel buffer pool needs non-zero dimensions, got {size}"
            )));
        }
        Ok(Self {
            shared: Arc::new(PoolShared {
                size,
                format,
                opts,
                state: Mutex::new(PoolState {
                    free: Vec::new(),
                    stats: PoolStats::default(),
                }),
            }),
        })
    }

    /// Dimensions of every buffer from this pool.
    pub fn size(&self) -> FrameSize {
        self.shared.size
    }

    /// Pixel layout of every buffer from this pool.
    pub fn format(&self) -> PixelFormat {
        self.shared.format
    }

    /// Snapshot of the allocation counters.
    pub fn stats(&self) -> PoolStats {
        self.shared.lock().stats
    }

    /// Hand out one buffer. Contents are unspecified when the buffer is reused.
    pub fn acquire(&self) -> PooledBuffer {
        let data = {
            let mut st = self.shared.lock();
            let data = match st.free.pop() {
                Some(data) => {
                    st.stats.retained = st.stats.retained.saturating_sub(1);
                    st.stats.reuses = st.stats.reuses.saturating_add(1);
                    data
                }
                None => {
                    st.stats.allocations = st.stats.allocations.saturating_add(1);
                    vec![0u8; byte_len(self.shared.size, self.shared.format)]
                }
            };
            st.stats.outstanding = st.stats.outstanding.saturating_add(1);
            data
        };

        PooledBuffer {
            buffer: PixelBuffer::from_parts(self.shared.size, self.shared.format, data),
            pool: Arc::downgrade(&self.shared),
        }
    }
}

impl std::fmt::Debug for PixelBufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PixelBufferPool")
            .field("size", &self.shared.size)
            .field("format", &self.shared.format)
            .field("stats", &self.stats())
            .finish()
    }
}

/// A pixel buffer on loan from a [`PixelBufferPool`]. Dereferences to [`PixelBuffer`].
pub struct PooledBuffer {
    buffer: PixelBuffer,
    pool: Weak<PoolShared>,
}

impl PooledBuffer {
    /// Copy the pixels out into a standalone buffer.
    pub fn to_pixel_buffer(&self) -> PixelBuffer {
        self.buffer.clone()
    }
}

impl Deref for PooledBuffer {
    type Target = PixelBuffer;

    fn deref(&self) -> &PixelBuffer {
        &self.buffer
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut PixelBuffer {
        &mut self.buffer
    }
}

impl std::fmt::Debug for PooledBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledBuffer")
            .field("size", &self.buffer.size())
            .field("format", &self.buffer.format())
            .finish()
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        // The pool may already be gone when the writer outlives the producing session.
        let Some(shared) = self.pool.upgrade() else {
            return;
        };
        let data = std::mem::take(&mut self.buffer.data);
        let mut st = shared.lock();
        st.stats.outstanding = st.stats.outstanding.saturating_sub(1);
        if st.free.len() >= shared.opts.max_retained {
            st.stats.dropped_on_release = st.stats.dropped_on_release.saturating_add(1);
            return;
        }
        st.free.push(data);
        st.stats.retained = st.stats.retained.saturating_add(1);
    }
}

#[cfg(test)]
#[path = "../../tests/unit/media/pool.rs"]
mod tests;
