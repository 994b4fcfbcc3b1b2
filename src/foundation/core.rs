use std::cmp::Ordering;
use std::fmt;

use crate::foundation::error::{SpatialError, SpatialResult};

/// Pixel dimensions of a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct FrameSize {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl FrameSize {
    /// Create a size, rejecting zero dimensions.
    pub fn new(width: u32, height: u32) -> SpatialResult<Self> {
        if width == 0 || height == 0 {
            return Err(SpatialError::validation(format!(
                "frame size must be non-zero, got {width}x{height}"
            )));
        }
        Ok(Self { width, height })
    }

    /// Size of one eye inside a side-by-side frame of this size.
    ///
    /// The width is halved with integer division, so an odd side-by-side width drops its last
    /// column. Height is unchanged.
    pub fn eye_frame_size(self) -> FrameSize {
        FrameSize {
            width: self.width / 2,
            height: self.height,
        }
    }

    /// Number of pixels.
    pub fn pixel_count(self) -> usize {
        (self.width as usize).saturating_mul(self.height as usize)
    }
}

impl fmt::Display for FrameSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Stereo eye carried by a multiview layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StereoView {
    /// Left eye.
    Left,
    /// Right eye.
    Right,
}

/// Multiview video layer. Layer 0 is the left (hero) eye, layer 1 the right eye.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LayerId {
    /// Layer 0, left eye.
    Left = 0,
    /// Layer 1, right eye.
    Right = 1,
}

impl LayerId {
    /// Both layers in output order.
    pub const ALL: [LayerId; 2] = [LayerId::Left, LayerId::Right];

    /// Numeric layer id written into the multiview stream.
    pub fn index(self) -> u32 {
        self as u32
    }

    /// Map a numeric id back to a layer. Only `0` and `1` exist.
    pub fn from_index(index: u32) -> Option<Self> {
        match index {
            0 => Some(LayerId::Left),
            1 => Some(LayerId::Right),
            _ => None,
        }
    }

    /// Eye this layer is tagged with.
    pub fn stereo_view(self) -> StereoView {
        match self {
            LayerId::Left => StereoView::Left,
            LayerId::Right => StereoView::Right,
        }
    }
}

/// Rational media timestamp `value / timescale` seconds.
///
/// Equality and ordering compare the instant, so `1/30` equals `2/60`.
#[derive(Clone, Copy, Debug)]
pub struct MediaTime {
    /// Tick count.
    pub value: i64,
    /// Ticks per second, always non-zero.
    pub timescale: u32,
}

impl MediaTime {
    /// Time zero.
    pub const ZERO: MediaTime = MediaTime {
        value: 0,
        timescale: 1,
    };

    /// Create a timestamp, rejecting a zero timescale.
    pub fn new(value: i64, timescale: u32) -> SpatialResult<Self> {
        if timescale == 0 {
            return Err(SpatialError::validation("MediaTime timescale must be > 0"));
        }
        Ok(Self { value, timescale })
    }

    /// Timestamp in seconds.
    pub fn as_secs_f64(self) -> f64 {
        self.value as f64 / f64::from(self.timescale)
    }
}

impl PartialEq for MediaTime {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for MediaTime {}

impl PartialOrd for MediaTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MediaTime {
    fn cmp(&self, other: &Self) -> Ordering {
        let lhs = i128::from(self.value) * i128::from(other.timescale);
        let rhs = i128::from(other.value) * i128::from(self.timescale);
        lhs.cmp(&rhs)
    }
}

impl fmt::Display for MediaTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} ({:.6}s)",
            self.value,
            self.timescale,
            self.as_secs_f64()
        )
    }
}

/// Frames-per-second represented as a rational `num/den`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FrameRate {
    /// Numerator (frames).
    pub num: u32,
    /// Denominator (seconds), must be non-zero.
    pub den: u32,
}

impl FrameRate {
    /// Create a validated frame rate.
    pub fn new(num: u32, den: u32) -> SpatialResult<Self> {
        if den == 0 {
            return Err(SpatialError::validation("FrameRate den must be > 0"));
        }
        if num == 0 {
            return Err(SpatialError::validation("FrameRate num must be > 0"));
        }
        Ok(Self { num, den })
    }

    /// Parse an ffprobe-style ratio such as `30000/1001` or a bare integer such as `30`.
    pub fn parse_ratio(s: &str) -> SpatialResult<Self> {
        let s = s.trim();
        let (num, den) = match s.split_once('/') {
            Some((n, d)) => (n.trim(), d.trim()),
            None => (s, "1"),
        };
        let num = num
            .parse::<u32>()
            .map_err(|e| SpatialError::validation(format!("invalid frame rate '{s}': {e}")))?;
        let den = den
            .parse::<u32>()
            .map_err(|e| SpatialError::validation(format!("invalid frame rate '{s}': {e}")))?;
        Self::new(num, den)
    }

    /// Convert to floating-point FPS.
    pub fn as_f64(self) -> f64 {
        f64::from(self.num) / f64::from(self.den)
    }

    /// Exact presentation time of the 0-based frame `index` at this constant rate.
    pub fn frame_time(self, index: u64) -> MediaTime {
        let value = i64::try_from(index)
            .unwrap_or(i64::MAX)
            .saturating_mul(i64::from(self.den));
        MediaTime {
            value,
            timescale: self.num,
        }
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
