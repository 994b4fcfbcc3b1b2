//! Splits a streamed Matroska file into cluster-sized chunks.
//!
//! The audio reader has `ffmpeg` stream-copy the source track into Matroska on a pipe. Every
//! chunk handed out is a run of the original bytes, so concatenating the chunks reproduces the
//! stream exactly. Elements before the first cluster (EBML header, segment header, `Info`,
//! `Tracks`, ...) ride along with the first cluster.

use std::io::Read;

use crate::foundation::core::MediaTime;
use crate::foundation::error::{SpatialError, SpatialResult};

pub(crate) const EBML_HEADER: u32 = 0x1A45_DFA3;
pub(crate) const SEGMENT: u32 = 0x1853_8067;
pub(crate) const INFO: u32 = 0x1549_A966;
pub(crate) const TIMESTAMP_SCALE: u32 = 0x2A_D7B1;
pub(crate) const CLUSTER: u32 = 0x1F43_B675;
pub(crate) const CLUSTER_TIMESTAMP: u32 = 0xE7;

const DEFAULT_TIMESTAMP_SCALE_NS: u64 = 1_000_000;
const MAX_ELEMENT_BYTES: u64 = 64 * 1024 * 1024;

/// One cluster plus whatever preceded it since the previous chunk.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct MkvChunk {
    pub pts: MediaTime,
    pub data: Vec<u8>,
}

pub(crate) struct ClusterChunker<R> {
    src: R,
    pending: Vec<u8>,
    timestamp_scale_ns: u64,
    started: bool,
    done: bool,
}

impl<R: Read> ClusterChunker<R> {
    pub(crate) fn new(src: R) -> Self {
        Self {
            src,
            pending: Vec::new(),
            timestamp_scale_ns: DEFAULT_TIMESTAMP_SCALE_NS,
            started: false,
            done: false,
        }
    }

    /// The next cluster, or `None` at the end of the stream.
    pub(crate) fn next_chunk(&mut self) -> SpatialResult<Option<MkvChunk>> {
        if self.done {
            return Ok(None);
        }
        loop {
            let mut raw = Vec::with_capacity(12);
            let Some(id) = read_id(&mut self.src, &mut raw)? else {
                self.done = true;
                if !self.pending.is_empty() {
                    tracing::debug!(bytes = self.pending.len(), "trailing matroska elements ignored");
                }
                return Ok(None);
            };
            if !self.started {
                if id != EBML_HEADER {
                    return Err(SpatialError::evaluation(format!(
                        "audio stream is not Matroska (first element {id:#x})"
                    )));
                }
                self.started = true;
            }
            let size = read_size(&mut self.src, &mut raw)?;

            if id == SEGMENT {
                // Descend: the segment's children are read as if they were top level.
                self.pending.extend_from_slice(&raw);
                continue;
            }

            let size = size.ok_or_else(|| {
                SpatialError::evaluation(format!("matroska element {id:#x} has an unknown size"))
            })?;
            let body = read_body(&mut self.src, id, size)?;

            match id {
                CLUSTER => {
                    let pts = self.cluster_time(&body)?;
                    let mut data = std::mem::take(&mut self.pending);
                    data.reserve(raw.len() + body.len());
                    data.extend_from_slice(&raw);
                    data.extend_from_slice(&body);
                    return Ok(Some(MkvChunk { pts, data }));
                }
                INFO => {
                    if let Some(scale) = find_uint(&body, TIMESTAMP_SCALE)? {
                        if scale == 0 {
                            return Err(SpatialError::evaluation("matroska timestamp scale is 0"));
                        }
                        self.timestamp_scale_ns = scale;
                    }
                }
                _ => {}
            }
            self.pending.extend_from_slice(&raw);
            self.pending.extend_from_slice(&body);
        }
    }

    fn cluster_time(&self, body: &[u8]) -> SpatialResult<MediaTime> {
        let ticks = find_uint(body, CLUSTER_TIMESTAMP)?
            .ok_or_else(|| SpatialError::evaluation("matroska cluster has no timestamp"))?;
        let ns = ticks
            .checked_mul(self.timestamp_scale_ns)
            .and_then(|ns| i64::try_from(ns).ok())
            .ok_or_else(|| SpatialError::evaluation("matroska cluster timestamp overflows"))?;
        MediaTime::new(ns, 1_000_000_000)
    }
}

fn read_body(src: &mut impl Read, id: u32, size: u64) -> SpatialResult<Vec<u8>> {
    if size > MAX_ELEMENT_BYTES {
        return Err(SpatialError::evaluation(format!(
            "matroska element {id:#x} is too large ({size} bytes)"
        )));
    }
    let mut body = vec![0u8; size as usize];
    src.read_exact(&mut body).map_err(|e| {
        SpatialError::evaluation(format!("matroska element {id:#x} is truncated: {e}"))
    })?;
    Ok(body)
}

/// Value of the first direct child `id` inside a master element body.
fn find_uint(mut body: &[u8], id: u32) -> SpatialResult<Option<u64>> {
    let mut raw = Vec::new();
    while let Some(child) = read_id(&mut body, &mut raw)? {
        let size = read_size(&mut body, &mut raw)?.ok_or_else(|| {
            SpatialError::evaluation(format!("matroska child {child:#x} has an unknown size"))
        })?;
        if size > body.len() as u64 {
            return Err(SpatialError::evaluation(format!(
                "matroska child {child:#x} overruns its parent"
            )));
        }
        let (value, rest) = body.split_at(size as usize);
        if child == id {
            return read_uint(value).map(Some);
        }
        body = rest;
    }
    Ok(None)
}

/// Element ID with its marker bit kept. `None` on a clean end of stream.
fn read_id(src: &mut impl Read, raw: &mut Vec<u8>) -> SpatialResult<Option<u32>> {
    let mut first = [0u8; 1];
    match src.read(&mut first) {
        Ok(0) => return Ok(None),
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::Interrupted => return read_id(src, raw),
        Err(e) => return Err(SpatialError::evaluation(format!("matroska read failed: {e}"))),
    }
    let width = first[0].leading_zeros() as usize + 1;
    if width > 4 {
        return Err(SpatialError::evaluation(format!(
            "invalid matroska element id lead byte {:#04x}",
            first[0]
        )));
    }
    let mut bytes = [0u8; 4];
    bytes[0] = first[0];
    read_vint_tail(src, &mut bytes[1..width])?;
    raw.extend_from_slice(&bytes[..width]);
    Ok(Some(bytes[..width].iter().fold(0u32, |acc, b| (acc << 8) | u32::from(*b))))
}

/// Element data size with the marker stripped. `None` means unknown size (all data bits set).
fn read_size(src: &mut impl Read, raw: &mut Vec<u8>) -> SpatialResult<Option<u64>> {
    let mut first = [0u8; 1];
    read_vint_tail(src, &mut first)?;
    let width = first[0].leading_zeros() as usize + 1;
    if width > 8 {
        return Err(SpatialError::evaluation("invalid matroska size lead byte 0x00"));
    }
    let mut bytes = [0u8; 8];
    bytes[0] = first[0];
    read_vint_tail(src, &mut bytes[1..width])?;
    raw.extend_from_slice(&bytes[..width]);

    let marker_mask = if width == 8 { 0 } else { 0xFFu8 >> width };
    let value = bytes[1..width]
        .iter()
        .fold(u64::from(bytes[0] & marker_mask), |acc, b| (acc << 8) | u64::from(*b));
    let all_ones = (1u64 << (7 * width)) - 1;
    Ok((value != all_ones).then_some(value))
}

fn read_vint_tail(src: &mut impl Read, buf: &mut [u8]) -> SpatialResult<()> {
    src.read_exact(buf)
        .map_err(|e| SpatialError::evaluation(format!("truncated matroska element header: {e}")))
}

fn read_uint(bytes: &[u8]) -> SpatialResult<u64> {
    if bytes.len() > 8 {
        return Err(SpatialError::evaluation(format!(
            "matroska unsigned integer is {} bytes wide",
            bytes.len()
        )));
    }
    Ok(bytes.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
}
