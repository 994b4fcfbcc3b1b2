//! Reader and writer backends behind [`AssetReader`](crate::AssetReader) and
//! [`AssetWriter`](crate::AssetWriter).

pub mod ffmpeg;
pub mod memory;
