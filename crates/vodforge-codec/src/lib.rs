//! Media codec interface for vodforge.
//!
//! The pipeline never touches media bytes itself; it goes through the
//! [`MediaCodec`] trait. Two backends are provided:
//!
//! - [`FfmpegCodec`] shells out to ffmpeg/ffprobe, the way the rest of the
//!   ecosystem's CLI-tool pipelines do.
//! - [`SyntheticCodec`] is a deterministic in-process fake for tests: chunks
//!   and segments are small text descriptors, so assertions can see exactly
//!   which (chunk, resolution) a segment came from.

pub mod error;
pub mod ffmpeg;
pub mod synthetic;
pub mod tools;

pub use error::{Error, Result};
pub use ffmpeg::FfmpegCodec;
pub use synthetic::SyntheticCodec;
pub use tools::{check_tool, check_tools, require_tool, ToolInfo};

use async_trait::async_trait;
use bytes::Bytes;
use vodforge_common::{Resolution, SourceMetadata, WatermarkSpec};

/// One chunk produced by splitting a source.
#[derive(Debug, Clone)]
pub struct SourceChunk {
    pub data: Bytes,
    pub duration_secs: f64,
}

/// One transcoded segment.
#[derive(Debug, Clone)]
pub struct TranscodedSegment {
    pub data: Bytes,
    pub duration_secs: f64,
}

/// Media codec operations consumed by the pipeline.
///
/// All operations take raw bytes rather than paths so backends decide their
/// own spooling strategy, and so the in-memory test backend needs no
/// filesystem at all.
#[async_trait]
pub trait MediaCodec: Send + Sync {
    /// Probe source metadata (dimensions, duration, codec).
    async fn probe(&self, source: &Bytes) -> Result<SourceMetadata>;

    /// Split the source into keyframe-aligned chunks of roughly
    /// `chunk_secs` each; the final chunk may be shorter. Chunks are
    /// returned in timeline order.
    async fn split(&self, source: &Bytes, chunk_secs: f64) -> Result<Vec<SourceChunk>>;

    /// Transcode one chunk to the target resolution, optionally burning in
    /// a watermark. Must be deterministic for identical inputs.
    async fn transcode(
        &self,
        chunk: &Bytes,
        resolution: Resolution,
        watermark: Option<&WatermarkSpec>,
    ) -> Result<TranscodedSegment>;

    /// Detect scene-change boundaries above `threshold`, dropping scenes
    /// shorter than `min_scene_secs`. Returns ascending timestamps in
    /// seconds, exclusive of 0 and the source end.
    async fn detect_scenes(
        &self,
        source: &Bytes,
        threshold: f32,
        min_scene_secs: f64,
    ) -> Result<Vec<f64>>;

    /// Extract a single frame at `at_secs` as an encoded image.
    /// Fails if `at_secs` is outside the source timeline.
    async fn extract_frame(&self, source: &Bytes, at_secs: f64) -> Result<Bytes>;
}
