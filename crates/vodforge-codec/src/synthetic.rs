//! Deterministic in-process codec for tests.
//!
//! Chunks and segments are small text descriptors instead of media bytes:
//! a chunk is `chunk:{index}:{duration}`, a transcoded segment is
//! `segment:{index}:{resolution}:wm=...`. Identical inputs always produce
//! identical outputs, which is what the pipeline's idempotency tests assert
//! on. Failure injection is keyed by (chunk index, resolution) so tests can
//! fail exactly one cell of the fan-out matrix.

use crate::{Error, MediaCodec, Result, SourceChunk, TranscodedSegment};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use vodforge_common::{Resolution, SourceMetadata, WatermarkSpec};

/// How an injected transcode failure behaves.
#[derive(Debug, Clone, Copy)]
enum FailureMode {
    /// Fail every attempt.
    Always,
    /// Fail this many attempts, then succeed.
    Times(u32),
}

/// Deterministic fake codec.
#[derive(Debug)]
pub struct SyntheticCodec {
    metadata: SourceMetadata,
    scene_boundaries: Vec<f64>,
    fail_split: bool,
    probe_failures: AtomicU32,
    transcode_failures: Mutex<HashMap<(u32, Resolution), FailureMode>>,
}

impl SyntheticCodec {
    /// A synthetic source with the given dimensions and duration.
    pub fn new(width: u32, height: u32, duration_secs: f64) -> Self {
        Self {
            metadata: SourceMetadata {
                width,
                height,
                duration_secs,
                codec: "h264".to_string(),
            },
            scene_boundaries: Vec::new(),
            fail_split: false,
            probe_failures: AtomicU32::new(0),
            transcode_failures: Mutex::new(HashMap::new()),
        }
    }

    /// Scene boundaries `detect_scenes` should report (before min-length
    /// filtering).
    pub fn with_scenes(mut self, boundaries: Vec<f64>) -> Self {
        self.scene_boundaries = boundaries;
        self
    }

    /// Make `split` fail, exercising the fatal SplitError path.
    pub fn with_failing_split(mut self) -> Self {
        self.fail_split = true;
        self
    }

    /// Fail the first `n` probe attempts, then succeed.
    pub fn with_probe_failures(self, n: u32) -> Self {
        self.probe_failures.store(n, Ordering::SeqCst);
        self
    }

    /// Fail every transcode of the given (chunk, resolution) pair.
    pub fn fail_transcode(&self, chunk_index: u32, resolution: Resolution) {
        self.transcode_failures
            .lock()
            .insert((chunk_index, resolution), FailureMode::Always);
    }

    /// Fail the first `times` transcodes of the pair, then succeed.
    pub fn fail_transcode_times(&self, chunk_index: u32, resolution: Resolution, times: u32) {
        self.transcode_failures
            .lock()
            .insert((chunk_index, resolution), FailureMode::Times(times));
    }

    fn chunk_payload(index: u32, duration_secs: f64) -> Bytes {
        Bytes::from(format!("chunk:{index}:{duration_secs}"))
    }

    fn parse_chunk(chunk: &Bytes) -> Result<(u32, f64)> {
        let text = std::str::from_utf8(chunk)
            .map_err(|_| Error::InvalidInput("chunk payload is not utf-8".to_string()))?;
        let mut parts = text.split(':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some("chunk"), Some(index), Some(duration)) => {
                let index = index
                    .parse()
                    .map_err(|_| Error::InvalidInput(format!("bad chunk index in '{text}'")))?;
                let duration = duration
                    .parse()
                    .map_err(|_| Error::InvalidInput(format!("bad chunk duration in '{text}'")))?;
                Ok((index, duration))
            }
            _ => Err(Error::InvalidInput(format!(
                "not a synthetic chunk payload: '{text}'"
            ))),
        }
    }
}

#[async_trait]
impl MediaCodec for SyntheticCodec {
    async fn probe(&self, _source: &Bytes) -> Result<SourceMetadata> {
        let remaining = self.probe_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.probe_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(Error::tool_failed("probe", "injected probe failure"));
        }
        Ok(self.metadata.clone())
    }

    async fn split(&self, _source: &Bytes, chunk_secs: f64) -> Result<Vec<SourceChunk>> {
        if self.fail_split {
            return Err(Error::tool_failed("split", "injected split failure"));
        }
        if chunk_secs <= 0.0 {
            return Err(Error::InvalidInput(format!(
                "chunk duration must be positive, got {chunk_secs}"
            )));
        }

        let mut chunks = Vec::new();
        let mut remaining = self.metadata.duration_secs;
        let mut index = 0u32;
        while remaining > 0.0 {
            let duration = remaining.min(chunk_secs);
            chunks.push(SourceChunk {
                data: Self::chunk_payload(index, duration),
                duration_secs: duration,
            });
            remaining -= duration;
            index += 1;
        }
        Ok(chunks)
    }

    async fn transcode(
        &self,
        chunk: &Bytes,
        resolution: Resolution,
        watermark: Option<&WatermarkSpec>,
    ) -> Result<TranscodedSegment> {
        let (index, duration_secs) = Self::parse_chunk(chunk)?;

        let mut failures = self.transcode_failures.lock();
        match failures.get_mut(&(index, resolution)) {
            Some(FailureMode::Always) => {
                return Err(Error::tool_failed(
                    "transcode",
                    format!("injected failure for chunk {index} / {resolution}"),
                ));
            }
            Some(FailureMode::Times(n)) if *n > 0 => {
                *n -= 1;
                return Err(Error::tool_failed(
                    "transcode",
                    format!("injected transient failure for chunk {index} / {resolution}"),
                ));
            }
            _ => {}
        }
        drop(failures);

        let wm = match watermark {
            Some(spec) => format!("{}@{}", spec.text, spec.position),
            None => "none".to_string(),
        };
        Ok(TranscodedSegment {
            data: Bytes::from(format!("segment:{index}:{resolution}:wm={wm}")),
            duration_secs,
        })
    }

    async fn detect_scenes(
        &self,
        _source: &Bytes,
        _threshold: f32,
        min_scene_secs: f64,
    ) -> Result<Vec<f64>> {
        let mut kept: Vec<f64> = Vec::new();
        for &t in &self.scene_boundaries {
            let previous = kept.last().copied().unwrap_or(0.0);
            if t - previous >= min_scene_secs && t < self.metadata.duration_secs {
                kept.push(t);
            }
        }
        Ok(kept)
    }

    async fn extract_frame(&self, _source: &Bytes, at_secs: f64) -> Result<Bytes> {
        if at_secs < 0.0 || at_secs >= self.metadata.duration_secs {
            return Err(Error::InvalidInput(format!(
                "frame timestamp {at_secs}s outside source duration {}s",
                self.metadata.duration_secs
            )));
        }
        Ok(Bytes::from(format!("frame@{at_secs}")))
    }
}
