//! Core data model for the transcoding pipeline.
//!
//! Everything that crosses a crate boundary lives here: the resolution
//! presets, probed source metadata, the chunk manifest, per-segment results,
//! playlists, enhancement outcomes, and the completion record handed back to
//! the caller.

use crate::ids::JobId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Output resolution preset.
///
/// The preset table is fixed; ladders are ordered subsets of it. Bandwidth
/// hints are static per preset and feed the master playlist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Resolution {
    #[serde(rename = "320p")]
    P320,
    #[serde(rename = "480p")]
    P480,
    #[serde(rename = "720p")]
    P720,
    #[serde(rename = "1080p")]
    P1080,
}

impl Resolution {
    /// All presets, highest first: the order ladders are built in.
    pub const PRESETS: [Resolution; 4] = [
        Resolution::P1080,
        Resolution::P720,
        Resolution::P480,
        Resolution::P320,
    ];

    /// Frame height in pixels.
    pub fn height(&self) -> u32 {
        match self {
            Self::P320 => 320,
            Self::P480 => 480,
            Self::P720 => 720,
            Self::P1080 => 1080,
        }
    }

    /// Approximate frame width assuming 16:9.
    pub fn width(&self) -> u32 {
        self.height() * 16 / 9
    }

    /// Static bandwidth hint in bits per second for adaptive selection.
    pub fn bandwidth(&self) -> u32 {
        match self {
            Self::P320 => 800_000,
            Self::P480 => 1_400_000,
            Self::P720 => 2_800_000,
            Self::P1080 => 5_000_000,
        }
    }

    /// Preset name as used in storage keys and playlists, e.g. `720p`.
    pub fn name(&self) -> &'static str {
        match self {
            Self::P320 => "320p",
            Self::P480 => "480p",
            Self::P720 => "720p",
            Self::P1080 => "1080p",
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Resolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "320p" => Ok(Self::P320),
            "480p" => Ok(Self::P480),
            "720p" => Ok(Self::P720),
            "1080p" => Ok(Self::P1080),
            other => Err(format!("unknown resolution '{other}'")),
        }
    }
}

/// Metadata probed from the source before any plan is made.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceMetadata {
    pub width: u32,
    pub height: u32,
    /// Duration in seconds.
    pub duration_secs: f64,
    pub codec: String,
}

/// One chunk of the split source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRef {
    /// Zero-based position in the source timeline.
    pub index: u32,
    /// Blob key of the chunk data.
    pub key: String,
    /// Actual chunk duration in seconds. The final chunk may be shorter
    /// than the target.
    pub duration_secs: f64,
}

/// Ordered, immutable list of source chunks.
///
/// Created exactly once per job by the chunk planner and never mutated
/// afterwards. Indices are contiguous from 0 and the chunks cover the source
/// timeline without gaps or overlaps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkManifest {
    pub job_id: JobId,
    /// Target chunk duration the planner asked for, in seconds.
    pub target_chunk_secs: f64,
    pub chunks: Vec<ChunkRef>,
}

impl ChunkManifest {
    /// Number of chunks.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Sum of chunk durations in seconds.
    pub fn total_duration_secs(&self) -> f64 {
        self.chunks.iter().map(|c| c.duration_secs).sum()
    }

    /// Check the manifest invariants: non-empty, indices contiguous from 0.
    pub fn validate(&self) -> Result<(), String> {
        if self.chunks.is_empty() {
            return Err("manifest contains no chunks".to_string());
        }
        for (expected, chunk) in self.chunks.iter().enumerate() {
            if chunk.index as usize != expected {
                return Err(format!(
                    "chunk indices not contiguous: expected {expected}, found {}",
                    chunk.index
                ));
            }
        }
        Ok(())
    }
}

/// Watermark overlay position on the frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WatermarkPosition {
    TopLeft,
    TopRight,
    BottomLeft,
    #[default]
    BottomRight,
    Center,
}

impl fmt::Display for WatermarkPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::TopLeft => "top-left",
            Self::TopRight => "top-right",
            Self::BottomLeft => "bottom-left",
            Self::BottomRight => "bottom-right",
            Self::Center => "center",
        };
        f.write_str(s)
    }
}

/// Validated watermark parameters, applied uniformly to every chunk of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatermarkSpec {
    pub text: String,
    pub position: WatermarkPosition,
    pub font_size: u32,
    /// Background box opacity, 0.0..=1.0.
    pub opacity: f32,
}

/// Result of transcoding one (chunk, resolution) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentResult {
    pub chunk_index: u32,
    pub resolution: Resolution,
    /// Blob key the segment was stored at.
    pub key: String,
    pub duration_secs: f64,
}

/// One quality level's ordered segment list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantPlaylist {
    pub resolution: Resolution,
    /// Bandwidth hint in bits per second.
    pub bandwidth: u32,
    /// Blob key the rendered playlist was stored at.
    pub key: String,
    /// Segment results in ascending chunk-index order.
    pub segments: Vec<SegmentResult>,
}

impl VariantPlaylist {
    /// A variant is valid only when it references every chunk index exactly
    /// once in ascending order.
    pub fn validate(&self, chunk_count: usize) -> Result<(), String> {
        if self.segments.len() != chunk_count {
            return Err(format!(
                "variant {} has {} segments, expected {chunk_count}",
                self.resolution,
                self.segments.len()
            ));
        }
        for (expected, seg) in self.segments.iter().enumerate() {
            if seg.chunk_index as usize != expected {
                return Err(format!(
                    "variant {} segment order broken at position {expected} (found chunk {})",
                    self.resolution, seg.chunk_index
                ));
            }
        }
        Ok(())
    }
}

/// Reference to a variant inside the master playlist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantRef {
    pub resolution: Resolution,
    pub bandwidth: u32,
    pub playlist_key: String,
    pub segment_count: usize,
}

/// The adaptive-bitrate "menu" listing all complete variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasterPlaylist {
    pub key: String,
    /// Variants sorted by bandwidth, highest first.
    pub variants: Vec<VariantRef>,
}

/// Which enhancement branch a result belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnhancementKind {
    Thumbnail,
    Chapters,
}

impl fmt::Display for EnhancementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Thumbnail => f.write_str("thumbnail"),
            Self::Chapters => f.write_str("chapters"),
        }
    }
}

/// Terminal outcome of an enhancement branch.
///
/// Branches always resolve to one of these; a branch that is still pending
/// when the grace period runs out is recorded as `Abandoned`, not dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum EnhancementOutcome {
    /// The branch produced its artifact(s). Keys point into the blob store.
    Completed { keys: Vec<String> },
    /// The branch failed; the job is unaffected.
    Failed { reason: String },
    /// The branch was still running when the job finalized.
    Abandoned,
}

/// Result of one enhancement branch, never required for job completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnhancementResult {
    pub kind: EnhancementKind,
    pub outcome: EnhancementOutcome,
}

impl EnhancementResult {
    /// Primary artifact key, if the branch completed.
    pub fn artifact(&self) -> Option<&str> {
        match &self.outcome {
            EnhancementOutcome::Completed { keys } => keys.first().map(String::as_str),
            _ => None,
        }
    }

    pub fn completed(kind: EnhancementKind, keys: Vec<String>) -> Self {
        Self {
            kind,
            outcome: EnhancementOutcome::Completed { keys },
        }
    }

    pub fn failed<S: Into<String>>(kind: EnhancementKind, reason: S) -> Self {
        Self {
            kind,
            outcome: EnhancementOutcome::Failed {
                reason: reason.into(),
            },
        }
    }

    pub fn abandoned(kind: EnhancementKind) -> Self {
        Self {
            kind,
            outcome: EnhancementOutcome::Abandoned,
        }
    }
}

/// Status of one pipeline stage in the completion record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Completed,
    Failed,
    Skipped,
    Abandoned,
}

/// Timing and status of one pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: String,
    pub status: StageStatus,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

/// The record delivered to the caller once a job reaches a terminal state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRecord {
    pub job_id: JobId,
    /// Resolutions actually produced (the full ladder for a Completed job).
    pub resolutions: Vec<Resolution>,
    /// Blob key of the master playlist.
    pub master_playlist: String,
    /// Blob key of the thumbnail, if that branch completed.
    pub thumbnail: Option<String>,
    /// Blob keys of the chapter files, if that branch completed.
    pub chapters: Option<Vec<String>>,
    /// Full per-branch outcomes, including failures and abandonments.
    pub enhancements: Vec<EnhancementResult>,
    /// Per-stage timing and status.
    pub stages: Vec<StageReport>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_parse_and_display() {
        for preset in Resolution::PRESETS {
            let parsed: Resolution = preset.name().parse().unwrap();
            assert_eq!(parsed, preset);
        }
        assert!("999p".parse::<Resolution>().is_err());
        assert!("720P".parse::<Resolution>().is_err());
    }

    #[test]
    fn test_presets_are_highest_first() {
        let heights: Vec<u32> = Resolution::PRESETS.iter().map(|r| r.height()).collect();
        assert_eq!(heights, vec![1080, 720, 480, 320]);
    }

    #[test]
    fn test_resolution_serde_uses_names() {
        let json = serde_json::to_string(&Resolution::P720).unwrap();
        assert_eq!(json, "\"720p\"");
        let back: Resolution = serde_json::from_str("\"320p\"").unwrap();
        assert_eq!(back, Resolution::P320);
    }

    #[test]
    fn test_manifest_validation() {
        let job_id = JobId::new();
        let mut manifest = ChunkManifest {
            job_id,
            target_chunk_secs: 4.0,
            chunks: vec![
                ChunkRef {
                    index: 0,
                    key: "a".into(),
                    duration_secs: 4.0,
                },
                ChunkRef {
                    index: 1,
                    key: "b".into(),
                    duration_secs: 2.5,
                },
            ],
        };
        assert!(manifest.validate().is_ok());
        assert!((manifest.total_duration_secs() - 6.5).abs() < f64::EPSILON);

        manifest.chunks[1].index = 2;
        assert!(manifest.validate().is_err());

        manifest.chunks.clear();
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn test_variant_validation_rejects_gaps() {
        let seg = |i: u32| SegmentResult {
            chunk_index: i,
            resolution: Resolution::P480,
            key: format!("seg_{i}"),
            duration_secs: 4.0,
        };
        let mut variant = VariantPlaylist {
            resolution: Resolution::P480,
            bandwidth: Resolution::P480.bandwidth(),
            key: "playlist".into(),
            segments: vec![seg(0), seg(1), seg(2)],
        };
        assert!(variant.validate(3).is_ok());

        variant.segments[1] = seg(2);
        assert!(variant.validate(3).is_err());

        variant.segments.pop();
        assert!(variant.validate(3).is_err());
    }

    #[test]
    fn test_enhancement_artifact() {
        let ok = EnhancementResult::completed(EnhancementKind::Thumbnail, vec!["k".into()]);
        assert_eq!(ok.artifact(), Some("k"));
        let failed = EnhancementResult::failed(EnhancementKind::Thumbnail, "boom");
        assert_eq!(failed.artifact(), None);
        let abandoned = EnhancementResult::abandoned(EnhancementKind::Chapters);
        assert_eq!(abandoned.artifact(), None);
    }
}
