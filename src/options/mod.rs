//! Options resolution.
//!
//! Raw [`ProcessingOptions`] arrive with every sub-block nullable. They are
//! resolved exactly once, against probed source metadata, into a fully-typed
//! [`ResolvedPlan`]; the coordinator never sees a null again. Anything
//! unknown or out of range is rejected here as a fatal `Config` error:
//! options bugs are deterministic, so retrying them is pointless.

use serde::{Deserialize, Serialize};
use vodforge_common::{
    Error, Resolution, Result, SourceMetadata, WatermarkPosition, WatermarkSpec,
};

/// Default frame offset for thumbnails, in seconds.
const DEFAULT_THUMBNAIL_OFFSET_SECS: f64 = 5.0;
/// Offset used when the source is shorter than the default offset.
const FALLBACK_THUMBNAIL_OFFSET_SECS: f64 = 1.0;
/// Default scene-change sensitivity.
const DEFAULT_SCENE_THRESHOLD: f32 = 0.3;
/// Default minimum scene length, in seconds.
const DEFAULT_MIN_SCENE_SECS: f64 = 30.0;

/// Raw, caller-supplied processing options. Every sub-block is optional;
/// absence disables the corresponding branch or falls back to defaults.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ProcessingOptions {
    /// Explicit resolution ladder, e.g. `["720p", "320p"]`. When present it
    /// is honored verbatim as a user override, with no upscale guard.
    #[serde(default)]
    pub resolutions: Option<Vec<String>>,

    #[serde(default)]
    pub thumbnail: Option<ThumbnailOptions>,

    #[serde(default)]
    pub chapters: Option<ChapterOptions>,

    #[serde(default)]
    pub watermark: Option<WatermarkOptions>,
}

/// Raw thumbnail options.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ThumbnailOptions {
    /// `offset` (default), `timestamp`, or `scene`.
    #[serde(default)]
    pub mode: Option<String>,

    /// Frame timestamp in seconds, required for `timestamp` mode.
    #[serde(default)]
    pub custom_time_secs: Option<f64>,
}

/// Raw chapter options. Presence of the block enables the branch.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ChapterOptions {
    /// Scene-change sensitivity in (0, 1); lower detects more scenes.
    #[serde(default)]
    pub scene_threshold: Option<f32>,

    /// Minimum scene length in seconds.
    #[serde(default)]
    pub min_scene_secs: Option<f64>,
}

/// Raw watermark options.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct WatermarkOptions {
    pub text: String,

    /// `top-left`, `top-right`, `bottom-left`, `bottom-right`, or `center`.
    #[serde(default)]
    pub position: Option<String>,

    #[serde(default)]
    pub font_size: Option<u32>,

    /// Background box opacity in [0, 1].
    #[serde(default)]
    pub opacity: Option<f32>,
}

/// An enhancement branch, resolved to enabled-with-params or disabled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BranchPlan<T> {
    Disabled,
    Enabled(T),
}

impl<T> BranchPlan<T> {
    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled(_))
    }

    pub fn params(&self) -> Option<&T> {
        match self {
            Self::Enabled(params) => Some(params),
            Self::Disabled => None,
        }
    }
}

/// How the thumbnail frame is selected.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ThumbnailSpec {
    /// Fixed offset into the source.
    Offset { at_secs: f64 },
    /// User-specified timestamp, used as-is. An out-of-range value fails the
    /// branch (absorbed), it is not clamped.
    Timestamp { at_secs: f64 },
    /// First detected scene boundary; runs scene detection inside the
    /// thumbnail branch.
    SceneBased,
}

/// Validated chapter detection parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChapterSpec {
    pub scene_threshold: f32,
    pub min_scene_secs: f64,
}

/// The fully-typed execution plan for one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedPlan {
    /// Resolution ladder, highest first, no duplicates.
    pub ladder: Vec<Resolution>,
    pub thumbnail: BranchPlan<ThumbnailSpec>,
    pub chapters: BranchPlan<ChapterSpec>,
    pub watermark: Option<WatermarkSpec>,
}

/// Resolve raw options against probed metadata into an execution plan.
pub fn resolve(options: &ProcessingOptions, metadata: &SourceMetadata) -> Result<ResolvedPlan> {
    Ok(ResolvedPlan {
        ladder: resolve_ladder(options.resolutions.as_deref(), metadata.height)?,
        thumbnail: resolve_thumbnail(options.thumbnail.as_ref(), metadata.duration_secs)?,
        chapters: resolve_chapters(options.chapters.as_ref())?,
        watermark: options
            .watermark
            .as_ref()
            .map(resolve_watermark)
            .transpose()?,
    })
}

/// Compute the resolution ladder.
///
/// An explicit list is a user override and is honored verbatim, including
/// entries above source height. The computed ladder keeps presets strictly
/// below the source height, always retaining the lowest preset as a floor.
fn resolve_ladder(requested: Option<&[String]>, source_height: u32) -> Result<Vec<Resolution>> {
    if let Some(tokens) = requested {
        if tokens.is_empty() {
            return Err(Error::config("resolution list is empty"));
        }
        let mut ladder = Vec::with_capacity(tokens.len());
        for token in tokens {
            let resolution: Resolution = token.parse().map_err(Error::Config)?;
            if ladder.contains(&resolution) {
                return Err(Error::config(format!(
                    "duplicate resolution '{resolution}' in explicit list"
                )));
            }
            ladder.push(resolution);
        }
        return Ok(ladder);
    }

    let ladder: Vec<Resolution> = Resolution::PRESETS
        .iter()
        .copied()
        .filter(|preset| preset.height() < source_height)
        .collect();

    if ladder.is_empty() {
        // Source is at or below the lowest preset; keep the floor.
        return Ok(vec![*Resolution::PRESETS.last().expect("preset table is non-empty")]);
    }
    Ok(ladder)
}

fn resolve_thumbnail(
    options: Option<&ThumbnailOptions>,
    duration_secs: f64,
) -> Result<BranchPlan<ThumbnailSpec>> {
    let Some(options) = options else {
        return Ok(BranchPlan::Disabled);
    };

    let spec = match options.mode.as_deref().unwrap_or("offset") {
        "offset" => {
            let at_secs = if duration_secs < DEFAULT_THUMBNAIL_OFFSET_SECS {
                FALLBACK_THUMBNAIL_OFFSET_SECS
            } else {
                DEFAULT_THUMBNAIL_OFFSET_SECS
            };
            ThumbnailSpec::Offset { at_secs }
        }
        "timestamp" => {
            let at_secs = options.custom_time_secs.ok_or_else(|| {
                Error::config("thumbnail mode 'timestamp' requires custom_time_secs")
            })?;
            if at_secs < 0.0 {
                return Err(Error::config(format!(
                    "thumbnail timestamp must be non-negative, got {at_secs}"
                )));
            }
            ThumbnailSpec::Timestamp { at_secs }
        }
        "scene" => ThumbnailSpec::SceneBased,
        other => {
            return Err(Error::config(format!("unknown thumbnail mode '{other}'")));
        }
    };
    Ok(BranchPlan::Enabled(spec))
}

fn resolve_chapters(options: Option<&ChapterOptions>) -> Result<BranchPlan<ChapterSpec>> {
    let Some(options) = options else {
        return Ok(BranchPlan::Disabled);
    };

    let scene_threshold = options.scene_threshold.unwrap_or(DEFAULT_SCENE_THRESHOLD);
    if !(0.0..=1.0).contains(&scene_threshold) {
        return Err(Error::config(format!(
            "scene_threshold must be within [0, 1], got {scene_threshold}"
        )));
    }

    let min_scene_secs = options.min_scene_secs.unwrap_or(DEFAULT_MIN_SCENE_SECS);
    if min_scene_secs <= 0.0 {
        return Err(Error::config(format!(
            "min_scene_secs must be positive, got {min_scene_secs}"
        )));
    }

    Ok(BranchPlan::Enabled(ChapterSpec {
        scene_threshold,
        min_scene_secs,
    }))
}

fn resolve_watermark(options: &WatermarkOptions) -> Result<WatermarkSpec> {
    let text = options.text.trim();
    if text.is_empty() {
        return Err(Error::config("watermark text is empty"));
    }

    let position = match options.position.as_deref() {
        None => WatermarkPosition::default(),
        Some("top-left") => WatermarkPosition::TopLeft,
        Some("top-right") => WatermarkPosition::TopRight,
        Some("bottom-left") => WatermarkPosition::BottomLeft,
        Some("bottom-right") => WatermarkPosition::BottomRight,
        Some("center") => WatermarkPosition::Center,
        Some(other) => {
            return Err(Error::config(format!("unknown watermark position '{other}'")));
        }
    };

    let font_size = options.font_size.unwrap_or(24);
    if font_size == 0 {
        return Err(Error::config("watermark font_size cannot be 0"));
    }

    let opacity = options.opacity.unwrap_or(0.5);
    if !(0.0..=1.0).contains(&opacity) {
        return Err(Error::config(format!(
            "watermark opacity must be within [0, 1], got {opacity}"
        )));
    }

    Ok(WatermarkSpec {
        text: text.to_string(),
        position,
        font_size,
        opacity,
    })
}
