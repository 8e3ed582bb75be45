//! Enhancement branches: thumbnail extraction and chapter generation.
//!
//! Both branches run detached from the mandatory track and are an
//! independent failure domain: every error is caught at the branch boundary
//! and converted into a failed [`EnhancementResult`]. Nothing that happens
//! here can move the job toward Failed or gate its completion.

use crate::options::{ChapterSpec, ThumbnailSpec};
use crate::workflow::context::{engine_error_to_task, JobContext};
use serde::{Deserialize, Serialize};
use vodforge_common::{keys, EnhancementKind, EnhancementResult, Error, JobId, Result};

/// Scene detection settings for scene-based thumbnails. Coarse on purpose:
/// only the first boundary is used.
const THUMBNAIL_SCENE_THRESHOLD: f32 = 0.3;
const THUMBNAIL_SCENE_MIN_SECS: f64 = 1.0;
/// Fallback frame offset when scene-based selection finds no boundary.
const THUMBNAIL_FALLBACK_OFFSET_SECS: f64 = 1.0;

/// Run the thumbnail branch to a terminal outcome.
pub async fn run_thumbnail_branch(
    ctx: JobContext,
    spec: ThumbnailSpec,
    duration_secs: f64,
) -> EnhancementResult {
    match thumbnail_inner(&ctx, spec, duration_secs).await {
        Ok(key) => EnhancementResult::completed(EnhancementKind::Thumbnail, vec![key]),
        Err(e) => {
            tracing::warn!("job {}: thumbnail branch failed: {e}", ctx.job_id);
            EnhancementResult::failed(EnhancementKind::Thumbnail, e.to_string())
        }
    }
}

async fn thumbnail_inner(
    ctx: &JobContext,
    spec: ThumbnailSpec,
    duration_secs: f64,
) -> Result<String> {
    ctx.engine
        .dispatch(&ctx.specs.enhancement, |_attempt| {
            let ctx = ctx.clone();
            async move {
                let enhancement_err = |message: String| {
                    Error::enhancement(EnhancementKind::Thumbnail, message)
                };

                let source = ctx
                    .store
                    .get(&keys::source(ctx.job_id))
                    .await
                    .map_err(|e| enhancement_err(format!("fetch source: {e}")))?;

                let at_secs = match spec {
                    ThumbnailSpec::Offset { at_secs } => at_secs,
                    // Used as-is: an out-of-range timestamp fails the
                    // branch rather than being clamped.
                    ThumbnailSpec::Timestamp { at_secs } => at_secs,
                    ThumbnailSpec::SceneBased => {
                        let boundaries = ctx
                            .codec
                            .detect_scenes(
                                &source,
                                THUMBNAIL_SCENE_THRESHOLD,
                                THUMBNAIL_SCENE_MIN_SECS,
                            )
                            .await
                            .map_err(|e| enhancement_err(format!("scene detection: {e}")))?;
                        boundaries
                            .first()
                            .copied()
                            .unwrap_or(THUMBNAIL_FALLBACK_OFFSET_SECS.min(duration_secs / 2.0))
                    }
                };

                let frame = ctx
                    .codec
                    .extract_frame(&source, at_secs)
                    .await
                    .map_err(|e| enhancement_err(e.to_string()))?;

                let key = keys::thumbnail(ctx.job_id);
                ctx.store
                    .put(&key, frame)
                    .await
                    .map_err(|e| enhancement_err(format!("store thumbnail: {e}")))?;
                Ok(key)
            }
        })
        .await
        .map_err(|e| {
            engine_error_to_task(e, |message| {
                Error::enhancement(EnhancementKind::Thumbnail, message)
            })
        })
}

/// One derived chapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub index: u32,
    pub start_secs: f64,
    pub end_secs: f64,
    pub duration_secs: f64,
    pub title: String,
}

/// Persisted chapters.json document.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChapterDocument {
    job_id: JobId,
    total_duration_secs: f64,
    chapter_count: usize,
    chapters: Vec<Chapter>,
}

/// Run the chapters branch to a terminal outcome.
pub async fn run_chapters_branch(
    ctx: JobContext,
    spec: ChapterSpec,
    duration_secs: f64,
) -> EnhancementResult {
    match chapters_inner(&ctx, spec, duration_secs).await {
        Ok(keys) => EnhancementResult::completed(EnhancementKind::Chapters, keys),
        Err(e) => {
            tracing::warn!("job {}: chapters branch failed: {e}", ctx.job_id);
            EnhancementResult::failed(EnhancementKind::Chapters, e.to_string())
        }
    }
}

async fn chapters_inner(
    ctx: &JobContext,
    spec: ChapterSpec,
    duration_secs: f64,
) -> Result<Vec<String>> {
    ctx.engine
        .dispatch(&ctx.specs.enhancement, |_attempt| {
            let ctx = ctx.clone();
            async move {
                let enhancement_err =
                    |message: String| Error::enhancement(EnhancementKind::Chapters, message);

                let source = ctx
                    .store
                    .get(&keys::source(ctx.job_id))
                    .await
                    .map_err(|e| enhancement_err(format!("fetch source: {e}")))?;

                let boundaries = ctx
                    .codec
                    .detect_scenes(&source, spec.scene_threshold, spec.min_scene_secs)
                    .await
                    .map_err(|e| enhancement_err(format!("scene detection: {e}")))?;

                let chapters = build_chapters(&boundaries, duration_secs, spec.min_scene_secs);

                let document = ChapterDocument {
                    job_id: ctx.job_id,
                    total_duration_secs: duration_secs,
                    chapter_count: chapters.len(),
                    chapters: chapters.clone(),
                };
                let json = serde_json::to_vec_pretty(&document)
                    .map_err(|e| enhancement_err(format!("encode chapters: {e}")))?;
                let json_key = keys::chapters_json(ctx.job_id);
                ctx.store
                    .put(&json_key, json.into())
                    .await
                    .map_err(|e| enhancement_err(format!("store chapters.json: {e}")))?;

                let vtt = render_webvtt(&chapters, ctx.job_id);
                let vtt_key = keys::chapters_vtt(ctx.job_id);
                ctx.store
                    .put(&vtt_key, vtt.into())
                    .await
                    .map_err(|e| enhancement_err(format!("store chapters.vtt: {e}")))?;

                Ok(vec![json_key, vtt_key])
            }
        })
        .await
        .map_err(|e| {
            engine_error_to_task(e, |message| {
                Error::enhancement(EnhancementKind::Chapters, message)
            })
        })
}

/// Derive chapters from scene boundaries.
///
/// Chapters always start at 0 and end at the source duration. A boundary is
/// kept only when both the preceding and the trailing chapter stay at least
/// `min_scene_secs` long; sources shorter than twice the minimum yield a
/// single chapter.
pub fn build_chapters(boundaries: &[f64], total_secs: f64, min_scene_secs: f64) -> Vec<Chapter> {
    if total_secs < 2.0 * min_scene_secs {
        return vec![Chapter {
            index: 0,
            start_secs: 0.0,
            end_secs: total_secs,
            duration_secs: total_secs,
            title: "Full Video".to_string(),
        }];
    }

    let mut starts = vec![0.0f64];
    for &t in boundaries {
        let previous = *starts.last().expect("starts is non-empty");
        if t - previous >= min_scene_secs && total_secs - t >= min_scene_secs {
            starts.push(t);
        }
    }

    starts
        .iter()
        .enumerate()
        .map(|(i, &start_secs)| {
            let end_secs = starts.get(i + 1).copied().unwrap_or(total_secs);
            Chapter {
                index: i as u32,
                start_secs,
                end_secs,
                duration_secs: end_secs - start_secs,
                title: format!("Chapter {}", i + 1),
            }
        })
        .collect()
}

/// Format seconds as a WebVTT timestamp (HH:MM:SS.mmm).
pub fn format_vtt_timestamp(secs: f64) -> String {
    let hours = (secs / 3600.0) as u64;
    let minutes = ((secs % 3600.0) / 60.0) as u64;
    let seconds = secs % 60.0;
    format!("{hours:02}:{minutes:02}:{seconds:06.3}")
}

/// Render chapters as a WebVTT file.
pub fn render_webvtt(chapters: &[Chapter], job_id: JobId) -> String {
    let mut lines = vec!["WEBVTT".to_string(), format!("X-JOB-ID: {job_id}"), String::new()];
    for chapter in chapters {
        lines.push(format!(
            "{} --> {}",
            format_vtt_timestamp(chapter.start_secs),
            format_vtt_timestamp(chapter.end_secs)
        ));
        lines.push(chapter.title.clone());
        lines.push(String::new());
    }
    lines.join("\n")
}
