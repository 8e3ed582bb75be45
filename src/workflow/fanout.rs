//! Transcode fan-out.
//!
//! One task per (chunk, resolution) pair, no ordering between tasks. Each
//! task is idempotent: its segment key is a pure function of the pair, so a
//! retried or replayed execution overwrites the same blob with equivalent
//! bytes and the aggregator ignores the duplicate.
//!
//! The ladder is a commitment: exhausting retries on any single pair fails
//! the whole job, identifying the chunk and resolution. There is no policy
//! to silently drop one resolution.

use crate::workflow::aggregate::SegmentAggregator;
use crate::workflow::context::{engine_error_to_task, JobContext};
use futures::future::join_all;
use vodforge_common::{keys, ChunkManifest, ChunkRef, Error, Resolution, Result, SegmentResult, WatermarkSpec};

/// Dispatch every (chunk, resolution) transcode and aggregate the results.
pub async fn run_transcodes(
    ctx: &JobContext,
    manifest: &ChunkManifest,
    ladder: &[Resolution],
    watermark: Option<&WatermarkSpec>,
    aggregator: &SegmentAggregator,
) -> Result<()> {
    let total = manifest.len() * ladder.len();
    tracing::info!(
        "job {}: dispatching {total} transcode tasks ({} chunks x {} resolutions){}",
        ctx.job_id,
        manifest.len(),
        ladder.len(),
        if watermark.is_some() { " with watermark" } else { "" }
    );

    let mut tasks = Vec::with_capacity(total);
    for &resolution in ladder {
        for chunk in &manifest.chunks {
            tasks.push(transcode_one(ctx, chunk, resolution, watermark, aggregator));
        }
    }

    let failures: Vec<Error> = join_all(tasks)
        .await
        .into_iter()
        .filter_map(|outcome| outcome.err())
        .collect();

    if let Some(first) = failures.into_iter().next() {
        return Err(first);
    }
    Ok(())
}

/// Transcode one (chunk, resolution) pair and record its segment.
async fn transcode_one(
    ctx: &JobContext,
    chunk: &ChunkRef,
    resolution: Resolution,
    watermark: Option<&WatermarkSpec>,
    aggregator: &SegmentAggregator,
) -> Result<()> {
    let chunk_index = chunk.index;
    let chunk_key = chunk.key.clone();
    let segment_key = keys::segment(ctx.job_id, resolution, chunk_index);
    let watermark = watermark.cloned();

    let outcome = ctx
        .engine
        .dispatch(&ctx.specs.transcode, |_attempt| {
            let ctx = ctx.clone();
            let chunk_key = chunk_key.clone();
            let segment_key = segment_key.clone();
            let watermark = watermark.clone();
            async move {
                let chunk_data = ctx.store.get(&chunk_key).await.map_err(|e| {
                    Error::transcode(chunk_index, resolution, format!("fetch chunk: {e}"))
                })?;

                let segment = ctx
                    .codec
                    .transcode(&chunk_data, resolution, watermark.as_ref())
                    .await
                    .map_err(|e| Error::transcode(chunk_index, resolution, e.to_string()))?;

                ctx.store.put(&segment_key, segment.data).await.map_err(|e| {
                    Error::transcode(chunk_index, resolution, format!("store segment: {e}"))
                })?;

                Ok(SegmentResult {
                    chunk_index,
                    resolution,
                    key: segment_key.clone(),
                    duration_secs: segment.duration_secs,
                })
            }
        })
        .await;

    match outcome {
        Ok(segment) => {
            // Late results for a cancelled or failed job are discarded, not
            // aggregated.
            if ctx.engine.is_cancelled() || ctx.registry.is_terminal(ctx.job_id) {
                tracing::debug!(
                    "job {}: discarding late segment chunk {chunk_index} / {resolution}",
                    ctx.job_id
                );
                return Ok(());
            }
            if !aggregator.record(segment) {
                tracing::debug!(
                    "job {}: duplicate segment chunk {chunk_index} / {resolution} ignored",
                    ctx.job_id
                );
            }
            Ok(())
        }
        Err(e) => Err(engine_error_to_task(e, |message| {
            Error::transcode(chunk_index, resolution, message)
        })),
    }
}
