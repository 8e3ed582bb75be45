//! Chunk planning.
//!
//! Splits the acquired source into keyframe-aligned chunks, uploads them,
//! and persists the manifest. The manifest is created exactly once per job;
//! a replayed split rebuilds the identical manifest because chunk keys are
//! pure functions of (job, index).

use crate::workflow::context::{engine_error_to_task, JobContext};
use vodforge_common::{keys, ChunkManifest, ChunkRef, Error, Result};

/// Split the source and persist the chunk manifest.
///
/// A demux failure is fatal: without a manifest nothing downstream can
/// proceed.
pub async fn plan_chunks(ctx: &JobContext) -> Result<ChunkManifest> {
    let chunk_secs = ctx.chunk_secs;

    let manifest = ctx
        .engine
        .dispatch(&ctx.specs.split, |_attempt| {
            let ctx = ctx.clone();
            async move {
                let source = ctx
                    .store
                    .get(&keys::source(ctx.job_id))
                    .await
                    .map_err(|e| Error::storage(format!("fetch source: {e}")))?;

                let chunks = ctx
                    .codec
                    .split(&source, chunk_secs)
                    .await
                    .map_err(|e| Error::split(e.to_string()))?;

                let mut refs = Vec::with_capacity(chunks.len());
                for (index, chunk) in chunks.into_iter().enumerate() {
                    let index = index as u32;
                    let key = keys::chunk(ctx.job_id, index);
                    ctx.store
                        .put(&key, chunk.data)
                        .await
                        .map_err(|e| Error::storage(format!("store chunk {index}: {e}")))?;
                    refs.push(ChunkRef {
                        index,
                        key,
                        duration_secs: chunk.duration_secs,
                    });
                }

                let manifest = ChunkManifest {
                    job_id: ctx.job_id,
                    target_chunk_secs: chunk_secs,
                    chunks: refs,
                };
                manifest.validate().map_err(Error::Split)?;

                let encoded = serde_json::to_vec_pretty(&manifest)
                    .map_err(|e| Error::split(format!("encode manifest: {e}")))?;
                ctx.store
                    .put(&keys::chunk_manifest(ctx.job_id), encoded.into())
                    .await
                    .map_err(|e| Error::storage(format!("store manifest: {e}")))?;

                Ok(manifest)
            }
        })
        .await
        .map_err(|e| engine_error_to_task(e, Error::Split))?;

    tracing::info!(
        "job {}: split into {} chunks ({}s target)",
        ctx.job_id,
        manifest.len(),
        chunk_secs
    );
    Ok(manifest)
}
