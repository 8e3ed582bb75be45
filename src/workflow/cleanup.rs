//! Best-effort removal of transient chunk artifacts.
//!
//! Runs only after every variant playlist is durable. Failures are logged
//! and never flip a completed job back to failed; orphaned chunks cost disk,
//! not correctness.

use crate::workflow::context::JobContext;
use vodforge_common::{keys, Error, Result};

/// Delete all transient chunk artifacts for the job.
///
/// Returns the number of blobs deleted.
pub async fn cleanup_chunks(ctx: &JobContext) -> Result<usize> {
    let prefix = keys::chunks_prefix(ctx.job_id);
    let chunk_keys = ctx
        .store
        .list(&prefix)
        .await
        .map_err(|e| Error::cleanup(format!("list chunks: {e}")))?;

    let mut deleted = 0usize;
    let mut failed = 0usize;
    for key in &chunk_keys {
        match ctx.store.delete(key).await {
            Ok(()) => deleted += 1,
            Err(e) => {
                failed += 1;
                tracing::warn!("job {}: failed to delete {key}: {e}", ctx.job_id);
            }
        }
    }

    if failed > 0 {
        return Err(Error::cleanup(format!(
            "{failed} of {} chunk artifacts could not be deleted",
            chunk_keys.len()
        )));
    }

    tracing::info!("job {}: cleaned up {deleted} chunk artifacts", ctx.job_id);
    Ok(deleted)
}
