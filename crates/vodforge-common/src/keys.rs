//! Persisted blob key layout for a job.
//!
//! Every artifact a job produces lives under its job-id prefix:
//!
//! ```text
//! {job_id}/source
//! {job_id}/chunks/manifest
//! {job_id}/chunks/source/chunk_{index}
//! {job_id}/outputs/{resolution}/segments/seg_{index}
//! {job_id}/outputs/{resolution}/playlist
//! {job_id}/outputs/master_playlist
//! {job_id}/thumbnail
//! {job_id}/chapters.json
//! {job_id}/chapters.vtt
//! ```
//!
//! Segment and chunk keys are pure functions of (job, resolution, index), so
//! re-executing a task writes to the same key and duplicate delivery is a
//! safe overwrite.

use crate::ids::JobId;
use crate::types::Resolution;

/// Key of the acquired source video.
pub fn source(job: JobId) -> String {
    format!("{job}/source")
}

/// Key of the persisted chunk manifest (json).
pub fn chunk_manifest(job: JobId) -> String {
    format!("{job}/chunks/manifest")
}

/// Key of one source chunk.
pub fn chunk(job: JobId, index: u32) -> String {
    format!("{job}/chunks/source/chunk_{index:04}")
}

/// Prefix under which all transient chunk artifacts live; cleanup deletes
/// this prefix once outputs are durable.
pub fn chunks_prefix(job: JobId) -> String {
    format!("{job}/chunks/")
}

/// Key of one transcoded segment.
pub fn segment(job: JobId, resolution: Resolution, index: u32) -> String {
    format!("{job}/outputs/{resolution}/segments/seg_{index:04}")
}

/// Key of a resolution's variant playlist.
pub fn variant_playlist(job: JobId, resolution: Resolution) -> String {
    format!("{job}/outputs/{resolution}/playlist")
}

/// Key of the master playlist.
pub fn master_playlist(job: JobId) -> String {
    format!("{job}/outputs/master_playlist")
}

/// Key of the thumbnail image.
pub fn thumbnail(job: JobId) -> String {
    format!("{job}/thumbnail")
}

/// Key of the chapters json artifact.
pub fn chapters_json(job: JobId) -> String {
    format!("{job}/chapters.json")
}

/// Key of the chapters WebVTT artifact.
pub fn chapters_vtt(job: JobId) -> String {
    format!("{job}/chapters.vtt")
}
