//! Playlist assembly.
//!
//! A deterministic, idempotent merge over already-produced segment results:
//! no media is touched, and regenerating from the same inputs always renders
//! byte-identical playlists. A resolution is either fully present (every
//! chunk index, ascending, no gaps) or entirely absent from the master; a
//! failed job never publishes a partial master playlist.

use crate::workflow::aggregate::SegmentAggregator;
use crate::workflow::context::JobContext;
use bytes::Bytes;
use vodforge_common::{
    keys, Error, MasterPlaylist, Resolution, Result, SegmentResult, VariantPlaylist, VariantRef,
};

/// Render one variant playlist.
///
/// Every transcoded chunk has independent timestamps, so each segment after
/// the first carries a discontinuity tag.
pub fn render_variant_playlist(segments: &[SegmentResult], target_chunk_secs: f64) -> String {
    let mut lines = vec![
        "#EXTM3U".to_string(),
        "#EXT-X-VERSION:3".to_string(),
        format!("#EXT-X-TARGETDURATION:{}", target_chunk_secs as u64 + 1),
        "#EXT-X-MEDIA-SEQUENCE:0".to_string(),
        "#EXT-X-PLAYLIST-TYPE:VOD".to_string(),
        "#EXT-X-ALLOW-CACHE:YES".to_string(),
    ];

    for segment in segments {
        if segment.chunk_index > 0 {
            lines.push("#EXT-X-DISCONTINUITY".to_string());
        }
        lines.push(format!("#EXTINF:{:.3},", segment.duration_secs));
        lines.push(format!("segments/seg_{:04}", segment.chunk_index));
    }

    lines.push("#EXT-X-ENDLIST".to_string());
    lines.join("\n")
}

/// Render the master playlist from variant references (already sorted
/// highest-bandwidth first).
pub fn render_master_playlist(variants: &[VariantRef]) -> String {
    let mut lines = vec!["#EXTM3U".to_string(), "#EXT-X-VERSION:3".to_string()];

    for variant in variants {
        lines.push(format!(
            "#EXT-X-STREAM-INF:BANDWIDTH={},RESOLUTION={}x{},NAME=\"{}\"",
            variant.bandwidth,
            variant.resolution.width(),
            variant.resolution.height(),
            variant.resolution
        ));
        lines.push(format!("{}/playlist", variant.resolution));
    }

    lines.join("\n")
}

/// Assemble and persist one resolution's variant playlist.
///
/// The aggregator must hold every chunk index for the resolution; a gap here
/// means an upstream invariant broke, reported as a fatal assembly error.
pub async fn assemble_variant(
    ctx: &JobContext,
    aggregator: &SegmentAggregator,
    resolution: Resolution,
    target_chunk_secs: f64,
) -> Result<VariantPlaylist> {
    let segments = aggregator
        .ordered_segments(resolution)
        .map_err(Error::Assembly)?;

    let playlist = VariantPlaylist {
        resolution,
        bandwidth: resolution.bandwidth(),
        key: keys::variant_playlist(ctx.job_id, resolution),
        segments,
    };
    playlist
        .validate(aggregator.chunk_count())
        .map_err(Error::Assembly)?;

    let rendered = render_variant_playlist(&playlist.segments, target_chunk_secs);
    ctx.store
        .put(&playlist.key, Bytes::from(rendered))
        .await
        .map_err(|e| Error::storage(format!("store variant playlist: {e}")))?;

    aggregator.mark_variant_complete(resolution);
    tracing::info!(
        "job {}: variant playlist complete for {resolution} ({} segments)",
        ctx.job_id,
        playlist.segments.len()
    );
    Ok(playlist)
}

/// Assemble and persist the master playlist once every variant is complete.
pub async fn assemble_master(
    ctx: &JobContext,
    variants: &[VariantPlaylist],
) -> Result<MasterPlaylist> {
    if variants.is_empty() {
        return Err(Error::assembly("no variants to publish"));
    }

    let mut refs: Vec<VariantRef> = variants
        .iter()
        .map(|variant| VariantRef {
            resolution: variant.resolution,
            bandwidth: variant.bandwidth,
            playlist_key: variant.key.clone(),
            segment_count: variant.segments.len(),
        })
        .collect();
    // Highest bandwidth first so players start at the best quality.
    refs.sort_by(|a, b| b.bandwidth.cmp(&a.bandwidth));

    let rendered = render_master_playlist(&refs);
    let key = keys::master_playlist(ctx.job_id);
    ctx.store
        .put(&key, Bytes::from(rendered))
        .await
        .map_err(|e| Error::storage(format!("store master playlist: {e}")))?;

    tracing::info!("job {}: master playlist published ({} variants)", ctx.job_id, refs.len());
    Ok(MasterPlaylist { key, variants: refs })
}
