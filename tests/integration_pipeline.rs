//! End-to-end pipeline tests against the synthetic codec and memory store.
//!
//! These drive the real coordinator, engine, and aggregation code; only the
//! media codec and blob store are test doubles.

use bytes::Bytes;
use std::sync::Arc;
use vodforge::config::PipelineConfig;
use vodforge::options::{ChapterOptions, ProcessingOptions, ThumbnailOptions, WatermarkOptions};
use vodforge::state::{JobRegistry, JobStatus};
use vodforge::workflow::Coordinator;
use vodforge_codec::{MediaCodec, SyntheticCodec};
use vodforge_common::{keys, EnhancementKind, EnhancementOutcome, Error, JobId, Resolution};
use vodforge_engine::LocalEngine;
use vodforge_store::{BlobStore, MemoryStore};

/// Pipeline config with instant retries so failure scenarios run fast.
fn test_config() -> PipelineConfig {
    PipelineConfig {
        initial_retry_secs: 0,
        max_retry_secs: 0,
        ..PipelineConfig::default()
    }
}

fn coordinator_with(codec: Arc<dyn MediaCodec>) -> (Coordinator, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let coordinator = Coordinator::new(
        store.clone(),
        codec,
        LocalEngine::new(8),
        JobRegistry::new(),
        test_config(),
    );
    (coordinator, store)
}

fn source_bytes() -> Bytes {
    Bytes::from_static(b"synthetic source video")
}

/// Scenario A: 1920x1080, 12s, 4s chunks, no options.
#[tokio::test]
async fn test_scenario_a_plain_1080p_source() {
    let codec = Arc::new(SyntheticCodec::new(1920, 1080, 12.0));
    let (coordinator, store) = coordinator_with(codec);
    let job_id = JobId::new();

    let record = coordinator
        .run_job(job_id, source_bytes(), &ProcessingOptions::default())
        .await
        .unwrap();

    // Ladder is computed from the preset table, highest first.
    assert_eq!(
        record.resolutions,
        vec![Resolution::P720, Resolution::P480, Resolution::P320]
    );
    assert_eq!(record.thumbnail, None);
    assert_eq!(record.chapters, None);
    assert!(record.enhancements.is_empty());

    // 9 segments: 3 chunks x 3 resolutions, all at deterministic keys.
    for resolution in [Resolution::P720, Resolution::P480, Resolution::P320] {
        for index in 0..3 {
            let key = keys::segment(job_id, resolution, index);
            assert!(store.exists(&key).await.unwrap(), "missing {key}");
        }
        assert!(store
            .exists(&keys::variant_playlist(job_id, resolution))
            .await
            .unwrap());
    }

    // One master playlist listing every variant, highest bandwidth first.
    let master = store.get(&keys::master_playlist(job_id)).await.unwrap();
    let master = String::from_utf8(master.to_vec()).unwrap();
    let p720 = master.find("720p/playlist").unwrap();
    let p480 = master.find("480p/playlist").unwrap();
    let p320 = master.find("320p/playlist").unwrap();
    assert!(p720 < p480 && p480 < p320);

    assert_eq!(
        coordinator.registry().get(job_id).unwrap().status,
        JobStatus::Completed
    );
}

#[tokio::test]
async fn test_variant_playlist_covers_source_duration() {
    let codec = Arc::new(SyntheticCodec::new(1920, 1080, 12.0));
    let (coordinator, store) = coordinator_with(codec);
    let job_id = JobId::new();

    coordinator
        .run_job(job_id, source_bytes(), &ProcessingOptions::default())
        .await
        .unwrap();

    let playlist = store
        .get(&keys::variant_playlist(job_id, Resolution::P720))
        .await
        .unwrap();
    let playlist = String::from_utf8(playlist.to_vec()).unwrap();

    // Segment entries are ascending and contiguous.
    let uris: Vec<&str> = playlist
        .lines()
        .filter(|line| line.starts_with("segments/"))
        .collect();
    assert_eq!(
        uris,
        vec!["segments/seg_0000", "segments/seg_0001", "segments/seg_0002"]
    );

    // Durations sum back to the source duration.
    let total: f64 = playlist
        .lines()
        .filter_map(|line| line.strip_prefix("#EXTINF:"))
        .filter_map(|rest| rest.trim_end_matches(',').parse::<f64>().ok())
        .sum();
    assert!((total - 12.0).abs() < 4.0, "total duration {total}");
    assert!(playlist.ends_with("#EXT-X-ENDLIST"));
}

#[tokio::test]
async fn test_chunk_artifacts_removed_after_completion() {
    let codec = Arc::new(SyntheticCodec::new(1920, 1080, 12.0));
    let (coordinator, store) = coordinator_with(codec);
    let job_id = JobId::new();

    coordinator
        .run_job(job_id, source_bytes(), &ProcessingOptions::default())
        .await
        .unwrap();

    // Transient chunks (and the manifest) are gone, outputs remain.
    assert!(store
        .list(&keys::chunks_prefix(job_id))
        .await
        .unwrap()
        .is_empty());
    assert!(store.exists(&keys::master_playlist(job_id)).await.unwrap());
}

/// Scenario B: out-of-range thumbnail timestamp degrades to null, nothing
/// else changes.
#[tokio::test]
async fn test_scenario_b_thumbnail_failure_is_isolated() {
    let job_a = JobId::new();
    let job_b = JobId::new();

    let codec = Arc::new(SyntheticCodec::new(1920, 1080, 12.0));
    let (coordinator, store_a) = coordinator_with(codec);
    let record_a = coordinator
        .run_job(job_a, source_bytes(), &ProcessingOptions::default())
        .await
        .unwrap();

    let options = ProcessingOptions {
        thumbnail: Some(ThumbnailOptions {
            mode: Some("timestamp".to_string()),
            custom_time_secs: Some(99999.0),
        }),
        ..Default::default()
    };
    let codec = Arc::new(SyntheticCodec::new(1920, 1080, 12.0));
    let (coordinator, store_b) = coordinator_with(codec);
    let record_b = coordinator
        .run_job(job_b, source_bytes(), &options)
        .await
        .unwrap();

    // Job completed; thumbnail degraded to null with a captured failure.
    assert_eq!(record_b.thumbnail, None);
    assert!(!store_b.exists(&keys::thumbnail(job_b)).await.unwrap());
    assert_eq!(record_b.enhancements.len(), 1);
    let thumbnail = &record_b.enhancements[0];
    assert_eq!(thumbnail.kind, EnhancementKind::Thumbnail);
    assert!(matches!(
        thumbnail.outcome,
        EnhancementOutcome::Failed { .. }
    ));

    // The primary output is byte-identical to the no-options run.
    assert_eq!(record_a.resolutions, record_b.resolutions);
    let master_a = store_a.get(&keys::master_playlist(job_a)).await.unwrap();
    let master_b = store_b.get(&keys::master_playlist(job_b)).await.unwrap();
    assert_eq!(master_a, master_b);
    assert_eq!(
        coordinator.registry().get(job_b).unwrap().status,
        JobStatus::Completed
    );
}

/// Scenario C: one (chunk, resolution) pair exhausting retries fails the
/// whole job and publishes nothing.
#[tokio::test]
async fn test_scenario_c_transcode_exhaustion_fails_job() {
    let codec = Arc::new(SyntheticCodec::new(1920, 1080, 12.0));
    codec.fail_transcode(1, Resolution::P480);
    let (coordinator, store) = coordinator_with(codec);
    let job_id = JobId::new();

    let err = coordinator
        .run_job(job_id, source_bytes(), &ProcessingOptions::default())
        .await
        .unwrap_err();

    // The failure payload identifies the failing pair.
    assert!(matches!(
        err,
        Error::Transcode {
            chunk_index: 1,
            resolution: Resolution::P480,
            ..
        }
    ));
    assert!(err.to_string().contains("chunk 1 / 480p"));

    // No master playlist is published for a failed job.
    assert!(!store.exists(&keys::master_playlist(job_id)).await.unwrap());
    for resolution in [Resolution::P720, Resolution::P480, Resolution::P320] {
        assert!(!store
            .exists(&keys::variant_playlist(job_id, resolution))
            .await
            .unwrap());
    }

    let job = coordinator.registry().get(job_id).unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error.unwrap().contains("chunk 1 / 480p"));
}

#[tokio::test]
async fn test_transient_transcode_failures_recover() {
    let codec = Arc::new(SyntheticCodec::new(1920, 1080, 12.0));
    // Fails twice, succeeds on the third and final attempt.
    codec.fail_transcode_times(0, Resolution::P320, 2);
    let (coordinator, _store) = coordinator_with(codec);

    let record = coordinator
        .run_job(JobId::new(), source_bytes(), &ProcessingOptions::default())
        .await
        .unwrap();
    assert_eq!(record.resolutions.len(), 3);
}

#[tokio::test]
async fn test_transient_probe_failures_recover() {
    let codec = Arc::new(SyntheticCodec::new(1920, 1080, 12.0).with_probe_failures(2));
    let (coordinator, _store) = coordinator_with(codec);

    let record = coordinator
        .run_job(JobId::new(), source_bytes(), &ProcessingOptions::default())
        .await
        .unwrap();
    assert_eq!(record.resolutions.len(), 3);
}

#[tokio::test]
async fn test_split_failure_is_fatal() {
    let codec = Arc::new(SyntheticCodec::new(1920, 1080, 12.0).with_failing_split());
    let (coordinator, store) = coordinator_with(codec);
    let job_id = JobId::new();

    let err = coordinator
        .run_job(job_id, source_bytes(), &ProcessingOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Split(_)));
    assert!(!store.exists(&keys::master_playlist(job_id)).await.unwrap());
    assert_eq!(
        coordinator.registry().get(job_id).unwrap().status,
        JobStatus::Failed
    );
}

#[tokio::test]
async fn test_invalid_options_fail_before_any_output() {
    let codec = Arc::new(SyntheticCodec::new(1920, 1080, 12.0));
    let (coordinator, store) = coordinator_with(codec);
    let job_id = JobId::new();

    let options = ProcessingOptions {
        resolutions: Some(vec!["999p".to_string()]),
        ..Default::default()
    };
    let err = coordinator
        .run_job(job_id, source_bytes(), &options)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Config(_)));
    // Nothing under outputs/ was written.
    assert!(store
        .list(&format!("{job_id}/outputs/"))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_explicit_resolution_list_is_honored() {
    // 480p source with an explicit 1080p request: user override wins.
    let codec = Arc::new(SyntheticCodec::new(854, 480, 8.0));
    let (coordinator, store) = coordinator_with(codec);
    let job_id = JobId::new();

    let options = ProcessingOptions {
        resolutions: Some(vec!["1080p".to_string()]),
        ..Default::default()
    };
    let record = coordinator
        .run_job(job_id, source_bytes(), &options)
        .await
        .unwrap();

    assert_eq!(record.resolutions, vec![Resolution::P1080]);
    assert!(store
        .exists(&keys::segment(job_id, Resolution::P1080, 0))
        .await
        .unwrap());
}

#[tokio::test]
async fn test_watermark_applies_to_every_chunk() {
    let codec = Arc::new(SyntheticCodec::new(1920, 1080, 12.0));
    let (coordinator, store) = coordinator_with(codec);
    let job_id = JobId::new();

    let options = ProcessingOptions {
        watermark: Some(WatermarkOptions {
            text: "demo".to_string(),
            position: None,
            font_size: None,
            opacity: None,
        }),
        ..Default::default()
    };
    coordinator
        .run_job(job_id, source_bytes(), &options)
        .await
        .unwrap();

    for index in 0..3 {
        let segment = store
            .get(&keys::segment(job_id, Resolution::P720, index))
            .await
            .unwrap();
        let segment = String::from_utf8(segment.to_vec()).unwrap();
        assert!(segment.contains("wm=demo@bottom-right"), "chunk {index}: {segment}");
    }
}

#[tokio::test]
async fn test_chapters_branch_produces_both_formats() {
    let codec = Arc::new(SyntheticCodec::new(1920, 1080, 60.0).with_scenes(vec![20.0, 40.0]));
    let (coordinator, store) = coordinator_with(codec);
    let job_id = JobId::new();

    let options = ProcessingOptions {
        chapters: Some(ChapterOptions {
            scene_threshold: None,
            min_scene_secs: Some(10.0),
        }),
        ..Default::default()
    };
    let record = coordinator
        .run_job(job_id, source_bytes(), &options)
        .await
        .unwrap();

    let chapter_keys = record.chapters.unwrap();
    assert_eq!(
        chapter_keys,
        vec![keys::chapters_json(job_id), keys::chapters_vtt(job_id)]
    );

    let json = store.get(&keys::chapters_json(job_id)).await.unwrap();
    let document: serde_json::Value = serde_json::from_slice(&json).unwrap();
    assert_eq!(document["chapter_count"], 3);

    let vtt = store.get(&keys::chapters_vtt(job_id)).await.unwrap();
    let vtt = String::from_utf8(vtt.to_vec()).unwrap();
    assert!(vtt.starts_with("WEBVTT"));
    assert!(vtt.contains("Chapter 1"));
}

#[tokio::test]
async fn test_scene_based_thumbnail_uses_first_boundary() {
    let codec = Arc::new(SyntheticCodec::new(1920, 1080, 60.0).with_scenes(vec![22.0, 40.0]));
    let (coordinator, store) = coordinator_with(codec);
    let job_id = JobId::new();

    let options = ProcessingOptions {
        thumbnail: Some(ThumbnailOptions {
            mode: Some("scene".to_string()),
            custom_time_secs: None,
        }),
        ..Default::default()
    };
    let record = coordinator
        .run_job(job_id, source_bytes(), &options)
        .await
        .unwrap();

    assert_eq!(record.thumbnail, Some(keys::thumbnail(job_id)));
    let frame = store.get(&keys::thumbnail(job_id)).await.unwrap();
    assert_eq!(frame, Bytes::from_static(b"frame@22"));
}

/// Re-running the identical job is a replay: every artifact lands at the
/// same key with the same bytes.
#[tokio::test]
async fn test_replay_produces_identical_artifacts() {
    let job_id = JobId::new();
    let options = ProcessingOptions::default();

    let codec = Arc::new(SyntheticCodec::new(1920, 1080, 12.0));
    let (coordinator, store) = coordinator_with(codec);
    coordinator
        .run_job(job_id, source_bytes(), &options)
        .await
        .unwrap();
    let segment_key = keys::segment(job_id, Resolution::P720, 2);
    let first_segment = store.get(&segment_key).await.unwrap();
    let first_master = store.get(&keys::master_playlist(job_id)).await.unwrap();

    // Fresh coordinator, same job id and inputs: the replay overwrites
    // every key with identical bytes.
    let codec = Arc::new(SyntheticCodec::new(1920, 1080, 12.0));
    let store2 = store.clone();
    let coordinator = Coordinator::new(
        store2,
        codec,
        LocalEngine::new(8),
        JobRegistry::new(),
        test_config(),
    );
    coordinator
        .run_job(job_id, source_bytes(), &options)
        .await
        .unwrap();

    assert_eq!(store.get(&segment_key).await.unwrap(), first_segment);
    assert_eq!(
        store.get(&keys::master_playlist(job_id)).await.unwrap(),
        first_master
    );
}

#[tokio::test]
async fn test_cancelled_engine_fails_job_without_output() {
    let codec = Arc::new(SyntheticCodec::new(1920, 1080, 12.0));
    let (coordinator, store) = coordinator_with(codec);
    let job_id = JobId::new();

    coordinator.cancel();
    let err = coordinator
        .run_job(job_id, source_bytes(), &ProcessingOptions::default())
        .await
        .unwrap_err();

    assert!(err.to_string().contains("cancelled"));
    assert_eq!(
        coordinator.registry().get(job_id).unwrap().status,
        JobStatus::Failed
    );
    assert!(store.list(&format!("{job_id}/")).await.unwrap().is_empty());
}
