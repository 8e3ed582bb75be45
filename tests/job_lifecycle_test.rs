//! Job lifecycle tests: status progression, stage reports, and the bounded
//! grace period for enhancement branches.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use vodforge::config::PipelineConfig;
use vodforge::options::{ChapterOptions, ProcessingOptions};
use vodforge::state::{JobEvent, JobRegistry, JobStatus};
use vodforge::workflow::Coordinator;
use vodforge_codec::{MediaCodec, Result as CodecResult, SourceChunk, SyntheticCodec, TranscodedSegment};
use vodforge_common::{
    EnhancementKind, EnhancementOutcome, JobId, Resolution, SourceMetadata, StageStatus,
    WatermarkSpec,
};
use vodforge_engine::LocalEngine;
use vodforge_store::MemoryStore;

fn test_config() -> PipelineConfig {
    PipelineConfig {
        initial_retry_secs: 0,
        max_retry_secs: 0,
        ..PipelineConfig::default()
    }
}

fn build(codec: Arc<dyn MediaCodec>) -> Coordinator {
    Coordinator::new(
        Arc::new(MemoryStore::new()),
        codec,
        LocalEngine::new(8),
        JobRegistry::new(),
        test_config(),
    )
}

#[tokio::test]
async fn test_status_progression_for_successful_job() {
    let coordinator = build(Arc::new(SyntheticCodec::new(1920, 1080, 12.0)));
    let mut events = coordinator.registry().subscribe();
    let job_id = JobId::new();

    coordinator
        .run_job(job_id, Bytes::from_static(b"src"), &ProcessingOptions::default())
        .await
        .unwrap();

    let mut statuses = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let JobEvent::StatusChanged { status, .. } = event {
            statuses.push(status);
        }
    }
    assert_eq!(
        statuses,
        vec![
            JobStatus::SourceReady,
            JobStatus::MetadataReady,
            JobStatus::Branching,
            JobStatus::AwaitingFanIn,
            JobStatus::Finalizing,
            JobStatus::Completed,
        ]
    );
}

#[tokio::test]
async fn test_stage_reports_cover_the_critical_path() {
    let coordinator = build(Arc::new(SyntheticCodec::new(1920, 1080, 12.0)));
    let record = coordinator
        .run_job(JobId::new(), Bytes::from_static(b"src"), &ProcessingOptions::default())
        .await
        .unwrap();

    let stages: Vec<(&str, StageStatus)> = record
        .stages
        .iter()
        .map(|report| (report.stage.as_str(), report.status))
        .collect();
    assert_eq!(
        stages,
        vec![
            ("acquire", StageStatus::Completed),
            ("probe", StageStatus::Completed),
            ("split", StageStatus::Completed),
            ("transcode", StageStatus::Completed),
            ("assemble", StageStatus::Completed),
            ("master", StageStatus::Completed),
            ("cleanup", StageStatus::Completed),
        ]
    );
}

#[tokio::test]
async fn test_failed_job_reports_failing_stage() {
    let codec = Arc::new(SyntheticCodec::new(1920, 1080, 12.0));
    codec.fail_transcode(0, Resolution::P720);
    let coordinator = build(codec);
    let mut events = coordinator.registry().subscribe();
    let job_id = JobId::new();

    coordinator
        .run_job(job_id, Bytes::from_static(b"src"), &ProcessingOptions::default())
        .await
        .unwrap_err();

    let mut failed_stage = None;
    while let Ok(event) = events.try_recv() {
        if let JobEvent::JobFailed { stage, .. } = event {
            failed_stage = Some(stage);
        }
    }
    assert_eq!(failed_stage.as_deref(), Some("transcode"));
}

/// Wraps the synthetic codec with a scene detection that never finishes in
/// time, so the chapters branch outlives the mandatory track.
struct StalledSceneCodec {
    inner: SyntheticCodec,
}

#[async_trait]
impl MediaCodec for StalledSceneCodec {
    async fn probe(&self, source: &Bytes) -> CodecResult<SourceMetadata> {
        self.inner.probe(source).await
    }

    async fn split(&self, source: &Bytes, chunk_secs: f64) -> CodecResult<Vec<SourceChunk>> {
        self.inner.split(source, chunk_secs).await
    }

    async fn transcode(
        &self,
        chunk: &Bytes,
        resolution: Resolution,
        watermark: Option<&WatermarkSpec>,
    ) -> CodecResult<TranscodedSegment> {
        self.inner.transcode(chunk, resolution, watermark).await
    }

    async fn detect_scenes(
        &self,
        _source: &Bytes,
        _threshold: f32,
        _min_scene_secs: f64,
    ) -> CodecResult<Vec<f64>> {
        tokio::time::sleep(std::time::Duration::from_secs(600)).await;
        Ok(vec![])
    }

    async fn extract_frame(&self, source: &Bytes, at_secs: f64) -> CodecResult<Bytes> {
        self.inner.extract_frame(source, at_secs).await
    }
}

#[tokio::test]
async fn test_stalled_enhancement_is_abandoned_not_awaited() {
    let codec = Arc::new(StalledSceneCodec {
        inner: SyntheticCodec::new(1920, 1080, 12.0),
    });
    let coordinator = build(codec);
    let options = ProcessingOptions {
        chapters: Some(ChapterOptions::default()),
        ..Default::default()
    };

    let started = std::time::Instant::now();
    let record = coordinator
        .run_job(JobId::new(), Bytes::from_static(b"src"), &options)
        .await
        .unwrap();

    // The job completed without waiting for the stalled branch: the grace
    // period is bounded by the mandatory track's duration (floored at 1s).
    assert!(started.elapsed() < std::time::Duration::from_secs(30));

    assert_eq!(record.chapters, None);
    assert_eq!(record.enhancements.len(), 1);
    let chapters = &record.enhancements[0];
    assert_eq!(chapters.kind, EnhancementKind::Chapters);
    assert_eq!(chapters.outcome, EnhancementOutcome::Abandoned);

    // The abandonment is visible in the stage reports, not silently dropped.
    let report = record
        .stages
        .iter()
        .find(|report| report.stage == "chapters")
        .unwrap();
    assert_eq!(report.status, StageStatus::Abandoned);
}

#[tokio::test]
async fn test_completion_record_identifies_job() {
    let coordinator = build(Arc::new(SyntheticCodec::new(1280, 720, 8.0)));
    let job_id = JobId::new();
    let record = coordinator
        .run_job(job_id, Bytes::from_static(b"src"), &ProcessingOptions::default())
        .await
        .unwrap();

    assert_eq!(record.job_id, job_id);
    // 720p source: only sub-720 presets are produced.
    assert_eq!(record.resolutions, vec![Resolution::P480, Resolution::P320]);
    assert!(record.master_playlist.contains(&job_id.to_string()));
}
