//! The DAG coordinator.
//!
//! Drives one job end to end: acquire → probe → resolve → fork branches →
//! split → transcode fan-out → variant assembly → master playlist →
//! enhancement join → cleanup. The coordinator performs no media work
//! itself; every heavy operation is dispatched to the engine and awaited.
//!
//! Failure domains are asymmetric on purpose. Critical-path errors unwind
//! the job to Failed carrying the originating stage and payload. Enhancement
//! branches are detached tasks whose outcome is always captured (success,
//! failure, or abandonment after a bounded grace period) and can neither
//! fail the job nor delay it by more than the mandatory track already took.

use crate::config::PipelineConfig;
use crate::options::{self, BranchPlan, ProcessingOptions};
use crate::state::{JobRegistry, JobStatus};
use crate::workflow::aggregate::SegmentAggregator;
use crate::workflow::context::{engine_error_to_task, JobContext, TaskSpecs};
use crate::workflow::{assemble, chunking, cleanup, enhance, fanout};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use vodforge_codec::MediaCodec;
use vodforge_common::{
    keys, CompletionRecord, EnhancementKind, EnhancementOutcome, EnhancementResult, Error, JobId,
    Result, SourceMetadata, StageReport, StageStatus,
};
use vodforge_engine::LocalEngine;
use vodforge_store::BlobStore;

/// Floor for the enhancement grace period, so a very fast mandatory track
/// does not abandon branches that would finish momentarily.
const MIN_GRACE_PERIOD: Duration = Duration::from_secs(1);

/// Coordinates transcoding jobs against a store, codec, and engine.
pub struct Coordinator {
    store: Arc<dyn BlobStore>,
    codec: Arc<dyn MediaCodec>,
    engine: LocalEngine,
    registry: JobRegistry,
    config: PipelineConfig,
}

impl Coordinator {
    pub fn new(
        store: Arc<dyn BlobStore>,
        codec: Arc<dyn MediaCodec>,
        engine: LocalEngine,
        registry: JobRegistry,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            codec,
            engine,
            registry,
            config,
        }
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    /// Stop dispatching new work. In-flight tasks may still complete; their
    /// late results are discarded once the job is terminal.
    pub fn cancel(&self) {
        self.engine.cancel();
    }

    /// Run one job to a terminal state and deliver its completion record.
    pub async fn run_job(
        &self,
        job_id: JobId,
        source: Bytes,
        options: &ProcessingOptions,
    ) -> Result<CompletionRecord> {
        let ctx = JobContext {
            job_id,
            store: self.store.clone(),
            codec: self.codec.clone(),
            engine: self.engine.clone(),
            registry: self.registry.clone(),
            specs: Arc::new(TaskSpecs::from_config(&self.config)),
            chunk_secs: self.config.chunk_secs,
        };
        self.registry.create(job_id);

        match self.drive(&ctx, source, options).await {
            Ok(record) => {
                self.registry.complete(job_id);
                tracing::info!("job {job_id} completed: {} resolutions", record.resolutions.len());
                Ok(record)
            }
            Err(e) => {
                tracing::error!("job {job_id} failed at {}: {e}", e.stage());
                self.registry.fail(job_id, e.stage(), &e.to_string());
                Err(e)
            }
        }
    }

    async fn drive(
        &self,
        ctx: &JobContext,
        source: Bytes,
        options: &ProcessingOptions,
    ) -> Result<CompletionRecord> {
        let mut timer = StageTimer::new();

        // Source acquisition: make the source durable under the job prefix.
        timer
            .run(ctx, "acquire", async {
                ctx.engine
                    .dispatch(&ctx.specs.acquire, |_attempt| {
                        let ctx = ctx.clone();
                        let source = source.clone();
                        async move {
                            ctx.store
                                .put(&keys::source(ctx.job_id), source)
                                .await
                                .map_err(|e| Error::acquisition(e.to_string()))
                        }
                    })
                    .await
                    .map_err(|e| engine_error_to_task(e, Error::Acquisition))
            })
            .await?;
        ctx.registry.transition(ctx.job_id, JobStatus::SourceReady);

        // Metadata probe.
        let metadata: SourceMetadata = timer
            .run(ctx, "probe", async {
                ctx.engine
                    .dispatch(&ctx.specs.probe, |_attempt| {
                        let ctx = ctx.clone();
                        async move {
                            let source = ctx
                                .store
                                .get(&keys::source(ctx.job_id))
                                .await
                                .map_err(|e| Error::metadata(format!("fetch source: {e}")))?;
                            ctx.codec
                                .probe(&source)
                                .await
                                .map_err(|e| Error::metadata(e.to_string()))
                        }
                    })
                    .await
                    .map_err(|e| engine_error_to_task(e, Error::Metadata))
            })
            .await?;
        ctx.registry.transition(ctx.job_id, JobStatus::MetadataReady);
        tracing::info!(
            "job {}: source {}x{}, {:.1}s, {}",
            ctx.job_id,
            metadata.width,
            metadata.height,
            metadata.duration_secs,
            metadata.codec
        );

        // Resolve raw options into the execution plan, exactly once.
        let plan = options::resolve(options, &metadata)?;
        tracing::info!(
            "job {}: ladder {:?}, thumbnail={}, chapters={}, watermark={}",
            ctx.job_id,
            plan.ladder.iter().map(|r| r.name()).collect::<Vec<_>>(),
            plan.thumbnail.is_enabled(),
            plan.chapters.is_enabled(),
            plan.watermark.is_some()
        );

        // Fork the enhancement branches; the mandatory track does not wait
        // for them until finalization.
        ctx.registry.transition(ctx.job_id, JobStatus::Branching);
        let mandatory_started = Instant::now();

        let thumbnail_branch = match &plan.thumbnail {
            BranchPlan::Enabled(spec) => Some(BranchHandle::spawn(
                EnhancementKind::Thumbnail,
                tokio::spawn(enhance::run_thumbnail_branch(
                    ctx.clone(),
                    *spec,
                    metadata.duration_secs,
                )),
            )),
            BranchPlan::Disabled => None,
        };
        let chapters_branch = match &plan.chapters {
            BranchPlan::Enabled(spec) => Some(BranchHandle::spawn(
                EnhancementKind::Chapters,
                tokio::spawn(enhance::run_chapters_branch(
                    ctx.clone(),
                    *spec,
                    metadata.duration_secs,
                )),
            )),
            BranchPlan::Disabled => None,
        };

        // Mandatory track: split, fan out, assemble variants.
        let mandatory_result = async {
            let manifest = timer.run(ctx, "split", chunking::plan_chunks(ctx)).await?;
            ctx.registry.transition(ctx.job_id, JobStatus::AwaitingFanIn);

            let aggregator = SegmentAggregator::new(manifest.len());
            timer
                .run(
                    ctx,
                    "transcode",
                    fanout::run_transcodes(
                        ctx,
                        &manifest,
                        &plan.ladder,
                        plan.watermark.as_ref(),
                        &aggregator,
                    ),
                )
                .await?;

            let variants = timer
                .run(ctx, "assemble", async {
                    let mut variants = Vec::with_capacity(plan.ladder.len());
                    for &resolution in &plan.ladder {
                        variants.push(
                            assemble::assemble_variant(
                                ctx,
                                &aggregator,
                                resolution,
                                manifest.target_chunk_secs,
                            )
                            .await?,
                        );
                    }
                    if !aggregator.all_variants_complete(&plan.ladder) {
                        return Err(Error::assembly("ladder incomplete after assembly"));
                    }
                    Ok(variants)
                })
                .await?;

            Ok::<_, Error>((manifest, variants))
        }
        .await;

        let (_manifest, variants) = match mandatory_result {
            Ok(output) => output,
            Err(e) => {
                // The job is failing; enhancement output for it is useless.
                if let Some(branch) = &thumbnail_branch {
                    branch.handle.abort();
                }
                if let Some(branch) = &chapters_branch {
                    branch.handle.abort();
                }
                return Err(e);
            }
        };

        // Every variant playlist is durable; publish the master.
        ctx.registry.transition(ctx.job_id, JobStatus::Finalizing);
        let master = timer
            .run(ctx, "master", assemble::assemble_master(ctx, &variants))
            .await?;

        // Join enhancement branches, waiting at most as long as the
        // mandatory track took. Still-pending branches are recorded as
        // abandoned, never silently dropped.
        let grace = mandatory_started.elapsed().max(MIN_GRACE_PERIOD);
        let thumbnail = join_branch(ctx, thumbnail_branch, grace, &mut timer).await;
        let chapters = join_branch(ctx, chapters_branch, grace, &mut timer).await;

        // Outputs are durable; drop the transient chunks. Best-effort only.
        let cleanup_started_at = Utc::now();
        let cleanup_clock = Instant::now();
        let cleanup_status = match cleanup::cleanup_chunks(ctx).await {
            Ok(_) => StageStatus::Completed,
            Err(e) => {
                tracing::warn!("job {}: cleanup failed, job remains completed: {e}", ctx.job_id);
                StageStatus::Failed
            }
        };
        timer.record(
            "cleanup",
            cleanup_status,
            cleanup_started_at,
            cleanup_clock.elapsed().as_millis() as u64,
        );

        let enhancements: Vec<EnhancementResult> = [thumbnail.clone(), chapters.clone()]
            .into_iter()
            .flatten()
            .collect();

        Ok(CompletionRecord {
            job_id: ctx.job_id,
            resolutions: plan.ladder.clone(),
            master_playlist: master.key.clone(),
            thumbnail: thumbnail
                .as_ref()
                .and_then(|result| result.artifact().map(str::to_string)),
            chapters: chapters.as_ref().and_then(|result| match &result.outcome {
                EnhancementOutcome::Completed { keys } => Some(keys.clone()),
                _ => None,
            }),
            enhancements,
            stages: timer.into_reports(),
        })
    }
}

/// A forked enhancement branch and when it started.
struct BranchHandle {
    kind: EnhancementKind,
    started_at: DateTime<Utc>,
    started: Instant,
    handle: JoinHandle<EnhancementResult>,
}

impl BranchHandle {
    fn spawn(kind: EnhancementKind, handle: JoinHandle<EnhancementResult>) -> Self {
        Self {
            kind,
            started_at: Utc::now(),
            started: Instant::now(),
            handle,
        }
    }
}

/// Join one enhancement branch within the grace period.
async fn join_branch(
    ctx: &JobContext,
    branch: Option<BranchHandle>,
    grace: Duration,
    timer: &mut StageTimer,
) -> Option<EnhancementResult> {
    let BranchHandle {
        kind,
        started_at,
        started,
        mut handle,
    } = branch?;

    let result = match tokio::time::timeout(grace, &mut handle).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_error)) => {
            tracing::warn!("job {}: {kind} branch task failed: {join_error}", ctx.job_id);
            EnhancementResult::failed(kind, format!("branch task failed: {join_error}"))
        }
        Err(_elapsed) => {
            handle.abort();
            tracing::warn!(
                "job {}: {kind} branch still pending after {:?} grace, abandoned",
                ctx.job_id,
                grace
            );
            EnhancementResult::abandoned(kind)
        }
    };

    let status = match &result.outcome {
        EnhancementOutcome::Completed { .. } => StageStatus::Completed,
        EnhancementOutcome::Failed { .. } => StageStatus::Failed,
        EnhancementOutcome::Abandoned => StageStatus::Abandoned,
    };
    timer.record(
        &kind.to_string(),
        status,
        started_at,
        started.elapsed().as_millis() as u64,
    );
    Some(result)
}

/// Collects per-stage timing and status for the completion record.
struct StageTimer {
    reports: Vec<StageReport>,
}

impl StageTimer {
    fn new() -> Self {
        Self {
            reports: Vec::new(),
        }
    }

    /// Time a critical-path stage.
    async fn run<T, F>(&mut self, ctx: &JobContext, stage: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let started_at = Utc::now();
        let clock = Instant::now();
        let result = fut.await;
        let elapsed_ms = clock.elapsed().as_millis() as u64;

        let status = if result.is_ok() {
            ctx.registry.stage_completed(ctx.job_id, stage, elapsed_ms);
            StageStatus::Completed
        } else {
            StageStatus::Failed
        };
        self.record(stage, status, started_at, elapsed_ms);
        result
    }

    fn record(
        &mut self,
        stage: &str,
        status: StageStatus,
        started_at: DateTime<Utc>,
        elapsed_ms: u64,
    ) {
        self.reports.push(StageReport {
            stage: stage.to_string(),
            status,
            started_at,
            elapsed_ms,
        });
    }

    fn into_reports(self) -> Vec<StageReport> {
        self.reports
    }
}
