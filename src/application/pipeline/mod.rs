//! The render pipeline: the strictly ordered stages one worker executes for
//! one job.
//!
//! Stage order is acquire audio → bootstrap front-end → invoke render →
//! persist artifact; a failure aborts everything after it. The terminal
//! notification runs on every path, and the front-end child is terminated on
//! every path, wrapped around the stages rather than inside them.

pub mod audio;
pub mod frontend;
pub mod invoke;

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tempfile::TempDir;
use thiserror::Error;
use tracing::{error, info};

use crate::application::callback::{CallbackNotifier, JobUpdate};
use crate::application::dispatcher::RenderRunner;
use crate::config::{FrontendSettings, RenderSettings};
use crate::domain::job::{JobSpec, PipelineStage, RenderOutcome};
use crate::infra::storage::{ArtifactStore, ArtifactStoreError};
use crate::util::text::tail;

use self::audio::{AudioError, AudioFetcher};
use self::frontend::{FrontendError, FrontendProcess};
use self::invoke::{InvokeError, run_render};

const PROGRESS_STARTED: u8 = 5;
const PROGRESS_FRONTEND_READY: u8 = 10;
const FAILURE_MESSAGE_TAIL_CHARS: usize = 500;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to create scratch directory: {0}")]
    Scratch(#[from] std::io::Error),
    #[error(transparent)]
    Acquisition(#[from] AudioError),
    #[error(transparent)]
    Bootstrap(#[from] FrontendError),
    #[error(transparent)]
    Invocation(#[from] InvokeError),
    #[error("failed to persist artifact: {0}")]
    Persistence(#[from] ArtifactStoreError),
}

impl PipelineError {
    /// Bounded diagnostic carried into the failed callback and the registry.
    pub fn failure_message(&self) -> String {
        tail(&self.to_string(), FAILURE_MESSAGE_TAIL_CHARS)
    }

    /// The stage that produced this error. Scratch setup counts as audio
    /// acquisition; nothing runs before it.
    pub fn stage(&self) -> PipelineStage {
        match self {
            PipelineError::Scratch(_) | PipelineError::Acquisition(_) => {
                PipelineStage::AcquireAudio
            }
            PipelineError::Bootstrap(_) => PipelineStage::BootstrapFrontend,
            PipelineError::Invocation(_) => PipelineStage::Invoke,
            PipelineError::Persistence(_) => PipelineStage::PersistArtifact,
        }
    }
}

/// Executes render jobs end to end. One instance serves every worker; all
/// per-job state lives on the worker's stack and in its scratch directory.
pub struct RenderPipeline {
    audio: AudioFetcher,
    frontend: FrontendSettings,
    render: RenderSettings,
    artifacts: Arc<ArtifactStore>,
    notifier: Arc<CallbackNotifier>,
}

impl RenderPipeline {
    pub fn new(
        audio: AudioFetcher,
        frontend: FrontendSettings,
        render: RenderSettings,
        artifacts: Arc<ArtifactStore>,
        notifier: Arc<CallbackNotifier>,
    ) -> Self {
        Self {
            audio,
            frontend,
            render,
            artifacts,
            notifier,
        }
    }

    async fn execute(&self, spec: &JobSpec, port: u16) -> Result<RenderOutcome, PipelineError> {
        self.notifier
            .notify(
                spec.callback_url.as_deref(),
                &spec.job_id,
                JobUpdate::Rendering {
                    progress: PROGRESS_STARTED,
                },
            )
            .await;

        // Scratch for audio, config, and the raw artifact; removed when the
        // worker finishes regardless of outcome.
        let scratch = TempDir::new()?;

        let audio_path = self
            .audio
            .acquire(&spec.job_id, &spec.audio, scratch.path())
            .await?;

        let front_end = FrontendProcess::start(&self.frontend, port).await?;

        self.notifier
            .notify(
                spec.callback_url.as_deref(),
                &spec.job_id,
                JobUpdate::Rendering {
                    progress: PROGRESS_FRONTEND_READY,
                },
            )
            .await;

        let result = self
            .render_and_persist(spec, &audio_path, scratch.path(), port)
            .await;

        // The front-end dies on success and on every render/persist failure.
        front_end.terminate().await;

        result
    }

    async fn render_and_persist(
        &self,
        spec: &JobSpec,
        audio_path: &std::path::Path,
        scratch: &std::path::Path,
        port: u16,
    ) -> Result<RenderOutcome, PipelineError> {
        let rendered = run_render(&self.render, spec, audio_path, scratch, port).await?;
        let stored = self
            .artifacts
            .persist(&spec.job_id, &rendered.output_path)
            .await?;

        Ok(RenderOutcome {
            artifact_key: stored.key,
            public_url: stored.public_url,
            file_size_bytes: stored.size_bytes,
            render_started_at: rendered.started_at,
            render_completed_at: rendered.completed_at,
        })
    }
}

#[async_trait]
impl RenderRunner for RenderPipeline {
    async fn run(&self, spec: JobSpec, port: u16) -> Result<RenderOutcome, PipelineError> {
        let started = Instant::now();
        let result = self.execute(&spec, port).await;
        let elapsed = started.elapsed();
        metrics::histogram!("fucina_render_seconds").record(elapsed.as_secs_f64());

        match &result {
            Ok(outcome) => {
                info!(
                    target = "fucina::pipeline",
                    op = "pipeline::run",
                    result = "completed",
                    job_id = spec.job_id,
                    tier = spec.tier.as_str(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    artifact_key = outcome.artifact_key,
                    "render pipeline completed"
                );
                self.notifier
                    .notify(
                        spec.callback_url.as_deref(),
                        &spec.job_id,
                        JobUpdate::Completed(outcome.clone()),
                    )
                    .await;
            }
            Err(err) => {
                error!(
                    target = "fucina::pipeline",
                    op = "pipeline::run",
                    result = "failed",
                    job_id = spec.job_id,
                    tier = spec.tier.as_str(),
                    stage = err.stage().as_str(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    error = %err,
                    "render pipeline failed"
                );
                self.notifier
                    .notify(
                        spec.callback_url.as_deref(),
                        &spec.job_id,
                        JobUpdate::Failed {
                            error_message: err.failure_message(),
                        },
                    )
                    .await;
            }
        }

        result
    }
}
