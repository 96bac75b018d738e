//! Job dispatch: authenticate, validate, pick a tier, spawn the worker,
//! return a polling handle.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

use crate::domain::job::{AudioSource, JobSpec, RenderOutcome, generate_job_id};
use crate::domain::tier::ComputeTier;

use super::pipeline::PipelineError;
use super::registry::{ExecutionLanes, ExecutionRegistry};

/// Raw submission as received from the caller, before validation.
#[derive(Debug, Clone, Default)]
pub struct SubmitCommand {
    pub job_id: Option<String>,
    pub config: Option<Value>,
    pub audio_url: Option<String>,
    pub audio_base64: Option<String>,
    pub callback_url: Option<String>,
    pub accelerated: Option<bool>,
    pub token: Option<String>,
}

/// What the caller gets back: the polling handle plus the resolved tier and
/// job identifier.
#[derive(Debug, Clone)]
pub struct SubmitReceipt {
    pub handle: Uuid,
    pub tier: ComputeTier,
    pub job_id: String,
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("Unauthorized")]
    Unauthorized,
    #[error("{0}")]
    Validation(String),
}

/// Seam between dispatch and execution: the production runner is the render
/// pipeline; tests substitute fakes.
#[async_trait]
pub trait RenderRunner: Send + Sync {
    async fn run(&self, spec: JobSpec, port: u16) -> Result<RenderOutcome, PipelineError>;
}

/// Accepts submissions and schedules one worker task per accepted job.
pub struct JobDispatcher {
    secret: Option<String>,
    registry: Arc<ExecutionRegistry>,
    lanes: Arc<ExecutionLanes>,
    runner: Arc<dyn RenderRunner>,
}

impl JobDispatcher {
    pub fn new(
        secret: Option<String>,
        registry: Arc<ExecutionRegistry>,
        lanes: Arc<ExecutionLanes>,
        runner: Arc<dyn RenderRunner>,
    ) -> Self {
        Self {
            secret,
            registry,
            lanes,
            runner,
        }
    }

    /// Authenticate and validate a submission, then spawn its worker.
    ///
    /// Returns as soon as the worker is scheduled; lane-permit acquisition
    /// happens inside the spawned task, so a full lane queues the job rather
    /// than blocking the caller.
    pub async fn submit(&self, command: SubmitCommand) -> Result<SubmitReceipt, SubmitError> {
        self.authenticate(command.token.as_deref())?;
        let spec = validate(command)?;

        let handle = self.registry.register(&spec.job_id);
        let tier = spec.tier;
        let job_id = spec.job_id.clone();
        metrics::counter!("fucina_jobs_submitted_total", "tier" => tier.as_str()).increment(1);

        info!(
            target = "fucina::dispatcher",
            job_id,
            handle = %handle,
            tier = tier.as_str(),
            "job accepted"
        );

        let registry = Arc::clone(&self.registry);
        let lanes = Arc::clone(&self.lanes);
        let runner = Arc::clone(&self.runner);
        tokio::spawn(async move {
            // The pipeline runs in its own task so a panic surfaces as a
            // JoinError here instead of leaving the record Running forever.
            let worker = tokio::spawn(async move {
                let slot = lanes.acquire(spec.tier).await;
                runner.run(spec, slot.port()).await
            });

            match worker.await {
                Ok(Ok(outcome)) => {
                    metrics::counter!("fucina_jobs_completed_total").increment(1);
                    registry.record_completed(handle, outcome);
                }
                Ok(Err(err)) => {
                    metrics::counter!("fucina_jobs_failed_total").increment(1);
                    registry.record_failed(handle, err.failure_message());
                }
                Err(join_err) => {
                    metrics::counter!("fucina_jobs_failed_total").increment(1);
                    error!(
                        target = "fucina::dispatcher",
                        handle = %handle,
                        error = %join_err,
                        "render worker aborted"
                    );
                    registry.record_failed(
                        handle,
                        format!("render worker aborted: {join_err}"),
                    );
                }
            }
        });

        Ok(SubmitReceipt {
            handle,
            tier,
            job_id,
        })
    }

    /// Exact-match shared-secret check, constant-time over the token bytes.
    /// With no secret configured every submission is rejected.
    fn authenticate(&self, token: Option<&str>) -> Result<(), SubmitError> {
        let Some(secret) = self.secret.as_deref() else {
            return Err(SubmitError::Unauthorized);
        };

        let presented = token.unwrap_or_default();
        if presented.as_bytes().ct_eq(secret.as_bytes()).unwrap_u8() == 0 {
            return Err(SubmitError::Unauthorized);
        }

        Ok(())
    }
}

fn validate(command: SubmitCommand) -> Result<JobSpec, SubmitError> {
    let config = match command.config {
        Some(Value::Object(fields)) if !fields.is_empty() => Value::Object(fields),
        Some(Value::Null) | None => {
            return Err(SubmitError::Validation("config is required".to_string()));
        }
        Some(_) => {
            return Err(SubmitError::Validation(
                "config must be a non-empty object".to_string(),
            ));
        }
    };

    let audio = match (command.audio_url, command.audio_base64) {
        (Some(url), None) => AudioSource::Url(url),
        (None, Some(payload)) => AudioSource::Inline(payload),
        (None, None) => {
            return Err(SubmitError::Validation(
                "audioUrl or audioBase64 is required".to_string(),
            ));
        }
        (Some(_), Some(_)) => {
            return Err(SubmitError::Validation(
                "exactly one of audioUrl and audioBase64 may be provided".to_string(),
            ));
        }
    };

    let tier = match command.accelerated {
        Some(true) => ComputeTier::Accelerated,
        Some(false) => ComputeTier::Standard,
        None => ComputeTier::for_config(&config),
    };

    Ok(JobSpec {
        job_id: command.job_id.unwrap_or_else(generate_job_id),
        config,
        audio,
        callback_url: command.callback_url,
        tier,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::num::NonZeroU32;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use serde_json::json;
    use time::macros::datetime;

    use crate::config::DispatchSettings;

    struct CountingRunner {
        calls: AtomicUsize,
    }

    impl CountingRunner {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl RenderRunner for CountingRunner {
        async fn run(&self, _spec: JobSpec, _port: u16) -> Result<RenderOutcome, PipelineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(RenderOutcome {
                artifact_key: "renders/job.mp4".to_string(),
                public_url: "renders/job.mp4".to_string(),
                file_size_bytes: 1,
                render_started_at: datetime!(2026-01-01 00:00:00 UTC),
                render_completed_at: datetime!(2026-01-01 00:00:01 UTC),
            })
        }
    }

    fn dispatcher(secret: Option<&str>, runner: Arc<dyn RenderRunner>) -> JobDispatcher {
        let registry = Arc::new(ExecutionRegistry::new(Duration::from_secs(3600)));
        let lanes = Arc::new(ExecutionLanes::new(
            &DispatchSettings {
                standard_slots: NonZeroU32::new(2).unwrap(),
                accelerated_slots: NonZeroU32::new(1).unwrap(),
                retention: Duration::from_secs(3600),
            },
            3000,
        ));
        JobDispatcher::new(secret.map(str::to_string), registry, lanes, runner)
    }

    fn valid_command(token: &str) -> SubmitCommand {
        SubmitCommand {
            config: Some(json!({"output": {"format": "flat-1080p-landscape"}})),
            audio_url: Some("https://example.net/a.mp3".to_string()),
            token: Some(token.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn wrong_token_is_rejected_without_scheduling() {
        let runner = CountingRunner::new();
        let dispatcher = dispatcher(Some("T"), runner.clone());

        let err = dispatcher
            .submit(valid_command("wrong"))
            .await
            .expect_err("must reject");

        assert!(matches!(err, SubmitError::Unauthorized));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(runner.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_secret_rejects_every_submission() {
        let dispatcher = dispatcher(None, CountingRunner::new());

        let err = dispatcher
            .submit(valid_command("anything"))
            .await
            .expect_err("must reject");

        assert!(matches!(err, SubmitError::Unauthorized));
    }

    #[tokio::test]
    async fn missing_audio_sources_fail_validation() {
        let dispatcher = dispatcher(Some("T"), CountingRunner::new());

        let mut command = valid_command("T");
        command.audio_url = None;
        let err = dispatcher.submit(command).await.expect_err("must reject");

        match err {
            SubmitError::Validation(message) => {
                assert!(message.contains("audioUrl or audioBase64"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn both_audio_sources_fail_validation() {
        let dispatcher = dispatcher(Some("T"), CountingRunner::new());

        let mut command = valid_command("T");
        command.audio_base64 = Some("aGk=".to_string());
        let err = dispatcher.submit(command).await.expect_err("must reject");

        assert!(matches!(err, SubmitError::Validation(_)));
    }

    #[tokio::test]
    async fn empty_config_fails_validation() {
        let dispatcher = dispatcher(Some("T"), CountingRunner::new());

        let mut command = valid_command("T");
        command.config = Some(json!({}));
        let err = dispatcher.submit(command).await.expect_err("must reject");

        assert!(matches!(err, SubmitError::Validation(_)));
    }

    #[tokio::test]
    async fn accepted_jobs_get_generated_ids_when_none_supplied() {
        let dispatcher = dispatcher(Some("T"), CountingRunner::new());

        let receipt = dispatcher
            .submit(valid_command("T"))
            .await
            .expect("accepted");

        assert!(receipt.job_id.starts_with("job-"));
        assert_eq!(receipt.tier, ComputeTier::Standard);
    }

    #[tokio::test]
    async fn profile_markers_select_the_accelerated_tier() {
        let dispatcher = dispatcher(Some("T"), CountingRunner::new());

        let mut command = valid_command("T");
        command.job_id = Some("job-1".to_string());
        command.config = Some(json!({"output": {"format": "4k-360"}}));
        let receipt = dispatcher.submit(command).await.expect("accepted");

        assert_eq!(receipt.tier, ComputeTier::Accelerated);
        assert_eq!(receipt.job_id, "job-1");
    }

    #[tokio::test]
    async fn explicit_override_beats_the_profile() {
        let dispatcher = dispatcher(Some("T"), CountingRunner::new());

        let mut command = valid_command("T");
        command.config = Some(json!({"output": {"format": "4k-360"}}));
        command.accelerated = Some(false);
        let receipt = dispatcher.submit(command).await.expect("accepted");

        assert_eq!(receipt.tier, ComputeTier::Standard);
    }

    #[tokio::test]
    async fn worker_panics_surface_as_failed_status() {
        use super::super::registry::ExecutionState;

        struct PanickingRunner;

        #[async_trait]
        impl RenderRunner for PanickingRunner {
            async fn run(&self, _spec: JobSpec, _port: u16) -> Result<RenderOutcome, PipelineError> {
                panic!("render worker lost its mind")
            }
        }

        let registry = Arc::new(ExecutionRegistry::new(Duration::from_secs(3600)));
        let lanes = Arc::new(ExecutionLanes::new(
            &DispatchSettings {
                standard_slots: NonZeroU32::new(1).unwrap(),
                accelerated_slots: NonZeroU32::new(1).unwrap(),
                retention: Duration::from_secs(3600),
            },
            3000,
        ));
        let dispatcher = JobDispatcher::new(
            Some("T".to_string()),
            Arc::clone(&registry),
            lanes,
            Arc::new(PanickingRunner),
        );

        let receipt = dispatcher
            .submit(valid_command("T"))
            .await
            .expect("accepted");

        for _ in 0..100 {
            if let Some(ExecutionState::Failed(message)) = registry.lookup(receipt.handle) {
                assert!(message.contains("aborted"), "unexpected message: {message}");
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("panicked worker never recorded a failure");
    }

    #[tokio::test]
    async fn duplicate_job_ids_each_get_their_own_handle() {
        let dispatcher = dispatcher(Some("T"), CountingRunner::new());

        let mut first = valid_command("T");
        first.job_id = Some("job-dup".to_string());
        let mut second = valid_command("T");
        second.job_id = Some("job-dup".to_string());

        let a = dispatcher.submit(first).await.expect("accepted");
        let b = dispatcher.submit(second).await.expect("accepted");

        assert_ne!(a.handle, b.handle);
    }
}
