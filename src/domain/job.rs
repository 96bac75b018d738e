//! Job vocabulary: audio sources, dispatchable specs, and render outcomes.

use serde::Serialize;
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use super::tier::ComputeTier;

/// Audio input for a render job. Validated submissions carry exactly one.
#[derive(Debug, Clone)]
pub enum AudioSource {
    /// Remote file fetched over HTTP.
    Url(String),
    /// Base64-encoded payload carried inline in the submission.
    Inline(String),
}

/// A validated submission, ready to execute.
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub job_id: String,
    pub config: Value,
    pub audio: AudioSource,
    pub callback_url: Option<String>,
    pub tier: ComputeTier,
}

/// What a successful pipeline produced. Serialized into status responses and
/// the success callback's output descriptor.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderOutcome {
    pub artifact_key: String,
    pub public_url: String,
    pub file_size_bytes: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub render_started_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub render_completed_at: OffsetDateTime,
}

/// Ordered pipeline stages. Strictly sequential; a stage failure aborts every
/// later stage except notification, which always runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    AcquireAudio,
    BootstrapFrontend,
    Invoke,
    PersistArtifact,
    Notify,
}

impl PipelineStage {
    pub fn as_str(self) -> &'static str {
        match self {
            PipelineStage::AcquireAudio => "acquire_audio",
            PipelineStage::BootstrapFrontend => "bootstrap_frontend",
            PipelineStage::Invoke => "invoke",
            PipelineStage::PersistArtifact => "persist_artifact",
            PipelineStage::Notify => "notify",
        }
    }
}

/// Mint a job identifier for submissions that do not carry one.
pub fn generate_job_id() -> String {
    format!("job-{}", Uuid::new_v4())
}
