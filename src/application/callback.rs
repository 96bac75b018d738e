//! Best-effort progress callbacks to the external control plane.
//!
//! Delivery is at-most-once: transport errors and non-2xx responses are logged
//! and swallowed, never retried, and never fail the pipeline. The execution
//! registry stays the authoritative record of job outcomes.

use reqwest::Client;
use serde::Serialize;
use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::config::{AuthSettings, ControlPlaneSettings};
use crate::domain::job::RenderOutcome;

/// One stage-boundary update for the control plane.
#[derive(Debug, Clone)]
pub enum JobUpdate {
    Rendering { progress: u8 },
    Completed(RenderOutcome),
    Failed { error_message: String },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CallbackBody<'a> {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    progress: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_message: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    current_stage: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<OutputDescriptor<'a>>,
}

/// Success descriptor: every field is measured by the pipeline; nothing is
/// reported as a placeholder.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OutputDescriptor<'a> {
    format: &'a str,
    local_path: &'a str,
    file_size_bytes: u64,
    #[serde(with = "time::serde::rfc3339")]
    render_started_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    render_completed_at: OffsetDateTime,
}

impl JobUpdate {
    fn body(&self) -> CallbackBody<'_> {
        match self {
            JobUpdate::Rendering { progress } => CallbackBody {
                status: "rendering",
                progress: Some(*progress),
                error_message: None,
                current_stage: None,
                output: None,
            },
            JobUpdate::Completed(outcome) => CallbackBody {
                status: "completed",
                progress: Some(100),
                error_message: None,
                current_stage: Some("Complete"),
                output: Some(OutputDescriptor {
                    format: artifact_format(&outcome.artifact_key),
                    local_path: &outcome.public_url,
                    file_size_bytes: outcome.file_size_bytes,
                    render_started_at: outcome.render_started_at,
                    render_completed_at: outcome.render_completed_at,
                }),
            },
            JobUpdate::Failed { error_message } => CallbackBody {
                status: "failed",
                progress: None,
                error_message: Some(error_message),
                current_stage: Some("Failed"),
                output: None,
            },
        }
    }
}

fn artifact_format(key: &str) -> &str {
    key.rsplit_once('.')
        .map(|(_, extension)| extension)
        .unwrap_or("mp4")
}

/// PATCHes job updates to `{callback_url}/api/render/{job_id}`.
pub struct CallbackNotifier {
    client: Client,
    bearer_token: Option<String>,
}

impl CallbackNotifier {
    pub fn new(
        control_plane: &ControlPlaneSettings,
        auth: &AuthSettings,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(control_plane.request_timeout)
            .build()?;

        Ok(Self {
            client,
            bearer_token: auth.token.clone(),
        })
    }

    /// Deliver one update. A missing callback URL makes this a no-op.
    pub async fn notify(&self, callback_url: Option<&str>, job_id: &str, update: JobUpdate) {
        let Some(base) = callback_url else {
            return;
        };

        let url = format!("{}/api/render/{job_id}", base.trim_end_matches('/'));
        let body = update.body();

        let mut request = self.client.patch(&url).json(&body);
        if let Some(token) = self.bearer_token.as_deref() {
            request = request.bearer_auth(token);
        }

        match request.send().await {
            Ok(response) if response.status().is_success() => {
                debug!(
                    target = "fucina::callback",
                    job_id,
                    status = body.status,
                    response_status = response.status().as_u16(),
                    "callback delivered"
                );
            }
            Ok(response) => {
                metrics::counter!("fucina_callbacks_failed_total").increment(1);
                warn!(
                    target = "fucina::callback",
                    job_id,
                    status = body.status,
                    response_status = response.status().as_u16(),
                    url,
                    "control plane rejected callback"
                );
            }
            Err(err) => {
                metrics::counter!("fucina_callbacks_failed_total").increment(1);
                warn!(
                    target = "fucina::callback",
                    job_id,
                    status = body.status,
                    url,
                    error = %err,
                    "callback delivery failed"
                );
            }
        }
    }
}
