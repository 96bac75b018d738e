use axum::{
    Json,
    extract::{Query, State},
    response::Response,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::application::{
    dispatcher::{SubmitCommand, SubmitError},
    registry::ExecutionState,
};
use crate::domain::{job::RenderOutcome, tier::ComputeTier};

use super::super::storage_health_response;
use super::{ApiState, error::ApiError};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitJobRequest {
    #[serde(default)]
    pub job_id: Option<String>,
    #[serde(default)]
    pub config: Option<Value>,
    #[serde(default)]
    pub audio_url: Option<String>,
    #[serde(default)]
    pub audio_base64: Option<String>,
    #[serde(default)]
    pub callback_url: Option<String>,
    #[serde(default)]
    pub accelerated: Option<bool>,
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitJobResponse {
    pub handle: String,
    pub tier: ComputeTier,
    pub job_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusParams {
    #[serde(default)]
    pub call_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobStatusResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<RenderOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Accept a render job, returning a polling handle once it is queued.
pub async fn submit_job(
    State(state): State<ApiState>,
    Json(request): Json<SubmitJobRequest>,
) -> Result<Json<SubmitJobResponse>, ApiError> {
    let command = SubmitCommand {
        job_id: request.job_id,
        config: request.config,
        audio_url: request.audio_url,
        audio_base64: request.audio_base64,
        callback_url: request.callback_url,
        accelerated: request.accelerated,
        token: request.token,
    };

    let receipt = state
        .dispatcher
        .submit(command)
        .await
        .map_err(|err| match err {
            SubmitError::Unauthorized => ApiError::unauthorized(),
            SubmitError::Validation(message) => ApiError::bad_request(message),
        })?;

    Ok(Json(SubmitJobResponse {
        handle: receipt.handle.to_string(),
        tier: receipt.tier,
        job_id: receipt.job_id,
    }))
}

/// Project the current execution state for a previously returned handle.
pub async fn job_status(
    State(state): State<ApiState>,
    Query(params): Query<StatusParams>,
) -> Result<Json<JobStatusResponse>, ApiError> {
    let call_id = params
        .call_id
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ApiError::bad_request("call_id query parameter required"))?;

    let projection = Uuid::parse_str(call_id)
        .ok()
        .and_then(|handle| state.registry.lookup(handle));

    let response = match projection {
        Some(ExecutionState::Running) => JobStatusResponse {
            status: "running",
            result: None,
            error: None,
        },
        Some(ExecutionState::Completed(outcome)) => JobStatusResponse {
            status: "completed",
            result: Some(outcome),
            error: None,
        },
        Some(ExecutionState::Failed(message)) => JobStatusResponse {
            status: "failed",
            result: None,
            error: Some(message),
        },
        None => JobStatusResponse {
            status: "unknown",
            result: None,
            error: Some(format!("no job found for call_id `{call_id}`")),
        },
    };

    Ok(Json(response))
}

/// Liveness probe backed by an artifact-bucket write check.
pub async fn health(State(state): State<ApiState>) -> Response {
    storage_health_response(state.artifacts.probe().await)
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn submit_request_accepts_camel_case_fields() {
        let body = json!({
            "jobId": "job-1",
            "config": {"output": {"format": "4k-360"}},
            "audioUrl": "https://example.net/track.mp3",
            "callbackUrl": "https://control.example.net",
            "accelerated": false,
            "token": "T",
        });

        let request: SubmitJobRequest = serde_json::from_value(body).unwrap();
        assert_eq!(request.job_id.as_deref(), Some("job-1"));
        assert_eq!(
            request.audio_url.as_deref(),
            Some("https://example.net/track.mp3")
        );
        assert_eq!(request.accelerated, Some(false));
        assert!(request.audio_base64.is_none());
    }

    #[test]
    fn submit_response_serializes_job_id_in_camel_case() {
        let response = SubmitJobResponse {
            handle: "a5c4c96e-47f6-4df4-a34f-8a62f1580a35".to_string(),
            tier: ComputeTier::Accelerated,
            job_id: "job-1".to_string(),
        };

        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["jobId"], "job-1");
        assert_eq!(value["tier"], "accelerated");
    }

    #[test]
    fn status_response_omits_absent_fields() {
        let running = serde_json::to_value(JobStatusResponse {
            status: "running",
            result: None,
            error: None,
        })
        .unwrap();

        assert_eq!(running, json!({"status": "running"}));
    }
}
