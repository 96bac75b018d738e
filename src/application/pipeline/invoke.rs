//! Render invocation: run the render CLI against the bootstrapped front-end
//! under a hard wall-clock timeout.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use time::OffsetDateTime;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{error, info};

use crate::config::RenderSettings;
use crate::domain::job::JobSpec;
use crate::util::text::tail;

const CONFIG_FILE_NAME: &str = "render-config.json";
const OUTPUT_LOG_TAIL_CHARS: usize = 2000;
const ERROR_TAIL_CHARS: usize = 500;

#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("failed to prepare render invocation: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to serialize render config: {0}")]
    Config(#[from] serde_json::Error),
    #[error("render failed (exit {code:?}): {stderr_tail}")]
    Exit {
        code: Option<i32>,
        stderr_tail: String,
    },
    #[error("render exceeded the {limit:?} timeout")]
    TimedOut { limit: Duration },
}

/// A finished render: where the artifact landed and when the command ran.
#[derive(Debug)]
pub struct RenderedArtifact {
    pub output_path: PathBuf,
    pub started_at: OffsetDateTime,
    pub completed_at: OffsetDateTime,
}

/// Write the job's config to scratch and run the render CLI.
///
/// A non-zero exit carries the stderr tail as the diagnostic; on timeout the
/// command future is dropped and the child killed. Either way no partial
/// artifact is trusted.
pub async fn run_render(
    settings: &RenderSettings,
    spec: &JobSpec,
    audio_path: &Path,
    scratch: &Path,
    port: u16,
) -> Result<RenderedArtifact, InvokeError> {
    let config_path = scratch.join(CONFIG_FILE_NAME);
    tokio::fs::write(&config_path, serde_json::to_vec(&spec.config)?).await?;

    let output_path = scratch.join(format!("{}.mp4", spec.job_id));
    let app_url = format!("http://127.0.0.1:{port}");

    let mut command = Command::new(&settings.command);
    command
        .args(&settings.args)
        .arg("--config")
        .arg(&config_path)
        .arg("--audio")
        .arg(audio_path)
        .arg("--output")
        .arg(&output_path)
        .arg("--app-url")
        .arg(&app_url)
        .arg("--job-id")
        .arg(&spec.job_id);
    if let Some(callback_url) = spec.callback_url.as_deref() {
        command.arg("--callback-url").arg(callback_url);
    }
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    info!(
        target = "fucina::pipeline::invoke",
        job_id = spec.job_id,
        command = %settings.command.display(),
        app_url,
        output = %output_path.display(),
        "starting render"
    );

    let started_at = OffsetDateTime::now_utc();
    let output = match timeout(settings.timeout, command.output()).await {
        Ok(result) => result?,
        Err(_) => {
            error!(
                target = "fucina::pipeline::invoke",
                job_id = spec.job_id,
                timeout_secs = settings.timeout.as_secs(),
                "render timed out"
            );
            return Err(InvokeError::TimedOut {
                limit: settings.timeout,
            });
        }
    };
    let completed_at = OffsetDateTime::now_utc();

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    info!(
        target = "fucina::pipeline::invoke",
        job_id = spec.job_id,
        exit_code = output.status.code().unwrap_or(-1),
        elapsed_secs = (completed_at - started_at).whole_seconds(),
        stdout_tail = %tail(&stdout, OUTPUT_LOG_TAIL_CHARS),
        stderr_tail = %tail(&stderr, OUTPUT_LOG_TAIL_CHARS),
        "render finished"
    );

    if !output.status.success() {
        return Err(InvokeError::Exit {
            code: output.status.code(),
            stderr_tail: tail(&stderr, ERROR_TAIL_CHARS),
        });
    }

    Ok(RenderedArtifact {
        output_path,
        started_at,
        completed_at,
    })
}
