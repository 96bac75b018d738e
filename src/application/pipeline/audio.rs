//! Audio acquisition: resolve a job's audio source into a scratch-local file.

use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::Client;
use thiserror::Error;
use tokio::fs;
use tracing::info;
use url::Url;

use crate::config::AudioSettings;
use crate::domain::job::AudioSource;

const DEFAULT_AUDIO_EXTENSION: &str = "mp3";

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("invalid audio url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("audio download failed: {0}")]
    Fetch(#[from] reqwest::Error),
    #[error("inline audio payload is not valid base64: {0}")]
    Decode(#[from] base64::DecodeError),
    #[error("failed to write audio file: {0}")]
    Io(#[from] std::io::Error),
}

/// Fetches remote audio or decodes inline payloads into the job's scratch
/// directory.
pub struct AudioFetcher {
    client: Client,
}

impl AudioFetcher {
    pub fn new(settings: &AudioSettings) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(settings.fetch_timeout).build()?;
        Ok(Self { client })
    }

    /// Resolve the job's audio source to a local file and return its path.
    pub async fn acquire(
        &self,
        job_id: &str,
        source: &AudioSource,
        scratch: &Path,
    ) -> Result<PathBuf, AudioError> {
        match source {
            AudioSource::Url(url) => self.fetch(job_id, url, scratch).await,
            AudioSource::Inline(payload) => decode_inline(job_id, payload, scratch).await,
        }
    }

    async fn fetch(&self, job_id: &str, url: &str, scratch: &Path) -> Result<PathBuf, AudioError> {
        let parsed = Url::parse(url)?;
        let extension = extension_from_url(&parsed);
        let dest = scratch.join(format!("{job_id}.{extension}"));

        let response = self.client.get(parsed).send().await?.error_for_status()?;
        let body = response.bytes().await?;
        fs::write(&dest, &body).await?;

        info!(
            target = "fucina::pipeline::audio",
            job_id,
            url,
            bytes = body.len(),
            "downloaded audio"
        );

        Ok(dest)
    }
}

async fn decode_inline(
    job_id: &str,
    payload: &str,
    scratch: &Path,
) -> Result<PathBuf, AudioError> {
    let dest = scratch.join(format!("{job_id}.{DEFAULT_AUDIO_EXTENSION}"));
    let decoded = BASE64.decode(payload)?;
    fs::write(&dest, &decoded).await?;

    info!(
        target = "fucina::pipeline::audio",
        job_id,
        encoded_chars = payload.len(),
        bytes = decoded.len(),
        "decoded inline audio"
    );

    Ok(dest)
}

fn extension_from_url(url: &Url) -> String {
    Path::new(url.path())
        .extension()
        .and_then(|value| value.to_str())
        .map(str::to_ascii_lowercase)
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_AUDIO_EXTENSION.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher() -> AudioFetcher {
        AudioFetcher::new(&AudioSettings {
            fetch_timeout: Duration::from_secs(2),
        })
        .expect("client builds")
    }

    #[tokio::test]
    async fn fetch_writes_audio_named_after_the_job() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tracks/a.wav"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"waveform".to_vec()))
            .mount(&server)
            .await;

        let scratch = TempDir::new().unwrap();
        let source = AudioSource::Url(format!("{}/tracks/a.wav", server.uri()));
        let dest = fetcher()
            .acquire("job-1", &source, scratch.path())
            .await
            .unwrap();

        assert_eq!(dest, scratch.path().join("job-1.wav"));
        assert_eq!(tokio::fs::read(&dest).await.unwrap(), b"waveform");
    }

    #[tokio::test]
    async fn fetch_defaults_extension_when_the_path_has_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"x".to_vec()))
            .mount(&server)
            .await;

        let scratch = TempDir::new().unwrap();
        let source = AudioSource::Url(format!("{}/stream", server.uri()));
        let dest = fetcher()
            .acquire("job-2", &source, scratch.path())
            .await
            .unwrap();

        assert_eq!(dest, scratch.path().join("job-2.mp3"));
    }

    #[tokio::test]
    async fn fetch_fails_on_non_success_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let scratch = TempDir::new().unwrap();
        let source = AudioSource::Url(format!("{}/missing.mp3", server.uri()));
        let err = fetcher()
            .acquire("job-3", &source, scratch.path())
            .await
            .unwrap_err();

        assert!(matches!(err, AudioError::Fetch(_)));
    }

    #[tokio::test]
    async fn inline_payload_decodes_to_an_mp3_file() {
        let scratch = TempDir::new().unwrap();
        let payload = BASE64.encode(b"inline-bytes");
        let source = AudioSource::Inline(payload);

        let dest = fetcher()
            .acquire("job-4", &source, scratch.path())
            .await
            .unwrap();

        assert_eq!(dest, scratch.path().join("job-4.mp3"));
        assert_eq!(tokio::fs::read(&dest).await.unwrap(), b"inline-bytes");
    }

    #[tokio::test]
    async fn malformed_inline_payload_is_rejected() {
        let scratch = TempDir::new().unwrap();
        let source = AudioSource::Inline("not base64 at all!".to_string());

        let err = fetcher()
            .acquire("job-5", &source, scratch.path())
            .await
            .unwrap_err();

        assert!(matches!(err, AudioError::Decode(_)));
    }
}
