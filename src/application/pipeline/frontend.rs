//! Rendering front-end bootstrap: spawn the server process on a leased port
//! and wait for it to accept connections.
//!
//! The process lifecycle is owned by a single [`FrontendProcess`] value:
//! `start` either returns a Ready process or kills the child before reporting
//! failure, and `terminate` is the one place the child is stopped. The child
//! is additionally spawned with `kill_on_drop`, so a worker that unwinds
//! without calling `terminate` still leaves no process behind.

use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::FrontendSettings;

#[derive(Debug, Error)]
pub enum FrontendError {
    #[error("failed to spawn front-end `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("front-end did not accept connections on port {port} within {waited:?}")]
    StartupTimeout { port: u16, waited: Duration },
}

/// A running, reachable front-end process.
#[derive(Debug)]
pub struct FrontendProcess {
    child: Child,
    port: u16,
}

impl FrontendProcess {
    /// Launch the front-end and poll its port until it accepts a TCP
    /// connection. On startup timeout the child is killed before the error is
    /// returned.
    pub async fn start(settings: &FrontendSettings, port: u16) -> Result<Self, FrontendError> {
        let command_name = settings.command.display().to_string();

        let child = Command::new(&settings.command)
            .args(&settings.args)
            .arg("-p")
            .arg(port.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| FrontendError::Spawn {
                command: command_name.clone(),
                source,
            })?;

        let mut process = Self { child, port };

        let attempts = settings.startup_attempts.get();
        for attempt in 1..=attempts {
            sleep(settings.poll_interval).await;

            if TcpStream::connect(("127.0.0.1", port)).await.is_ok() {
                info!(
                    target = "fucina::pipeline::frontend",
                    command = command_name,
                    port,
                    attempt,
                    "front-end ready"
                );
                return Ok(process);
            }
        }

        let waited = settings.poll_interval * attempts;
        warn!(
            target = "fucina::pipeline::frontend",
            command = command_name,
            port,
            attempts,
            "front-end never became reachable; killing it"
        );
        process.shutdown().await;

        Err(FrontendError::StartupTimeout { port, waited })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Stop the front-end. Consumes the process; runs on every pipeline exit
    /// path.
    pub async fn terminate(mut self) {
        self.shutdown().await;
    }

    async fn shutdown(&mut self) {
        if let Err(err) = self.child.kill().await {
            warn!(
                target = "fucina::pipeline::frontend",
                port = self.port,
                error = %err,
                "failed to kill front-end process"
            );
        }
    }
}
