use thiserror::Error;

/// Failures raised by the infrastructure layer before or outside request
/// handling: filesystem access and telemetry setup.
#[derive(Debug, Error)]
pub enum InfraError {
    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),
    #[error("telemetry setup failed: {0}")]
    Telemetry(String),
}

impl InfraError {
    pub fn telemetry(message: impl Into<String>) -> Self {
        Self::Telemetry(message.into())
    }
}
