//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    net::SocketAddr,
    num::{NonZeroU32, NonZeroU64},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "fucina";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_MAX_BODY_BYTES: u64 = 64 * 1024 * 1024;
const DEFAULT_STANDARD_SLOTS: u32 = 2;
const DEFAULT_ACCELERATED_SLOTS: u32 = 1;
const DEFAULT_RETENTION_SECS: u64 = 3600;
const DEFAULT_AUDIO_FETCH_TIMEOUT_SECS: u64 = 120;
const DEFAULT_FRONTEND_COMMAND: &str = "npx";
const DEFAULT_FRONTEND_ARGS: [&str; 2] = ["next", "start"];
const DEFAULT_FRONTEND_PORT: u16 = 3000;
const DEFAULT_FRONTEND_STARTUP_ATTEMPTS: u32 = 60;
const DEFAULT_FRONTEND_POLL_INTERVAL_MS: u64 = 1000;
const DEFAULT_RENDER_COMMAND: &str = "npx";
const DEFAULT_RENDER_ARGS: [&str; 2] = ["tsx", "scripts/render-entry.ts"];
const DEFAULT_RENDER_TIMEOUT_SECS: u64 = 3600;
const DEFAULT_STORAGE_ROOT: &str = "artifacts";
const DEFAULT_CALLBACK_TIMEOUT_SECS: u64 = 10;

/// Command-line arguments for the fucina binary.
#[derive(Debug, Parser)]
#[command(name = "fucina", version, about = "Render-job orchestration service")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "FUCINA_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the orchestration HTTP service.
    Serve(Box<ServeArgs>),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the shared submission secret.
    #[arg(long = "auth-token", value_name = "TOKEN", hide_env_values = true)]
    pub auth_token: Option<String>,

    /// Override the standard-lane worker slots.
    #[arg(long = "dispatch-standard-slots", value_name = "COUNT")]
    pub dispatch_standard_slots: Option<u32>,

    /// Override the accelerated-lane worker slots.
    #[arg(long = "dispatch-accelerated-slots", value_name = "COUNT")]
    pub dispatch_accelerated_slots: Option<u32>,

    /// Override the retention window for terminal job records.
    #[arg(long = "dispatch-retention-seconds", value_name = "SECONDS")]
    pub dispatch_retention_seconds: Option<u64>,

    /// Override the audio download timeout.
    #[arg(long = "audio-fetch-timeout-seconds", value_name = "SECONDS")]
    pub audio_fetch_timeout_seconds: Option<u64>,

    /// Override the front-end launch command.
    #[arg(long = "frontend-command", value_name = "PATH")]
    pub frontend_command: Option<PathBuf>,

    /// Override the front-end base port.
    #[arg(long = "frontend-port", value_name = "PORT")]
    pub frontend_port: Option<u16>,

    /// Override the render CLI command.
    #[arg(long = "render-command", value_name = "PATH")]
    pub render_command: Option<PathBuf>,

    /// Override the render wall-clock timeout.
    #[arg(long = "render-timeout-seconds", value_name = "SECONDS")]
    pub render_timeout_seconds: Option<u64>,

    /// Override the artifact storage root.
    #[arg(long = "storage-root", value_name = "PATH")]
    pub storage_root: Option<PathBuf>,

    /// Override the public base URL artifacts are reachable under.
    #[arg(long = "storage-public-base-url", value_name = "URL")]
    pub storage_public_base_url: Option<String>,
}

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub auth: AuthSettings,
    pub dispatch: DispatchSettings,
    pub audio: AudioSettings,
    pub frontend: FrontendSettings,
    pub render: RenderSettings,
    pub storage: StorageSettings,
    pub control_plane: ControlPlaneSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
    pub max_body_bytes: NonZeroU64,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct AuthSettings {
    /// Shared secret submissions must present. `None` rejects every submission.
    pub token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub standard_slots: NonZeroU32,
    pub accelerated_slots: NonZeroU32,
    pub retention: Duration,
}

#[derive(Debug, Clone)]
pub struct AudioSettings {
    pub fetch_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct FrontendSettings {
    pub command: PathBuf,
    pub args: Vec<String>,
    pub port: u16,
    pub startup_attempts: NonZeroU32,
    pub poll_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub command: PathBuf,
    pub args: Vec<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct StorageSettings {
    pub root: PathBuf,
    /// Base URL the bucket is served under. When unset, status responses and
    /// callbacks carry the bare storage key instead of a resolvable URL.
    pub public_base_url: Option<Url>,
}

#[derive(Debug, Clone)]
pub struct ControlPlaneSettings {
    pub request_timeout: Duration,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("FUCINA").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    auth: RawAuthSettings,
    dispatch: RawDispatchSettings,
    audio: RawAudioSettings,
    frontend: RawFrontendSettings,
    render: RawRenderSettings,
    storage: RawStorageSettings,
    control_plane: RawControlPlaneSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(token) = overrides.auth_token.as_ref() {
            self.auth.token = Some(token.clone());
        }
        if let Some(slots) = overrides.dispatch_standard_slots {
            self.dispatch.standard_slots = Some(slots);
        }
        if let Some(slots) = overrides.dispatch_accelerated_slots {
            self.dispatch.accelerated_slots = Some(slots);
        }
        if let Some(seconds) = overrides.dispatch_retention_seconds {
            self.dispatch.retention_seconds = Some(seconds);
        }
        if let Some(seconds) = overrides.audio_fetch_timeout_seconds {
            self.audio.fetch_timeout_seconds = Some(seconds);
        }
        if let Some(command) = overrides.frontend_command.as_ref() {
            self.frontend.command = Some(command.clone());
        }
        if let Some(port) = overrides.frontend_port {
            self.frontend.port = Some(port);
        }
        if let Some(command) = overrides.render_command.as_ref() {
            self.render.command = Some(command.clone());
        }
        if let Some(seconds) = overrides.render_timeout_seconds {
            self.render.timeout_seconds = Some(seconds);
        }
        if let Some(root) = overrides.storage_root.as_ref() {
            self.storage.root = Some(root.clone());
        }
        if let Some(url) = overrides.storage_public_base_url.as_ref() {
            self.storage.public_base_url = Some(url.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            auth,
            dispatch,
            audio,
            frontend,
            render,
            storage,
            control_plane,
        } = raw;

        let server = build_server_settings(server)?;
        let logging = build_logging_settings(logging)?;
        let auth = build_auth_settings(auth);
        let dispatch = build_dispatch_settings(dispatch)?;
        let audio = build_audio_settings(audio)?;
        let frontend = build_frontend_settings(frontend)?;
        let render = build_render_settings(render)?;
        let storage = build_storage_settings(storage)?;
        let control_plane = build_control_plane_settings(control_plane)?;

        // Each execution slot leases frontend.port + offset, so the highest
        // leased port must still fit in a u16.
        let total_slots =
            u64::from(dispatch.standard_slots.get()) + u64::from(dispatch.accelerated_slots.get());
        let highest_port = u64::from(frontend.port) + total_slots - 1;
        if highest_port > u64::from(u16::MAX) {
            return Err(LoadError::invalid(
                "frontend.port",
                format!(
                    "port range {}..={highest_port} for {total_slots} execution slots exceeds {}",
                    frontend.port,
                    u16::MAX
                ),
            ));
        }

        Ok(Self {
            server,
            logging,
            auth,
            dispatch,
            audio,
            frontend,
            render,
            storage,
            control_plane,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    let max_body_value = server.max_body_bytes.unwrap_or(DEFAULT_MAX_BODY_BYTES);
    let max_body_bytes = NonZeroU64::new(max_body_value)
        .ok_or_else(|| LoadError::invalid("server.max_body_bytes", "must be greater than zero"))?;
    usize::try_from(max_body_value).map_err(|_| {
        LoadError::invalid(
            "server.max_body_bytes",
            "value exceeds supported range for usize",
        )
    })?;

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
        max_body_bytes,
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_auth_settings(auth: RawAuthSettings) -> AuthSettings {
    let token = auth.token.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    AuthSettings { token }
}

fn build_dispatch_settings(dispatch: RawDispatchSettings) -> Result<DispatchSettings, LoadError> {
    let standard = dispatch.standard_slots.unwrap_or(DEFAULT_STANDARD_SLOTS);
    let accelerated = dispatch
        .accelerated_slots
        .unwrap_or(DEFAULT_ACCELERATED_SLOTS);

    let retention_seconds = dispatch.retention_seconds.unwrap_or(DEFAULT_RETENTION_SECS);
    if retention_seconds == 0 {
        return Err(LoadError::invalid(
            "dispatch.retention_seconds",
            "must be greater than zero",
        ));
    }

    Ok(DispatchSettings {
        standard_slots: non_zero_u32(standard.into(), "dispatch.standard_slots")?,
        accelerated_slots: non_zero_u32(accelerated.into(), "dispatch.accelerated_slots")?,
        retention: Duration::from_secs(retention_seconds),
    })
}

fn build_audio_settings(audio: RawAudioSettings) -> Result<AudioSettings, LoadError> {
    let timeout_seconds = audio
        .fetch_timeout_seconds
        .unwrap_or(DEFAULT_AUDIO_FETCH_TIMEOUT_SECS);
    if timeout_seconds == 0 {
        return Err(LoadError::invalid(
            "audio.fetch_timeout_seconds",
            "must be greater than zero",
        ));
    }

    Ok(AudioSettings {
        fetch_timeout: Duration::from_secs(timeout_seconds),
    })
}

fn build_frontend_settings(frontend: RawFrontendSettings) -> Result<FrontendSettings, LoadError> {
    let command = frontend
        .command
        .unwrap_or_else(|| PathBuf::from(DEFAULT_FRONTEND_COMMAND));
    if command.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "frontend.command",
            "path must not be empty",
        ));
    }

    let args = frontend
        .args
        .unwrap_or_else(|| DEFAULT_FRONTEND_ARGS.iter().map(ToString::to_string).collect());

    let port = frontend.port.unwrap_or(DEFAULT_FRONTEND_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "frontend.port",
            "port must be greater than zero",
        ));
    }

    let attempts = frontend
        .startup_attempts
        .unwrap_or(DEFAULT_FRONTEND_STARTUP_ATTEMPTS);

    let poll_interval_ms = frontend
        .poll_interval_ms
        .unwrap_or(DEFAULT_FRONTEND_POLL_INTERVAL_MS);
    if poll_interval_ms == 0 {
        return Err(LoadError::invalid(
            "frontend.poll_interval_ms",
            "must be greater than zero",
        ));
    }

    Ok(FrontendSettings {
        command,
        args,
        port,
        startup_attempts: non_zero_u32(attempts.into(), "frontend.startup_attempts")?,
        poll_interval: Duration::from_millis(poll_interval_ms),
    })
}

fn build_render_settings(render: RawRenderSettings) -> Result<RenderSettings, LoadError> {
    let command = render
        .command
        .unwrap_or_else(|| PathBuf::from(DEFAULT_RENDER_COMMAND));
    if command.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "render.command",
            "path must not be empty",
        ));
    }

    let args = render
        .args
        .unwrap_or_else(|| DEFAULT_RENDER_ARGS.iter().map(ToString::to_string).collect());

    let timeout_seconds = render.timeout_seconds.unwrap_or(DEFAULT_RENDER_TIMEOUT_SECS);
    if timeout_seconds == 0 {
        return Err(LoadError::invalid(
            "render.timeout_seconds",
            "must be greater than zero",
        ));
    }

    Ok(RenderSettings {
        command,
        args,
        timeout: Duration::from_secs(timeout_seconds),
    })
}

fn build_storage_settings(storage: RawStorageSettings) -> Result<StorageSettings, LoadError> {
    let root = storage
        .root
        .unwrap_or_else(|| PathBuf::from(DEFAULT_STORAGE_ROOT));
    if root.as_os_str().is_empty() {
        return Err(LoadError::invalid("storage.root", "path must not be empty"));
    }

    let public_base_url = storage
        .public_base_url
        .map(|value| {
            Url::parse(value.trim()).map_err(|err| {
                LoadError::invalid("storage.public_base_url", format!("failed to parse: {err}"))
            })
        })
        .transpose()?;

    Ok(StorageSettings {
        root,
        public_base_url,
    })
}

fn build_control_plane_settings(
    control_plane: RawControlPlaneSettings,
) -> Result<ControlPlaneSettings, LoadError> {
    let timeout_seconds = control_plane
        .request_timeout_seconds
        .unwrap_or(DEFAULT_CALLBACK_TIMEOUT_SECS);
    if timeout_seconds == 0 {
        return Err(LoadError::invalid(
            "control_plane.request_timeout_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ControlPlaneSettings {
        request_timeout: Duration::from_secs(timeout_seconds),
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
    max_body_bytes: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawAuthSettings {
    token: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDispatchSettings {
    standard_slots: Option<u32>,
    accelerated_slots: Option<u32>,
    retention_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawAudioSettings {
    fetch_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawFrontendSettings {
    command: Option<PathBuf>,
    args: Option<Vec<String>>,
    port: Option<u16>,
    startup_attempts: Option<u32>,
    poll_interval_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRenderSettings {
    command: Option<PathBuf>,
    args: Option<Vec<String>>,
    timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawStorageSettings {
    root: Option<PathBuf>,
    public_base_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawControlPlaneSettings {
    request_timeout_seconds: Option<u64>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_overrides_take_highest_precedence() {
        let mut raw = RawSettings::default();
        raw.server.port = Some(4000);
        raw.logging.level = Some("info".to_string());

        let overrides = ServeOverrides {
            server_port: Some(4321),
            log_level: Some("debug".to_string()),
            ..Default::default()
        };

        raw.apply_serve_overrides(&overrides);
        let settings = Settings::from_raw(raw).expect("valid settings");

        assert_eq!(settings.server.addr.port(), 4321);
        assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    }

    #[test]
    fn defaults_cover_every_section() {
        let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

        assert_eq!(settings.server.addr.port(), DEFAULT_PORT);
        assert!(settings.auth.token.is_none());
        assert_eq!(settings.dispatch.standard_slots.get(), 2);
        assert_eq!(settings.dispatch.accelerated_slots.get(), 1);
        assert_eq!(settings.audio.fetch_timeout, Duration::from_secs(120));
        assert_eq!(settings.frontend.port, 3000);
        assert_eq!(settings.frontend.startup_attempts.get(), 60);
        assert_eq!(settings.render.timeout, Duration::from_secs(3600));
        assert_eq!(settings.storage.root, PathBuf::from("artifacts"));
        assert!(settings.storage.public_base_url.is_none());
        assert_eq!(
            settings.control_plane.request_timeout,
            Duration::from_secs(10)
        );
    }

    #[test]
    fn blank_auth_token_is_treated_as_unset() {
        let mut raw = RawSettings::default();
        raw.auth.token = Some("   ".to_string());

        let settings = Settings::from_raw(raw).expect("valid settings");
        assert!(settings.auth.token.is_none());
    }

    #[test]
    fn cli_json_logging_enforces_format() {
        let mut raw = RawSettings::default();
        let overrides = ServeOverrides {
            log_json: Some(true),
            ..Default::default()
        };

        raw.apply_serve_overrides(&overrides);
        let settings = Settings::from_raw(raw).expect("valid settings");

        assert!(matches!(settings.logging.format, LogFormat::Json));
    }

    #[test]
    fn zero_render_timeout_is_rejected() {
        let mut raw = RawSettings::default();
        raw.render.timeout_seconds = Some(0);

        let err = Settings::from_raw(raw).expect_err("zero timeout must fail");
        assert!(matches!(
            err,
            LoadError::Invalid {
                key: "render.timeout_seconds",
                ..
            }
        ));
    }

    #[test]
    fn frontend_port_range_must_fit_in_a_u16() {
        let mut raw = RawSettings::default();
        raw.frontend.port = Some(u16::MAX);
        raw.dispatch.standard_slots = Some(2);
        raw.dispatch.accelerated_slots = Some(1);

        let err = Settings::from_raw(raw).expect_err("overflowing port range must fail");
        assert!(matches!(
            err,
            LoadError::Invalid {
                key: "frontend.port",
                ..
            }
        ));

        let mut raw = RawSettings::default();
        raw.frontend.port = Some(u16::MAX);
        raw.dispatch.standard_slots = Some(1);
        raw.dispatch.accelerated_slots = Some(1);

        let err = Settings::from_raw(raw).expect_err("overflowing port range must fail");
        assert!(matches!(
            err,
            LoadError::Invalid {
                key: "frontend.port",
                ..
            }
        ));

        let mut raw = RawSettings::default();
        raw.frontend.port = Some(u16::MAX - 2);
        raw.dispatch.standard_slots = Some(2);
        raw.dispatch.accelerated_slots = Some(1);

        Settings::from_raw(raw).expect("range ending exactly at u16::MAX is fine");
    }

    #[test]
    fn malformed_public_base_url_is_rejected() {
        let mut raw = RawSettings::default();
        raw.storage.public_base_url = Some("not a url".to_string());

        let err = Settings::from_raw(raw).expect_err("malformed url must fail");
        assert!(matches!(
            err,
            LoadError::Invalid {
                key: "storage.public_base_url",
                ..
            }
        ));
    }

    #[test]
    fn default_to_serve_command() {
        let args = CliArgs::parse_from(["fucina"]);
        let command = args
            .command
            .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
        assert!(matches!(command, Command::Serve(_)));
    }

    #[test]
    fn parse_serve_overrides() {
        let args = CliArgs::parse_from([
            "fucina",
            "serve",
            "--server-host",
            "0.0.0.0",
            "--auth-token",
            "shared-secret",
            "--dispatch-standard-slots",
            "4",
            "--storage-public-base-url",
            "https://renders.example.net",
        ]);

        match args.command.expect("serve command") {
            Command::Serve(serve) => {
                assert_eq!(serve.overrides.server_host.as_deref(), Some("0.0.0.0"));
                assert_eq!(serve.overrides.auth_token.as_deref(), Some("shared-secret"));
                assert_eq!(serve.overrides.dispatch_standard_slots, Some(4));
                assert_eq!(
                    serve.overrides.storage_public_base_url.as_deref(),
                    Some("https://renders.example.net")
                );
            }
        }
    }
}
