use std::{future::IntoFuture, pin::pin, process, sync::Arc, time::Duration};

use fucina::{
    application::{
        callback::CallbackNotifier,
        dispatcher::JobDispatcher,
        error::AppError,
        pipeline::{RenderPipeline, audio::AudioFetcher},
        registry::{ExecutionLanes, ExecutionRegistry},
    },
    config,
    infra::{
        error::InfraError,
        http::{ApiState, build_api_router},
        storage::ArtifactStore,
        telemetry,
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let app = build_application_context(&settings)?;

    // Sweep terminal job records past the retention window.
    let sweeper_handle = {
        let registry = app.registry.clone();
        let interval = sweep_interval(settings.dispatch.retention);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // Skip the first immediate tick
            loop {
                ticker.tick().await;
                registry.sweep();
            }
        })
    };

    let result = serve_http(&settings, app.api_state).await;

    sweeper_handle.abort();
    let _ = sweeper_handle.await;

    result
}

/// Check roughly ten times per retention window, at least once a second.
fn sweep_interval(retention: Duration) -> Duration {
    (retention / 10).max(Duration::from_secs(1))
}

struct ApplicationContext {
    api_state: ApiState,
    registry: Arc<ExecutionRegistry>,
}

fn build_application_context(settings: &config::Settings) -> Result<ApplicationContext, AppError> {
    let artifacts = Arc::new(
        ArtifactStore::new(&settings.storage).map_err(|err| AppError::from(InfraError::Io(err)))?,
    );

    let notifier = Arc::new(
        CallbackNotifier::new(&settings.control_plane, &settings.auth)
            .map_err(|err| AppError::unexpected(format!("failed to build callback client: {err}")))?,
    );

    let audio = AudioFetcher::new(&settings.audio)
        .map_err(|err| AppError::unexpected(format!("failed to build audio client: {err}")))?;

    let pipeline = Arc::new(RenderPipeline::new(
        audio,
        settings.frontend.clone(),
        settings.render.clone(),
        artifacts.clone(),
        notifier,
    ));

    let registry = Arc::new(ExecutionRegistry::new(settings.dispatch.retention));
    let lanes = Arc::new(ExecutionLanes::new(
        &settings.dispatch,
        settings.frontend.port,
    ));
    let dispatcher = Arc::new(JobDispatcher::new(
        settings.auth.token.clone(),
        registry.clone(),
        lanes,
        pipeline,
    ));

    if settings.auth.token.is_none() {
        info!(
            target = "fucina::main",
            "no auth token configured; every submission will be rejected"
        );
    }

    Ok(ApplicationContext {
        api_state: ApiState {
            dispatcher,
            registry: registry.clone(),
            artifacts,
        },
        registry,
    })
}

async fn serve_http(settings: &config::Settings, api_state: ApiState) -> Result<(), AppError> {
    let max_body_bytes = settings.server.max_body_bytes.get() as usize;
    let router = build_api_router(api_state, max_body_bytes);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        target = "fucina::main",
        addr = %settings.server.addr,
        "listening"
    );

    // Once the shutdown signal fires, in-flight requests get at most the
    // configured graceful window before the process exits anyway.
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let server = axum::serve(listener, router.into_make_service()).with_graceful_shutdown(
        async move {
            shutdown_signal().await;
            let _ = shutdown_tx.send(());
        },
    );

    let mut server = pin!(server.into_future());
    tokio::select! {
        result = &mut server => {
            result.map_err(|err| AppError::unexpected(format!("server error: {err}")))
        }
        _ = async {
            let _ = shutdown_rx.await;
            tokio::time::sleep(settings.server.graceful_shutdown).await;
        } => {
            info!(
                target = "fucina::main",
                "graceful shutdown window elapsed; exiting"
            );
            Ok(())
        }
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
        return;
    }
    info!(target = "fucina::main", "shutdown signal received");
}
