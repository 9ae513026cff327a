use anyhow::{Context, Result};
use exec_gateway::api::{self, AppState};
use exec_gateway::config::DEFAULT_LISTEN_ADDR;
use exec_gateway::{ConfigStore, ProcessEnv};
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let store = Arc::new(ConfigStore::load(ProcessEnv));
    let listen_addr = match store.current() {
        Ok(config) => {
            info!(
                bin = %config.bin.display(),
                workdir = %config.workdir.display(),
                dry_run = config.dry_run,
                allowed = ?config.allowed_commands,
                "configuration loaded"
            );
            config.listen_addr.clone()
        }
        Err(e) => {
            warn!(
                error = %e,
                "starting with invalid configuration; requests will fail until fixed"
            );
            DEFAULT_LISTEN_ADDR.to_string()
        }
    };

    let shutdown = CancellationToken::new();
    spawn_reload_on_sighup(store.clone())?;

    let app = api::router(AppState::new(store, shutdown.clone()));
    let listener = tokio::net::TcpListener::bind(&listen_addr)
        .await
        .with_context(|| format!("binding {listen_addr}"))?;
    info!(addr = %listen_addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await
        .context("running server")?;

    info!("shutdown complete");
    Ok(())
}

fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("exec_gateway=info,tower_http=info"));

    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
            .ok();
    }
}

fn spawn_reload_on_sighup(store: Arc<ConfigStore>) -> Result<()> {
    let mut hangup = signal(SignalKind::hangup()).context("installing SIGHUP handler")?;
    tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            match store.reload() {
                Ok(_) => info!("configuration reloaded"),
                Err(e) => error!(error = %e, "reload failed; keeping previous configuration"),
            }
        }
    });
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM, then cancel in-flight executions.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("shutdown signal received, killing in-flight executions");
    shutdown.cancel();
}
