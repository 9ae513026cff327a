//! HTTP entrypoint.
//!
//! Every executed request answers 200 with an [`InvokeResponse`], including
//! non-zero exits and timeouts. Only pipeline rejections and configuration
//! failures map to error statuses.

use crate::config::{ConfigStore, GatewayConfig};
use crate::error::{ConfigError, Violation, ViolationKind};
use crate::payload::{InvokeRequest, InvokeResponse};
use crate::request::ExecRequest;
use crate::runner;
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{info, warn, Level};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    config: Arc<ConfigStore>,
    shutdown: CancellationToken,
    versions: Arc<VersionCache>,
}

impl AppState {
    /// Cancelling `shutdown` kills every in-flight execution.
    pub fn new(config: Arc<ConfigStore>, shutdown: CancellationToken) -> Self {
        Self {
            config,
            shutdown,
            versions: Arc::new(VersionCache::default()),
        }
    }
}

/// Executable versions, looked up once per binary path.
///
/// Keyed by path so that a reload pointing `EXEC_BIN` elsewhere is noticed.
#[derive(Debug, Default)]
pub struct VersionCache {
    known: Mutex<HashMap<PathBuf, Option<String>>>,
}

impl VersionCache {
    /// Cached version of `bin`, calling `lookup` on first sight.
    pub async fn get_or_lookup<F, Fut>(&self, bin: &Path, lookup: F) -> Option<String>
    where
        F: FnOnce(PathBuf) -> Fut,
        Fut: Future<Output = Option<String>>,
    {
        let mut known = self.known.lock().await;
        if let Some(version) = known.get(bin) {
            return version.clone();
        }
        let version = lookup(bin.to_path_buf()).await;
        known.insert(bin.to_path_buf(), version.clone());
        version
    }
}

/// Create the application router.
pub fn router(state: AppState) -> Router {
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::DEBUG))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    Router::new()
        .route("/", post(invoke))
        .route("/invoke", post(invoke))
        .route("/health", get(health))
        .layer(trace_layer)
        .with_state(state)
}

/// Errors returned to HTTP clients.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Rejected(#[from] Violation),

    #[error("configuration unavailable: {0}")]
    Config(#[from] ConfigError),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: &'static str,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        self.status_and_code().0
    }

    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Rejected(v) => match v.kind() {
                ViolationKind::MalformedInput => (StatusCode::BAD_REQUEST, "MALFORMED_INPUT"),
                ViolationKind::PolicyDenied => (StatusCode::FORBIDDEN, "POLICY_DENIED"),
                ViolationKind::BadRequest => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            },
            ApiError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let body = ErrorResponse {
            error: self.to_string(),
            code,
        };
        (status, Json(body)).into_response()
    }
}

/// Turn a payload into a runnable request under `config`.
///
/// Nothing is spawned here; a `Violation` means nothing ever will be.
pub fn build_request(
    config: &GatewayConfig,
    payload: &InvokeRequest,
) -> Result<ExecRequest, Violation> {
    let tokens = if config.expand_env {
        payload.tokens_expanded(|key| std::env::var(key).ok())?
    } else {
        payload.tokens()?
    };

    let vetted = config.policy().prepare(tokens)?;

    let env = config.env_policy.apply(&payload.env);
    if !env.dropped.is_empty() {
        warn!(dropped = ?env.dropped, "refused environment overrides");
    }

    let workdir = payload
        .workdir_override()
        .map(PathBuf::from)
        .unwrap_or_else(|| config.workdir.clone());

    let mut request = ExecRequest::new(config.effective_bin(), vetted.argv)
        .with_cwd(workdir)
        .with_env(env.kept)
        .with_max_output_bytes(config.max_output_bytes)
        .with_line_filters(config.stdout_exclude.clone(), config.stderr_exclude.clone());
    if let Some(timeout) = config.timeout {
        request = request.with_timeout(timeout);
    }

    info!(
        subcommand = %vetted.subcommand,
        namespace = ?vetted.target.as_ref().map(|t| t.namespace.as_str()),
        "request accepted"
    );
    Ok(request)
}

async fn invoke(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<InvokeResponse>, ApiError> {
    let config = state.config.current()?;
    let payload = InvokeRequest::from_json(&body)?;
    let request = build_request(&config, &payload).inspect_err(|v| {
        info!(kind = %v.kind(), reason = %v, "request rejected");
    })?;

    let cancel = state.shutdown.child_token();
    let start = Instant::now();
    let outcome = runner::run(&request, &cancel).await;
    let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

    let mut meta = BTreeMap::new();
    meta.insert("workdir".to_string(), request.cwd.display().to_string());
    meta.insert("bin".to_string(), request.bin.display().to_string());
    if !config.dry_run {
        let version = state
            .versions
            .get_or_lookup(&config.bin, |bin| async move {
                runner::query_version(&bin).await
            })
            .await;
        if let Some(version) = version {
            meta.insert("version".to_string(), version);
        }
    }

    Ok(Json(InvokeResponse {
        exit_code: outcome.exit_code,
        duration_ms,
        stdout: outcome.stdout,
        stderr: outcome.stderr,
        truncated: outcome.truncated,
        timed_out: outcome.timed_out,
        meta,
    }))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
