//! Dashboard HTTP API
//!
//! JSON endpoints over hyper http1 exposing telemetry snapshots and cached
//! liveness results, plus health and Prometheus endpoints.
//!
//! | Route                   | Body                                   |
//! |-------------------------|----------------------------------------|
//! | `/healthz`              | `ok`                                   |
//! | `/api/status`           | server name, hostname, uptime, time    |
//! | `/api/metrics`          | one fresh [`TelemetrySample`]          |
//! | `/api/metrics/history`  | rolling window of samples              |
//! | `/api/apps`             | targets joined with cached liveness    |
//! | `/api/apps/status`      | target id to state                     |
//! | `/metrics`              | Prometheus text exposition             |

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::CONTENT_TYPE;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::liveness::{LivenessCache, LivenessResult, LivenessState};
use crate::metrics;
use crate::sampling::{TelemetrySample, TelemetrySampler};
use crate::targets::{MonitoredTarget, TargetStore};

const JSON: &str = "application/json";

// =============================================================================
// Shared State
// =============================================================================

/// Everything the handlers read from
#[derive(Clone)]
pub struct AppState {
    pub sampler: Arc<TelemetrySampler>,
    pub cache: LivenessCache,
    pub store: Arc<dyn TargetStore>,
    pub server_name: String,
    /// Root of the procfs tree, used for the hostname
    pub proc_root: PathBuf,
    pub started: Instant,
}

impl AppState {
    pub fn new(
        sampler: Arc<TelemetrySampler>,
        cache: LivenessCache,
        store: Arc<dyn TargetStore>,
        server_name: impl Into<String>,
    ) -> Self {
        Self {
            sampler,
            cache,
            store,
            server_name: server_name.into(),
            proc_root: PathBuf::from(crate::sampling::reader::DEFAULT_PROC_ROOT),
            started: Instant::now(),
        }
    }

    pub fn with_proc_root(mut self, proc_root: impl Into<PathBuf>) -> Self {
        self.proc_root = proc_root.into();
        self
    }

    fn hostname(&self) -> String {
        std::fs::read_to_string(self.proc_root.join("sys/kernel/hostname"))
            .ok()
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty())
            .or_else(|| std::env::var("HOSTNAME").ok())
            .unwrap_or_else(|| "unknown".to_string())
    }
}

// =============================================================================
// Response Bodies
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ServerStatus {
    server_name: String,
    hostname: String,
    uptime_secs: u64,
    now: DateTime<Utc>,
    sampling: &'static str,
}

/// A monitored target with its latest liveness result
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AppView {
    #[serde(flatten)]
    target: MonitoredTarget,
    state: LivenessState,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_check: Option<LivenessResult>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

// =============================================================================
// Routing
// =============================================================================

/// Serve one request
pub async fn route(state: &AppState, method: &Method, path: &str) -> Response<Full<Bytes>> {
    if *method != Method::GET && *method != Method::HEAD {
        return text(StatusCode::METHOD_NOT_ALLOWED, "method not allowed");
    }

    let result = match path {
        "/healthz" | "/livez" => return text(StatusCode::OK, "ok"),
        "/api/status" => status(state),
        "/api/metrics" => current_sample(state).await,
        "/api/metrics/history" => json(StatusCode::OK, &state.sampler.history()),
        "/api/apps" => apps(state).await,
        "/api/apps/status" => apps_status(state).await,
        "/metrics" => prometheus_text(),
        _ => return text(StatusCode::NOT_FOUND, "not found"),
    };

    result.unwrap_or_else(|e| {
        warn!("Request {} failed: {}", path, e);
        let code = match e {
            Error::TargetStore(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorBody {
            error: e.to_string(),
        };
        json(code, &body).unwrap_or_else(|_| text(code, "error"))
    })
}

fn status(state: &AppState) -> Result<Response<Full<Bytes>>> {
    json(
        StatusCode::OK,
        &ServerStatus {
            server_name: state.server_name.clone(),
            hostname: state.hostname(),
            uptime_secs: state.started.elapsed().as_secs(),
            now: Utc::now(),
            sampling: state.sampler.strategy().as_str(),
        },
    )
}

async fn current_sample(state: &AppState) -> Result<Response<Full<Bytes>>> {
    // Reading procfs and statvfs blocks
    let sampler = Arc::clone(&state.sampler);
    let sample: TelemetrySample = tokio::task::spawn_blocking(move || sampler.sample())
        .await
        .map_err(|e| Error::Internal(format!("Sampling task failed: {}", e)))?;
    json(StatusCode::OK, &sample)
}

async fn apps(state: &AppState) -> Result<Response<Full<Bytes>>> {
    let targets = state.store.list_targets().await?;
    let views: Vec<AppView> = targets
        .into_iter()
        .map(|target| {
            let last_check = state.cache.get(&target.id);
            AppView {
                state: last_check.as_ref().map(|r| r.state).unwrap_or_default(),
                target,
                last_check,
            }
        })
        .collect();
    json(StatusCode::OK, &views)
}

async fn apps_status(state: &AppState) -> Result<Response<Full<Bytes>>> {
    let targets = state.store.list_targets().await?;
    let states: BTreeMap<String, LivenessState> = targets
        .into_iter()
        .map(|t| {
            let s = state.cache.state(&t.id);
            (t.id, s)
        })
        .collect();
    json(StatusCode::OK, &states)
}

fn prometheus_text() -> Result<Response<Full<Bytes>>> {
    let body = metrics::gather_text()?;
    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, "text/plain; version=0.0.4")
        .body(Full::new(Bytes::from(body)))
        .map_err(|e| Error::Internal(format!("Failed to build response: {}", e)))
}

fn json<T: Serialize + ?Sized>(code: StatusCode, value: &T) -> Result<Response<Full<Bytes>>> {
    let body = serde_json::to_vec(value)
        .map_err(|e| Error::Internal(format!("Failed to encode response: {}", e)))?;
    Response::builder()
        .status(code)
        .header(CONTENT_TYPE, JSON)
        .body(Full::new(Bytes::from(body)))
        .map_err(|e| Error::Internal(format!("Failed to build response: {}", e)))
}

fn text(code: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *response.status_mut() = code;
    response
}

// =============================================================================
// Server
// =============================================================================

/// Accept connections until `shutdown` is cancelled
pub async fn serve(addr: SocketAddr, state: AppState, shutdown: CancellationToken) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Internal(format!("Failed to bind {}: {}", addr, e)))?;

    info!("Dashboard API listening on {}", addr);
    serve_listener(listener, state, shutdown).await
}

/// Serve on an already-bound listener
pub async fn serve_listener(
    listener: TcpListener,
    state: AppState,
    shutdown: CancellationToken,
) -> Result<()> {
    let state = Arc::new(state);

    loop {
        let (stream, peer) = tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Dashboard API shutting down");
                return Ok(());
            }
            accepted = listener.accept() => accepted
                .map_err(|e| Error::Internal(format!("Accept error: {}", e)))?,
        };

        debug!("Accepted connection from {}", peer);
        let io = TokioIo::new(stream);
        let state = Arc::clone(&state);

        tokio::spawn(async move {
            let service = service_fn(move |req: Request<hyper::body::Incoming>| {
                let state = Arc::clone(&state);
                async move {
                    let response = route(&state, req.method(), req.uri().path()).await;
                    Ok::<_, Infallible>(response)
                }
            });

            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                error!("Connection error: {}", e);
            }
        });
    }
}

// =============================================================================
// Tests
// =============================================================================
