use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{info, warn};

use crate::engine::LogEngine;
use crate::error::{LogQueryError, Result};
use crate::model::{AggregateRequest, QueryFilter};

type Sessions = Arc<RwLock<HashMap<String, mpsc::UnboundedSender<Event>>>>;

static NEXT_SESSION: AtomicU64 = AtomicU64::new(1);

/// Removes its session from the map when the SSE stream holding it is dropped.
struct SessionGuard {
    id: String,
    sessions: Sessions,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if let Ok(mut sessions) = self.sessions.write() {
            sessions.remove(&self.id);
        }
        info!("sse session {} closed", self.id);
    }
}

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<LogEngine>,
    pub sessions: Sessions,
}

struct ApiError(LogQueryError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            LogQueryError::DirectoryNotFound { .. } | LogQueryError::NotFound(_) => StatusCode::NOT_FOUND,
            e if e.is_validation() => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self.0.to_json())).into_response()
    }
}

/// Run a blocking engine call off the async executor.
async fn run_engine<T, F>(engine: Arc<LogEngine>, f: F) -> std::result::Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&LogEngine) -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(move || f(&engine))
        .await
        .map_err(|e| ApiError(LogQueryError::Io(std::io::Error::other(e.to_string()))))?
        .map_err(ApiError)
}

fn json_ok<T: Serialize>(result: std::result::Result<T, ApiError>) -> Response {
    match result {
        Ok(v) => (StatusCode::OK, Json(v)).into_response(),
        Err(e) => e.into_response(),
    }
}

fn bad_body(e: JsonRejection) -> Response {
    ApiError(LogQueryError::InvalidRequest(format!("invalid request body: {e}"))).into_response()
}

async fn list_files_handler(State(state): State<AppState>) -> Response {
    json_ok(run_engine(state.engine, |e| e.list_log_files()).await)
}

async fn query_handler(
    State(state): State<AppState>,
    payload: std::result::Result<Json<QueryFilter>, JsonRejection>,
) -> Response {
    let filter = match payload {
        Ok(Json(f)) => f,
        Err(e) => return bad_body(e),
    };
    json_ok(run_engine(state.engine, move |e| e.query_logs(&filter)).await)
}

async fn aggregate_handler(
    State(state): State<AppState>,
    payload: std::result::Result<Json<AggregateRequest>, JsonRejection>,
) -> Response {
    let req = match payload {
        Ok(Json(r)) => r,
        Err(e) => return bad_body(e),
    };
    json_ok(run_engine(state.engine, move |e| e.aggregate_logs(req.files.as_deref(), &req.group_by)).await)
}

async fn stats_handler(State(state): State<AppState>) -> Response {
    json_ok(run_engine(state.engine, |e| e.get_log_stats()).await)
}

async fn sse_handler(State(state): State<AppState>) -> Sse<impl Stream<Item = std::result::Result<Event, axum::Error>>> {
    let (tx, rx) = mpsc::unbounded_channel();
    let session_id = format!(
        "{}-{}",
        chrono::Utc::now().timestamp_nanos_opt().unwrap_or(0),
        NEXT_SESSION.fetch_add(1, Ordering::Relaxed)
    );

    // relative URI; the client resolves it against the SSE endpoint
    let endpoint_url = format!("/message?session_id={}", session_id);
    let _ = tx.send(Event::default().event("endpoint").data(endpoint_url));

    if let Ok(mut sessions) = state.sessions.write() {
        sessions.insert(session_id.clone(), tx);
    }
    info!("sse session {} opened", session_id);

    let guard = SessionGuard { id: session_id, sessions: state.sessions.clone() };
    let stream = UnboundedReceiverStream::new(rx).map(move |event| {
        let _session = &guard;
        Ok::<_, axum::Error>(event)
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[derive(Deserialize)]
struct MessageQuery {
    session_id: String,
}

async fn message_handler(
    State(state): State<AppState>,
    Query(q): Query<MessageQuery>,
    Json(req): Json<crate::mcp::RpcRequest>,
) -> impl IntoResponse {
    let sender = state
        .sessions
        .read()
        .ok()
        .and_then(|sessions| sessions.get(&q.session_id).cloned());

    let Some(sender) = sender else {
        return StatusCode::NOT_FOUND;
    };

    let engine = state.engine.clone();
    let sessions = state.sessions.clone();
    let session_id = q.session_id;
    tokio::task::spawn_blocking(move || {
        let Some(resp) = crate::mcp::process_request(&engine, req) else { return };
        if let Ok(json_str) = serde_json::to_string(&resp) {
            if sender.send(Event::default().event("message").data(json_str)).is_err() {
                warn!("sse session {} closed, dropping it", session_id);
                if let Ok(mut s) = sessions.write() {
                    s.remove(&session_id);
                }
            }
        }
    });
    StatusCode::ACCEPTED
}

pub fn build_router(engine: Arc<LogEngine>) -> Router {
    let state = AppState {
        engine,
        sessions: Arc::new(RwLock::new(HashMap::new())),
    };
    Router::new()
        .route("/files", get(list_files_handler))
        .route("/query", post(query_handler))
        .route("/aggregate", post(aggregate_handler))
        .route("/stats", get(stats_handler))
        .route("/sse", get(sse_handler))
        .route("/message", post(message_handler))
        .with_state(state)
}

pub async fn serve_http(engine: Arc<LogEngine>) -> Result<()> {
    let server = &engine.config().server;
    let addr = format!(
        "{}:{}",
        server.http_addr.clone().unwrap_or_else(|| "127.0.0.1".to_string()),
        server.http_port.unwrap_or(8000)
    );
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| LogQueryError::ConfigError(format!("bind {addr} failed: {e}")))?;
    info!("HTTP server listening on http://{}", addr);
    info!("SSE endpoint: http://{}/sse", addr);
    axum::serve(listener, build_router(engine)).await.map_err(Into::into)
}
