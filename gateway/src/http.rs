//! HTTP/WebSocket surface (spec §6). Router shape mirrors the teacher's
//! `main.rs` (`Router::new().route(...).layer(CorsLayer)`), generalized
//! from one `/ws` + one REST route to the full console/vnc/admin surface.

use crate::agent_link::AgentLinkRegistry;
use crate::auth::{authenticate_admin, resolve_customer_jwt};
use crate::bridge::{run_gateway_bridge, BridgeParams};
use crate::cookie;
use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use axum_extra::extract::CookieJar;
use bmc_proto::control::{PowerOp, RpcEnvelope, UnaryOp, UnaryResult};
use bmc_proto::{AgentInfo, Channel};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/metrics", get(metrics))
        .route("/console/{id}", get(console_viewer))
        .route("/console/{id}/ws", get(console_ws))
        .route("/vnc/{id}", get(vnc_viewer))
        .route("/vnc/{id}/ws", get(vnc_ws))
        .route("/api/sessions/sol", post(create_sol_session))
        .route("/api/sessions/vnc", post(create_vnc_session))
        .route("/api/sessions/{id}", delete(close_session))
        .route("/api/servers/{id}/power", post(power_operation))
        .route("/api/servers/{id}/info", get(bmc_info))
        .route("/api/admin/agents", get(admin_list_agents))
        .route("/agent/ws", get(agent_link_ws))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ── Health / status / metrics ───────────────────────────────────

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    region: String,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy", service: "bmc-gateway", region: state.region.to_string() })
}

#[derive(Serialize)]
struct StatusResponse {
    agents: Vec<AgentInfo>,
    session_count: usize,
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse { agents: state.agents.list(), session_count: state.sessions.len().await })
}

async fn metrics(State(state): State<AppState>) -> String {
    format!(
        "# HELP gateway_agents_total Number of agents currently in the registry\n\
         # TYPE gateway_agents_total gauge\n\
         gateway_agents_total {}\n\
         # HELP gateway_sessions_total Number of live web sessions\n\
         # TYPE gateway_sessions_total gauge\n\
         gateway_sessions_total {}\n",
        state.agents.count(),
        state.sessions.len().await
    )
}

// ── Console / VNC viewer ────────────────────────────────────────

async fn console_viewer(State(state): State<AppState>, Path(id): Path<String>, headers: HeaderMap) -> Response {
    render_viewer(&state, &id, Channel::Sol, &headers).await
}

async fn vnc_viewer(State(state): State<AppState>, Path(id): Path<String>, headers: HeaderMap) -> Response {
    render_viewer(&state, &id, Channel::Vnc, &headers).await
}

async fn render_viewer(state: &AppState, id: &str, channel: Channel, headers: &HeaderMap) -> Response {
    let (websocket_url, web_session_id) = match channel {
        Channel::Sol => {
            let Some(sol) = state.console.get_sol_session(id) else { return ApiError(bmc_proto::PlatformError::NotFound("session".into())).into_response() };
            let Ok(web) = state.sessions.get_by_sol_session_id(id).await else {
                return ApiError(bmc_proto::PlatformError::NotFound("session".into())).into_response();
            };
            (sol.websocket_url, web.id)
        }
        Channel::Vnc => {
            let Some(vnc) = state.console.get_vnc_session(id) else { return ApiError(bmc_proto::PlatformError::NotFound("session".into())).into_response() };
            let Ok(web) = state.sessions.get_by_vnc_session_id(id).await else {
                return ApiError(bmc_proto::PlatformError::NotFound("session".into())).into_response();
            };
            (vnc.websocket_url, web.id)
        }
    };

    let https = cookie::is_https(headers.get("x-forwarded-proto").and_then(|v| v.to_str().ok()));
    let jar = CookieJar::new().add(cookie::session_cookie(&web_session_id, https, Duration::from_secs(3600)));
    let html = format!(
        "<!doctype html><html><body><script>const ws = new WebSocket((location.protocol === 'https:' ? 'wss://' : 'ws://') + location.host + '{websocket_url}');</script></body></html>"
    );
    (jar, Html(html)).into_response()
}

// ── Console / VNC WebSocket upgrade ─────────────────────────────

async fn console_ws(State(state): State<AppState>, Path(id): Path<String>, ws: WebSocketUpgrade) -> Response {
    upgrade_bridge(state, id, Channel::Sol, ws).await
}

async fn vnc_ws(State(state): State<AppState>, Path(id): Path<String>, ws: WebSocketUpgrade) -> Response {
    upgrade_bridge(state, id, Channel::Vnc, ws).await
}

async fn upgrade_bridge(state: AppState, session_id: String, channel: Channel, ws: WebSocketUpgrade) -> Response {
    let (server_id, agent_id) = match channel {
        Channel::Sol => match state.console.get_sol_session(&session_id) {
            Some(s) => (s.server_id, s.agent_id),
            None => return ApiError(bmc_proto::PlatformError::NotFound("session".into())).into_response(),
        },
        Channel::Vnc => match state.console.get_vnc_session(&session_id) {
            Some(s) => (s.server_id, s.agent_id),
            None => return ApiError(bmc_proto::PlatformError::NotFound("session".into())).into_response(),
        },
    };
    // A second attempt on a live session replaces the first (spec §5, §9 open question).
    let cancel = state.console.claim_bridge(&session_id);
    let link = state.link.clone();
    ws.on_upgrade(move |socket| async move {
        run_gateway_bridge(socket, BridgeParams { session_id, server_id, agent_id, channel }, link, cancel).await;
    })
}

// ── Session lifecycle REST ──────────────────────────────────────

#[derive(Deserialize)]
struct CreateSessionRequest {
    server_id: String,
}

async fn create_sol_session(State(state): State<AppState>, jar: CookieJar, headers: HeaderMap, Json(req): Json<CreateSessionRequest>) -> Result<Response, ApiError> {
    let jwt = resolve_customer_jwt(&state, &jar, &headers).await?;
    let handle = state.console.create_sol_session(&jwt, &req.server_id).await?;
    Ok(Json(handle_to_json(&handle)).into_response())
}

async fn create_vnc_session(State(state): State<AppState>, jar: CookieJar, headers: HeaderMap, Json(req): Json<CreateSessionRequest>) -> Result<Response, ApiError> {
    let jwt = resolve_customer_jwt(&state, &jar, &headers).await?;
    let handle = state.console.create_vnc_session(&jwt, &req.server_id).await?;
    Ok(Json(handle_to_json(&handle)).into_response())
}

#[derive(Serialize)]
struct SessionResponse {
    session_id: String,
    viewer_url: String,
    websocket_url: String,
    expires_at: chrono::DateTime<chrono::Utc>,
}

fn handle_to_json(handle: &crate::console::SessionHandle) -> SessionResponse {
    SessionResponse { session_id: handle.session_id.clone(), viewer_url: handle.viewer_url.clone(), websocket_url: handle.websocket_url.clone(), expires_at: handle.expires_at }
}

async fn close_session(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    state.console.close_session(&id).await;
    axum::http::StatusCode::NO_CONTENT
}

// ── Unary BMC operations ────────────────────────────────────────

#[derive(Deserialize)]
struct PowerRequest {
    op: PowerOp,
}

async fn power_operation(State(state): State<AppState>, Path(server_id): Path<String>, jar: CookieJar, headers: HeaderMap, Json(req): Json<PowerRequest>) -> Result<Json<UnaryResult>, ApiError> {
    let jwt = resolve_customer_jwt(&state, &jar, &headers).await?;
    let (_, agent_id) = state.console.resolve_agent(&jwt, &server_id).await?;
    let result = state.link.send_unary_request(&agent_id, &server_id, UnaryOp::Power(req.op)).await?;
    Ok(Json(result))
}

async fn bmc_info(State(state): State<AppState>, Path(server_id): Path<String>, jar: CookieJar, headers: HeaderMap) -> Result<Json<UnaryResult>, ApiError> {
    let jwt = resolve_customer_jwt(&state, &jar, &headers).await?;
    let (_, agent_id) = state.console.resolve_agent(&jwt, &server_id).await?;
    let result = state.link.send_unary_request(&agent_id, &server_id, UnaryOp::Info).await?;
    Ok(Json(result))
}

// ── Admin ────────────────────────────────────────────────────────

async fn admin_list_agents(State(state): State<AppState>, jar: CookieJar, headers: HeaderMap) -> Result<Json<Vec<AgentInfo>>, ApiError> {
    authenticate_admin(&state, &jar, &headers).await?;
    Ok(Json(state.agents.list()))
}

// ── Gateway<->Agent link ─────────────────────────────────────────

async fn agent_link_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_agent_link(socket, state))
}

async fn handle_agent_link(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<RpcEnvelope>();
    let outbound = tokio::spawn(async move {
        while let Some(envelope) = rx.recv().await {
            match bmc_proto::control::encode(&envelope) {
                Ok(bytes) => {
                    if sink.send(WsMessage::Binary(bytes.into())).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!(error = %e, "failed to encode rpc envelope"),
            }
        }
    });

    let mut agent_id: Option<String> = None;
    while let Some(Ok(frame)) = stream.next().await {
        let WsMessage::Binary(bytes) = frame else { continue };
        let Ok(envelope) = bmc_proto::control::decode(&bytes) else { continue };
        match envelope {
            RpcEnvelope::Register { agent_id: id, datacenter_id, endpoint } => {
                info!(agent_id = %id, %datacenter_id, "agent registered");
                state.agents.register(&id, &datacenter_id, &endpoint);
                state.link.register_connection(&id, tx.clone());
                agent_id = Some(id);
            }
            RpcEnvelope::Heartbeat { agent_id: id, at } => {
                state.agents.update_last_seen(&id, at);
            }
            other => state.link.dispatch_incoming(other),
        }
    }

    outbound.abort();
    if let Some(id) = agent_id {
        info!(agent_id = %id, "agent link disconnected");
        state.link.remove_connection(&id);
    }
}
