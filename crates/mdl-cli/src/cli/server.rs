//! HTTP server hosting the RPC carriers: `GET /rpc/ws` (duplex) and
//! `POST /rpc/http` (single-shot), both behind the gate.

use std::future::ready;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use futures::{SinkExt, StreamExt};
use mdl_core::rpc::{serve_duplex, single_shot, RpcDispatcher};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::gate::Gate;

#[derive(Clone)]
pub struct AppState {
    pub rpc: Arc<RpcDispatcher>,
    pub gate: Arc<dyn Gate>,
}

pub fn router(state: AppState) -> Router {
    let rpc = Router::new()
        .route("/ws", get(ws_handler))
        .route("/http", post(http_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_gate));

    Router::new()
        .nest("/rpc", rpc)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn require_gate(State(state): State<AppState>, req: Request, next: Next) -> Response {
    if state.gate.allow(req.headers(), req.uri().query()) {
        next.run(req).await
    } else {
        tracing::debug!(path = %req.uri().path(), "rpc request rejected by gate");
        (StatusCode::UNAUTHORIZED, "unauthorized").into_response()
    }
}

async fn http_handler(State(state): State<AppState>, body: Bytes) -> impl IntoResponse {
    let response = single_shot(&state.rpc, &body).await;
    ([(header::CONTENT_TYPE, "application/json")], response)
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state.rpc))
}

/// Adapt one WebSocket to the duplex carrier. Text and binary messages are
/// call frames; a close frame or read error ends the connection.
async fn handle_socket(socket: WebSocket, rpc: Arc<RpcDispatcher>) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(conn_id = %conn_id, "rpc connection opened");

    let (sink, stream) = socket.split();
    let incoming = Box::pin(
        stream
            .take_while(|msg| ready(matches!(msg, Ok(m) if !matches!(m, Message::Close(_)))))
            .filter_map(|msg| {
                ready(match msg {
                    Ok(Message::Text(text)) => Some(text.as_str().to_owned()),
                    Ok(Message::Binary(bytes)) => Some(String::from_utf8_lossy(&bytes).into_owned()),
                    _ => None,
                })
            }),
    );
    let outgoing = Box::pin(
        sink.with(|frame: String| ready(Ok::<_, axum::Error>(Message::Text(frame.into())))),
    );
    let events = rpc.dispatcher().store().subscribe();

    let answered = serve_duplex(&rpc, incoming, outgoing, Some(events)).await;
    tracing::info!(conn_id = %conn_id, calls = answered, "rpc connection closed");
}
