//! HTTP and WebSocket front end.
//!
//! Routes:
//!
//! - `GET /listGames`: BSON catalog listing, independent of any session
//! - `GET /attach`: WebSocket upgrade; one session per connection
//! - `GET /status`: plain text status with the number of clients online
//!
//! Admission runs before the upgrade, so refused clients get a plain
//! `401` and no session state is ever created for them.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use log::{debug, error, info, warn};
use serde::Deserialize;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;

use super::access::{AccessGate, PolicyError, SessionTicket};
use super::catalog::{Catalog, CatalogError};
use super::config::ConfigError;
use super::core::CoreFactory;
use super::protocol::encode_catalog;
use super::session::Session;
use super::worker::spawn_session;

/// Errors that stop the server. All of them are fatal at startup.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Policy(#[from] PolicyError),
    #[error("no games found in {0}")]
    EmptyCatalog(PathBuf),
    #[error("failed to bind {addr}: {source}")]
    Bind { addr: SocketAddr, source: io::Error },
    #[error("server error: {0}")]
    Serve(io::Error),
}

/// Process-wide state shared by every route.
#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<Catalog>,
    pub gate: Arc<AccessGate>,
    pub factory: Arc<dyn CoreFactory>,
}

impl AppState {
    pub fn new(catalog: Catalog, gate: AccessGate, factory: Arc<dyn CoreFactory>) -> Self {
        Self {
            catalog: Arc::new(catalog),
            gate: Arc::new(gate),
            factory,
        }
    }
}

/// Builds the router for all relay routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/listGames", get(list_games))
        .route("/attach", get(attach))
        .route("/status", get(status))
        .with_state(state)
}

/// Binds `addr` and serves until Ctrl-C.
pub async fn serve(addr: SocketAddr, state: AppState) -> Result<(), ServerError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;
    serve_listener(listener, state, shutdown_signal()).await
}

/// Serves on an already bound listener until `shutdown` completes.
pub async fn serve_listener<F>(listener: TcpListener, state: AppState, shutdown: F) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!("Listening on http://{}", addr);
    }

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(ServerError::Serve)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

async fn list_games(State(state): State<AppState>) -> Response {
    match encode_catalog(&state.catalog.names()) {
        Ok(body) => ([(header::CONTENT_TYPE, "application/octet-stream")], body).into_response(),
        Err(e) => {
            error!("Failed to encode catalog: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn status(State(state): State<AppState>) -> String {
    format!(
        "pocket-relay\n\n{} clients online\n{} games loaded\n",
        state.gate.registry().live_count(),
        state.catalog.len()
    )
}

#[derive(Debug, Deserialize)]
struct AttachParams {
    password: Option<String>,
}

async fn attach(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<AttachParams>,
    headers: HeaderMap,
) -> Response {
    let credential = bearer_token(&headers).or(params.password.as_deref());
    let ticket = match state.gate.admit(credential) {
        Ok(ticket) => ticket,
        Err(e) => {
            warn!("Rejected client: {}", e);
            return (StatusCode::UNAUTHORIZED, e.to_string()).into_response();
        }
    };

    ws.on_upgrade(move |socket| handle_socket(socket, state, ticket))
}

/// Extracts the password from an `Authorization: Bearer` header.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

/// Pumps frames between one WebSocket and its session worker.
async fn handle_socket(mut socket: WebSocket, state: AppState, ticket: SessionTicket) {
    let id = ticket.id();
    let registry = Arc::clone(state.gate.registry());
    info!("Client {} connected ({} online)", id, registry.live_count());

    let session = Session::new(id, Arc::clone(&state.catalog), Arc::clone(&state.factory));
    let mut handle = match spawn_session(session) {
        Ok(handle) => handle,
        Err(e) => {
            error!("Client {}: failed to start session worker: {}", id, e);
            return;
        }
    };

    loop {
        tokio::select! {
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Binary(data))) => {
                    if !handle.send(data) {
                        break;
                    }
                }
                Some(Ok(Message::Text(text))) => {
                    if !handle.send(text.into_bytes()) {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!("Client {}: socket error: {}", id, e);
                    break;
                }
            },
            outgoing = handle.recv() => match outgoing {
                Some(bytes) => {
                    if socket.send(Message::Binary(bytes)).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
        }
    }

    // Closing the worker's inbound channel stops its timers and releases the core
    drop(handle);
    drop(ticket);
    info!("Client {} disconnected ({} online)", id, registry.live_count());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::access::AccessPolicy;
    use crate::relay::core::PatternCoreFactory;
    use axum::http::HeaderValue;
    use bson::Document;

    fn state(policies: Vec<AccessPolicy>) -> AppState {
        let mut catalog = Catalog::default();
        catalog.insert("TETRIS".into(), vec![0; 16]);
        catalog.insert("ZELDA".into(), vec![0; 16]);
        AppState::new(catalog, AccessGate::new(policies).unwrap(), Arc::new(PatternCoreFactory))
    }

    #[test]
    fn test_bearer_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer hunter2"));
        assert_eq!(bearer_token(&headers), Some("hunter2"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);
    }

    #[tokio::test]
    async fn test_list_games_is_bson_listing() {
        let response = list_games(State(state(Vec::new()))).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let doc = Document::from_reader(&mut &body[..]).unwrap();
        assert_eq!(doc.get_str("0").unwrap(), "TETRIS");
        assert_eq!(doc.get_str("1").unwrap(), "ZELDA");
    }

    #[tokio::test]
    async fn test_status_reports_clients_online() {
        let state = state(Vec::new());
        let _ticket = state.gate.admit(None).unwrap();
        let text = status(State(state.clone())).await;
        assert!(text.contains("1 clients online"));
        assert!(text.contains("2 games loaded"));
    }
}
