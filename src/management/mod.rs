//! The management surface: a second `axum` server, bound to a separate Unix
//! socket, exposing the control plane over HTTP. Each handler is a thin
//! translator from wire format to `SocketManager` operations; no business
//! logic lives here.

use crate::manager::{ManagerError, SocketManager};
use crate::model::SocketCreateRequest;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::net::UnixListener;
use tokio::sync::oneshot;

#[derive(Debug, thiserror::Error)]
pub enum ManagementError {
  #[error("{0}")]
  Client(String),
  #[error("{0}")]
  NotFound(String),
  #[error("{0}")]
  Internal(String),
}

impl IntoResponse for ManagementError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ManagementError::Client(m) => (StatusCode::BAD_REQUEST, m.clone()),
      ManagementError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
      ManagementError::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, m.clone()),
    };
    (status, Json(json!({ "success": false, "error": message }))).into_response()
  }
}

impl From<ManagerError> for ManagementError {
  fn from(e: ManagerError) -> Self {
    match &e {
      ManagerError::AlreadyExists(_) | ManagerError::AddressInUse(_) => ManagementError::Client(e.to_string()),
      ManagerError::NotFound(_) => ManagementError::NotFound(e.to_string()),
      ManagerError::Repository(_) | ManagerError::Internal(_) => ManagementError::Internal(e.to_string()),
    }
  }
}

fn router(manager: Arc<SocketManager>) -> Router {
  Router::new()
    .route("/socket/create", post(create_socket))
    .route("/socket/list", get(list_sockets))
    .route("/socket/describe", get(describe_socket))
    .route("/socket/delete", delete(delete_socket))
    .route("/socket/clean", post(clean_sockets))
    .route("/health", get(health))
    .with_state(manager)
}

/// Serve the management surface over `listener` until `shutdown` fires.
pub async fn serve(listener: UnixListener, manager: Arc<SocketManager>, shutdown: oneshot::Receiver<()>) -> anyhow::Result<()> {
  let app = router(manager);
  axum::serve(listener, app)
    .with_graceful_shutdown(async {
      let _ = shutdown.await;
    })
    .await?;
  Ok(())
}

#[derive(Deserialize)]
struct SocketParam {
  socket: Option<String>,
}

fn require_socket_param(params: SocketParam) -> Result<String, ManagementError> {
  params
    .socket
    .filter(|s| !s.is_empty())
    .ok_or_else(|| ManagementError::Client("missing required parameter 'socket'".to_string()))
}

async fn create_socket(State(manager): State<Arc<SocketManager>>, body: Bytes) -> Result<Response, ManagementError> {
  let request: SocketCreateRequest =
    serde_json::from_slice(&body).map_err(|e| ManagementError::Client(format!("invalid socket config: {e}")))?;
  let created = manager.create(request).await?;
  Ok(
    (
      StatusCode::CREATED,
      Json(json!({
        "success": true,
        "socket": { "path": created.listen_address, "config": created },
      })),
    )
      .into_response(),
  )
}

async fn list_sockets(State(manager): State<Arc<SocketManager>>) -> impl IntoResponse {
  Json(json!({ "success": true, "sockets": manager.list() }))
}

async fn describe_socket(
  State(manager): State<Arc<SocketManager>>,
  Query(params): Query<SocketParam>,
) -> Result<Response, ManagementError> {
  let name = require_socket_param(params)?;
  let config = manager
    .get(&name)
    .ok_or_else(|| ManagementError::NotFound(format!("socket {name:?} not found")))?;
  Ok(Json(json!({ "success": true, "config": config })).into_response())
}

async fn delete_socket(
  State(manager): State<Arc<SocketManager>>,
  Query(params): Query<SocketParam>,
) -> Result<Response, ManagementError> {
  let name = require_socket_param(params)?;
  manager.delete(&name).await?;
  Ok(Json(json!({ "success": true, "message": format!("socket {name:?} deleted") })).into_response())
}

async fn clean_sockets(State(manager): State<Arc<SocketManager>>) -> Result<Response, ManagementError> {
  let cleaned = manager.clean().await?;
  Ok(Json(json!({ "success": true, "message": format!("{cleaned} socket(s) cleaned") })).into_response())
}

async fn health() -> impl IntoResponse {
  Json(json!({ "status": "healthy", "message": "ok" }))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::repository::InMemoryRepository;
  use axum::body::Body;
  use axum::http::Request;
  use tower::ServiceExt;

  fn test_manager(dir: &std::path::Path) -> Arc<SocketManager> {
    SocketManager::new(Arc::new(InMemoryRepository::new()), dir)
  }

  #[tokio::test]
  async fn health_reports_healthy() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(test_manager(dir.path()));
    let response = app
      .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
      .await
      .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
  }

  #[tokio::test]
  async fn describe_without_socket_param_is_bad_request() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(test_manager(dir.path()));
    let response = app
      .oneshot(Request::builder().uri("/socket/describe").body(Body::empty()).unwrap())
      .await
      .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
  }

  #[tokio::test]
  async fn describe_unknown_socket_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(test_manager(dir.path()));
    let response = app
      .oneshot(
        Request::builder()
          .uri("/socket/describe?socket=ghost")
          .body(Body::empty())
          .unwrap(),
      )
      .await
      .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
  }

  #[tokio::test]
  async fn create_then_list_then_delete_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(test_manager(dir.path()));

    let config = json!({
      "name": "ci",
      "listen_address": dir.path().join("ci.sock").to_string_lossy(),
      "docker_daemon_url": "unix:///var/run/docker.sock",
      "config": {},
      "rules": [],
    });

    let create_response = app
      .clone()
      .oneshot(
        Request::builder()
          .method("POST")
          .uri("/socket/create")
          .header("content-type", "application/json")
          .body(Body::from(serde_json::to_vec(&config).unwrap()))
          .unwrap(),
      )
      .await
      .unwrap();
    assert_eq!(create_response.status(), StatusCode::CREATED);

    let list_response = app
      .clone()
      .oneshot(Request::builder().uri("/socket/list").body(Body::empty()).unwrap())
      .await
      .unwrap();
    assert_eq!(list_response.status(), StatusCode::OK);

    let delete_response = app
      .oneshot(
        Request::builder()
          .method("DELETE")
          .uri("/socket/delete?socket=ci")
          .body(Body::empty())
          .unwrap(),
      )
      .await
      .unwrap();
    assert_eq!(delete_response.status(), StatusCode::OK);
  }

  #[tokio::test]
  async fn create_without_a_name_assigns_a_uuid_based_one() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(test_manager(dir.path()));

    let config = json!({
      "docker_daemon_url": "unix:///var/run/docker.sock",
    });

    let create_response = app
      .oneshot(
        Request::builder()
          .method("POST")
          .uri("/socket/create")
          .header("content-type", "application/json")
          .body(Body::from(serde_json::to_vec(&config).unwrap()))
          .unwrap(),
      )
      .await
      .unwrap();
    assert_eq!(create_response.status(), StatusCode::CREATED);

    let body = axum::body::to_bytes(create_response.into_body(), usize::MAX).await.unwrap();
    let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
    let name = parsed["socket"]["config"]["name"].as_str().unwrap();
    assert!(uuid::Uuid::parse_str(name).is_ok());
  }
}
