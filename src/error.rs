//! The error taxonomy for the proxy runtime's data-plane requests. Every
//! handler maps into one of these variants so `ProxyError` can implement
//! `IntoResponse` once rather than per-handler.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
  #[error("{0}")]
  Client(String),
  #[error("{0}")]
  NotFound(String),
  #[error("{0}")]
  Policy(String),
  #[error("{0}")]
  Upstream(String),
  #[error(transparent)]
  Internal(#[from] anyhow::Error),
}

impl IntoResponse for ProxyError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ProxyError::Client(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
      ProxyError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
      ProxyError::Policy(msg) => (StatusCode::FORBIDDEN, msg.clone()),
      ProxyError::Upstream(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
      ProxyError::Internal(err) => {
        tracing::error!(error = %err, "internal error");
        (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
      }
    };
    (status, Json(json!({ "error": message }))).into_response()
  }
}
