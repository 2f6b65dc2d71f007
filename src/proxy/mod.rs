//! The proxy runtime: one HTTP server per live proxy socket, each bound to
//! its own `SocketConfig` snapshot, served directly over a
//! `tokio::net::UnixListener` via `axum::serve` — axum's `serve` accepts any
//! `Listener` implementation, Unix sockets included.

mod forwarder;

use crate::error::ProxyError;
use crate::evaluator;
use crate::model::{self, SocketConfig};
use axum::body::{Body, Bytes};
use axum::extract::{Request, State};
use axum::http::{header, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::Router;
use forwarder::Forwarder;
use indexmap::IndexMap;
use std::sync::Arc;
use tokio::net::UnixListener;
use tokio::sync::oneshot;

struct ProxyState {
  config: SocketConfig,
  forwarder: Forwarder,
}

/// Serve `config`'s proxy socket until `shutdown` fires, then drain
/// in-flight connections within the 5-second deadline.
pub async fn serve(listener: UnixListener, config: SocketConfig, shutdown: oneshot::Receiver<()>) -> anyhow::Result<()> {
  let forwarder = Forwarder::new(&config.docker_daemon_url)?;
  let state = Arc::new(ProxyState { config, forwarder });
  let app = Router::new().fallback(handle_request).with_state(state);

  axum::serve(listener, app)
    .with_graceful_shutdown(async {
      let _ = shutdown.await;
    })
    .await?;
  Ok(())
}

async fn handle_request(State(state): State<Arc<ProxyState>>, req: Request) -> Response {
  let (parts, body) = req.into_parts();

  let body_bytes = match axum::body::to_bytes(body, state.config.max_body_bytes()).await {
    Ok(bytes) => bytes,
    Err(_) => return ProxyError::Client("request body exceeds the configured size limit".to_string()).into_response(),
  };

  let decoded_body = decode_json_body(&parts.headers, &body_bytes);
  let request = model::Request {
    method: parts.method.to_string(),
    path: parts.uri.path().to_string(),
    body: decoded_body,
  };

  let result = evaluator::evaluate(&request, &state.config.rules);

  if !result.allowed {
    return ProxyError::Policy(result.reason).into_response();
  }

  let outgoing_body = if result.modified {
    let modified = result.modified_body.unwrap_or_default();
    match serde_json::to_vec(&model::Value::Object(modified)) {
      Ok(bytes) => Bytes::from(bytes),
      Err(e) => return ProxyError::Internal(e.into()).into_response(),
    }
  } else {
    body_bytes
  };

  let mut forward_headers = parts.headers.clone();
  if result.modified {
    if let Ok(len) = HeaderValue::from_str(&outgoing_body.len().to_string()) {
      forward_headers.insert(header::CONTENT_LENGTH, len);
    }
  }

  let path_and_query = parts
    .uri
    .path_and_query()
    .map(|pq| pq.as_str().to_string())
    .unwrap_or_else(|| parts.uri.path().to_string());

  match state
    .forwarder
    .forward(parts.method.clone(), &path_and_query, forward_headers, outgoing_body)
    .await
  {
    Ok(upstream) => stream_upstream_response(upstream),
    Err(e) => ProxyError::Upstream(e.to_string()).into_response(),
  }
}

fn stream_upstream_response(upstream: hyper::Response<hyper::body::Incoming>) -> Response {
  let (parts, incoming) = upstream.into_parts();
  let mut builder = Response::builder().status(parts.status);
  if let Some(headers) = builder.headers_mut() {
    *headers = parts.headers;
  }
  builder
    .body(Body::new(incoming))
    .unwrap_or_else(|e| ProxyError::Internal(e.into()).into_response())
}

/// Decode the request body as a JSON object. Any non-object payload,
/// non-JSON content type, or decode failure yields an empty map rather than
/// an error — body-conditional rules simply don't match.
fn decode_json_body(headers: &axum::http::HeaderMap, body: &Bytes) -> IndexMap<String, model::Value> {
  let is_json = headers
    .get(header::CONTENT_TYPE)
    .and_then(|v| v.to_str().ok())
    .is_some_and(|s| s.starts_with("application/json"));

  if !is_json || body.is_empty() {
    return IndexMap::new();
  }

  match serde_json::from_slice::<model::Value>(body) {
    Ok(model::Value::Object(map)) => map,
    _ => IndexMap::new(),
  }
}
