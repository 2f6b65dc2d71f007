//! The per-socket upstream client: one transport per live proxy socket,
//! dialling either the Docker daemon's Unix socket or a TCP endpoint. HTTPS
//! upstreams are rejected outright; TLS is out of scope.

use anyhow::Context;
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{HeaderMap, Method, Response, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use hyperlocal::{UnixConnector, Uri as UnixUri};
use std::path::PathBuf;

const POOL_MAX_IDLE_PER_HOST: usize = 10;

#[derive(Clone)]
pub enum Forwarder {
  Unix {
    client: Client<UnixConnector, Full<Bytes>>,
    socket_path: PathBuf,
  },
  Http {
    client: Client<HttpConnector, Full<Bytes>>,
    scheme: String,
    authority: String,
  },
}

impl Forwarder {
  /// Parse a `docker_daemon_url` of the form `unix:///path`, a bare
  /// filesystem path, or `http(s)://host:port` / `tcp://host:port`.
  pub fn new(daemon_url: &str) -> anyhow::Result<Self> {
    if let Some(path) = daemon_url.strip_prefix("unix://") {
      return Ok(Self::unix(path));
    }
    if daemon_url.starts_with('/') {
      return Ok(Self::unix(daemon_url));
    }
    if let Some(authority) = daemon_url.strip_prefix("tcp://") {
      return Ok(Self::http(authority));
    }
    if let Some(authority) = daemon_url.strip_prefix("http://") {
      return Ok(Self::http(authority));
    }
    anyhow::bail!("unsupported docker_daemon_url (TLS upstreams are out of scope): {daemon_url}")
  }

  fn unix(path: &str) -> Self {
    Self::Unix {
      client: Client::builder(TokioExecutor::new())
        .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
        .build(UnixConnector),
      socket_path: PathBuf::from(path),
    }
  }

  fn http(authority: &str) -> Self {
    Self::Http {
      client: Client::builder(TokioExecutor::new())
        .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
        .build(HttpConnector::new()),
      scheme: "http".to_string(),
      authority: authority.to_string(),
    }
  }

  fn build_uri(&self, path_and_query: &str) -> anyhow::Result<Uri> {
    match self {
      Self::Unix { socket_path, .. } => Ok(UnixUri::new(socket_path, path_and_query).into()),
      Self::Http { scheme, authority, .. } => Uri::builder()
        .scheme(scheme.as_str())
        .authority(authority.as_str())
        .path_and_query(path_and_query)
        .build()
        .context("building upstream URI"),
    }
  }

  pub async fn forward(
    &self,
    method: Method,
    path_and_query: &str,
    headers: HeaderMap,
    body: Bytes,
  ) -> anyhow::Result<Response<Incoming>> {
    let uri = self.build_uri(path_and_query)?;
    let mut builder = hyper::Request::builder().method(method).uri(uri);
    if let Some(h) = builder.headers_mut() {
      *h = headers;
    }
    let request = builder.body(Full::new(body)).context("building upstream request")?;

    let response = match self {
      Self::Unix { client, .. } => client.request(request).await,
      Self::Http { client, .. } => client.request(request).await,
    };
    response.context("upstream request failed")
  }
}
