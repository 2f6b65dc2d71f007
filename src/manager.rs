//! The socket manager: owns the authoritative set of live proxy sockets,
//! each a listener + HTTP server + config snapshot bundle. State lives in a
//! `DashMap` for lock-free `get`/`list`, guarded by a `tokio::sync::RwLock`
//! "phase lock" that serialises the multi-step create/delete sequences.

use crate::model::{SocketConfig, SocketCreateRequest};
use crate::proxy;
use crate::repository::{RepositoryError, SocketRepository};
use anyhow::Context;
use dashmap::DashMap;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UnixListener;
use tokio::sync::{oneshot, RwLock};
use tokio::task::JoinHandle;

const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
  #[error("socket {0:?} already exists")]
  AlreadyExists(String),
  #[error("socket {0:?} not found")]
  NotFound(String),
  #[error("listen address {0:?} is already in use by another socket")]
  AddressInUse(String),
  #[error(transparent)]
  Repository(#[from] RepositoryError),
  #[error(transparent)]
  Internal(#[from] anyhow::Error),
}

struct LiveSocket {
  config: SocketConfig,
  shutdown_tx: Option<oneshot::Sender<()>>,
  task: JoinHandle<()>,
}

pub struct SocketManager {
  repository: Arc<dyn SocketRepository>,
  sockets_dir: PathBuf,
  sockets: DashMap<String, LiveSocket>,
  phase_lock: RwLock<()>,
}

impl SocketManager {
  pub fn new(repository: Arc<dyn SocketRepository>, sockets_dir: impl Into<PathBuf>) -> Arc<Self> {
    Arc::new(Self {
      repository,
      sockets_dir: sockets_dir.into(),
      sockets: DashMap::new(),
      phase_lock: RwLock::new(()),
    })
  }

  /// Load every persisted config and re-instantiate its listener, without
  /// re-persisting. Failures are logged per-socket and do not stop
  /// reconciliation of the rest.
  pub async fn reconcile(self: &Arc<Self>) -> anyhow::Result<()> {
    let configs = self.repository.list().context("listing persisted sockets during reconciliation")?;
    for config in configs {
      let name = config.name.clone();
      let _guard = self.phase_lock.write().await;
      if self.sockets.contains_key(&name) {
        continue;
      }
      match self.spawn(config).await {
        Ok(live) => {
          self.sockets.insert(name, live);
        }
        Err(e) => tracing::error!(socket = %name, error = %e, "failed to reconcile persisted socket"),
      }
    }
    Ok(())
  }

  /// Persist, then bind and start a listener; roll back the persisted
  /// record if the listener fails to come up. Returns the config with its
  /// resolved `name` and `listen_address`. A missing `name` is assigned a
  /// UUID-based one.
  pub async fn create(self: &Arc<Self>, request: SocketCreateRequest) -> Result<SocketConfig, ManagerError> {
    let name = request
      .name
      .filter(|n| !n.is_empty())
      .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let mut config = SocketConfig {
      name,
      listen_address: request.listen_address,
      docker_daemon_url: request.docker_daemon_url,
      config: request.config,
      rules: request.rules,
    };

    let _guard = self.phase_lock.write().await;
    if self.sockets.contains_key(&config.name) {
      return Err(ManagerError::AlreadyExists(config.name));
    }
    if config.listen_address.is_empty() {
      config.listen_address = self.sockets_dir.join(format!("{}.sock", config.name)).to_string_lossy().into_owned();
    }
    if self.sockets.iter().any(|e| e.config.listen_address == config.listen_address) {
      return Err(ManagerError::AddressInUse(config.listen_address));
    }

    self.repository.save(&config)?;

    match self.spawn(config.clone()).await {
      Ok(live) => {
        self.sockets.insert(config.name.clone(), live);
        tracing::info!(socket = %config.name, listen_address = %config.listen_address, "socket created");
        Ok(config)
      }
      Err(e) => {
        let _ = self.repository.delete(&config.name);
        Err(ManagerError::Internal(e))
      }
    }
  }

  /// Graceful shutdown with a 5-second deadline, then the socket file and
  /// persisted config are removed. The removal proceeds even if individual
  /// steps fail; only the aggregate outcome is reported.
  pub async fn delete(self: &Arc<Self>, name: &str) -> Result<(), ManagerError> {
    let _guard = self.phase_lock.write().await;
    let (_, mut live) = self
      .sockets
      .remove(name)
      .ok_or_else(|| ManagerError::NotFound(name.to_string()))?;

    if let Some(tx) = live.shutdown_tx.take() {
      let _ = tx.send(());
    }
    if tokio::time::timeout(SHUTDOWN_DEADLINE, &mut live.task).await.is_err() {
      tracing::warn!(socket = %name, "graceful shutdown deadline exceeded, aborting listener task");
      live.task.abort();
    }

    if let Err(e) = std::fs::remove_file(&live.config.listen_address) {
      if e.kind() != std::io::ErrorKind::NotFound {
        tracing::warn!(socket = %name, error = %e, "failed to remove socket file");
      }
    }
    if let Err(e) = self.repository.delete(name) {
      tracing::warn!(socket = %name, error = %e, "failed to remove persisted config");
    }

    tracing::info!(socket = %name, "socket deleted");
    Ok(())
  }

  /// Delete every live socket, collecting per-entry errors into a single
  /// aggregated error rather than stopping at the first failure.
  pub async fn clean(self: &Arc<Self>) -> Result<usize, ManagerError> {
    let names: Vec<String> = self.sockets.iter().map(|e| e.key().clone()).collect();
    let mut cleaned = 0;
    let mut failures = Vec::new();
    for name in names {
      match self.delete(&name).await {
        Ok(()) => cleaned += 1,
        Err(e) => failures.push(format!("{name}: {e}")),
      }
    }
    if failures.is_empty() {
      Ok(cleaned)
    } else {
      Err(ManagerError::Internal(anyhow::anyhow!("clean had {} failure(s): {}", failures.len(), failures.join("; "))))
    }
  }

  pub fn list(&self) -> Vec<String> {
    self.sockets.iter().map(|e| e.key().clone()).collect()
  }

  pub fn get(&self, name: &str) -> Option<SocketConfig> {
    self.sockets.get(name).map(|e| e.config.clone())
  }

  async fn spawn(&self, config: SocketConfig) -> anyhow::Result<LiveSocket> {
    let path = PathBuf::from(&config.listen_address);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).with_context(|| format!("creating parent dir for {}", path.display()))?;
    }
    let _ = std::fs::remove_file(&path);
    let listener = UnixListener::bind(&path).with_context(|| format!("binding proxy socket {}", path.display()))?;
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o660))
      .with_context(|| format!("setting permissions on {}", path.display()))?;

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let task_config = config.clone();
    let socket_name = config.name.clone();
    let task = tokio::spawn(async move {
      if let Err(e) = proxy::serve(listener, task_config, shutdown_rx).await {
        tracing::error!(socket = %socket_name, error = %e, "proxy server exited with error");
      }
    });

    Ok(LiveSocket {
      config,
      shutdown_tx: Some(shutdown_tx),
      task,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::SocketExtra;
  use crate::repository::InMemoryRepository;

  fn config(name: &str, dir: &std::path::Path) -> SocketCreateRequest {
    SocketCreateRequest {
      name: Some(name.to_string()),
      listen_address: dir.join(format!("{name}.sock")).to_string_lossy().into_owned(),
      docker_daemon_url: "unix:///var/run/docker.sock".to_string(),
      config: SocketExtra::default(),
      rules: vec![],
    }
  }

  #[tokio::test]
  async fn create_then_delete_round_trips_through_repository() {
    let dir = tempfile::tempdir().unwrap();
    let repo = Arc::new(InMemoryRepository::new());
    let manager = SocketManager::new(repo.clone(), dir.path());

    let created = manager.create(config("alpha", dir.path())).await.unwrap();
    assert_eq!(created.name, "alpha");
    assert_eq!(manager.list(), vec!["alpha".to_string()]);
    assert!(repo.load("alpha").is_ok());

    manager.delete("alpha").await.unwrap();
    assert!(manager.list().is_empty());
    assert!(repo.load("alpha").is_err());
  }

  #[tokio::test]
  async fn create_assigns_a_uuid_based_name_when_omitted() {
    let dir = tempfile::tempdir().unwrap();
    let repo = Arc::new(InMemoryRepository::new());
    let manager = SocketManager::new(repo, dir.path());

    let mut request = config("unused", dir.path());
    request.name = None;
    request.listen_address = String::new();

    let created = manager.create(request).await.unwrap();
    assert!(uuid::Uuid::parse_str(&created.name).is_ok());
    assert_eq!(manager.list(), vec![created.name]);
  }

  #[tokio::test]
  async fn create_rejects_duplicate_name() {
    let dir = tempfile::tempdir().unwrap();
    let repo = Arc::new(InMemoryRepository::new());
    let manager = SocketManager::new(repo, dir.path());

    manager.create(config("dup", dir.path())).await.unwrap();
    let result = manager.create(config("dup", dir.path())).await;
    assert!(matches!(result, Err(ManagerError::AlreadyExists(_))));
  }

  #[tokio::test]
  async fn delete_of_unknown_socket_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let repo = Arc::new(InMemoryRepository::new());
    let manager = SocketManager::new(repo, dir.path());
    assert!(matches!(manager.delete("ghost").await, Err(ManagerError::NotFound(_))));
  }

  #[tokio::test]
  async fn clean_removes_every_live_socket() {
    let dir = tempfile::tempdir().unwrap();
    let repo = Arc::new(InMemoryRepository::new());
    let manager = SocketManager::new(repo, dir.path());
    manager.create(config("one", dir.path())).await.unwrap();
    manager.create(config("two", dir.path())).await.unwrap();

    let cleaned = manager.clean().await.unwrap();
    assert_eq!(cleaned, 2);
    assert!(manager.list().is_empty());
  }
}
